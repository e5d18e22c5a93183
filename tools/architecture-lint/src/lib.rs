//! Layer boundary lint for the clinic console crate.
//!
//! Every file under `console/src/{domain,inbound,outbound}` is parsed with
//! `syn`, and each path it names is checked against its layer's bans:
//!
//! | layer      | may not name                                             |
//! |------------|----------------------------------------------------------|
//! | `domain`   | `inbound`, `outbound`, and the adapter crates            |
//! | `inbound`  | `outbound`, `reqwest`                                    |
//! | `outbound` | `inbound`, `clap`                                        |
//!
//! `std::fs` and `tokio::fs` are banned everywhere; files are reached through
//! `cap_std` directory handles instead.
//!
//! Run it with `cargo run -p architecture-lint`.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use syn::visit::{self, Visit};
use thiserror::Error;

const CRATE_NAME: &str = "clinic_console";
const AMBIENT_FS: [(&str, &str); 2] = [("std", "fs"), ("tokio", "fs")];

/// One banned reference found in one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// File path relative to `console/src`.
    pub file: PathBuf,
    /// Which ban the file broke.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Why the lint did not pass.
#[derive(Debug, Error)]
pub enum ArchitectureLintError {
    /// Sources could not be listed or read.
    #[error("reading console sources failed: {0}")]
    Io(#[from] io::Error),
    /// A file is outside the layers or is not valid Rust.
    #[error("cannot lint {}: {message}", file.display())]
    Parse {
        /// Offending file.
        file: PathBuf,
        /// Parser or layout complaint.
        message: String,
    },
    /// Banned references were found.
    #[error("{}", report(.0))]
    Violations(Vec<Violation>),
}

fn report(violations: &[Violation]) -> String {
    violations
        .iter()
        .fold(String::from("layer boundary violations:"), |mut text, violation| {
            text.push_str("\n  ");
            text.push_str(&violation.to_string());
            text
        })
}

/// A Rust source file to be linted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintSource {
    /// Path relative to `console/src`.
    pub file: PathBuf,
    /// Rust source text.
    pub contents: String,
}

/// Lint the sources of the `console/` directory at `console_dir`.
///
/// # Errors
///
/// See [`ArchitectureLintError`].
pub fn lint_console_sources(console_dir: &Path) -> Result<(), ArchitectureLintError> {
    let src = Dir::open_ambient_dir(console_dir.join("src"), ambient_authority())?;
    lint_sources(&read_layer_sources(&src)?)
}

/// Lint in-memory sources; every violation across all files is reported.
///
/// # Errors
///
/// See [`ArchitectureLintError`].
pub fn lint_sources(sources: &[LintSource]) -> Result<(), ArchitectureLintError> {
    let mut violations = Vec::new();
    for source in sources {
        violations.extend(check(source)?);
    }
    if violations.is_empty() {
        return Ok(());
    }
    violations.sort();
    Err(ArchitectureLintError::Violations(violations))
}

fn check(source: &LintSource) -> Result<Vec<Violation>, ArchitectureLintError> {
    let unlintable = |message: String| ArchitectureLintError::Parse {
        file: source.file.clone(),
        message,
    };
    let layer = Layer::of_file(&source.file)
        .ok_or_else(|| unlintable("file is not under domain/, inbound/ or outbound/".to_owned()))?;
    let syntax = syn::parse_file(&source.contents).map_err(|err| unlintable(err.to_string()))?;

    let mut names = NamedPaths::default();
    names.visit_file(&syntax);
    let messages: BTreeSet<String> = names.0.iter().flat_map(|path| layer.judge(path)).collect();
    Ok(messages
        .into_iter()
        .map(|message| Violation {
            file: source.file.clone(),
            message,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Domain,
    Inbound,
    Outbound,
}

impl Layer {
    const ALL: [Self; 3] = [Self::Domain, Self::Inbound, Self::Outbound];

    const fn dir(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    fn named(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|layer| layer.dir() == segment)
    }

    fn of_file(file: &Path) -> Option<Self> {
        let first = file.components().next()?;
        Self::named(first.as_os_str().to_str()?)
    }

    const fn banned_layers(self) -> &'static [Self] {
        match self {
            Self::Domain => &[Self::Inbound, Self::Outbound],
            Self::Inbound => &[Self::Outbound],
            Self::Outbound => &[Self::Inbound],
        }
    }

    const fn banned_crates(self) -> &'static [&'static str] {
        match self {
            Self::Domain => &[
                "cap_std",
                "clap",
                "color_eyre",
                "ortho_config",
                "reqwest",
                "tempfile",
                "tracing_subscriber",
            ],
            Self::Inbound => &["reqwest"],
            Self::Outbound => &["clap"],
        }
    }

    fn judge(self, path: &[String]) -> impl Iterator<Item = String> {
        let name = self.dir();
        let layer = internal_layer(path)
            .filter(|target| self.banned_layers().contains(target))
            .map(|target| format!("{name} layer imports crate::{}", target.dir()));
        let krate = external_crate(path)
            .filter(|root| self.banned_crates().iter().any(|banned| banned == root))
            .map(|root| format!("{name} layer uses external crate `{root}`"));
        let ambient = ambient_fs(path)
            .map(|fs| format!("{name} layer touches the filesystem ambiently through `{fs}`"));
        layer.into_iter().chain(krate).chain(ambient)
    }
}

fn is_relative(segment: &str) -> bool {
    matches!(segment, "crate" | "self" | "super")
}

/// Layer a path points into, seen from inside the console crate.
fn internal_layer(path: &[String]) -> Option<Layer> {
    let mut rest = path.iter().map(String::as_str).peekable();
    if rest.next_if_eq(&CRATE_NAME).is_none() {
        while rest.next_if(|segment| is_relative(segment)).is_some() {}
    }
    rest.next().and_then(Layer::named)
}

fn external_crate(path: &[String]) -> Option<&str> {
    let root = path.first()?.as_str();
    (!is_relative(root) && root != CRATE_NAME).then_some(root)
}

fn ambient_fs(path: &[String]) -> Option<String> {
    let [root, module, ..] = path else {
        return None;
    };
    AMBIENT_FS
        .iter()
        .find(|(want_root, want_module)| root == want_root && module == want_module)
        .map(|(want_root, want_module)| format!("{want_root}::{want_module}"))
}

/// Every path a file names, from expressions, types and `use` items alike.
#[derive(Default)]
struct NamedPaths(BTreeSet<Vec<String>>);

impl<'ast> Visit<'ast> for NamedPaths {
    fn visit_path(&mut self, node: &'ast syn::Path) {
        let segments: Vec<String> = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect();
        if !segments.is_empty() {
            self.0.insert(segments);
        }
        visit::visit_path(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.0.extend(flatten_use(&node.tree));
    }
}

/// Expand a `use` tree into one path per imported leaf.
fn flatten_use(tree: &syn::UseTree) -> Vec<Vec<String>> {
    let leaf = |mut prefix: Vec<String>, last: String| {
        prefix.push(last);
        prefix
    };
    let mut leaves = Vec::new();
    let mut pending = vec![(Vec::new(), tree)];
    while let Some((prefix, node)) = pending.pop() {
        match node {
            syn::UseTree::Path(step) => {
                pending.push((leaf(prefix, step.ident.to_string()), step.tree.as_ref()));
            }
            syn::UseTree::Name(name) => leaves.push(leaf(prefix, name.ident.to_string())),
            syn::UseTree::Rename(rename) => leaves.push(leaf(prefix, rename.ident.to_string())),
            syn::UseTree::Glob(_) => leaves.push(leaf(prefix, "*".to_owned())),
            syn::UseTree::Group(group) => {
                pending.extend(group.items.iter().map(|item| (prefix.clone(), item)));
            }
        }
    }
    leaves
}

/// Read every `.rs` file below the layer directories of `src`.
fn read_layer_sources(src: &Dir) -> Result<Vec<LintSource>, ArchitectureLintError> {
    let mut pending = Vec::new();
    for layer in Layer::ALL {
        match src.open_dir(layer.dir()) {
            Ok(dir) => pending.push((dir, PathBuf::from(layer.dir()))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    let mut sources = Vec::new();
    while let Some((dir, relative)) = pending.pop() {
        for entry in dir.entries()? {
            let entry = entry?;
            let name = entry.file_name();
            let file = relative.join(&name);
            if entry.file_type()?.is_dir() {
                pending.push((entry.open_dir()?, file));
            } else if file.extension().is_some_and(|ext| ext == "rs") {
                let contents = dir.read_to_string(&name)?;
                sources.push(LintSource { file, contents });
            }
        }
    }
    sources.sort_by(|left, right| left.file.cmp(&right.file));
    Ok(sources)
}

#[cfg(test)]
mod tests;
