//! Sign-out listener for the terminal front end.
//!
//! A terminal has no login page to navigate to, so the "redirect" is a log
//! line telling the operator to sign in again.

use tracing::{info, warn};

use crate::domain::ports::{SignOutListener, SignOutReason};

/// Logs where a graphical client would navigate to its login screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginPromptRedirect;

impl SignOutListener for LoginPromptRedirect {
    fn signed_out(&self, reason: SignOutReason) {
        match reason {
            SignOutReason::Unauthorized => {
                warn!("session expired; run `clinic-console login` to sign in again");
            }
            SignOutReason::UserRequested => info!("signed out"),
        }
    }
}
