//! Administrator accounts listed in the admin directory.

use serde::Deserialize;

use super::AdminId;

/// Administrator as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminUser {
    /// Account identifier.
    pub id: AdminId,
    /// Display name.
    #[serde(default, alias = "name")]
    pub full_name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Contact phone.
    #[serde(default)]
    pub phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_with_name_alias_and_missing_phone() {
        let admin: AdminUser = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "Ada Admin",
            "email": "ada@clinic.test",
        }))
        .expect("decode admin");
        assert_eq!(admin.id.as_str(), "7");
        assert_eq!(admin.full_name, "Ada Admin");
        assert_eq!(admin.phone, "");
    }
}
