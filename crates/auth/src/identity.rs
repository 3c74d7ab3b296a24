use serde::{Deserialize, Serialize};

use storefront_core::UserId;

use crate::Role;

/// The signed-in user as observed by route guards and screens.
///
/// Parsed from the `user` object of auth responses (camelCase on the wire) or
/// derived from access-token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "_id", alias = "userId")]
    pub id: UserId,
    pub email: String,
    #[serde(default, alias = "first_name")]
    pub first_name: String,
    #[serde(default, alias = "last_name")]
    pub last_name: String,
    pub role: Role,
}

impl Identity {
    /// "First Last", falling back to the e-mail when no name is known.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }

    /// Empty `roles` means "any role".
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.is_empty() || roles.contains(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(first: &str, last: &str) -> Identity {
        Identity {
            id: UserId::new("1").unwrap(),
            email: "ana@shop.test".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            role: Role::Cashier,
        }
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(identity("Ana", "Lima").display_name(), "Ana Lima");
        assert_eq!(identity("Ana", "").display_name(), "Ana");
        assert_eq!(identity(" ", "").display_name(), "ana@shop.test");
    }

    #[test]
    fn empty_role_set_admits_everyone() {
        let ana = identity("Ana", "Lima");
        assert!(ana.has_any_role(&[]));
        assert!(ana.has_any_role(&[Role::Admin, Role::Cashier]));
        assert!(!ana.has_any_role(&[Role::Admin]));
    }

    #[test]
    fn parses_api_user_payload() {
        let json = r#"{"_id": 12, "email": "m@shop.test", "firstName": "Mo", "role": "manager"}"#;
        let user: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_str(), "12");
        assert_eq!(user.first_name, "Mo");
        assert_eq!(user.last_name, "");
        assert_eq!(user.role, Role::Manager);
    }
}
