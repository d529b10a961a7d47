//! Local user as seen by Chargify.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;

/// The subset of a local user that is mirrored on the Chargify customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingUser {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub organization: Option<String>,
}

/// Customer fields sent to Chargify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl BillingUser {
    /// Attributes for creating the Chargify customer, keyed by reference.
    pub fn signup_attributes(&self) -> CustomerAttributes {
        CustomerAttributes {
            reference: Some(self.id.to_string()),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            organization: None,
        }
    }

    /// Attributes for updating the Chargify customer.
    ///
    /// Chargify requires both names, so a blank first name falls back to the
    /// email and a blank last name to `default_last_name`.
    pub fn update_attributes(&self, default_last_name: &str) -> CustomerAttributes {
        let first_name = if self.first_name.trim().is_empty() {
            self.email.clone()
        } else {
            self.first_name.clone()
        };
        let last_name = if self.last_name.trim().is_empty() {
            default_last_name.to_string()
        } else {
            self.last_name.clone()
        };

        CustomerAttributes {
            reference: None,
            first_name,
            last_name,
            email: self.email.clone(),
            organization: self
                .organization
                .clone()
                .filter(|org| !org.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> BillingUser {
        BillingUser {
            id: UserId::new("42").unwrap(),
            email: "jane@example.com".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            organization: None,
        }
    }

    #[test]
    fn signup_uses_user_id_as_reference() {
        let attrs = user().signup_attributes();
        assert_eq!(attrs.reference.as_deref(), Some("42"));
        assert_eq!(attrs.first_name, "Jane");
    }

    #[test]
    fn update_falls_back_for_missing_names() {
        let mut u = user();
        u.first_name = String::new();
        u.last_name = " ".into();
        let attrs = u.update_attributes("Reader");
        assert_eq!(attrs.first_name, "jane@example.com");
        assert_eq!(attrs.last_name, "Reader");
        assert!(attrs.reference.is_none());
    }

    #[test]
    fn update_sends_organization_only_when_set() {
        let mut u = user();
        assert!(u.update_attributes("x").organization.is_none());
        u.organization = Some("Acme".into());
        assert_eq!(u.update_attributes("x").organization.as_deref(), Some("Acme"));

        let json = serde_json::to_value(user().update_attributes("x")).unwrap();
        assert!(json.get("organization").is_none());
        assert!(json.get("reference").is_none());
    }
}
