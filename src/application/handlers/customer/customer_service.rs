//! CustomerService - Keeps Chargify customers in sync with local users.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::domain::customer::{BillingUser, CustomerDetails};
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode};
use crate::ports::{BillingProvider, Customer};

pub struct CustomerService {
    provider: Arc<dyn BillingProvider>,
    default_last_name: String,
}

impl CustomerService {
    pub fn new(provider: Arc<dyn BillingProvider>, default_last_name: impl Into<String>) -> Self {
        Self {
            provider,
            default_last_name: default_last_name.into(),
        }
    }

    /// Creates the Chargify customer for `user` and returns it as stored by
    /// Chargify, looked up by reference.
    pub async fn create_account(&self, user: &BillingUser) -> Result<Customer, DomainError> {
        self.provider
            .create_customer(&user.signup_attributes())
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Unable to create customer");
                DomainError::from(e).with_detail("operation", "create_customer")
            })?;

        self.find_customer(user).await
    }

    /// Pushes the user's name, email and organization to Chargify.
    ///
    /// Without `customer_id` the customer is looked up by reference first.
    pub async fn update_customer(
        &self,
        user: &BillingUser,
        customer_id: Option<CustomerId>,
        extra_fields: Map<String, Value>,
    ) -> Result<(), DomainError> {
        let customer_id = match customer_id {
            Some(id) => id,
            None => self.find_customer(user).await?.id,
        };

        let attributes = user.update_attributes(&self.default_last_name);
        self.provider
            .update_customer(customer_id, &attributes, extra_fields)
            .await?;

        tracing::debug!(user_id = %user.id, %customer_id, "Chargify customer updated");
        Ok(())
    }

    /// Applies validated billing details: names replace the user's, country
    /// and zip are sent as extra customer fields.
    pub async fn update_billing_details(
        &self,
        user: &BillingUser,
        customer_id: Option<CustomerId>,
        details: &CustomerDetails,
    ) -> Result<(), DomainError> {
        let user = BillingUser {
            first_name: details.first_name.clone(),
            last_name: details.last_name.clone(),
            ..user.clone()
        };
        let mut extra = Map::new();
        extra.insert("country".into(), json!(details.country));
        extra.insert("zip".into(), json!(details.zip));

        self.update_customer(&user, customer_id, extra).await
    }

    async fn find_customer(&self, user: &BillingUser) -> Result<Customer, DomainError> {
        self.provider
            .lookup_customer_by_reference(user.id.as_str())
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::CustomerNotFound,
                    format!("No Chargify customer with reference {}", user.id),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chargify::MockBillingProvider;
    use crate::domain::customer::PaymentMethod;
    use crate::domain::foundation::UserId;
    use crate::ports::BillingError;

    fn user(first_name: &str, last_name: &str) -> BillingUser {
        BillingUser {
            id: UserId::new("42").unwrap(),
            email: "jane@example.com".into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            organization: Some("Acme".into()),
        }
    }

    fn service(mock: &MockBillingProvider) -> CustomerService {
        CustomerService::new(Arc::new(mock.clone()), "Unknown")
    }

    #[tokio::test]
    async fn create_account_returns_looked_up_customer() {
        let mock = MockBillingProvider::new();
        let customer = service(&mock)
            .create_account(&user("Jane", "Doe"))
            .await
            .unwrap();

        assert_eq!(customer.reference.as_deref(), Some("42"));
        assert!(mock.was_called("lookup_customer_by_reference"));
    }

    #[tokio::test]
    async fn create_account_reports_provider_failure() {
        let mock = MockBillingProvider::new();
        mock.set_method_error(
            "create_customer",
            BillingError::unprocessable(vec!["Email: is invalid".into()]),
        );

        let err = service(&mock)
            .create_account(&user("Jane", "Doe"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentRejected);
        assert!(!mock.was_called("lookup_customer_by_reference"));
    }

    #[tokio::test]
    async fn update_customer_looks_up_id_and_applies_fallbacks() {
        let mock = MockBillingProvider::new();
        let svc = service(&mock);
        let created = svc.create_account(&user("Jane", "Doe")).await.unwrap();

        svc.update_customer(&user("", ""), None, Map::new())
            .await
            .unwrap();

        let args = mock.last_args("update_customer").unwrap();
        assert_eq!(args[0], created.id.to_string());
        assert_eq!(args[1], "jane@example.com");
        assert_eq!(args[2], "Unknown");
    }

    #[tokio::test]
    async fn update_customer_without_chargify_customer_fails() {
        let mock = MockBillingProvider::new();
        let err = service(&mock)
            .update_customer(&user("Jane", "Doe"), None, Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CustomerNotFound);
    }

    #[tokio::test]
    async fn billing_details_send_country_and_zip() {
        let mock = MockBillingProvider::new();
        let svc = service(&mock);
        let created = svc.create_account(&user("Jane", "Doe")).await.unwrap();

        let details = CustomerDetails {
            first_name: "Janet".into(),
            last_name: "Dupont".into(),
            payment_method: PaymentMethod::CreditCard,
            country: "FR".into(),
            zip: "75011".into(),
        };
        svc.update_billing_details(&user("Jane", "Doe"), Some(created.id), &details)
            .await
            .unwrap();

        let stored = mock.lookup_customer_by_reference("42").await.unwrap().unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Janet"));
        assert_eq!(stored.extra.get("country"), Some(&json!("FR")));
        assert_eq!(stored.extra.get("zip"), Some(&json!("75011")));
    }
}
