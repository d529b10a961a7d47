//! DirectFlowService - Chargify Direct round trips.
//!
//! Issues signed secure parameters for forms posted straight to Chargify,
//! then validates the redirect callback against the single-use nonce it was
//! issued with and fetches the resulting API call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::domain::direct::{
    CallbackParams, DirectError, DirectSigner, Nonce, SecureParams, CHARGIFY_NONCE_SERVICE,
    RESULT_CODE_SUCCESS,
};
use crate::domain::foundation::UserId;
use crate::domain::subscription::as_integer;
use crate::ports::{BillingProvider, NonceStore};

/// Outcome of a validated Direct callback.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectOutcome {
    /// Chargify reported success. Card updates carry the new profile.
    Completed {
        call: Value,
        payment_profile: Option<Value>,
    },
    /// The call went through but Chargify refused it.
    Rejected { call: Value, error: Option<String> },
}

pub struct DirectFlowService {
    signer: DirectSigner,
    nonces: Arc<dyn NonceStore>,
    provider: Arc<dyn BillingProvider>,
    nonce_ttl: Duration,
}

impl DirectFlowService {
    pub fn new(
        signer: DirectSigner,
        nonces: Arc<dyn NonceStore>,
        provider: Arc<dyn BillingProvider>,
        nonce_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            nonces,
            provider,
            nonce_ttl,
        }
    }

    /// Secure params for a signup form posted by `user_id`.
    ///
    /// The signed data is built here so the Chargify customer created by the
    /// form always carries the caller's reference.
    pub async fn secure_signup(
        &self,
        user_id: &UserId,
        product_handle: Option<&str>,
        redirect_uri: &str,
    ) -> Result<SecureParams, DirectError> {
        let mut data = vec![(
            "signup[customer][reference]".to_string(),
            user_id.to_string(),
        )];
        if let Some(handle) = product_handle {
            data.push(("signup[product][handle]".to_string(), handle.to_string()));
        }
        self.secure_initial(redirect_uri, &data).await
    }

    /// Signs `data` and `redirect_uri` with a freshly stored nonce.
    async fn secure_initial(
        &self,
        redirect_uri: &str,
        data: &[(String, String)],
    ) -> Result<SecureParams, DirectError> {
        let nonce = Nonce::issue(CHARGIFY_NONCE_SERVICE, Utc::now());
        self.nonces
            .save(&nonce)
            .await
            .map_err(|e| DirectError::Store(e.to_string()))?;

        SecureParams::build(&self.signer, &nonce, redirect_uri, data)
    }

    /// Consumes the callback's nonce and checks its signature.
    ///
    /// The nonce is deleted before the signature is checked, so a callback
    /// can be verified at most once.
    pub async fn verify_callback(&self, params: &CallbackParams) -> Result<(), DirectError> {
        let matches = self
            .nonces
            .find(CHARGIFY_NONCE_SERVICE, &params.nonce, &params.timestamp)
            .await
            .map_err(|e| DirectError::Store(e.to_string()))?;
        let nonce = params.select_nonce(&self.signer, matches, Utc::now(), self.nonce_ttl)?;

        let removed = self
            .nonces
            .delete(&nonce)
            .await
            .map_err(|e| DirectError::Store(e.to_string()))?;
        if !removed {
            return Err(DirectError::NonceNotFound);
        }

        params.verify_signature(&self.signer, &nonce)
    }

    pub async fn callback_is_valid(&self, params: &CallbackParams) -> bool {
        match self.verify_callback(params).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(call_id = %params.call_id, error = %e, "Invalid Chargify Direct callback");
                false
            }
        }
    }

    /// Validates the redirect query and resolves the API call it reports.
    pub async fn handle_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<DirectOutcome, DirectError> {
        let params = CallbackParams::from_query(query)?;
        self.verify_callback(&params).await.map_err(|e| {
            tracing::warn!(call_id = %params.call_id, error = %e, "Invalid Chargify Direct callback");
            e
        })?;

        let call = self
            .provider
            .get_api_call(&params.call_id)
            .await
            .map_err(|e| DirectError::Provider(e.to_string()))?;

        let result = call.pointer("/response/result");
        let result_code = result
            .and_then(|r| r.get("result_code"))
            .and_then(as_integer);

        if result_code == Some(RESULT_CODE_SUCCESS) {
            let payment_profile = call
                .pointer("/response/subscriptioncardupdater/payment_profile")
                .cloned();
            tracing::info!(call_id = %params.call_id, "Chargify Direct call completed");
            return Ok(DirectOutcome::Completed {
                call,
                payment_profile,
            });
        }

        let error = result
            .and_then(|r| r.pointer("/errors/0/message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        tracing::warn!(
            call_id = %params.call_id,
            result_code = ?result_code,
            error = error.as_deref().unwrap_or(""),
            "Chargify Direct call failed"
        );
        Ok(DirectOutcome::Rejected { call, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chargify::MockBillingProvider;
    use crate::adapters::memory::InMemoryNonceStore;
    use crate::domain::foundation::DomainError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixture {
        mock: MockBillingProvider,
        nonces: InMemoryNonceStore,
        service: DirectFlowService,
    }

    fn fixture() -> Fixture {
        let mock = MockBillingProvider::new();
        let nonces = InMemoryNonceStore::new();
        let service = DirectFlowService::new(
            DirectSigner::new("api-id", "secret"),
            Arc::new(nonces.clone()),
            Arc::new(mock.clone()),
            Duration::seconds(3600),
        );
        Fixture {
            mock,
            nonces,
            service,
        }
    }

    /// Issues secure params and builds the query Chargify would redirect with.
    async fn callback_query(fx: &Fixture, result_code: &str) -> HashMap<String, String> {
        let params = fx
            .service
            .secure_initial("https://app.example.com/direct/callback", &[])
            .await
            .unwrap();
        let signature = DirectSigner::new("api-id", "secret")
            .sign(
                &params.secure_timestamp,
                &params.secure_nonce,
                &["200", result_code, "call-1"],
            )
            .unwrap();

        HashMap::from([
            ("api_id".to_string(), "api-id".to_string()),
            ("nonce".to_string(), params.secure_nonce),
            ("timestamp".to_string(), params.secure_timestamp),
            ("status_code".to_string(), "200".to_string()),
            ("result_code".to_string(), result_code.to_string()),
            ("call_id".to_string(), "call-1".to_string()),
            ("signature".to_string(), signature),
        ])
    }

    // ══════════════════════════════════════════════════════════════
    // Secure params
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn secure_initial_stores_nonce_and_appends_redirect() {
        let fx = fixture();
        let params = fx
            .service
            .secure_initial(
                "https://app.example.com/cb",
                &[("signup[product][handle]".to_string(), "monthly".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(params.secure_api_id, "api-id");
        assert!(params.secure_data.ends_with("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"));
        let stored = fx
            .nonces
            .find(CHARGIFY_NONCE_SERVICE, &params.secure_nonce, &params.secure_timestamp)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn signup_binds_customer_reference_to_user() {
        let fx = fixture();
        let user = UserId::new("42").unwrap();

        let params = fx
            .service
            .secure_signup(&user, Some("monthly"), "https://app.example.com/cb")
            .await
            .unwrap();

        assert_eq!(
            params.secure_data,
            "signup%5Bcustomer%5D%5Breference%5D=42\
             &signup%5Bproduct%5D%5Bhandle%5D=monthly\
             &redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"
        );
    }

    #[tokio::test]
    async fn signup_without_product_signs_reference_only() {
        let fx = fixture();
        let user = UserId::new("7").unwrap();

        let params = fx
            .service
            .secure_signup(&user, None, "https://app.example.com/cb")
            .await
            .unwrap();

        assert!(params
            .secure_data
            .starts_with("signup%5Bcustomer%5D%5Breference%5D=7&redirect_uri="));
    }

    // ══════════════════════════════════════════════════════════════
    // Callback
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn successful_callback_returns_payment_profile() {
        let fx = fixture();
        fx.mock.add_api_call(
            "call-1",
            json!({
                "id": "call-1",
                "response": {
                    "result": { "status_code": "200", "result_code": "2000", "errors": [] },
                    "subscriptioncardupdater": { "payment_profile": { "id": 55 } }
                }
            }),
        );
        let query = callback_query(&fx, "2000").await;

        let outcome = fx.service.handle_callback(&query).await.unwrap();

        match outcome {
            DirectOutcome::Completed {
                payment_profile, ..
            } => assert_eq!(payment_profile, Some(json!({ "id": 55 }))),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_call_reports_first_error() {
        let fx = fixture();
        fx.mock.add_api_call(
            "call-1",
            json!({
                "response": {
                    "result": {
                        "result_code": 4000,
                        "errors": [{ "message": "Card declined" }, { "message": "Other" }]
                    }
                }
            }),
        );
        let query = callback_query(&fx, "4000").await;

        let outcome = fx.service.handle_callback(&query).await.unwrap();

        assert!(matches!(
            outcome,
            DirectOutcome::Rejected { error: Some(ref e), .. } if e == "Card declined"
        ));
    }

    #[tokio::test]
    async fn nonce_is_single_use() {
        let fx = fixture();
        fx.mock.add_api_call(
            "call-1",
            json!({ "response": { "result": { "result_code": "2000" } } }),
        );
        let query = callback_query(&fx, "2000").await;

        fx.service.handle_callback(&query).await.unwrap();
        let err = fx.service.handle_callback(&query).await.unwrap_err();
        assert!(matches!(err, DirectError::NonceNotFound));
    }

    /// Replays the result of its first `find`, like a concurrent callback
    /// that looked the nonce up before another one deleted it.
    struct StaleFindStore {
        inner: InMemoryNonceStore,
        first_find: Mutex<Option<Vec<Nonce>>>,
    }

    #[async_trait]
    impl NonceStore for StaleFindStore {
        async fn save(&self, nonce: &Nonce) -> Result<(), DomainError> {
            self.inner.save(nonce).await
        }

        async fn find(
            &self,
            service: &str,
            value: &str,
            timestamp: &str,
        ) -> Result<Vec<Nonce>, DomainError> {
            let replayed = self.first_find.lock().unwrap().clone();
            if let Some(found) = replayed {
                return Ok(found);
            }
            let found = self.inner.find(service, value, timestamp).await?;
            *self.first_find.lock().unwrap() = Some(found.clone());
            Ok(found)
        }

        async fn delete(&self, nonce: &Nonce) -> Result<bool, DomainError> {
            self.inner.delete(nonce).await
        }
    }

    #[tokio::test]
    async fn second_consume_of_found_nonce_is_rejected() {
        let fx = fixture();
        let query = callback_query(&fx, "2000").await;
        let service = DirectFlowService::new(
            DirectSigner::new("api-id", "secret"),
            Arc::new(StaleFindStore {
                inner: fx.nonces.clone(),
                first_find: Mutex::new(None),
            }),
            Arc::new(fx.mock.clone()),
            Duration::seconds(3600),
        );
        let params = CallbackParams::from_query(&query).unwrap();

        service.verify_callback(&params).await.unwrap();
        let err = service.verify_callback(&params).await.unwrap_err();

        assert!(matches!(err, DirectError::NonceNotFound));
    }

    #[tokio::test]
    async fn tampered_signature_is_invalid() {
        let fx = fixture();
        let mut query = callback_query(&fx, "2000").await;
        query.insert("result_code".into(), "2001".into());

        let params = CallbackParams::from_query(&query).unwrap();
        assert!(!fx.service.callback_is_valid(&params).await);
        assert!(!fx.mock.was_called("get_api_call"));
    }

    #[tokio::test]
    async fn foreign_api_id_is_invalid() {
        let fx = fixture();
        let mut query = callback_query(&fx, "2000").await;
        query.insert("api_id".into(), "other".into());

        let err = fx.service.handle_callback(&query).await.unwrap_err();
        assert!(matches!(err, DirectError::ApiIdMismatch));
        assert!(err.is_invalid_callback());
    }

    #[tokio::test]
    async fn missing_parameter_is_invalid() {
        let fx = fixture();
        let mut query = callback_query(&fx, "2000").await;
        query.remove("call_id");

        let err = fx.service.handle_callback(&query).await.unwrap_err();
        assert!(matches!(err, DirectError::MissingParameter("call_id")));
    }

    #[tokio::test]
    async fn unknown_api_call_is_provider_error() {
        let fx = fixture();
        let query = callback_query(&fx, "2000").await;

        let err = fx.service.handle_callback(&query).await.unwrap_err();
        assert!(matches!(err, DirectError::Provider(_)));
        assert!(!err.is_invalid_callback());
    }
}
