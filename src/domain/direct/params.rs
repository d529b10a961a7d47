//! Chargify Direct secure form parameters and redirect callback parameters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DirectError, DirectSigner, Nonce};

/// Hidden fields posted to Chargify with a Direct form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureParams {
    pub secure_api_id: String,
    pub secure_nonce: String,
    pub secure_timestamp: String,
    pub secure_data: String,
    pub secure_signature: String,
}

impl SecureParams {
    /// Builds signed parameters for `nonce`.
    ///
    /// `data` is URL-encoded in order with `redirect_uri` appended last. An
    /// existing `redirect_uri` entry is replaced.
    pub fn build(
        signer: &DirectSigner,
        nonce: &Nonce,
        redirect_uri: &str,
        data: &[(String, String)],
    ) -> Result<Self, DirectError> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in data.iter().filter(|(key, _)| key != "redirect_uri") {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("redirect_uri", redirect_uri);
        let secure_data = serializer.finish();

        let secure_signature = signer.sign(&nonce.timestamp, &nonce.value, &[&secure_data])?;

        Ok(Self {
            secure_api_id: signer.api_id().to_string(),
            secure_nonce: nonce.value.clone(),
            secure_timestamp: nonce.timestamp.clone(),
            secure_data,
            secure_signature,
        })
    }
}

/// Query parameters Chargify appends when redirecting back after a Direct
/// form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub api_id: String,
    pub nonce: String,
    pub timestamp: String,
    pub status_code: String,
    pub result_code: String,
    pub call_id: String,
    pub signature: String,
}

impl CallbackParams {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, DirectError> {
        let get = |key: &'static str| {
            query
                .get(key)
                .cloned()
                .ok_or(DirectError::MissingParameter(key))
        };

        Ok(Self {
            api_id: get("api_id")?,
            nonce: get("nonce")?,
            timestamp: get("timestamp")?,
            status_code: get("status_code")?,
            result_code: get("result_code")?,
            call_id: get("call_id")?,
            signature: get("signature")?,
        })
    }

    /// Picks the nonce this callback refers to among the stored `matches`.
    ///
    /// The api id must match and exactly one unexpired nonce must exist.
    pub fn select_nonce(
        &self,
        signer: &DirectSigner,
        matches: Vec<Nonce>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Nonce, DirectError> {
        if self.api_id != signer.api_id() {
            return Err(DirectError::ApiIdMismatch);
        }

        let mut matches = matches;
        let nonce = match matches.len() {
            0 => return Err(DirectError::NonceNotFound),
            1 => matches.remove(0),
            n => return Err(DirectError::AmbiguousNonce(n)),
        };

        if nonce.is_expired(now, ttl) {
            return Err(DirectError::NonceExpired);
        }
        Ok(nonce)
    }

    /// Checks the signature over `status_code ‖ result_code ‖ call_id`.
    pub fn verify_signature(&self, signer: &DirectSigner, nonce: &Nonce) -> Result<(), DirectError> {
        let parts = [
            self.status_code.as_str(),
            self.result_code.as_str(),
            self.call_id.as_str(),
        ];
        if signer.matches(&self.signature, &nonce.timestamp, &nonce.value, &parts)? {
            Ok(())
        } else {
            Err(DirectError::InvalidSignature)
        }
    }
}
