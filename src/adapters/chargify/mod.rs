//! Chargify billing provider adapter.
//!
//! Implements the `BillingProvider` port over the Chargify REST API:
//! - Customer management
//! - Subscription lifecycle (holds, product changes, cancellations)
//! - Payment profiles, products, coupons
//! - Invoices, statements, transactions and metadata
//! - Chargify Direct API call lookup
//!
//! # Security
//!
//! - API key and Direct password are held as `secrecy::SecretString`
//!
//! # Configuration
//!
//! Required environment variables:
//! - `CHARGIFY_BILLING__CHARGIFY__SITE_URL`
//! - `CHARGIFY_BILLING__CHARGIFY__API_KEY`

mod client;
mod mock_billing_provider;

pub use client::{ChargifyClient, ChargifyClientConfig};
pub use mock_billing_provider::{MethodCall, MockBillingProvider};
