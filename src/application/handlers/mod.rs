//! Application handlers.
//!
//! Services and command handlers that orchestrate domain operations over the
//! ports.

pub mod catalog;
pub mod customer;
pub mod direct;
pub mod subscription;
pub mod webhook;

pub use catalog::ProductCatalogService;
pub use customer::CustomerService;
pub use direct::{DirectFlowService, DirectOutcome};
pub use subscription::{
    StartTrialCommand, StartTrialHandler, SubscribeCommand, SubscriptionService,
    UpdatePaymentMethodCommand, UpdatePaymentMethodHandler, UpdatePaymentMethodResult,
};
pub use webhook::{HandleChargifyWebhookCommand, HandleChargifyWebhookHandler};
