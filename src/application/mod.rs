//! Application layer - Services, command handlers and pagination.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;
pub mod pagination;

pub use handlers::{
    CustomerService, DirectFlowService, DirectOutcome, HandleChargifyWebhookCommand,
    HandleChargifyWebhookHandler, ProductCatalogService, StartTrialCommand, StartTrialHandler,
    SubscribeCommand, SubscriptionService, UpdatePaymentMethodCommand, UpdatePaymentMethodHandler, UpdatePaymentMethodResult,
};
pub use pagination::{all_invoices, all_subscriptions, paginate};
