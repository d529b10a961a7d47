//! Subscription lifecycle handlers.

mod start_trial;
mod subscription_service;
mod update_payment_method;

pub use start_trial::{StartTrialCommand, StartTrialHandler};
pub use subscription_service::{SubscribeCommand, SubscriptionService, REACTIVATE_EVENT};
pub use update_payment_method::{
    UpdatePaymentMethodCommand, UpdatePaymentMethodHandler, UpdatePaymentMethodResult,
    CREDIT_CARD_FAILED_EVENT, PAYPAL_FAILED_EVENT,
};
