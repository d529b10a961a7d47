//! Customers: the local user mirrored on Chargify and the billing details
//! form.

mod details_form;
mod user;

pub use details_form::{CustomerDetails, CustomerDetailsForm, PaymentMethod};
pub use user::{BillingUser, CustomerAttributes};
