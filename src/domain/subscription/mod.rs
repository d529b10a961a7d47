//! Subscription domain: Chargify states, the cached snapshot proxy and the
//! local subscription record.

mod fields;
mod record;
mod snapshot;
mod state;

pub use fields::{as_integer, convert_price, expiration_last_day, lower, parse_datetime};
pub use record::{PlanType, SubscriptionRecord, CARD_EXPIRY_MARGIN_DAYS};
pub use snapshot::{Converter, FieldValue, ProxiedAttribute, SubscriptionSnapshot, PROXIED_ATTRIBUTES};
pub use state::SubscriptionState;
