#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
//! Chargify Billing - Subscription billing over the Chargify API
//!
//! Keeps local subscription records in sync with Chargify: customer accounts,
//! the subscription lifecycle, cached provider snapshots, signed webhooks and
//! the Chargify Direct secure form round trip.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
