//! Domain layer containing billing types and rules.
//!
//! # Module Organization
//!
//! - `foundation` - Identifiers and error types
//! - `subscription` - Chargify states, cached snapshot proxy, local record
//! - `coupon` - Trial coupons
//! - `catalog` - Chargify products and the product catalog
//! - `customer` - Local users mirrored as Chargify customers
//! - `webhook` - Webhook decoding and signature verification
//! - `direct` - Chargify Direct secure parameters and callbacks

pub mod catalog;
pub mod coupon;
pub mod customer;
pub mod direct;
pub mod foundation;
pub mod subscription;
pub mod webhook;
