//! Chargify customer synchronisation.

mod customer_service;

pub use customer_service::CustomerService;
