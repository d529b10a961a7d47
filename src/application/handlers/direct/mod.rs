//! Chargify Direct flow.

mod direct_flow_service;

pub use direct_flow_service::{DirectFlowService, DirectOutcome};
