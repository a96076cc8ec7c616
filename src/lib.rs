//! Approval hub: leave and reimbursement applications routed by
//! configurable rules through sequential, countersign or or-sign approval.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logger;
pub mod stats;
pub mod store;
pub mod workflow;
