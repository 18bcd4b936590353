//! Application layer containing the billing business logic.
//!
//! [`engine::BillingEngine`] is the entry point for every operation. It is
//! split across files by concern: settlement and the approval workflow add
//! their own `impl BillingEngine` blocks, and the pure policy and scheduling
//! rules live in their own modules so they can be tested without a store.

pub mod approval;
pub mod engine;
pub mod locks;
pub mod policy;
pub mod scheduler;
pub mod settlement;
