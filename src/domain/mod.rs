//! Domain layer: billing entities, value objects and the ports the
//! application layer depends on.

pub mod approval;
pub mod history;
pub mod ids;
pub mod money;
pub mod payment;
pub mod ports;
pub mod service;
pub mod settings;
pub mod subscription;
pub mod wallet;

/// A point on the environment's monotonic time axis.
///
/// The unit is whatever the clock supplies (seconds or block height); the
/// engine only requires it to be consistent for a subscription's lifetime.
pub type Timestamp = u64;
