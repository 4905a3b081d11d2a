//! Domain models shared across the pool

mod health;
mod node;

pub use health::{HealthClass, HealthRecord, ProbeReport, ProbeResult};
pub use node::{ProxyNode, ProxyProtocol};
