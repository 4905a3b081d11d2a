//! Health tracking: scoring, registry, adaptive scheduling and probing

mod prober;
mod registry;
mod scheduler;
mod score;

pub use prober::{Prober, ProberConfig};
pub use registry::HealthRegistry;
pub use scheduler::AdaptiveScheduler;
pub use score::ScoreModel;
