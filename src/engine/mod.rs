//! Supervised proxy engine: process lifecycle and control API

mod control;
mod supervisor;

pub use control::EngineControl;
pub use supervisor::{EngineStatus, EngineSupervisor};
