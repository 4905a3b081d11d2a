//! Background services driven by the pool facade

mod node_refresh;
mod probe_loop;

pub use node_refresh::NodeRefreshService;
pub use probe_loop::ProbeService;
