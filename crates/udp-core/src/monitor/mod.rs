pub mod engine;
pub mod state;

pub use engine::Monitor;
pub use state::{MonitorError, MonitorState};
