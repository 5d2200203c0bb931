use std::sync::Arc;

use udp_core::Monitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}
