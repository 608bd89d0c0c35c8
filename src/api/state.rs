//! API shared state

use crate::status::CurrentGeneration;

/// Shared state passed to all API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    /// View of the generation that is current when a request arrives
    pub current: CurrentGeneration,
}

impl ApiState {
    pub fn new(current: CurrentGeneration) -> Self {
        Self { current }
    }
}
