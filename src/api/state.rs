use std::sync::Arc;

use crate::sentinel::Sentinel;

#[derive(Clone)]
pub struct AppState {
    pub sentinel: Arc<Sentinel>,
}

impl AppState {
    pub fn new(sentinel: Arc<Sentinel>) -> Self {
        Self { sentinel }
    }
}
