use std::sync::Arc;

use crate::run::config::RuntimeConfig;
use crate::run::progress::EngineContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<EngineContext>,
    pub config: Arc<RuntimeConfig>,
}

impl AppState {
    pub fn new(ctx: Arc<EngineContext>, config: Arc<RuntimeConfig>) -> Self {
        AppState { ctx, config }
    }
}
