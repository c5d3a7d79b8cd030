use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    notify::Notifier,
    qcm::runner::AttemptRunner,
    store::QcmStore,
    utils::clock::Clock,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QcmStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

impl AppState {
    pub fn runner(&self) -> AttemptRunner<'_> {
        AttemptRunner::new(self.store.as_ref(), self.clock.as_ref(), self.notifier.as_ref())
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
