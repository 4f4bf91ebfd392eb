//! Records every model the mapper has persisted documents of.

use mea::mutex::Mutex;
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::model::Model;

/// Set of models known to a [`Mapper`](crate::mapper::Mapper), in registration order.
///
/// Registration is idempotent by model name and safe to call from concurrent tasks.
#[derive(Default)]
pub struct ModelRegistry {
    models: Mutex<Vec<Arc<Model>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `model` unless a model of the same name is already registered.
    ///
    /// Returns `true` if the model was added.
    pub async fn register(&self, model: &Arc<Model>) -> bool {
        let mut models = self.models.lock().await;

        if models.iter().any(|known| known.name() == model.name()) {
            return false;
        }

        models.push(Arc::clone(model));
        true
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.models
            .lock()
            .await
            .iter()
            .any(|model| model.name() == name)
    }

    /// Snapshot of the registered models.
    pub async fn models(&self) -> Vec<Arc<Model>> {
        self.models.lock().await.clone()
    }
}

impl Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry").finish_non_exhaustive()
    }
}
