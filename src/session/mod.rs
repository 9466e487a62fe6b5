use std::sync::Arc;

use tokio::task::{spawn_blocking, JoinHandle};
use tracing::debug;

use crate::{config::Config, dataset, engine::Engine, net::error::Error};

pub mod coordinator;
pub mod peer;

/// One side's partition together with the engine that works on it.
///
/// Engine calls are CPU bound and are always moved onto tokio's blocking
/// threads, never run on the runtime itself.
#[derive(Clone)]
pub struct Local {
    engine: Arc<Engine>,
    partition: Arc<Vec<f32>>,
}

impl Local {
    /// Builds the engine and generates `config.partition_len()` values
    /// starting at global index `offset`.
    pub async fn generate(config: &Config, offset: u64) -> Result<Self, Error> {
        let engine = Arc::new(Engine::new(config)?);
        let len = config.partition_len();
        let pool_owner = engine.clone();
        debug!(len, offset, "generating partition");
        let partition =
            spawn_blocking(move || dataset::generate(len, offset, pool_owner.pool())).await?;
        Ok(Self {
            engine,
            partition: Arc::new(partition),
        })
    }

    /// Uses an existing partition instead of generating one.
    pub fn new(engine: Engine, partition: Vec<f32>) -> Self {
        Self {
            engine: Arc::new(engine),
            partition: Arc::new(partition),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.partition.len()
    }

    /// Starts `f` on a blocking thread and returns its handle.
    pub fn spawn<T, F>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce(&Engine, &[f32]) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        let partition = self.partition.clone();
        spawn_blocking(move || f(&engine, &partition))
    }

    /// Runs `f` on a blocking thread and waits for it.
    pub async fn run<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Engine, &[f32]) -> T + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.spawn(f).await?)
    }
}
