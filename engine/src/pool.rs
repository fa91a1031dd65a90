//! Fixed-capacity pool of pre-spawned engines with bounded checkout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Duration};
use uuid::Uuid;

use crate::uci::{EngineError, UciEngine};

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no engines available in the pool")]
    Timeout,
    #[error("engine pool is shut down")]
    Closed,
    #[error("engine {0} missing from pool")]
    UnknownEngine(Uuid),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A fixed set of engine processes, never grown under load.
///
/// Checked-out engines are exclusively owned by their session until given
/// back; an engine id appears in the available channel at most once, so
/// `available + leased == capacity` holds at all times. The checkout
/// timeout caps worst-case session creation latency.
pub struct EnginePool {
    engines: RwLock<HashMap<Uuid, Arc<UciEngine>>>,
    available_tx: mpsc::Sender<Uuid>,
    available_rx: Mutex<mpsc::Receiver<Uuid>>,
    engine_path: PathBuf,
    capacity: usize,
    closed: AtomicBool,
}

impl EnginePool {
    pub fn new(engine_path: impl Into<PathBuf>, capacity: usize) -> Self {
        let (available_tx, available_rx) = mpsc::channel(capacity.max(1));
        Self {
            engines: RwLock::new(HashMap::new()),
            available_tx,
            available_rx: Mutex::new(available_rx),
            engine_path: engine_path.into(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eagerly spawns the full set of engines. On any spawn failure the
    /// engines spawned so far are closed before the error is returned.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        for _ in 0..self.capacity {
            match UciEngine::spawn(&self.engine_path).await {
                Ok(engine) => {
                    let engine = Arc::new(engine);
                    let id = engine.id();
                    self.engines.write().unwrap().insert(id, engine);
                    // Capacity equals the channel bound, so this never fails.
                    let _ = self.available_tx.try_send(id);
                }
                Err(e) => {
                    tracing::error!(error = %e, "engine spawn failed, closing partial pool");
                    let spawned: Vec<_> =
                        self.engines.write().unwrap().drain().map(|(_, e)| e).collect();
                    for engine in spawned {
                        if let Err(close_err) = engine.close().await {
                            tracing::warn!(error = %close_err, "failed to close engine");
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        tracing::info!(count = self.capacity, "engine pool initialized");
        Ok(())
    }

    /// Takes the next available engine, waiting up to five seconds.
    pub async fn checkout(&self) -> Result<Arc<UciEngine>, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let id = time::timeout(CHECKOUT_TIMEOUT, async {
            self.available_rx.lock().await.recv().await
        })
        .await
        .map_err(|_| PoolError::Timeout)?
        .ok_or(PoolError::Closed)?;

        let engine = self
            .engines
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PoolError::UnknownEngine(id))?;

        tracing::debug!(engine_id = %id, "engine checked out");
        Ok(engine)
    }

    /// Offers an engine back to the available set, non-blocking. Returning
    /// an id the pool does not own is a no-op.
    pub fn give_back(&self, id: Uuid) {
        if !self.engines.read().unwrap().contains_key(&id) {
            return;
        }
        match self.available_tx.try_send(id) {
            Ok(()) => tracing::debug!(engine_id = %id, "engine returned to pool"),
            Err(_) => {
                tracing::warn!(engine_id = %id, "failed to return engine, channel full")
            }
        }
    }

    /// Closes every engine and empties the pool. Subsequent checkouts fail
    /// with `PoolError::Closed`.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let engines: Vec<_> = self.engines.write().unwrap().drain().map(|(_, e)| e).collect();
        for engine in engines {
            if let Err(e) = engine.close().await {
                tracing::error!(engine_id = %engine.id(), error = %e, "error closing engine");
            }
        }
        tracing::info!("engine pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::tests::fake_engine;

    #[tokio::test]
    async fn test_initialize_and_checkout_all() {
        let (_dir, path) = fake_engine();
        let pool = EnginePool::new(&path, 2);
        pool.initialize().await.unwrap();

        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert_ne!(a.id(), b.id());

        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_times_out_when_exhausted() {
        let (_dir, path) = fake_engine();
        let pool = EnginePool::new(&path, 1);
        pool.initialize().await.unwrap();

        let leased = pool.checkout().await.unwrap();
        let err = match pool.checkout().await {
            Ok(_) => panic!("expected checkout to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, PoolError::Timeout));

        pool.give_back(leased.id());
        let again = pool.checkout().await.unwrap();
        assert_eq!(again.id(), leased.id());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_give_back_unknown_id_is_ignored() {
        let (_dir, path) = fake_engine();
        let pool = EnginePool::new(&path, 1);
        pool.initialize().await.unwrap();

        pool.give_back(Uuid::new_v4());
        // The stranger id must not have displaced the real engine.
        let engine = pool.checkout().await.unwrap();
        pool.give_back(engine.id());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_checkout_after_shutdown_fails() {
        let (_dir, path) = fake_engine();
        let pool = EnginePool::new(&path, 1);
        pool.initialize().await.unwrap();
        pool.shutdown().await;

        assert!(matches!(pool.checkout().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn test_initialize_failure_cleans_up() {
        let pool = EnginePool::new("/nonexistent/engine-binary", 3);
        let err = pool.initialize().await.unwrap_err();
        assert!(matches!(err, PoolError::Engine(_)));
        assert!(pool.engines.read().unwrap().is_empty());
    }
}
