//! One shared client per socket path.
//!
//! Building a client waits for the daemon socket, so it should happen once
//! per daemon. [`ClientRegistry::acquire`] builds the client on first use and
//! hands out the same instance afterwards; concurrent first callers wait on
//! a single construction. [`ClientRegistry::release`] drops the cached
//! client, e.g. once the daemon behind it has been stopped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use nydusd_config::{ClientConfig, ReadinessConfig, TransportConfig};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::NydusdClient;
use crate::error::ClientError;

type Slot = Arc<OnceCell<Arc<NydusdClient>>>;

/// Lazily constructed clients keyed by socket path.
#[derive(Debug)]
pub struct ClientRegistry {
    readiness: ReadinessConfig,
    transport: TransportConfig,
    clients: Mutex<HashMap<PathBuf, Slot>>,
}

impl ClientRegistry {
    pub fn new(readiness: ReadinessConfig, transport: TransportConfig) -> Self {
        Self {
            readiness,
            transport,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.readiness.clone(), config.transport.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the client for `socket_path`, building it on first use.
    ///
    /// A failed construction is not cached; the next call tries again.
    pub async fn acquire(&self, socket_path: &Path) -> Result<Arc<NydusdClient>, ClientError> {
        let slot = Arc::clone(self.lock().entry(socket_path.to_path_buf()).or_default());

        let client = slot
            .get_or_try_init(|| async {
                debug!(path = %socket_path.display(), "building nydusd client");
                NydusdClient::with_config(socket_path, &self.readiness, &self.transport)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Forget the client for `socket_path`. Returns whether one was cached.
    ///
    /// Holders of an acquired client keep using it until they drop it.
    pub fn release(&self, socket_path: &Path) -> bool {
        self.lock()
            .remove(socket_path)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of socket paths with a live client.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    fn fast_registry() -> ClientRegistry {
        ClientRegistry::new(
            ReadinessConfig {
                max_attempts: 3,
                interval_ms: 5,
                jitter_ms: 0,
            },
            TransportConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_acquire_returns_same_client() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("api.sock");
        let _listener = UnixListener::bind(&sock).unwrap();

        let registry = fast_registry();
        let (a, b) = tokio::join!(registry.acquire(&sock), registry.acquire(&sock));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.socket_path(), sock.as_path());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_clients_are_scoped_per_path() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("a.sock");
        let second = tmp.path().join("b.sock");
        let _l1 = UnixListener::bind(&first).unwrap();
        let _l2 = UnixListener::bind(&second).unwrap();

        let registry = fast_registry();
        let a = registry.acquire(&first).await.unwrap();
        let b = registry.acquire(&second).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_release_forces_rebuild() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("api.sock");
        let _listener = UnixListener::bind(&sock).unwrap();

        let registry = fast_registry();
        let before = registry.acquire(&sock).await.unwrap();
        assert!(registry.release(&sock));
        assert!(!registry.release(&sock));
        assert!(registry.is_empty());

        let after = registry.acquire(&sock).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let tmp = TempDir::new().unwrap();
        let sock = tmp.path().join("late.sock");

        let registry = fast_registry();
        let err = registry.acquire(&sock).await.unwrap_err();
        assert!(matches!(err, ClientError::NotReady { attempts: 3, .. }));
        assert!(registry.is_empty());

        let _listener = UnixListener::bind(&sock).unwrap();
        assert!(registry.acquire(&sock).await.is_ok());
    }
}
