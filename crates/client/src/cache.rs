//! Process-wide caches of backend data, and the debounced user refresh.
//!
//! Both caches hold the last value the backend returned successfully. A
//! failed fetch is logged and leaves the cached value alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use txlens_core::{IsolationLevel, RefreshSignal};

use crate::backend::{BackendApi, User};
use crate::error::Error;
use crate::monitor::RefreshSink;

/// Last known contents of the backend's `users` table.
#[derive(Debug, Clone)]
pub struct EntityCache {
    users: Arc<watch::Sender<Vec<User>>>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(watch::Sender::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.users.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<User>> {
        self.users.subscribe()
    }

    /// Refetch users, replacing the cached list on success.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the cache keeps its previous value.
    pub async fn refresh<B: BackendApi + ?Sized>(&self, backend: &B) -> Result<(), Error> {
        let users = backend.fetch_users().await?;
        self.users.send_replace(users);
        Ok(())
    }
}

/// The isolation level currently selected on the backend, once known.
#[derive(Debug, Clone)]
pub struct SettingsCache {
    level: Arc<watch::Sender<Option<IsolationLevel>>>,
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: Arc::new(watch::Sender::new(None)),
        }
    }

    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        *self.level.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<IsolationLevel>> {
        self.level.subscribe()
    }

    /// # Errors
    ///
    /// Returns the backend failure; the cache keeps its previous value.
    pub async fn refresh<B: BackendApi + ?Sized>(&self, backend: &B) -> Result<(), Error> {
        let level = backend.fetch_isolation_level().await?;
        self.level.send_replace(Some(level));
        Ok(())
    }

    /// Ask the backend to switch levels; the cache follows only once the
    /// backend has accepted.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the cache keeps its previous value.
    pub async fn change<B: BackendApi + ?Sized>(
        &self,
        backend: &B,
        level: IsolationLevel,
    ) -> Result<(), Error> {
        backend.set_isolation_level(level).await?;
        self.level.send_replace(Some(level));
        Ok(())
    }
}

/// Debounced, fire-and-forget refresh of the [`EntityCache`].
///
/// The first signal schedules a fetch `delay` later; signals arriving before
/// that fetch starts are folded into it. The fetch runs on its own task and
/// never touches the ledger.
pub struct RefreshScheduler<B: ?Sized> {
    backend: Arc<B>,
    cache: EntityCache,
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl<B: BackendApi + ?Sized> RefreshScheduler<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, cache: EntityCache, delay: Duration) -> Self {
        Self {
            backend,
            cache,
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl<B: BackendApi + ?Sized> RefreshSink for RefreshScheduler<B> {
    fn request_refresh(&self, signal: RefreshSignal) {
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::trace!(cause = %signal.cause, "refresh already scheduled");
            return;
        }
        tracing::debug!(cause = %signal.cause, delay = ?self.delay, "scheduling user refresh");

        let backend = Arc::clone(&self.backend);
        let cache = self.cache.clone();
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Signals from here on describe writes this fetch may miss.
            pending.store(false, Ordering::Release);
            if let Err(err) = cache.refresh(backend.as_ref()).await {
                tracing::warn!(%err, "user refresh failed, keeping cached users");
            }
        });
    }
}
