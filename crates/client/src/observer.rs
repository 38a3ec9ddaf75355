//! [`Observer`]: the monitor task, the stream connection and the backend
//! caches started and stopped together.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use txlens_core::{IsolationLevel, Ledger, Reconciler};

use crate::backend::{BackendApi, Scenario, User};
use crate::cache::{EntityCache, RefreshScheduler, SettingsCache};
use crate::config::ObserverConfig;
use crate::error::Error;
use crate::ingest::{connect, ConnectionState};
use crate::monitor::{Monitor, MonitorInput, MonitorView};

type Connector = Box<
    dyn Fn(mpsc::Sender<MonitorInput>, watch::Receiver<bool>) -> BoxFuture<'static, ConnectionState>
        + Send
        + Sync,
>;

/// A running observer: monitor task, stream connection and backend caches.
///
/// Dropping an `Observer` drops its shutdown sender, which stops the
/// connection just as [`close`](Self::close) does. The monitor then exits
/// once the queue drains, and its final ledger is lost.
pub struct Observer<B: ?Sized> {
    backend: Arc<B>,
    inbox: mpsc::Sender<MonitorInput>,
    view: watch::Receiver<MonitorView>,
    users: EntityCache,
    settings: SettingsCache,
    shutdown: watch::Sender<bool>,
    connector: Connector,
    monitor: JoinHandle<Ledger>,
    ingester: JoinHandle<ConnectionState>,
}

impl<B: BackendApi + ?Sized> Observer<B> {
    /// Connect to `config.stream_url` and prime the caches from `backend`.
    pub async fn start(config: &ObserverConfig, backend: Arc<B>) -> Self {
        let url = config.stream_url.clone();
        Self::start_with(config, backend, move |inbox, shutdown| {
            connect(url.clone(), inbox, shutdown)
        })
        .await
    }

    /// Like [`start`](Self::start), with `connector` producing the stream
    /// connection. The connector is called again on [`reconnect`](Self::reconnect).
    pub async fn start_with<C, F>(config: &ObserverConfig, backend: Arc<B>, connector: C) -> Self
    where
        C: Fn(mpsc::Sender<MonitorInput>, watch::Receiver<bool>) -> F + Send + Sync + 'static,
        F: Future<Output = ConnectionState> + Send + 'static,
    {
        let connector: Connector =
            Box::new(move |inbox, shutdown| connector(inbox, shutdown).boxed());

        let users = EntityCache::new();
        let settings = SettingsCache::new();
        let scheduler = RefreshScheduler::new(
            Arc::clone(&backend),
            users.clone(),
            config.refresh_delay(),
        );
        let (monitor, view) = Monitor::new(Reconciler::new(config.refresh_policy), scheduler);

        let (inbox, queue) = mpsc::channel(config.queue_capacity.max(1));
        let monitor = tokio::spawn(monitor.run(queue));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ingester = tokio::spawn(connector(inbox.clone(), shutdown_rx));

        let (primed_users, primed_level) = tokio::join!(
            users.refresh(backend.as_ref()),
            settings.refresh(backend.as_ref()),
        );
        if let Err(err) = primed_users {
            tracing::warn!(%err, "could not load users");
        }
        if let Err(err) = primed_level {
            tracing::warn!(%err, "could not load isolation level");
        }

        Self {
            backend,
            inbox,
            view,
            users,
            settings,
            shutdown,
            connector,
            monitor,
            ingester,
        }
    }

    /// The view after the most recently handled input.
    #[must_use]
    pub fn view(&self) -> MonitorView {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorView> {
        self.view.clone()
    }

    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.users.users()
    }

    #[must_use]
    pub fn subscribe_users(&self) -> watch::Receiver<Vec<User>> {
        self.users.subscribe()
    }

    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.settings.isolation_level()
    }

    /// Empty the log and the registry. Queued behind every event already
    /// received, and applied in one step.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if the monitor has exited.
    pub async fn clear(&self) -> Result<(), Error> {
        self.inbox
            .send(MonitorInput::Clear)
            .await
            .map_err(|_| Error::Stopped)
    }

    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn run_scenario(&self, scenario: &Scenario) -> Result<(), Error> {
        self.backend.run_scenario(scenario).await
    }

    /// # Errors
    ///
    /// Returns the backend failure; the cached level is unchanged then.
    pub async fn change_isolation_level(&self, level: IsolationLevel) -> Result<(), Error> {
        self.settings.change(self.backend.as_ref(), level).await
    }

    /// # Errors
    ///
    /// Returns the backend failure; the cached users are unchanged then.
    pub async fn refresh_users(&self) -> Result<(), Error> {
        self.users.refresh(self.backend.as_ref()).await
    }

    /// Wait until the connection has either opened or closed.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if the monitor has exited.
    pub async fn wait_ready(&self) -> Result<ConnectionState, Error> {
        self.wait_connection(|state| !matches!(state, ConnectionState::Connecting))
            .await
    }

    /// Wait until the connection has closed.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if the monitor has exited.
    pub async fn wait_closed(&self) -> Result<ConnectionState, Error> {
        self.wait_connection(ConnectionState::is_closed).await
    }

    async fn wait_connection(
        &self,
        ready: impl Fn(&ConnectionState) -> bool,
    ) -> Result<ConnectionState, Error> {
        let mut view = self.view.clone();
        let connection = view
            .wait_for(|view| ready(&view.connection))
            .await
            .map_err(|_| Error::Stopped)?
            .connection
            .clone();
        Ok(connection)
    }

    /// Open a fresh connection once the previous one has ended. Returns
    /// `false`, doing nothing, while the current connection is still running.
    pub fn reconnect(&mut self) -> bool {
        if !self.ingester.is_finished() || *self.shutdown.borrow() {
            return false;
        }
        tracing::info!("reconnecting event stream");
        self.ingester = tokio::spawn((self.connector)(
            self.inbox.clone(),
            self.shutdown.subscribe(),
        ));
        true
    }

    /// Stop the connection, drain the queue and return the final ledger.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if the monitor task panicked.
    pub async fn close(self) -> Result<Ledger, Error> {
        self.shutdown.send_replace(true);
        if let Err(err) = self.ingester.await {
            tracing::warn!(%err, "ingester task failed");
        }
        drop(self.inbox);
        self.monitor.await.map_err(|_| Error::Stopped)
    }
}
