//! Live side of txlens: the event stream connection, backend calls and the
//! monitor task that owns the ledger.
//!
//! An [`Observer`] ties the pieces together:
//!
//! - the **ingester** reads WebSocket frames and decodes them;
//! - the **monitor** applies every input in order through one queue and
//!   publishes a fresh [`MonitorView`] after each;
//! - the **refresh scheduler** refetches users some time after a mutating
//!   statement, independently of the monitor;
//! - the **caches** hold the last users list and isolation level the
//!   backend returned.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use txlens_client::{HttpBackend, Observer, ObserverConfig};
//!
//! let config = ObserverConfig::default();
//! let backend = Arc::new(HttpBackend::new(&config.base_url, config.request_timeout())?);
//! let observer = Observer::start(&config, backend).await;
//! observer.wait_ready().await?;
//! let view = observer.view();
//! println!("{} events", view.snapshot.full_log().len());
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod observer;

pub use backend::{BackendApi, HttpBackend, LevelSpelling, Scenario, User};
pub use cache::{EntityCache, RefreshScheduler, SettingsCache};
pub use config::ObserverConfig;
pub use error::Error;
pub use ingest::{connect, connect_recording, ingest, ConnectionState, Frame};
pub use monitor::{Diagnostics, Monitor, MonitorInput, MonitorView, RefreshSink};
pub use observer::Observer;
