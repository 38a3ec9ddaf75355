use txlens_core::event::UnknownIsolationLevel;

/// Failures talking to the backend or running the observer.
///
/// None of these ever reach the ledger: a failed call leaves whatever was
/// cached before in place.
#[derive(Debug, derive_more::From, derive_more::Display)]
pub enum Error {
    /// The event stream connection failed.
    #[from]
    #[display("event stream transport failed: {_0}")]
    Transport(tokio_tungstenite::tungstenite::Error),
    /// An HTTP request did not complete.
    #[from]
    #[display("backend request failed: {_0}")]
    Request(reqwest::Error),
    /// The backend answered with a non-success status.
    #[display("backend answered {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
    /// The backend reported an isolation level outside the supported set.
    #[from]
    #[display("backend reported {_0}")]
    IsolationLevel(UnknownIsolationLevel),
    /// The monitor task is gone; the observer has been closed.
    #[display("observer is no longer running")]
    Stopped,
}

impl std::error::Error for Error {}
