#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use txlens_client::{BackendApi, Error, Frame, Scenario, User};
use txlens_core::IsolationLevel;

/// In-memory backend counting every call. With `failing` set, every call
/// answers 503.
pub struct MockBackend {
    pub users: Mutex<Vec<User>>,
    pub level: Mutex<IsolationLevel>,
    pub user_fetches: AtomicUsize,
    pub scenarios: Mutex<Vec<Scenario>>,
    pub failing: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(vec![user(1, "Alice", 1000.0), user(2, "Bob", 1500.0)]),
            level: Mutex::new(IsolationLevel::RepeatableRead),
            user_fetches: AtomicUsize::new(0),
            scenarios: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.user_fetches.load(Ordering::SeqCst)
    }

    pub fn set_balance(&self, id: u64, balance: f64) {
        for row in self.users.lock().unwrap().iter_mut() {
            if row.id == id {
                row.balance = balance;
            }
        }
    }

    fn check(&self, endpoint: &str) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn fetch_users(&self) -> Result<Vec<User>, Error> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.check("users")?;
        Ok(self.users.lock().unwrap().clone())
    }

    async fn fetch_isolation_level(&self) -> Result<IsolationLevel, Error> {
        self.check("isolation-level")?;
        Ok(*self.level.lock().unwrap())
    }

    async fn run_scenario(&self, scenario: &Scenario) -> Result<(), Error> {
        self.check("scenarios")?;
        self.scenarios.lock().unwrap().push(*scenario);
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), Error> {
        self.check("isolation-level")?;
        *self.level.lock().unwrap() = level;
        Ok(())
    }
}

pub fn user(id: u64, name: &str, balance: f64) -> User {
    User {
        id,
        name: name.to_string(),
        balance,
    }
}

pub fn text(message: &str) -> Result<Frame, Infallible> {
    Ok(Frame::Text(message.to_string()))
}

/// The committed transfer from the backend's wire format.
pub fn transfer() -> Vec<Result<Frame, Infallible>> {
    vec![
        text(r#"{"id":"t1","type":"transaction_started","isolation_level":"READ-COMMITTED","timestamp":1000}"#),
        text(r#"{"id":"t1","type":"query_executed","query":"UPDATE accounts SET balance = 10 WHERE id = 1","timestamp":1001}"#),
        text(r#"{"id":"t1","type":"transaction_committed","timestamp":1002}"#),
    ]
}
