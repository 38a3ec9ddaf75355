use std::collections::HashMap;

use rand::distr::{Distribution, Uniform};
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use txlens_core::{encode, IsolationLevel, TransactionEvent, TransactionStatus};
use typed_builder::TypedBuilder;

const STATEMENTS: [&str; 6] = [
    "SELECT * FROM users WHERE id = ?",
    "SELECT balance FROM users WHERE id = ?",
    "UPDATE users SET balance = balance - 500 WHERE id = ?",
    "UPDATE users SET balance = ? WHERE id = ?",
    "INSERT INTO transfers (from_id, to_id, amount) VALUES (?, ?, ?)",
    "DELETE FROM transfers WHERE id = ?",
];

const MALFORMED: [&str; 4] = [
    r#"{"id":"broken","type":"#,
    r#"{"id":"broken","type":"transaction_paused","timestamp":0}"#,
    r#"{"id":"broken","type":"query_executed","timestamp":0}"#,
    "ping",
];

/// Upper bound on each noise percentage, so that every stream terminates.
const MAX_NOISE_PERCENT: u64 = 40;

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct StreamParams {
    pub id: u64,
    /// Number of transactions started over the whole stream.
    pub n_transaction: u64,
    /// Maximum number of statements per transaction.
    pub n_query: u64,
    /// Chance (percent) that a step emits an event for an id that never started.
    #[builder(default)]
    #[serde(default)]
    pub orphan_percent: u64,
    /// Chance (percent) that a step repeats a start or terminal event.
    #[builder(default)]
    #[serde(default)]
    pub duplicate_percent: u64,
    /// Chance (percent) that an undecodable line precedes a message.
    #[builder(default)]
    #[serde(default)]
    pub malformed_percent: u64,
}

/// Events in receipt order plus the status each started transaction must
/// end up with once they are all reconciled.
#[derive(Debug, Clone)]
pub struct GeneratedStream {
    pub events: Vec<TransactionEvent>,
    pub expected: HashMap<String, TransactionStatus>,
}

/// A stream rendered as wire text, one message per line.
#[derive(Deserialize, Serialize, Debug)]
pub struct Recording {
    params: StreamParams,
    messages: Vec<String>,
}

impl Recording {
    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_params(&self) -> &StreamParams {
        &self.params
    }

    #[must_use]
    pub fn get_messages(&self) -> &[String] {
        &self.messages
    }

    /// Newline-delimited messages, with a trailing newline.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut text = self.messages.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

struct Clock {
    now: i64,
    jitter: Uniform<i64>,
}

impl Clock {
    // Timestamps drift backwards by up to the jitter, so they are not monotonic.
    fn tick<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) -> i64 {
        self.now += 10;
        self.now - self.jitter.sample(rng)
    }
}

/// Generate one stream of `n_transaction` interleaved transactions.
///
/// Each transaction starts, runs up to `n_query` statements and then either
/// commits or rolls back; which of the active transactions advances next is
/// random. Noise events never change the expected outcome:
///
/// - orphan events use ids (`orphan-N`) that never receive a start;
/// - duplicate starts target already-known ids with a different level;
/// - duplicate terminals repeat an already-emitted terminal event.
///
/// # Panics
///
/// Never in practice: every distribution is built over a non-empty range.
#[must_use]
pub fn generate_single_stream(params: &StreamParams) -> GeneratedStream {
    let mut rng = rand::rng();
    let percent = Uniform::new(0, 100).unwrap();
    let levels = Uniform::new(0, IsolationLevel::ALL.len()).unwrap();
    let statements = Uniform::new(0, STATEMENTS.len()).unwrap();
    let query_count = Uniform::new_inclusive(0, params.n_query).unwrap();
    let mut clock = Clock {
        now: 1_700_000_000_000,
        jitter: Uniform::new(0, 25).unwrap(),
    };

    let orphan_percent = params.orphan_percent.min(MAX_NOISE_PERCENT);
    let duplicate_percent = params.duplicate_percent.min(MAX_NOISE_PERCENT);

    let mut events = Vec::new();
    let mut expected: HashMap<String, TransactionStatus> = HashMap::new();
    // (id, statements still to run)
    let mut active: Vec<(String, u64)> = Vec::new();
    let mut terminals: Vec<TransactionEvent> = Vec::new();
    let mut next_transaction = 0;
    let mut next_orphan = 0;

    while next_transaction < params.n_transaction || !active.is_empty() {
        let roll = percent.sample(&mut rng);

        if roll < orphan_percent {
            let id = format!("orphan-{next_orphan}");
            next_orphan += 1;
            let timestamp = clock.tick(&mut rng);
            events.push(if rng.random::<bool>() {
                TransactionEvent::query(id, STATEMENTS[statements.sample(&mut rng)], timestamp)
            } else {
                TransactionEvent::committed(id, timestamp)
            });
            continue;
        }

        if roll < orphan_percent + duplicate_percent {
            let timestamp = clock.tick(&mut rng);
            if rng.random::<bool>() && !terminals.is_empty() {
                let index = Uniform::new(0, terminals.len()).unwrap().sample(&mut rng);
                let mut repeat = terminals[index].clone();
                repeat.timestamp.0 = timestamp;
                events.push(repeat);
                continue;
            }
            if let Some(id) = expected.keys().next().cloned() {
                events.push(TransactionEvent::started(
                    id,
                    IsolationLevel::Serializable.as_str(),
                    timestamp,
                ));
                continue;
            }
        }

        let start_new = next_transaction < params.n_transaction
            && (active.is_empty() || rng.random::<bool>());

        if start_new {
            let id = format!("tx{next_transaction}");
            next_transaction += 1;
            let level = IsolationLevel::ALL[levels.sample(&mut rng)];
            events.push(TransactionEvent::started(
                id.clone(),
                level.as_str(),
                clock.tick(&mut rng),
            ));
            expected.insert(id.clone(), TransactionStatus::Active);
            active.push((id, query_count.sample(&mut rng)));
            continue;
        }

        let index = Uniform::new(0, active.len()).unwrap().sample(&mut rng);
        let timestamp = clock.tick(&mut rng);
        if active[index].1 > 0 {
            active[index].1 -= 1;
            events.push(TransactionEvent::query(
                active[index].0.clone(),
                STATEMENTS[statements.sample(&mut rng)],
                timestamp,
            ));
        } else {
            let (id, _) = active.swap_remove(index);
            let (terminal, status) = if rng.random::<bool>() {
                (
                    TransactionEvent::committed(id.clone(), timestamp),
                    TransactionStatus::Committed,
                )
            } else {
                (
                    TransactionEvent::rollbacked(id.clone(), timestamp),
                    TransactionStatus::Rollbacked,
                )
            };
            expected.insert(id, status);
            terminals.push(terminal.clone());
            events.push(terminal);
        }
    }

    GeneratedStream { events, expected }
}

/// Render a stream as wire messages, salting it with undecodable lines at
/// `malformed_percent`.
///
/// # Panics
///
/// Never in practice: every distribution is built over a non-empty range.
#[must_use]
pub fn render_messages(events: &[TransactionEvent], malformed_percent: u64) -> Vec<String> {
    let mut rng = rand::rng();
    let percent = Uniform::new(0, 100).unwrap();
    let malformed = Uniform::new(0, MALFORMED.len()).unwrap();

    let mut messages = Vec::with_capacity(events.len());
    for event in events {
        if percent.sample(&mut rng) < malformed_percent {
            messages.push(MALFORMED[malformed.sample(&mut rng)].to_string());
        }
        if let Ok(message) = encode(event) {
            messages.push(message);
        }
    }
    messages
}

#[must_use]
pub fn generate_recording(params: StreamParams) -> Recording {
    let stream = generate_single_stream(&params);
    let messages = render_messages(&stream.events, params.malformed_percent);
    Recording { params, messages }
}

#[must_use]
pub fn generate_mult_recordings(
    n_stream: u64,
    n_transaction: u64,
    n_query: u64,
    noise_percent: u64,
) -> Vec<Recording> {
    (0..n_stream)
        .into_par_iter()
        .map(|id| {
            generate_recording(
                StreamParams::builder()
                    .id(id)
                    .n_transaction(n_transaction)
                    .n_query(n_query)
                    .orphan_percent(noise_percent)
                    .duplicate_percent(noise_percent)
                    .malformed_percent(noise_percent)
                    .build(),
            )
        })
        .collect()
}
