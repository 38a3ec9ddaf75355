use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use txlens_core::{decode, encode, Ledger, Reconciler, TransactionEvent};

const STATEMENTS: [&str; 4] = [
    "SELECT * FROM users WHERE id = ?",
    "UPDATE users SET balance = balance - 500 WHERE id = 1",
    "INSERT INTO audit (user_id, delta) VALUES (1, -500)",
    "SELECT balance FROM users WHERE id = 2",
];

/// Build a stream of `transactions` interleaved transactions with
/// `queries` statements each. Every third transaction rolls back.
fn build_stream(transactions: usize, queries: usize) -> Vec<TransactionEvent> {
    let mut events = Vec::with_capacity(transactions * (queries + 2));
    let mut clock: i64 = 0;
    let mut tick = || {
        clock += 1;
        clock
    };

    for tx in 0..transactions {
        events.push(TransactionEvent::started(
            format!("tx{tx}"),
            "REPEATABLE-READ",
            tick(),
        ));
    }
    for q in 0..queries {
        for tx in 0..transactions {
            events.push(TransactionEvent::query(
                format!("tx{tx}"),
                STATEMENTS[(tx + q) % STATEMENTS.len()],
                tick(),
            ));
        }
    }
    for tx in 0..transactions {
        let id = format!("tx{tx}");
        if tx % 3 == 0 {
            events.push(TransactionEvent::rollbacked(id, tick()));
        } else {
            events.push(TransactionEvent::committed(id, tick()));
        }
    }
    events
}

fn bench_reconcile(c: &mut Criterion) {
    let reconciler = Reconciler::default();
    let mut group = c.benchmark_group("reconcile");

    for (transactions, queries) in [(4, 4), (32, 8), (256, 16)] {
        let events = build_stream(transactions, queries);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{transactions}x{queries}")),
            &events,
            |b, events| {
                b.iter(|| {
                    let (ledger, signals) =
                        reconciler.replay(Ledger::new(), black_box(events.clone()));
                    black_box((ledger.log().len(), signals.len()))
                });
            },
        );
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let messages: Vec<String> = build_stream(32, 8)
        .iter()
        .filter_map(|event| encode(event).ok())
        .collect();

    c.bench_function("decode/32x8", |b| {
        b.iter(|| {
            for message in &messages {
                let _ = black_box(decode(black_box(message)));
            }
        });
    });
}

criterion_group!(benches, bench_reconcile, bench_decode);
criterion_main!(benches);
