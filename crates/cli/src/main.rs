mod render;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, process};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use txlens_cli::{
    App, BackendArgs, Command, GenerateArgs, IsolationLevelArgs, ReconnectGate, ReplayArgs,
    ScenarioArgs, ScenarioKind, WatchArgs, WatchCommand,
};
use txlens_client::{
    connect_recording, BackendApi, HttpBackend, Observer, ObserverConfig, Scenario,
};
use txlens_core::{decode, Ledger, Reconciler};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    match &app.command {
        Command::Watch(args) => watch(args).await,
        Command::Users(args) => users(args).await,
        Command::IsolationLevel(args) => isolation_level(args).await,
        Command::Scenario(args) => scenario(args).await,
        Command::Generate(args) => generate(args),
        Command::Replay(args) => replay(args),
        Command::Schema => schema(),
    }
}

fn exit_with(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn http_backend(config: &ObserverConfig) -> HttpBackend {
    HttpBackend::new(&config.base_url, config.request_timeout())
        .map(|backend| backend.with_level_spelling(config.level_spelling))
        .unwrap_or_else(|e| {
            eprintln!("Failed to build HTTP client: {e}");
            process::exit(1);
        })
}

fn load(args: &BackendArgs) -> (ObserverConfig, HttpBackend) {
    let config = args.load().unwrap_or_else(|e| exit_with(&e));
    let backend = http_backend(&config);
    (config, backend)
}

async fn users(args: &BackendArgs) {
    let (_, backend) = load(args);
    let users = backend.fetch_users().await.unwrap_or_else(|e| {
        eprintln!("Failed to fetch users: {e}");
        process::exit(1);
    });
    print!("{}", render::users_table(&users));
}

async fn isolation_level(args: &IsolationLevelArgs) {
    let (_, backend) = load(&args.backend);
    if let Some(level) = args.level {
        backend.set_isolation_level(level).await.unwrap_or_else(|e| {
            eprintln!("Failed to set isolation level: {e}");
            process::exit(1);
        });
        println!("Isolation level set to {level}");
    } else {
        let level = backend.fetch_isolation_level().await.unwrap_or_else(|e| {
            eprintln!("Failed to fetch isolation level: {e}");
            process::exit(1);
        });
        println!("{level}");
    }
}

async fn scenario(args: &ScenarioArgs) {
    let (_, backend) = load(&args.backend);
    let scenario = match args.scenario {
        ScenarioKind::DirtyRead { user_id, amount } => Scenario::DirtyRead { user_id, amount },
    };
    backend.run_scenario(&scenario).await.unwrap_or_else(|e| {
        eprintln!("Failed to start {}: {e}", scenario.name());
        process::exit(1);
    });
    println!("Started {} scenario", scenario.name());
}

fn generate(args: &GenerateArgs) {
    fs::create_dir_all(&args.output_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output directory: {e}");
        process::exit(1);
    });

    let recordings = txlens_testgen::generator::generate_mult_recordings(
        args.n_stream,
        args.n_transaction,
        args.n_query,
        args.noise_percent,
    );

    for recording in &recordings {
        let path = args
            .output_dir
            .join(format!("{}.jsonl", recording.get_id()));
        fs::write(&path, recording.to_jsonl()).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {e}", path.display());
            process::exit(1);
        });
    }

    println!(
        "Generated {} recordings to {}",
        recordings.len(),
        args.output_dir.display()
    );
}

fn replay(args: &ReplayArgs) {
    let text = fs::read_to_string(&args.input).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {e}", args.input.display());
        process::exit(1);
    });

    let reconciler = Reconciler::new(args.refresh_policy.into());
    let mut ledger = Ledger::new();
    let mut refresh_signals = 0_usize;
    let mut failures = Vec::new();

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode(line) {
            Ok(event) => {
                let (next, outcome) = reconciler.reconcile(ledger, event);
                ledger = next;
                if outcome.refresh.is_some() {
                    refresh_signals += 1;
                }
            }
            Err(e) => failures.push(format!("line {}: {e}", number + 1)),
        }
    }

    let snapshot = ledger.snapshot();
    if args.json {
        let result = serde_json::json!({
            "file": args.input.display().to_string(),
            "events": snapshot.full_log(),
            "transactions": snapshot.live_transactions(),
            "counts": snapshot.counts(),
            "refresh_signals": refresh_signals,
            "decode_failures": failures,
        });
        println!("{result}");
        return;
    }

    if args.verbose {
        for event in snapshot.full_log() {
            println!("{}", render::event_line(event));
        }
        println!();
    }
    for tx in snapshot.live_transactions() {
        println!("{}", render::transaction_line(&tx));
    }
    println!(
        "{} events, {}, {refresh_signals} refresh signals",
        snapshot.full_log().len(),
        render::counts_line(snapshot.counts())
    );
    for failure in &failures {
        println!("  dropped {failure}");
    }
}

fn schema() {
    let schema = schemars::schema_for!(txlens_core::WireMessage);
    println!(
        "{}",
        serde_json::to_string_pretty(&schema).unwrap_or_else(|e| {
            eprintln!("Failed to render schema: {e}");
            process::exit(1);
        })
    );
}

/// Append every line sent to the returned channel to `path`.
async fn recorder(path: &Path) -> mpsc::UnboundedSender<String> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to open {}: {e}", path.display());
            process::exit(1);
        });

    let (tap, mut lines) = mpsc::unbounded_channel::<String>();
    let path = path.to_path_buf();
    tokio::spawn(async move {
        while let Some(mut line) = lines.recv().await {
            line.push('\n');
            let written = async {
                file.write_all(line.as_bytes()).await?;
                file.flush().await
            };
            if let Err(err) = written.await {
                tracing::warn!(path = %path.display(), %err, "recording stopped");
                break;
            }
        }
    });
    tap
}

async fn run_command(observer: &Observer<HttpBackend>, command: WatchCommand) {
    let outcome = match command {
        WatchCommand::Clear => observer.clear().await,
        WatchCommand::Users => observer.refresh_users().await,
        WatchCommand::Level(None) => {
            match observer.isolation_level() {
                Some(level) => println!("-- isolation level {level}"),
                None => println!("-- isolation level unknown"),
            }
            Ok(())
        }
        WatchCommand::Level(Some(level)) => {
            let changed = observer.change_isolation_level(level).await;
            if changed.is_ok() {
                println!("-- isolation level {level}");
            }
            changed
        }
        WatchCommand::DirtyRead { user_id, amount } => {
            observer
                .run_scenario(&Scenario::DirtyRead { user_id, amount })
                .await
        }
        WatchCommand::Quit => Ok(()),
    };
    if let Err(e) = outcome {
        eprintln!("-- {e}");
    }
}

async fn watch(args: &WatchArgs) {
    let config = args.load().unwrap_or_else(|e| exit_with(&e));
    let backend = Arc::new(http_backend(&config));

    let mut observer = match &args.record {
        Some(path) => {
            let tap = recorder(path).await;
            let url = config.stream_url.clone();
            Observer::start_with(&config, backend, move |inbox, shutdown| {
                connect_recording(url.clone(), inbox, shutdown, tap.clone())
            })
            .await
        }
        None => Observer::start(&config, backend).await,
    };

    match observer.isolation_level() {
        Some(level) => println!("-- isolation level {level}"),
        None => println!("-- isolation level unknown"),
    }
    print!("{}", render::users_table(&observer.users()));

    let mut view = observer.subscribe();
    let mut users = observer.subscribe_users();
    let mut feed = render::Feed::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut gate = ReconnectGate::default();
    let mut reconnect_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                for line in feed.update(&current) {
                    println!("{line}");
                }
                if gate.should_reconnect(&current) {
                    let Some(delay) = args.reconnect_delay_ms else {
                        break;
                    };
                    reconnect_at = Some(Instant::now() + Duration::from_millis(delay));
                }
            }
            () = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                if reconnect_at.is_some() =>
            {
                // The closed connection's task may still be winding down.
                reconnect_at = (!observer.reconnect())
                    .then(|| Instant::now() + Duration::from_millis(10));
            }
            changed = users.changed() => {
                if changed.is_ok() {
                    let current = users.borrow_and_update().clone();
                    print!("{}", render::users_table(&current));
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match WatchCommand::parse(&line) {
                    Ok(Some(WatchCommand::Quit)) => break,
                    Ok(Some(command)) => run_command(&observer, command).await,
                    Ok(None) => {}
                    Err(message) => eprintln!("-- {message}"),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    match observer.close().await {
        Ok(ledger) => println!(
            "-- {} events, {} transactions observed",
            ledger.log().len(),
            ledger.registry().len()
        ),
        Err(e) => exit_with(&format!("Failed to stop observer: {e}")),
    }
}
