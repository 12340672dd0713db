// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window count demo across processes
//!
//! # Usage
//!
//! Terminal 1 (watch the count):
//! ```bash
//! cargo run --example window_sync_demo -- watch
//! ```
//!
//! Terminal 2..N (open a few windows, close them again):
//! ```bash
//! cargo run --example window_sync_demo -- open 3
//! ```
//!
//! Remove the named segments when every process is gone:
//! ```bash
//! cargo run --example window_sync_demo -- cleanup
//! ```
//!
//! Set `RUST_LOG=debug` to see the `[COUNTER]` / `[LISTENER]` traffic.

use std::sync::Arc;
use std::time::Duration;
use winsync::{ChannelSink, SharedCounter, SyncConfig, SyncMode, WindowSync};

const APP_ID: &str = "window_sync_demo";
const SUBSCRIBER: i64 = 1;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <watch|open [n]|cleanup>", args[0]);
        println!();
        println!("  watch    - Print every count change");
        println!("  open [n] - Open n windows (default 1), hold 3s, close them");
        println!("  cleanup  - Remove the named segments");
        return;
    }

    let config = SyncConfig::from_env();
    let config = if std::env::var("WINSYNC_APP_ID").is_ok() {
        config
    } else {
        SyncConfig {
            app_id: APP_ID.to_string(),
            ..config
        }
    };

    match args[1].as_str() {
        "watch" => run_watch(config),
        "open" => {
            let n = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
            run_open(config, n);
        }
        "cleanup" => match SharedCounter::unlink(&config) {
            Ok(()) => println!("Removed segments for '{}'", config.app_id),
            Err(e) => println!("Cleanup failed: {}", e),
        },
        other => println!("Unknown command: {}", other),
    }
}

fn open_sync(config: SyncConfig) -> Option<(Arc<ChannelSink>, WindowSync)> {
    let sink = Arc::new(ChannelSink::new());
    match WindowSync::open(config, sink.clone()) {
        Ok(sync) => {
            if sync.mode() == SyncMode::Local {
                println!("Shared memory unavailable, counting this process only");
            }
            Some((sink, sync))
        }
        Err(e) => {
            println!("Failed to open window sync: {}", e);
            None
        }
    }
}

fn run_watch(config: SyncConfig) {
    println!("=== Watching '{}' ===", config.app_id);
    let Some((sink, sync)) = open_sync(config) else {
        return;
    };

    let updates = sink.endpoint(SUBSCRIBER);
    sync.register_subscriber(SUBSCRIBER);

    loop {
        match updates.recv_timeout(Duration::from_secs(10)) {
            Ok(count) => println!("windows open: {}", count),
            Err(_) => println!("(no change for 10s, count={})", sync.window_count()),
        }
    }
}

fn run_open(config: SyncConfig, n: u32) {
    println!("=== Opening {} window(s) in '{}' ===", n, config.app_id);
    let Some((_sink, sync)) = open_sync(config) else {
        return;
    };

    for _ in 0..n {
        println!("created -> {}", sync.on_window_created());
        std::thread::sleep(Duration::from_millis(200));
    }
    std::thread::sleep(Duration::from_secs(3));
    for _ in 0..n {
        println!("destroyed -> {}", sync.on_window_destroyed());
        std::thread::sleep(Duration::from_millis(200));
    }

    let m = sync.metrics().snapshot();
    println!(
        "increments={} decrements={} signals={} wakes={}",
        m.increments, m.decrements, m.signals, m.wakes
    );
}
