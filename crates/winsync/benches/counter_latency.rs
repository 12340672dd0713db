// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Counter and notification latency
//!
//! - `counter_increment_local`: atomic update plus signal, process-local block
//! - `counter_increment_shared`: same over a named segment
//! - `signal_round_trip`: signal -> listener thread -> handler -> channel

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossbeam::channel;
use std::time::Duration;
use winsync::{ChangeSignal, NotificationListener, ResetMode, SharedCounter, SyncConfig};

fn bench_config(tag: &str) -> SyncConfig {
    SyncConfig::new(format!("bench_{}_{}", tag, std::process::id()))
}

fn bench_increment_local(c: &mut Criterion) {
    let counter = SharedCounter::local(bench_config("local"));
    counter.initialize().expect("init");

    c.bench_function("counter_increment_local", |b| {
        b.iter(|| black_box(counter.increment()));
    });
}

fn bench_increment_shared(c: &mut Criterion) {
    let config = bench_config("shared");
    let counter = SharedCounter::new(config.clone());
    if let Err(e) = counter.initialize() {
        eprintln!("skipping counter_increment_shared: {}", e);
        return;
    }

    c.bench_function("counter_increment_shared", |b| {
        b.iter(|| black_box(counter.increment()));
    });

    counter.shutdown();
    let _ = SharedCounter::unlink(&config);
}

fn bench_signal_round_trip(c: &mut Criterion) {
    let signal = std::sync::Arc::new(ChangeSignal::local(ResetMode::Manual));
    let listener =
        NotificationListener::with_signal(std::sync::Arc::clone(&signal), Duration::from_secs(1));
    let (tx, rx) = channel::unbounded();
    listener.set_handler(move || {
        let _ = tx.send(());
    });
    listener.start().expect("start");

    c.bench_function("signal_round_trip", |b| {
        b.iter(|| {
            signal.signal();
            rx.recv_timeout(Duration::from_secs(1)).expect("wake");
        });
    });

    listener.stop();
}

criterion_group!(
    benches,
    bench_increment_local,
    bench_increment_shared,
    bench_signal_round_trip
);
criterion_main!(benches);
