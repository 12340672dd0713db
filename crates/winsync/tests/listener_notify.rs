// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![cfg(unix)]
#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Listener wake-up over the named change signal.

use crossbeam::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winsync::{ChangeSignal, NotificationListener, ResetMode, SharedCounter, SyncConfig};

fn unique_config(tag: &str) -> SyncConfig {
    SyncConfig::new(format!(
        "lnotify_{}_{}_{}",
        tag,
        std::process::id(),
        fastrand::u32(..)
    ))
    .with_wait_timeout(Duration::from_millis(100))
}

struct Cleanup(SyncConfig);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = SharedCounter::unlink(&self.0);
    }
}

#[test]
fn test_manual_signal_reaches_handler_quickly() {
    let config = unique_config("manual");
    let _cleanup = Cleanup(config.clone());

    let listener = NotificationListener::new(&config);
    let (tx, rx) = channel::unbounded();
    listener.set_handler(move || {
        let _ = tx.send(Instant::now());
    });
    listener.start().expect("start");

    let publisher = ChangeSignal::create_or_open(&config).expect("open signal");
    let sent = Instant::now();
    publisher.signal();

    let woke = rx
        .recv_timeout(Duration::from_millis(100))
        .expect("handler not invoked within 100ms");
    assert!(woke.duration_since(sent) < Duration::from_millis(100));
    listener.stop();
}

#[test]
fn test_increment_wakes_listener_of_other_handle() {
    let config = unique_config("counter");
    let _cleanup = Cleanup(config.clone());

    let producer = SharedCounter::new(config.clone());
    producer.initialize().expect("init producer");

    let observer = Arc::new(SharedCounter::new(config.clone()));
    observer.initialize().expect("init observer");
    let signal = observer.signal().expect("observer signal");
    assert!(signal.is_shared());

    let listener = NotificationListener::with_signal(signal, config.wait_timeout);
    let (tx, rx) = channel::unbounded();
    {
        let observer = Arc::clone(&observer);
        listener.set_handler(move || {
            let _ = tx.send(observer.get());
        });
    }
    listener.start().expect("start");

    producer.increment();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(1));
    listener.stop();
}

#[test]
fn test_manual_reset_wakes_every_listener() {
    let config = unique_config("fanout").with_reset_mode(ResetMode::Manual);
    let _cleanup = Cleanup(config.clone());

    let (tx, rx) = channel::unbounded();
    let listeners: Vec<NotificationListener> = (0..3)
        .map(|i| {
            let l = NotificationListener::new(&config);
            let tx = tx.clone();
            l.set_handler(move || {
                let _ = tx.send(i);
            });
            l.start().expect("start");
            l
        })
        .collect();

    let publisher = ChangeSignal::create_or_open(&config).expect("open signal");
    publisher.signal();

    let mut seen: Vec<i32> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).expect("wake"))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2]);
    assert!(publisher.is_set(), "manual reset stays set");

    for l in &listeners {
        l.stop();
    }
}

#[test]
fn test_auto_reset_wakes_one_listener() {
    let config = unique_config("auto").with_reset_mode(ResetMode::Auto);
    let _cleanup = Cleanup(config.clone());

    let (tx, rx) = channel::unbounded();
    let listeners: Vec<NotificationListener> = (0..2)
        .map(|i| {
            let l = NotificationListener::new(&config);
            let tx = tx.clone();
            l.set_handler(move || {
                let _ = tx.send(i);
            });
            l.start().expect("start");
            l
        })
        .collect();

    let publisher = ChangeSignal::create_or_open(&config).expect("open signal");
    assert_eq!(publisher.mode(), ResetMode::Auto);
    publisher.signal();

    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    assert!(!publisher.is_set(), "auto reset clears itself");

    for l in &listeners {
        l.stop();
    }
}

#[test]
fn test_stop_never_started_returns_immediately() {
    let config = unique_config("neverstarted");
    let listener = NotificationListener::new(&config);
    let start = Instant::now();
    listener.stop();
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_stop_is_prompt_despite_long_timeout() {
    let config = unique_config("prompt").with_wait_timeout(Duration::from_secs(30));
    let _cleanup = Cleanup(config.clone());

    let listener = NotificationListener::new(&config);
    listener.start().expect("start");
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    listener.stop();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!listener.is_running());
}
