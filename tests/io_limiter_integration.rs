//! Integration tests for the checkpoint I/O limiter.
//!
//! Overrides and reconfiguration come from many threads at once while a
//! flush loop consults the limiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tidemark::common::Settings;
use tidemark::io::{IoClock, IoLimiter, ManualClock, INITIAL_STAMP};

fn manual_limiter(iops: i64) -> (IoLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(10_000));
    (IoLimiter::with_clock(iops, clock.clone()), clock)
}

/// Paired disable/enable calls from many threads cancel out.
#[test]
fn test_overrides_commute_across_threads() {
    let (limiter, _clock) = manual_limiter(1_000);
    let before = limiter.state();

    thread::scope(|s| {
        for _ in 0..8 {
            let limiter = &limiter;
            s.spawn(move || {
                for _ in 0..1_000 {
                    limiter.disable_limit();
                    assert!(!limiter.is_limited());
                    limiter.enable_limit();
                }
            });
        }
    });

    assert_eq!(limiter.state(), before);
    assert!(limiter.is_limited());
}

/// Reconfiguring during overrides keeps both the new rate and the
/// outstanding overrides.
#[test]
fn test_configure_during_rush() {
    let (limiter, _clock) = manual_limiter(600);

    let rush = limiter.begin_temporary_rush();
    limiter.configure(2_000);
    assert!(!limiter.is_limited());
    assert_eq!(limiter.io_per_quantum(), 200);

    limiter.configure(-1);
    drop(rush);
    // Still off: the configuration now says unlimited
    assert!(!limiter.is_limited());
    assert!(limiter.state().config_disabled());

    limiter.configure(300);
    assert!(limiter.is_limited());
    assert_eq!(limiter.state().overrides(), 0);
}

/// Concurrent rushes and reconfiguration leave a consistent state word.
#[test]
fn test_concurrent_rush_and_configure() {
    let (limiter, _clock) = manual_limiter(600);
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            let limiter = &limiter;
            s.spawn(move || {
                for _ in 0..500 {
                    let _rush = limiter.begin_temporary_rush();
                    assert!(!limiter.is_limited());
                }
            });
        }
        let limiter = &limiter;
        let stop = &stop;
        s.spawn(move || {
            let mut iops = 100;
            while !stop.load(Ordering::Acquire) {
                limiter.configure(iops);
                iops = if iops >= 10_000 { 100 } else { iops + 100 };
            }
            limiter.configure(1_000);
        });
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
    });

    let state = limiter.state();
    assert_eq!(state.overrides(), 0);
    assert!(!state.config_disabled());
    assert_eq!(state.iopq, 100);
}

/// A flush loop under a rush never pauses; afterwards it is throttled again.
#[test]
fn test_flush_loop_with_rush() {
    let (limiter, clock) = manual_limiter(100);
    assert_eq!(limiter.io_per_quantum(), 10);

    {
        let _rush = limiter.begin_temporary_rush();
        let mut stamp = INITIAL_STAMP;
        for _ in 0..50 {
            stamp = limiter.maybe_limit_io(stamp, 10, &mut ());
            assert_eq!(stamp, INITIAL_STAMP);
        }
    }
    assert!(clock.pauses().is_empty());

    let mut stamp = INITIAL_STAMP;
    for _ in 0..5 {
        stamp = limiter.maybe_limit_io(stamp, 10, &mut ());
    }
    // First call opens the quantum, every later one fills it
    assert_eq!(clock.pauses().len(), 4);
    assert_eq!(limiter.stats().pauses(), 4);
    assert_eq!(limiter.stats().paused(), Duration::from_millis(400));
}

/// The limiter follows the dynamic setting, and stops following once
/// dropped.
#[test]
fn test_limiter_follows_dynamic_setting() {
    let settings = Settings::new().with_iops_limit(1_000);
    let clock: Arc<dyn IoClock> = Arc::new(ManualClock::new(0));
    let limiter = IoLimiter::from_settings(&settings, clock);
    assert_eq!(limiter.io_per_quantum(), 100);

    settings.checkpoint_iops_limit.set(50);
    assert_eq!(limiter.io_per_quantum(), 5);

    settings.checkpoint_iops_limit.set(0);
    assert!(!limiter.is_limited());

    drop(limiter);
    // Listener outlives the limiter without effect
    settings.checkpoint_iops_limit.set(600);
}

/// Concurrent setting changes leave the limiter configured for the value the
/// setting ends up with.
#[test]
fn test_concurrent_setting_changes_settle_on_final_value() {
    let settings = Settings::new().with_iops_limit(600);
    let clock: Arc<dyn IoClock> = Arc::new(ManualClock::new(0));
    let limiter = IoLimiter::from_settings(&settings, clock);

    for _ in 0..20 {
        thread::scope(|s| {
            for t in 0..4i64 {
                let settings = &settings;
                s.spawn(move || {
                    for i in 0..100 {
                        let iops = if (t + i) % 7 == 0 { -1 } else { 100 * (t + 1) + 10 * i };
                        settings.checkpoint_iops_limit.set(iops);
                    }
                });
            }
        });

        let iops = settings.checkpoint_iops_limit.get();
        if iops < 1 {
            assert!(limiter.state().config_disabled());
        } else {
            assert!(!limiter.state().config_disabled());
            assert_eq!(i64::from(limiter.io_per_quantum()), iops / 10);
        }
    }
}
