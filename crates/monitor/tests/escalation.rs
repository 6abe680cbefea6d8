mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use home_sentry_common::{Settings, ShutdownAction};
use home_sentry_monitor::{CountdownOutcome, CycleReport, SentryStatus};
use support::{home_settings, Harness};

#[tokio::test(start_paused = true)]
async fn absent_before_first_sighting_waits_for_phone() {
    let h = Harness::new(home_settings(5, 10), false);

    assert_eq!(h.cycle().await, CycleReport::WaitingForPhone);
    assert_eq!(h.cycle().await, CycleReport::WaitingForPhone);

    let snapshot = h.monitor.snapshot();
    assert_eq!(snapshot.status, SentryStatus::WaitingForPhone);
    assert_eq!(snapshot.grace_count, 0);
    assert!(!snapshot.phone_ever_seen);
    assert!(h.performed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_sighting_is_persisted_exactly_once() {
    let h = Harness::new(home_settings(5, 10), false);
    h.presence.set_present(true);

    assert_eq!(h.cycle().await, CycleReport::Present);
    assert_eq!(h.cycle().await, CycleReport::Present);

    assert_eq!(h.monitor.status(), SentryStatus::Monitoring);
    assert!(h.monitor.snapshot().phone_ever_seen);
    assert_eq!(*h.state.saves.lock().unwrap(), [true]);
}

#[tokio::test(start_paused = true)]
async fn once_seen_never_waits_for_phone_again() {
    let h = Harness::new(home_settings(5, 10), false);
    h.presence.set_present(true);
    h.cycle().await;
    h.presence.set_present(false);

    assert_eq!(
        h.cycle().await,
        CycleReport::Grace {
            count: 1,
            threshold: 5
        }
    );
    assert!(!h.statuses()[1..].contains(&SentryStatus::WaitingForPhone));
}

#[tokio::test(start_paused = true)]
async fn three_misses_escalate_through_grace_period() {
    let h = Harness::new(home_settings(3, 5), true);

    assert_eq!(
        h.cycle().await,
        CycleReport::Grace {
            count: 1,
            threshold: 3
        }
    );
    assert_eq!(
        h.cycle().await,
        CycleReport::Grace {
            count: 2,
            threshold: 3
        }
    );
    assert_eq!(
        h.cycle().await,
        CycleReport::Escalated(CountdownOutcome::Executed(ShutdownAction::Shutdown))
    );

    assert_eq!(
        h.statuses(),
        [
            SentryStatus::GracePeriod,
            SentryStatus::GracePeriod,
            SentryStatus::ShutdownImminent
        ]
    );
    assert_eq!(h.performed(), [ShutdownAction::Shutdown]);
    assert!(!h.monitor.is_shutdown_pending());
}

#[tokio::test(start_paused = true)]
async fn escalation_happens_exactly_at_the_threshold() {
    for threshold in [1u32, 5, 100] {
        let mut settings = home_settings(threshold, 5);
        settings.shutdown_action = ShutdownAction::Lock;
        let h = Harness::new(settings, true);

        for count in 1..threshold {
            assert_eq!(
                h.cycle().await,
                CycleReport::Grace { count, threshold },
                "threshold {threshold}"
            );
            assert!(h.performed().is_empty());
        }
        assert_eq!(
            h.cycle().await,
            CycleReport::Escalated(CountdownOutcome::Executed(ShutdownAction::Lock)),
            "threshold {threshold}"
        );
        assert_eq!(h.performed(), [ShutdownAction::Lock]);
    }
}

#[tokio::test(start_paused = true)]
async fn leaving_home_clears_grace() {
    let h = Harness::new(home_settings(5, 10), true);
    h.cycle().await;
    h.cycle().await;
    assert_eq!(h.monitor.snapshot().grace_count, 2);

    h.presence.set_network("Cafe Wifi");
    assert_eq!(h.cycle().await, CycleReport::Roaming);

    let snapshot = h.monitor.snapshot();
    assert_eq!(snapshot.status, SentryStatus::Roaming);
    assert_eq!(snapshot.grace_count, 0);

    h.presence.set_network(support::HOME);
    assert_eq!(
        h.cycle().await,
        CycleReport::Grace {
            count: 1,
            threshold: 5
        }
    );
}

#[tokio::test(start_paused = true)]
async fn presence_resets_grace() {
    let h = Harness::new(home_settings(5, 10), true);
    h.cycle().await;
    h.cycle().await;
    h.presence.set_present(true);
    assert_eq!(h.cycle().await, CycleReport::Present);
    assert_eq!(h.monitor.snapshot().grace_count, 0);
    assert!(h.state.saves.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_network_is_never_home() {
    let h = Harness::new(home_settings(1, 5), true);
    *h.presence.network.lock().unwrap() = home_sentry_monitor::NetworkName::Unknown;
    assert_eq!(h.cycle().await, CycleReport::Roaming);

    let mut settings = home_settings(1, 5);
    settings.home_ssid.clear();
    let h = Harness::new(settings, true);
    assert_eq!(h.cycle().await, CycleReport::Roaming);
    assert_eq!(h.presence.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_device_disables_monitoring() {
    let settings = Settings {
        device_mac: None,
        ..home_settings(1, 5)
    };
    let h = Harness::new(settings, true);
    assert_eq!(h.cycle().await, CycleReport::DeviceNotConfigured);
    assert_eq!(h.monitor.status(), SentryStatus::Roaming);
    assert_eq!(h.presence.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn paused_skips_detection_and_keeps_grace() {
    let h = Harness::new(home_settings(5, 10), true);
    h.cycle().await;
    h.settings.current.lock().unwrap().is_paused = true;

    assert_eq!(h.cycle().await, CycleReport::Paused);
    let snapshot = h.monitor.snapshot();
    assert_eq!(snapshot.status, SentryStatus::Paused);
    assert_eq!(snapshot.grace_count, 1);
    assert_eq!(h.presence.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_persist_and_update_status() {
    let h = Harness::new(home_settings(5, 10), true);

    h.monitor.pause();
    assert_eq!(h.monitor.status(), SentryStatus::Paused);
    h.monitor.resume();
    assert_eq!(h.monitor.status(), SentryStatus::Roaming);

    assert_eq!(*h.settings.pause_writes.lock().unwrap(), [true, false]);
    assert_eq!(h.statuses(), [SentryStatus::Paused, SentryStatus::Roaming]);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_when_the_settings_write_fails() {
    let h = Harness::new(home_settings(1, 10), true);
    h.settings.fail_pause_writes.store(true, Ordering::SeqCst);

    h.monitor.pause();
    assert_eq!(h.monitor.status(), SentryStatus::Paused);
    assert_eq!(h.monitor.paused_override(), Some(true));
    assert!(!h.settings.current.lock().unwrap().is_paused);

    assert_eq!(h.cycle().await, CycleReport::Paused);
    assert_eq!(h.cycle().await, CycleReport::Paused);
    assert_eq!(h.presence.checks.load(Ordering::SeqCst), 0);
    assert!(h.performed().is_empty());

    h.monitor.resume();
    assert_eq!(
        h.cycle().await,
        CycleReport::Escalated(CountdownOutcome::Executed(ShutdownAction::Shutdown))
    );
    assert!(h.settings.pause_writes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn settings_file_takes_over_once_it_agrees_or_changes() {
    let h = Harness::new(home_settings(5, 10), true);
    h.settings.fail_pause_writes.store(true, Ordering::SeqCst);
    h.monitor.pause();
    assert_eq!(h.cycle().await, CycleReport::Paused);

    // Someone else writes the pause: the override is no longer needed.
    h.settings.current.lock().unwrap().is_paused = true;
    assert_eq!(h.cycle().await, CycleReport::Paused);
    assert_eq!(h.monitor.paused_override(), None);

    h.settings.current.lock().unwrap().is_paused = false;
    assert_eq!(h.cycle().await, CycleReport::Grace { count: 1, threshold: 5 });
}

#[tokio::test(start_paused = true)]
async fn failed_first_sighting_save_is_kept_in_memory() {
    let h = Harness::new(home_settings(5, 10), false);
    h.state.fail_saves.store(true, Ordering::SeqCst);
    h.presence.set_present(true);

    assert_eq!(h.cycle().await, CycleReport::Present);
    assert!(h.monitor.snapshot().phone_ever_seen);
    assert!(h.state.saves.lock().unwrap().is_empty());

    h.presence.set_present(false);
    assert_eq!(h.cycle().await, CycleReport::Grace { count: 1, threshold: 5 });
    assert_eq!(h.cycle().await, CycleReport::Grace { count: 2, threshold: 5 });
    assert!(!h.statuses().contains(&SentryStatus::WaitingForPhone));
}

#[tokio::test(start_paused = true)]
async fn settings_failures_are_not_treated_as_absence() {
    let h = Harness::new(home_settings(1, 5), true);
    h.settings.failing_loads.store(2, Ordering::SeqCst);
    let monitor = Arc::clone(&h.monitor);
    let run = tokio::spawn(async move { monitor.start().await });

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(h.presence.checks.load(Ordering::SeqCst), 0);
    assert!(h.statuses().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.presence.checks.load(Ordering::SeqCst) >= 1);

    run.abort();
}

#[tokio::test(start_paused = true)]
async fn observer_may_read_the_monitor() {
    let h = Harness::new(home_settings(5, 10), true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let monitor = Arc::clone(&h.monitor);
    h.monitor
        .set_status_observer(Arc::new(move |status: SentryStatus| {
            let snapshot = monitor.snapshot();
            log.lock().unwrap().push((status, snapshot.grace_count));
        }));

    h.cycle().await;
    h.cycle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        [(SentryStatus::GracePeriod, 1), (SentryStatus::GracePeriod, 2)]
    );
    // The replaced observer no longer hears anything.
    assert!(h.statuses().is_empty());
}
