use std::fmt;

/// What the monitor currently believes about the machine's situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentryStatus {
    /// Away from the home network, or no device to watch.
    Roaming,
    /// At home and the device answered the last check.
    Monitoring,
    /// At home, device missing, still within the tolerated misses.
    GracePeriod,
    /// Countdown to the protective action is running.
    ShutdownImminent,
    Paused,
    /// At home, device configured but never seen yet.
    WaitingForPhone,
}

impl SentryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SentryStatus::Roaming => "Roaming",
            SentryStatus::Monitoring => "Monitoring",
            SentryStatus::GracePeriod => "Grace Period",
            SentryStatus::ShutdownImminent => "Shutdown Imminent",
            SentryStatus::Paused => "Paused",
            SentryStatus::WaitingForPhone => "Waiting for Phone",
        }
    }
}

impl fmt::Display for SentryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives every status assignment. Called outside the monitor's lock, so
/// implementations may call back into the monitor.
pub trait StatusObserver: Send + Sync {
    fn on_status_changed(&self, status: SentryStatus);
}

impl<F> StatusObserver for F
where
    F: Fn(SentryStatus) + Send + Sync,
{
    fn on_status_changed(&self, status: SentryStatus) {
        self(status)
    }
}
