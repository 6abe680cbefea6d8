//! Presence detection: which network are we on, and is the device really
//! there right now.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use home_sentry_common::validate::{sanitize_hostname, UNKNOWN_HOST};
use home_sentry_common::MacAddress;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::probe::{NeighborEntry, NetworkProbe};
use crate::retry::{retry, retry_until, RetryConfig};

const SWEEP_CONCURRENCY: usize = 64;

/// Result of asking the wireless subsystem for the current network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkName {
    Connected(String),
    /// Disconnected, or the query kept failing. Never equal to a home SSID.
    Unknown,
}

impl NetworkName {
    pub fn matches_home(&self, home_ssid: &str) -> bool {
        match self {
            NetworkName::Connected(name) => !home_ssid.is_empty() && name == home_ssid,
            NetworkName::Unknown => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NetworkName::Connected(name) => name,
            NetworkName::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host found by a subnet scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDevice {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    pub hostname: String,
}

/// What the monitor needs to know each cycle.
#[async_trait]
pub trait PresenceCheck: Send + Sync {
    async fn current_network_name(&self) -> NetworkName;

    async fn is_device_present(&self, mac: &MacAddress, ping_timeout: Duration) -> bool;
}

/// [`PresenceCheck`] over any [`NetworkProbe`], with retries around the
/// flaky OS queries.
pub struct PresenceDetector<P> {
    probe: Arc<P>,
    retry: RetryConfig,
    sweep_concurrency: usize,
}

impl<P: NetworkProbe + 'static> PresenceDetector<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
            retry: RetryConfig::default(),
            sweep_concurrency: SWEEP_CONCURRENCY,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    async fn read_table(&self) -> Result<Vec<NeighborEntry>, ProbeError> {
        retry(&self.retry, || self.probe.neighbor_table()).await
    }

    async fn find_ip(&self, mac: &MacAddress) -> Option<Ipv4Addr> {
        match self.read_table().await {
            Ok(entries) => entries
                .into_iter()
                .find(|entry| entry.mac == *mac)
                .map(|entry| entry.ip),
            Err(err) => {
                debug!(error = %err, "neighbor table unavailable");
                None
            }
        }
    }

    /// Ping every other host of our /24 so the neighbor table fills up.
    /// Returns once every probe has finished.
    pub async fn sweep_subnet(&self, ping_timeout: Duration) -> Result<(), ProbeError> {
        let local = self.probe.local_ipv4().await?;
        let [a, b, c, _] = local.octets();
        let permits = Arc::new(Semaphore::new(self.sweep_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for host in 1..=254u8 {
            let target = Ipv4Addr::new(a, b, c, host);
            if target == local {
                continue;
            }
            let probe = Arc::clone(&self.probe);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                probe.ping(target, ping_timeout).await;
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                debug!(error = %err, "sweep probe task failed");
            }
        }
        debug!(subnet = %Ipv4Addr::new(a, b, c, 0), "subnet sweep finished");
        Ok(())
    }

    /// Every device on the local subnet, resolved and sorted by address.
    pub async fn scan_devices(
        &self,
        ping_timeout: Duration,
    ) -> Result<Vec<NetworkDevice>, ProbeError> {
        if let Err(err) = self.sweep_subnet(ping_timeout).await {
            warn!(error = %err, "subnet sweep failed; using cached neighbors only");
        }
        let mut unique: HashMap<MacAddress, Ipv4Addr> = HashMap::new();
        for entry in self.read_table().await? {
            unique.entry(entry.mac).or_insert(entry.ip);
        }

        let mut lookups = JoinSet::new();
        for (mac, ip) in unique {
            let probe = Arc::clone(&self.probe);
            lookups.spawn(async move {
                let hostname = probe
                    .reverse_lookup(ip)
                    .await
                    .map(|name| sanitize_hostname(&name))
                    .unwrap_or_else(|| UNKNOWN_HOST.to_string());
                NetworkDevice { ip, mac, hostname }
            });
        }
        let mut devices = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok(device) => devices.push(device),
                Err(err) => debug!(error = %err, "hostname lookup task failed"),
            }
        }
        devices.sort_by_key(|device| device.ip);
        info!(count = devices.len(), "device scan complete");
        Ok(devices)
    }

    pub async fn visible_networks(&self) -> Result<Vec<String>, ProbeError> {
        self.probe.visible_networks().await
    }
}

#[async_trait]
impl<P: NetworkProbe + 'static> PresenceCheck for PresenceDetector<P> {
    async fn current_network_name(&self) -> NetworkName {
        let ssid = retry_until(
            &self.retry,
            || async {
                match self.probe.current_ssid().await {
                    Ok(ssid) => ssid.filter(|name| !name.is_empty()),
                    Err(err) => {
                        debug!(error = %err, "SSID query failed");
                        None
                    }
                }
            },
            Option::is_some,
        )
        .await;
        match ssid {
            Some(name) => NetworkName::Connected(name),
            None => NetworkName::Unknown,
        }
    }

    async fn is_device_present(&self, mac: &MacAddress, ping_timeout: Duration) -> bool {
        let cached = self.find_ip(mac).await;

        match cached {
            Some(ip) => {
                if let Err(err) = self.probe.evict_neighbor(ip).await {
                    debug!(%ip, error = %err, "could not evict neighbor entry");
                }
                if !self.probe.ping(ip, ping_timeout).await {
                    debug!(%ip, "last known address did not answer");
                }
            }
            None => {
                if let Err(err) = self.sweep_subnet(ping_timeout).await {
                    debug!(error = %err, "subnet sweep failed");
                }
            }
        }

        let present = match self.read_table().await {
            Ok(entries) => entries.iter().any(|entry| entry.mac == *mac),
            Err(err) => {
                warn!(error = %err, "neighbor table unavailable after probing");
                false
            }
        };
        debug!(%mac, present, "presence check");
        present
    }
}
