//! Network queries the presence detector needs, and their implementation
//! on top of the OS command-line tools.

pub(crate) mod command;
pub mod parse;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use home_sentry_common::MacAddress;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::ProbeError;

/// One resolved row of the local neighbor (ARP) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Name of the wireless network currently joined; `None` when disconnected.
    async fn current_ssid(&self) -> Result<Option<String>, ProbeError>;

    /// Wireless networks in range.
    async fn visible_networks(&self) -> Result<Vec<String>, ProbeError>;

    async fn neighbor_table(&self) -> Result<Vec<NeighborEntry>, ProbeError>;

    /// Drop a single cached neighbor entry so the next lookup is fresh.
    async fn evict_neighbor(&self, ip: Ipv4Addr) -> Result<(), ProbeError>;

    /// One echo request; true if a reply arrived within `timeout`.
    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> bool;

    /// This host's address on the network used for the default route.
    async fn local_ipv4(&self) -> Result<Ipv4Addr, ProbeError>;

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

/// [`NetworkProbe`] backed by `netsh`/`arp`/`ping` on Windows,
/// `iwgetid`/`nmcli`/`ip neigh`/`ping` on Linux and
/// `networksetup`/`arp`/`ping` on macOS.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    command_timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl SystemProbe {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    async fn stdout(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        Ok(command::stdout_of(program, args, self.command_timeout).await?)
    }
}

#[cfg(target_os = "windows")]
impl SystemProbe {
    async fn query_ssid(&self) -> Result<Option<String>, ProbeError> {
        let output = self.stdout("netsh", &["wlan", "show", "interfaces"]).await?;
        Ok(parse::parse_netsh_ssid(&output))
    }

    async fn query_networks(&self) -> Result<Vec<String>, ProbeError> {
        let output = self.stdout("netsh", &["wlan", "show", "networks"]).await?;
        Ok(parse::parse_netsh_networks(&output))
    }

    async fn query_neighbors(&self) -> Result<String, ProbeError> {
        self.stdout("arp", &["-a"]).await
    }

    async fn evict(&self, ip: &str) -> Result<(), ProbeError> {
        self.stdout("arp", &["-d", ip]).await.map(drop)
    }

    fn ping_args(ip: &str, timeout: Duration) -> Vec<String> {
        vec![
            "-n".into(),
            "1".into(),
            "-w".into(),
            timeout.as_millis().to_string(),
            ip.into(),
        ]
    }

    async fn lookup(&self, ip: &str) -> Option<String> {
        let output = self.stdout("nslookup", &[ip]).await.ok()?;
        parse::parse_nslookup(&output)
    }
}

#[cfg(target_os = "linux")]
impl SystemProbe {
    async fn query_ssid(&self) -> Result<Option<String>, ProbeError> {
        match self.stdout("iwgetid", &["-r"]).await {
            Ok(output) => {
                if let Some(ssid) = parse::parse_iwgetid(&output) {
                    return Ok(Some(ssid));
                }
            }
            Err(err) => debug!(error = %err, "iwgetid unavailable; trying nmcli"),
        }
        let output = self
            .stdout("nmcli", &["-t", "-f", "active,ssid", "dev", "wifi"])
            .await?;
        Ok(parse::parse_nmcli_active(&output))
    }

    async fn query_networks(&self) -> Result<Vec<String>, ProbeError> {
        let output = self
            .stdout("nmcli", &["-t", "-f", "ssid", "dev", "wifi", "list"])
            .await?;
        Ok(parse::parse_nmcli_networks(&output))
    }

    async fn query_neighbors(&self) -> Result<String, ProbeError> {
        self.stdout("ip", &["-4", "neigh", "show"]).await
    }

    async fn evict(&self, ip: &str) -> Result<(), ProbeError> {
        self.stdout("ip", &["neigh", "flush", "to", ip]).await.map(drop)
    }

    fn ping_args(ip: &str, timeout: Duration) -> Vec<String> {
        // iputils only takes whole seconds for -W.
        let secs = timeout.as_millis().div_ceil(1000).max(1);
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            secs.to_string(),
            ip.into(),
        ]
    }

    async fn lookup(&self, ip: &str) -> Option<String> {
        let output = self.stdout("getent", &["hosts", ip]).await.ok()?;
        parse::parse_getent(&output)
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
impl SystemProbe {
    async fn query_ssid(&self) -> Result<Option<String>, ProbeError> {
        let output = self
            .stdout("networksetup", &["-getairportnetwork", "en0"])
            .await?;
        Ok(parse::parse_airport_network(&output))
    }

    async fn query_networks(&self) -> Result<Vec<String>, ProbeError> {
        Err(ProbeError::Unsupported("listing wireless networks"))
    }

    async fn query_neighbors(&self) -> Result<String, ProbeError> {
        self.stdout("arp", &["-an"]).await
    }

    async fn evict(&self, ip: &str) -> Result<(), ProbeError> {
        self.stdout("arp", &["-d", ip]).await.map(drop)
    }

    fn ping_args(ip: &str, timeout: Duration) -> Vec<String> {
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            timeout.as_millis().to_string(),
            ip.into(),
        ]
    }

    async fn lookup(&self, ip: &str) -> Option<String> {
        let output = self.stdout("dig", &["+short", "-x", ip]).await.ok()?;
        parse::parse_dig(&output)
    }
}

#[async_trait]
impl NetworkProbe for SystemProbe {
    async fn current_ssid(&self) -> Result<Option<String>, ProbeError> {
        self.query_ssid().await
    }

    async fn visible_networks(&self) -> Result<Vec<String>, ProbeError> {
        self.query_networks().await
    }

    async fn neighbor_table(&self) -> Result<Vec<NeighborEntry>, ProbeError> {
        let output = self.query_neighbors().await?;
        Ok(parse::parse_neighbor_table(&output))
    }

    async fn evict_neighbor(&self, ip: Ipv4Addr) -> Result<(), ProbeError> {
        self.evict(&ip.to_string()).await
    }

    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> bool {
        let args = Self::ping_args(&ip.to_string(), timeout);
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        let limit = timeout + Duration::from_secs(1);
        match command::run("ping", &borrowed, limit).await {
            Ok(output) => output.status.success(),
            Err(err) => {
                debug!(%ip, error = %err, "ping failed");
                false
            }
        }
    }

    async fn local_ipv4(&self) -> Result<Ipv4Addr, ProbeError> {
        // Connecting a UDP socket sends nothing; it only selects a route.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(ProbeError::NoRoute)?;
        socket
            .connect((Ipv4Addr::new(8, 8, 8, 8), 80))
            .await
            .map_err(ProbeError::NoRoute)?;
        match socket.local_addr().map_err(ProbeError::NoRoute)?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            other => Err(ProbeError::NoRoute(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("route selected non-IPv4 source {}", other),
            ))),
        }
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.lookup(&ip.to_string()).await
    }
}
