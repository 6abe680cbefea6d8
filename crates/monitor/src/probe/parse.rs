//! Text parsers for the OS tools the system probe shells out to. All of
//! them are pure so they can be tested against captured output.

use std::net::Ipv4Addr;

use home_sentry_common::MacAddress;
use once_cell::sync::Lazy;
use regex::Regex;

use super::NeighborEntry;

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\b").expect("valid IPv4 pattern")
});

static LINK_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(])([0-9A-Fa-f]{1,2}(?:[:-][0-9A-Fa-f]{1,2}){5})(?:$|[\s)])")
        .expect("valid link address pattern")
});

static NETSH_SSID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s+SSID\s+:\s+(.+)$").expect("valid netsh SSID pattern"));

static NETSH_NETWORK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^SSID \d+ : (.*)$").expect("valid netsh network pattern"));

/// Extract `(IPv4, link address)` pairs from `arp -a` (Windows),
/// `arp -an` (macOS/BSD) or `ip neigh show` (Linux) output.
///
/// Lines without a resolved link address (interface headers, incomplete
/// or failed entries) are skipped, as are multicast and broadcast entries.
pub fn parse_neighbor_table(output: &str) -> Vec<NeighborEntry> {
    output
        .lines()
        .filter_map(|line| {
            let ip: Ipv4Addr = IPV4.captures(line)?.get(1)?.as_str().parse().ok()?;
            let mac: MacAddress = LINK_ADDRESS.captures(line)?.get(1)?.as_str().parse().ok()?;
            if ip.is_multicast() || ip.is_broadcast() || mac.is_broadcast() || mac.is_multicast() {
                return None;
            }
            Some(NeighborEntry { ip, mac })
        })
        .collect()
}

fn connected_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    let placeholder =
        name.eq_ignore_ascii_case("disconnected") || name.eq_ignore_ascii_case("unknown");
    if name.is_empty() || placeholder {
        None
    } else {
        Some(name.to_string())
    }
}

/// `netsh wlan show interfaces`.
pub fn parse_netsh_ssid(output: &str) -> Option<String> {
    NETSH_SSID
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|name| connected_name(name.as_str()))
}

/// `netsh wlan show networks`.
pub fn parse_netsh_networks(output: &str) -> Vec<String> {
    dedup_names(
        NETSH_NETWORK
            .captures_iter(output)
            .filter_map(|caps| caps.get(1).map(|name| name.as_str().to_string())),
    )
}

/// `iwgetid -r` prints the bare SSID, or nothing when disconnected.
pub fn parse_iwgetid(output: &str) -> Option<String> {
    connected_name(output)
}

/// `nmcli -t -f active,ssid dev wifi`: the line starting with `yes:`.
pub fn parse_nmcli_active(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("yes:"))
        .and_then(|name| connected_name(&unescape_nmcli(name)))
}

/// `nmcli -t -f ssid dev wifi list`.
pub fn parse_nmcli_networks(output: &str) -> Vec<String> {
    dedup_names(output.lines().map(unescape_nmcli))
}

/// Terse nmcli output escapes `:` and `\` with a backslash.
fn unescape_nmcli(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `networksetup -getairportnetwork en0`.
pub fn parse_airport_network(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Current Wi-Fi Network:"))
        .and_then(connected_name)
}

fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !unique.iter().any(|seen| seen == name) {
            unique.push(name.to_string());
        }
    }
    unique
}

/// `nslookup <ip>` (Windows): the `Name:` line.
pub fn parse_nslookup(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Name:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// `getent hosts <ip>` (Linux): `<ip> <canonical name> [aliases]`.
pub fn parse_getent(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

/// `dig +short -x <ip>` (macOS): a fully qualified name with a trailing dot.
pub fn parse_dig(output: &str) -> Option<String> {
    output
        .lines()
        .map(|line| line.trim().trim_end_matches('.'))
        .find(|line| !line.is_empty() && !line.starts_with(';'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(raw: &str) -> MacAddress {
        raw.parse().unwrap()
    }

    #[test]
    fn windows_arp_table() {
        let output = "\
Interface: 192.168.1.23 --- 0xb
  Internet Address      Physical Address      Type
  192.168.1.1           a0-b1-c2-d3-e4-f5     dynamic
  192.168.1.42          A4-83-E7-12-34-56     dynamic
  192.168.1.255         ff-ff-ff-ff-ff-ff     static
  224.0.0.22            01-00-5e-00-00-16     static
  239.255.255.250       01-00-5e-7f-ff-fa     static
";
        let entries = parse_neighbor_table(output);
        assert_eq!(
            entries,
            vec![
                NeighborEntry {
                    ip: Ipv4Addr::new(192, 168, 1, 1),
                    mac: mac("a0-b1-c2-d3-e4-f5"),
                },
                NeighborEntry {
                    ip: Ipv4Addr::new(192, 168, 1, 42),
                    mac: mac("a4-83-e7-12-34-56"),
                },
            ]
        );
    }

    #[test]
    fn linux_ip_neigh() {
        let output = "\
192.168.1.1 dev wlan0 lladdr a0:b1:c2:d3:e4:f5 REACHABLE
192.168.1.77 dev wlan0  FAILED
192.168.1.42 dev wlan0 lladdr a4:83:e7:12:34:56 STALE
fe80::1 dev wlan0 lladdr a0:b1:c2:d3:e4:f5 router STALE
";
        let entries = parse_neighbor_table(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].ip, Ipv4Addr::new(192, 168, 1, 42));
        assert_eq!(entries[1].mac, mac("a4-83-e7-12-34-56"));
    }

    #[test]
    fn macos_arp_table_with_unpadded_octets() {
        let output = "\
? (192.168.1.1) at a0:b1:c2:d3:e4:f5 on en0 ifscope [ethernet]
? (192.168.1.42) at a4:83:e7:2:4:6 on en0 ifscope [ethernet]
? (192.168.1.50) at (incomplete) on en0 ifscope [ethernet]
? (224.0.0.251) at 1:0:5e:0:0:fb on en0 ifscope permanent [ethernet]
";
        let entries = parse_neighbor_table(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].mac.to_string(), "a4-83-e7-02-04-06");
    }

    #[test]
    fn netsh_interfaces() {
        let connected = "\
    Name                   : Wi-Fi
    State                  : connected
    SSID                   : HomeNet 5G
    BSSID                  : a0:b1:c2:d3:e4:f5
";
        assert_eq!(parse_netsh_ssid(connected).as_deref(), Some("HomeNet 5G"));

        let disconnected = "\
    Name                   : Wi-Fi
    State                  : disconnected
";
        assert_eq!(parse_netsh_ssid(disconnected), None);
    }

    #[test]
    fn netsh_networks_are_deduplicated() {
        let output = "\
SSID 1 : HomeNet
    Network type            : Infrastructure
SSID 2 : Neighbor
SSID 3 : HomeNet
SSID 4 :
";
        assert_eq!(parse_netsh_networks(output), ["HomeNet", "Neighbor"]);
    }

    #[test]
    fn linux_ssid_sources() {
        assert_eq!(parse_iwgetid("HomeNet\n").as_deref(), Some("HomeNet"));
        assert_eq!(parse_iwgetid("\n"), None);
        let nmcli = "no:Neighbor\nyes:Home\\:Net\n";
        assert_eq!(parse_nmcli_active(nmcli).as_deref(), Some("Home:Net"));
        assert_eq!(parse_nmcli_active("no:Neighbor\n"), None);
        assert_eq!(
            parse_nmcli_networks("HomeNet\n\nNeighbor\nHomeNet\n"),
            ["HomeNet", "Neighbor"]
        );
    }

    #[test]
    fn macos_airport() {
        assert_eq!(
            parse_airport_network("Current Wi-Fi Network: HomeNet\n").as_deref(),
            Some("HomeNet")
        );
        assert_eq!(
            parse_airport_network("You are not associated with an AirPort network.\n"),
            None
        );
    }

    #[test]
    fn reverse_lookup_outputs() {
        let nslookup = "\
Server:  router.lan
Address:  192.168.1.1

Name:    pixel-7.lan
Address:  192.168.1.42
";
        assert_eq!(parse_nslookup(nslookup).as_deref(), Some("pixel-7.lan"));
        assert_eq!(
            parse_getent("192.168.1.42    pixel-7.lan pixel\n").as_deref(),
            Some("pixel-7.lan")
        );
        assert_eq!(parse_dig("pixel-7.local.\n").as_deref(), Some("pixel-7.local"));
        assert_eq!(parse_dig(""), None);
    }
}
