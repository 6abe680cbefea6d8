use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A 48-bit link-layer address.
///
/// Accepts the separators the various neighbor tables print
/// (`aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`, `aabbccddeeff`, and the
/// unpadded `a:b:c:d:e:f` form macOS uses). Always displays in the
/// canonical lowercase dash-separated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group addresses have the least significant bit of the first octet set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }
}

fn invalid(raw: &str) -> ValidationError {
    ValidationError::new(
        "device_mac",
        format!(
            "'{}' is not a MAC address (expected aa:bb:cc:dd:ee:ff, aa-bb-cc-dd-ee-ff or aabbccddeeff)",
            raw
        ),
    )
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let mut octets = [0u8; 6];

        if trimmed.len() == 12 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            for (index, octet) in octets.iter_mut().enumerate() {
                let pair = &trimmed[index * 2..index * 2 + 2];
                *octet = u8::from_str_radix(pair, 16).map_err(|_| invalid(raw))?;
            }
            return Ok(Self(octets));
        }

        let groups: Vec<&str> = trimmed.split([':', '-']).collect();
        if groups.len() != 6 {
            return Err(invalid(raw));
        }
        for (octet, group) in octets.iter_mut().zip(groups) {
            if group.is_empty() || group.len() > 2 || !group.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(invalid(raw));
            }
            *octet = u8::from_str_radix(group, 16).map_err(|_| invalid(raw))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            a, b, c, d, e, g
        )
    }
}
