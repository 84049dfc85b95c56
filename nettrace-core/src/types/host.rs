use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Coarse geolocation attached to a host when a lookup source provides one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Snapshot of the probed host, taken once per probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHost {
    /// Name as given by the caller (or the IP literal itself).
    pub hostname: String,
    /// Address the probe was sent to.
    pub ip: IpAddr,
    /// Port, for connection-oriented probes.
    pub port: Option<u16>,
    /// Autonomous System Number (e.g. `"AS13335"`).
    pub asn: Option<String>,
    pub location: Option<GeoLocation>,
}

impl NetworkHost {
    pub fn new(hostname: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            ip,
            port: None,
            asn: None,
            location: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

impl std::fmt::Display for NetworkHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hostname == self.ip.to_string() {
            write!(f, "{}", self.ip)?;
        } else {
            write!(f, "{} ({})", self.hostname, self.ip)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}
