//! Per-tool input parameters.
//!
//! Each tool has a typed parameter struct; [`Parameters`] is their tagged
//! union. The map adapter (`get` / `set` / `to_map`) exists for callers that
//! only have string keys, such as form-driven front ends.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::services::{validate_domain, validate_host};
use crate::types::{DnsRecordType, PingOptions, TraceOptions};

/// Default TLS port.
pub const DEFAULT_SSL_PORT: u16 = 443;

/// Serialized name of the union tag; not settable through the map adapter.
const TAG: &str = "tool";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingParameters {
    pub host: String,
    #[serde(flatten)]
    pub options: PingOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceParameters {
    pub host: String,
    #[serde(flatten)]
    pub options: TraceOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsParameters {
    pub domain: String,
    /// Empty means [`DnsRecordType::DEFAULT_SET`].
    #[serde(default)]
    pub record_types: Vec<DnsRecordType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoisParameters {
    /// Domain name or IP address.
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslParameters {
    pub host: String,
    #[serde(default = "default_ssl_port")]
    pub port: u16,
}

const fn default_ssl_port() -> u16 {
    DEFAULT_SSL_PORT
}

/// Input for one diagnostic tool run.
///
/// Serialized with a `"tool"` tag: `{"tool": "dns", "domain": "example.com", "recordTypes": ["A"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum Parameters {
    Ping(PingParameters),
    Traceroute(TraceParameters),
    Dns(DnsParameters),
    Whois(WhoisParameters),
    Ssl(SslParameters),
}

impl Parameters {
    pub fn ping(host: impl Into<String>) -> Self {
        Self::Ping(PingParameters {
            host: host.into(),
            options: PingOptions::default(),
        })
    }

    pub fn traceroute(host: impl Into<String>) -> Self {
        Self::Traceroute(TraceParameters {
            host: host.into(),
            options: TraceOptions::default(),
        })
    }

    /// DNS lookup of the default record set.
    pub fn dns(domain: impl Into<String>) -> Self {
        Self::Dns(DnsParameters {
            domain: domain.into(),
            record_types: Vec::new(),
        })
    }

    pub fn whois(query: impl Into<String>) -> Self {
        Self::Whois(WhoisParameters {
            query: query.into(),
        })
    }

    pub fn ssl(host: impl Into<String>) -> Self {
        Self::Ssl(SslParameters {
            host: host.into(),
            port: DEFAULT_SSL_PORT,
        })
    }

    /// Name of the tool these parameters belong to.
    pub const fn tool_name(&self) -> &'static str {
        match self {
            Self::Ping(_) => "ping",
            Self::Traceroute(_) => "traceroute",
            Self::Dns(_) => "dns",
            Self::Whois(_) => "whois",
            Self::Ssl(_) => "ssl",
        }
    }

    /// The host, domain or query the run targets.
    pub fn target(&self) -> &str {
        match self {
            Self::Ping(p) => &p.host,
            Self::Traceroute(p) => &p.host,
            Self::Dns(p) => &p.domain,
            Self::Whois(p) => &p.query,
            Self::Ssl(p) => &p.host,
        }
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> NetTraceResult<()> {
        match self {
            Self::Ping(p) => {
                p.options.validate()?;
                validate_host(&p.host, ErrorCode::PingValidationFailed)?;
            }
            Self::Traceroute(p) => {
                p.options.validate()?;
                validate_host(&p.host, ErrorCode::TracerouteValidationFailed)?;
            }
            Self::Dns(p) => {
                validate_domain(&p.domain, ErrorCode::DnsValidationFailed)?;
            }
            Self::Whois(p) => {
                if p.query.trim().parse::<IpAddr>().is_err() {
                    validate_domain(&p.query, ErrorCode::WhoisValidationFailed)?;
                }
            }
            Self::Ssl(p) => {
                validate_host(&p.host, ErrorCode::SslValidationFailed)?;
                if p.port == 0 {
                    return Err(NetTraceError::validation(
                        ErrorCode::SslValidationFailed,
                        "Port must be between 1 and 65535",
                    ));
                }
            }
        }
        Ok(())
    }

    /// All parameters as a camelCase key → JSON value map (durations in milliseconds).
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().filter(|(k, _)| k != TAG).collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    /// Replace one parameter by key.
    ///
    /// Unknown keys and values of the wrong shape fail with `INVALID_PARAMETER`;
    /// on failure `self` is left unchanged.
    pub fn set(&mut self, key: &str, value: Value) -> NetTraceResult<()> {
        let tool = self.tool_name();
        let invalid = |message: String| {
            NetTraceError::validation(ErrorCode::InvalidParameter, message)
                .with_context("tool", tool)
                .with_context("parameter", key)
        };

        let mut map = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            _ => return Err(invalid("Parameters are not serializable".to_string())),
        };
        if key == TAG || !map.contains_key(key) {
            return Err(invalid(format!("Unknown parameter: {key}")));
        }
        map.insert(key.to_string(), value);

        *self = serde_json::from_value(Value::Object(map))
            .map_err(|e| invalid(format!("Invalid value for {key}: {e}")))?;
        Ok(())
    }
}
