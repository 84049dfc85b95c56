//! Resolver construction for the DNS driver.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use hickory_resolver::{
    TokioResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};

/// Human-readable description of the DNS servers used by the system resolver.
pub(crate) static SYSTEM_DNS_LABEL: LazyLock<String> = LazyLock::new(|| {
    #[cfg(any(unix, target_os = "windows"))]
    {
        if let Ok((config, _opts)) = hickory_resolver::system_conf::read_system_conf() {
            let ips = dedup_ips(&config);
            if !ips.is_empty() {
                return ips.join(", ");
            }
        }
    }

    let fallback = ResolverConfig::default();
    let ips = dedup_ips(&fallback);
    if ips.is_empty() {
        "Default".to_string()
    } else {
        ips.join(", ")
    }
});

/// Deduplicate nameserver IP addresses from a resolver configuration.
pub(crate) fn dedup_ips(config: &ResolverConfig) -> Vec<String> {
    let mut ips: Vec<String> = Vec::new();
    for ns in config.name_servers() {
        let ip = ns.socket_addr.ip().to_string();
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

/// Label for the servers a resolver built from `servers` talks to.
pub(crate) fn server_label(servers: &[IpAddr]) -> String {
    if servers.is_empty() {
        SYSTEM_DNS_LABEL.clone()
    } else {
        servers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Build a resolver for `servers`, or the system configuration when empty.
///
/// Resolver-level retries are disabled: each query is a single attempt bounded
/// by `timeout`, and retrying is left to the caller's retry policy.
pub(crate) fn build_resolver(servers: &[IpAddr], timeout: Duration) -> TokioResolver {
    if !servers.is_empty() {
        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(servers, 53, true),
        );
        let provider = TokioConnectionProvider::default();
        return TokioResolver::builder_with_config(config, provider)
            .with_options(single_attempt(ResolverOpts::default(), timeout))
            .build();
    }

    build_system_resolver(timeout)
}

fn single_attempt(mut opts: ResolverOpts, timeout: Duration) -> ResolverOpts {
    opts.attempts = 1;
    opts.timeout = timeout;
    // Answers must reflect the server, not a previous call.
    opts.cache_size = 0;
    opts
}

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver(timeout: Duration) -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(mut builder) => {
                let opts = single_attempt(builder.options_mut().clone(), timeout);
                *builder.options_mut() = opts;
                return builder.build();
            }
            Err(e) => {
                log::warn!(
                    "[DNS] Failed to load system DNS configuration, falling back to defaults: {e}"
                );
            }
        }
    }

    let provider = TokioConnectionProvider::default();
    TokioResolver::builder_with_config(ResolverConfig::default(), provider)
        .with_options(single_attempt(ResolverOpts::default(), timeout))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_ips_default_config() {
        let config = ResolverConfig::default();
        let ips = dedup_ips(&config);
        assert!(
            !ips.is_empty(),
            "Default config should have at least one nameserver IP"
        );
    }

    #[test]
    fn test_dedup_ips_empty_config() {
        let config = ResolverConfig::from_parts(None, vec![], NameServerConfigGroup::new());
        let ips = dedup_ips(&config);
        assert!(ips.is_empty(), "Empty config should produce no IPs");
    }

    #[test]
    fn test_dedup_ips_removes_duplicates() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        // Same IP twice (UDP + TCP entries per IP, so four entries in total)
        let ns_group = NameServerConfigGroup::from_ips_clear(&[ip, ip], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], ns_group);
        let ips = dedup_ips(&config);
        assert_eq!(ips, vec!["1.2.3.4".to_string()]);
    }

    #[test]
    fn test_server_label_lists_configured_servers() {
        let servers: Vec<IpAddr> = vec!["1.1.1.1".parse().unwrap(), "9.9.9.9".parse().unwrap()];
        assert_eq!(server_label(&servers), "1.1.1.1, 9.9.9.9");
        assert!(!server_label(&[]).is_empty());
    }

    #[test]
    fn test_single_attempt_options() {
        let opts = single_attempt(ResolverOpts::default(), Duration::from_secs(2));
        assert_eq!(opts.attempts, 1);
        assert_eq!(opts.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_build_resolver_with_servers() {
        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        // Should not panic
        let _resolver = build_resolver(&[ip], Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_build_resolver_without_servers() {
        // Falls back to the system resolver
        let _resolver = build_resolver(&[], Duration::from_secs(1));
    }
}
