//! Suffix → WHOIS server routing.

use std::net::IpAddr;

use crate::utils::net::reverse_zone;

/// Known authoritative WHOIS servers, keyed by zone suffix.
///
/// Lookups use the longest matching suffix, so `co.uk` takes precedence over `uk`
/// and `in-addr.arpa` over `arpa`.
const SERVERS: &[(&str, &str)] = &[
    // Reverse zones
    ("arpa", "whois.iana.org"),
    ("in-addr.arpa", "whois.arin.net"),
    ("ip6.arpa", "whois.arin.net"),
    // Generic
    ("com", "whois.verisign-grs.com"),
    ("net", "whois.verisign-grs.com"),
    ("org", "whois.pir.org"),
    ("info", "whois.nic.info"),
    ("biz", "whois.nic.biz"),
    ("name", "whois.nic.name"),
    ("mobi", "whois.nic.mobi"),
    ("pro", "whois.nic.pro"),
    ("edu", "whois.educause.edu"),
    ("gov", "whois.dotgov.gov"),
    ("int", "whois.iana.org"),
    ("aero", "whois.nic.aero"),
    ("asia", "whois.nic.asia"),
    ("coop", "whois.nic.coop"),
    ("museum", "whois.nic.museum"),
    ("travel", "whois.nic.travel"),
    ("xxx", "whois.nic.xxx"),
    ("app", "whois.nic.google"),
    ("dev", "whois.nic.google"),
    ("page", "whois.nic.google"),
    ("io", "whois.nic.io"),
    ("ai", "whois.nic.ai"),
    ("co", "whois.nic.co"),
    ("me", "whois.nic.me"),
    ("tv", "whois.nic.tv"),
    ("cc", "ccwhois.verisign-grs.com"),
    ("xyz", "whois.nic.xyz"),
    ("online", "whois.nic.online"),
    ("site", "whois.nic.site"),
    ("tech", "whois.nic.tech"),
    ("store", "whois.nic.store"),
    ("cloud", "whois.nic.cloud"),
    ("top", "whois.nic.top"),
    // Country codes
    ("uk", "whois.nic.uk"),
    ("co.uk", "whois.nic.uk"),
    ("org.uk", "whois.nic.uk"),
    ("ac.uk", "whois.ja.net"),
    ("de", "whois.denic.de"),
    ("fr", "whois.nic.fr"),
    ("nl", "whois.domain-registry.nl"),
    ("be", "whois.dns.be"),
    ("eu", "whois.eu"),
    ("it", "whois.nic.it"),
    ("es", "whois.nic.es"),
    ("ch", "whois.nic.ch"),
    ("li", "whois.nic.li"),
    ("at", "whois.nic.at"),
    ("se", "whois.iis.se"),
    ("nu", "whois.iis.nu"),
    ("no", "whois.norid.no"),
    ("dk", "whois.punktum.dk"),
    ("fi", "whois.fi"),
    ("pl", "whois.dns.pl"),
    ("cz", "whois.nic.cz"),
    ("ru", "whois.tcinet.ru"),
    ("su", "whois.tcinet.ru"),
    ("ua", "whois.ua"),
    ("us", "whois.nic.us"),
    ("ca", "whois.cira.ca"),
    ("mx", "whois.mx"),
    ("br", "whois.registro.br"),
    ("com.br", "whois.registro.br"),
    ("ar", "whois.nic.ar"),
    ("cl", "whois.nic.cl"),
    ("au", "whois.auda.org.au"),
    ("com.au", "whois.auda.org.au"),
    ("nz", "whois.irs.net.nz"),
    ("co.nz", "whois.irs.net.nz"),
    ("jp", "whois.jprs.jp"),
    ("co.jp", "whois.jprs.jp"),
    ("cn", "whois.cnnic.cn"),
    ("com.cn", "whois.cnnic.cn"),
    ("hk", "whois.hkirc.hk"),
    ("tw", "whois.twnic.net.tw"),
    ("kr", "whois.kr"),
    ("in", "whois.registry.in"),
    ("sg", "whois.sgnic.sg"),
    ("za", "whois.registry.net.za"),
    ("co.za", "whois.registry.net.za"),
    ("ir", "whois.nic.ir"),
    ("tr", "whois.trabis.gov.tr"),
];

/// Server for a validated, ASCII, lower-case-insensitive domain name.
pub fn server_for_domain(domain: &str) -> Option<&'static str> {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    // Walk suffixes from longest to shortest: "a.co.uk", "co.uk", "uk".
    let mut suffix = domain.as_str();
    loop {
        if let Some(server) = lookup(suffix) {
            return Some(server);
        }
        match suffix.split_once('.') {
            Some((_, rest)) => suffix = rest,
            None => return None,
        }
    }
}

/// Server for an IP query, routed through its reverse zone.
pub fn server_for_ip(ip: IpAddr) -> &'static str {
    lookup(reverse_zone(ip)).unwrap_or("whois.arin.net")
}

fn lookup(suffix: &str) -> Option<&'static str> {
    SERVERS
        .iter()
        .find(|(zone, _)| *zone == suffix)
        .map(|(_, server)| *server)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_tld() {
        assert_eq!(server_for_domain("example.com"), Some("whois.verisign-grs.com"));
        assert_eq!(server_for_domain("EXAMPLE.ORG"), Some("whois.pir.org"));
    }

    #[test]
    fn test_longest_suffix_wins() {
        assert_eq!(server_for_domain("bbc.co.uk"), Some("whois.nic.uk"));
        assert_eq!(server_for_domain("ox.ac.uk"), Some("whois.ja.net"));
        assert_eq!(server_for_domain("sub.ox.ac.uk"), Some("whois.ja.net"));
    }

    #[test]
    fn test_unknown_tld() {
        assert_eq!(server_for_domain("example.invalidtld"), None);
    }

    #[test]
    fn test_ip_routes_to_arin() {
        assert_eq!(server_for_ip("8.8.8.8".parse().unwrap()), "whois.arin.net");
        assert_eq!(server_for_ip("2001:db8::1".parse().unwrap()), "whois.arin.net");
    }

    #[test]
    fn test_table_has_no_duplicate_zones() {
        let mut zones: Vec<&str> = SERVERS.iter().map(|(z, _)| *z).collect();
        zones.sort_unstable();
        let before = zones.len();
        zones.dedup();
        assert_eq!(before, zones.len());
    }
}
