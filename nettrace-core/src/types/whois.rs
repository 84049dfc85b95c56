use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contact role as labelled in WHOIS output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactRole {
    Registrant,
    Admin,
    Tech,
    Billing,
}

impl ContactRole {
    /// Match the role prefix of a lower-cased WHOIS key (`"admin email"` -> `Admin`).
    ///
    /// Returns the role and the remainder of the key.
    pub fn split_key(key: &str) -> Option<(Self, &str)> {
        const PREFIXES: [(&str, ContactRole); 6] = [
            ("registrant", ContactRole::Registrant),
            ("administrative", ContactRole::Admin),
            ("admin", ContactRole::Admin),
            ("technical", ContactRole::Tech),
            ("tech", ContactRole::Tech),
            ("billing", ContactRole::Billing),
        ];
        PREFIXES.iter().find_map(|(prefix, role)| {
            key.strip_prefix(prefix)
                .map(|rest| (*role, rest.trim_start_matches([' ', '-', '_']).trim()))
        })
    }
}

impl fmt::Display for ContactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registrant => "registrant",
            Self::Admin => "admin",
            Self::Tech => "tech",
            Self::Billing => "billing",
        };
        f.write_str(s)
    }
}

/// Contact block for one role. Only fields present in the response are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: Option<String>,
    pub organization: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Street / city / postal lines joined with `", "`.
    pub address: Option<String>,
}

impl Contact {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.organization.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

/// WHOIS query result with parsed registration fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoisResult {
    /// Domain (or IP) as reported by the server, falling back to the query.
    pub domain: String,
    /// Domain registrar (e.g. "Cloudflare, Inc.").
    pub registrar: Option<String>,
    /// Registration creation date.
    pub created: Option<DateTime<Utc>>,
    /// Last updated date.
    pub updated: Option<DateTime<Utc>>,
    /// Registration expiration date.
    pub expires: Option<DateTime<Utc>>,
    /// Authoritative name servers.
    pub name_servers: Vec<String>,
    /// EPP status codes.
    pub status: Vec<String>,
    pub contacts: BTreeMap<ContactRole, Contact>,
    /// Server whose response was parsed.
    pub server: String,
    /// Every server queried, in order, starting with the TLD server.
    pub referral_chain: Vec<String>,
    /// Raw WHOIS response text.
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key() {
        assert_eq!(
            ContactRole::split_key("registrant name"),
            Some((ContactRole::Registrant, "name"))
        );
        assert_eq!(
            ContactRole::split_key("administrative contact email"),
            Some((ContactRole::Admin, "contact email"))
        );
        assert_eq!(
            ContactRole::split_key("tech-phone"),
            Some((ContactRole::Tech, "phone"))
        );
        assert_eq!(ContactRole::split_key("registrar"), None);
    }

    #[test]
    fn test_contact_is_empty() {
        assert!(Contact::default().is_empty());
        let c = Contact {
            email: Some("a@b.c".into()),
            ..Contact::default()
        };
        assert!(!c.is_empty());
    }
}
