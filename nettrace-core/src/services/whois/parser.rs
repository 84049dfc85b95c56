//! Line-oriented WHOIS response parser.
//!
//! Responses are tokenised into `key: value` pairs; keys are lower-cased and
//! matched against an alias table. Indented continuation lines without a colon
//! (Nominet style blocks) are attributed to the last key with an empty value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::dates::parse_date;
use crate::types::{Contact, ContactRole, WhoisResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Domain,
    Registrar,
    Created,
    Updated,
    Expires,
    NameServer,
    Status,
}

const ALIASES: &[(&str, Field)] = &[
    ("domain name", Field::Domain),
    ("domain", Field::Domain),
    ("domainname", Field::Domain),
    ("registrar", Field::Registrar),
    ("registrar name", Field::Registrar),
    ("sponsoring registrar", Field::Registrar),
    ("registrar organization", Field::Registrar),
    ("creation date", Field::Created),
    ("created", Field::Created),
    ("created date", Field::Created),
    ("created on", Field::Created),
    ("registered", Field::Created),
    ("registered on", Field::Created),
    ("registration date", Field::Created),
    ("registration time", Field::Created),
    ("domain registration date", Field::Created),
    ("regdate", Field::Created),
    ("updated date", Field::Updated),
    ("updated", Field::Updated),
    ("last updated", Field::Updated),
    ("last modified", Field::Updated),
    ("last-update", Field::Updated),
    ("modified", Field::Updated),
    ("changed", Field::Updated),
    ("updated on", Field::Updated),
    ("registry expiry date", Field::Expires),
    ("registrar registration expiration date", Field::Expires),
    ("expiry date", Field::Expires),
    ("expiration date", Field::Expires),
    ("expiration time", Field::Expires),
    ("expires", Field::Expires),
    ("expires on", Field::Expires),
    ("expire", Field::Expires),
    ("paid-till", Field::Expires),
    ("renewal date", Field::Expires),
    ("name server", Field::NameServer),
    ("name servers", Field::NameServer),
    ("nameserver", Field::NameServer),
    ("nameservers", Field::NameServer),
    ("nserver", Field::NameServer),
    ("dns", Field::NameServer),
    ("domain status", Field::Status),
    ("status", Field::Status),
    ("state", Field::Status),
];

fn field_for(key: &str) -> Option<Field> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, field)| *field)
}

/// Contact attribute named by the remainder of a role-prefixed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContactField {
    Name,
    Organization,
    Email,
    Phone,
    Address,
}

fn contact_field_for(rest: &str) -> Option<ContactField> {
    let rest = rest.strip_prefix("contact").map_or(rest, str::trim_start);
    match rest {
        "" | "name" => Some(ContactField::Name),
        "organization" | "organisation" | "org" => Some(ContactField::Organization),
        "email" | "e-mail" => Some(ContactField::Email),
        "phone" | "phone number" | "telephone" | "tel" => Some(ContactField::Phone),
        "street" | "address" | "city" | "state/province" | "postal code" | "country"
        | "country code" => Some(ContactField::Address),
        _ => None,
    }
}

/// What a key resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Field(Field),
    Contact(ContactRole, ContactField),
}

fn target_for(key: &str) -> Option<Target> {
    if let Some(field) = field_for(key) {
        return Some(Target::Field(field));
    }
    let (role, rest) = ContactRole::split_key(key)?;
    contact_field_for(rest).map(|field| Target::Contact(role, field))
}

fn is_comment(line: &str) -> bool {
    line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>")
}

/// Split a line into a lower-cased key and a trimmed value.
fn split_line(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_lowercase(), value.trim()))
}

#[derive(Debug, Default)]
struct Builder {
    domain: Option<String>,
    registrar: Option<String>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
    name_servers: Vec<String>,
    status: Vec<String>,
    contacts: BTreeMap<ContactRole, Contact>,
}

impl Builder {
    fn apply(&mut self, target: Target, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match target {
            Target::Field(Field::Domain) => {
                self.domain.get_or_insert_with(|| value.to_string());
            }
            Target::Field(Field::Registrar) => {
                self.registrar.get_or_insert_with(|| value.to_string());
            }
            Target::Field(Field::Created) => set_date(&mut self.created, value),
            Target::Field(Field::Updated) => set_date(&mut self.updated, value),
            Target::Field(Field::Expires) => set_date(&mut self.expires, value),
            Target::Field(Field::NameServer) => {
                if let Some(first) = value.split_whitespace().next() {
                    push_unique(
                        &mut self.name_servers,
                        first.trim_end_matches('.').to_lowercase(),
                    );
                }
            }
            Target::Field(Field::Status) => {
                if let Some(first) = value.split_whitespace().next() {
                    push_unique(&mut self.status, first.to_string());
                }
            }
            Target::Contact(role, field) => {
                let contact = self.contacts.entry(role).or_default();
                let slot = match field {
                    ContactField::Name => &mut contact.name,
                    ContactField::Organization => &mut contact.organization,
                    ContactField::Email => &mut contact.email,
                    ContactField::Phone => &mut contact.phone,
                    ContactField::Address => {
                        match &mut contact.address {
                            Some(address) => {
                                address.push_str(", ");
                                address.push_str(value);
                            }
                            None => contact.address = Some(value.to_string()),
                        }
                        return;
                    }
                };
                slot.get_or_insert_with(|| value.to_string());
            }
        }
    }
}

fn set_date(slot: &mut Option<DateTime<Utc>>, value: &str) {
    if slot.is_none() {
        *slot = parse_date(value);
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

/// Parse `raw` into a [`WhoisResult`]. `query` is used when no domain line is present.
///
/// `server` and `referral_chain` are left empty for the caller to fill.
pub fn parse(query: &str, raw: &str) -> WhoisResult {
    let mut builder = Builder::default();
    // Key whose value is expected on the following indented lines.
    let mut pending: Option<Target> = None;

    for line in raw.lines() {
        let indented = line.starts_with([' ', '\t']);
        let line = line.trim();
        if line.is_empty() {
            pending = None;
            continue;
        }
        if is_comment(line) {
            continue;
        }

        match split_line(line) {
            Some((key, value)) => {
                let target = target_for(&key);
                pending = None;
                match target {
                    Some(target) if value.is_empty() => pending = Some(target),
                    Some(target) => builder.apply(target, value),
                    None => {}
                }
            }
            None => {
                if let Some(target) = pending
                    && indented
                {
                    builder.apply(target, line);
                }
            }
        }
    }

    // Contacts are additive: a role appears only when at least one field was present.
    builder.contacts.retain(|_, contact| !contact.is_empty());

    WhoisResult {
        domain: builder.domain.unwrap_or_else(|| query.to_string()),
        registrar: builder.registrar,
        created: builder.created,
        updated: builder.updated,
        expires: builder.expires,
        name_servers: builder.name_servers,
        status: builder.status,
        contacts: builder.contacts,
        server: String::new(),
        referral_chain: Vec::new(),
        raw: raw.to_string(),
    }
}
