use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The closed set of identifier kinds we keep history for. Each class gets its
/// own dedup cache and its own collection in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierClass {
    Domain,
    Ip,
    Md5,
    Email,
}

impl IdentifierClass {
    pub const ALL: [IdentifierClass; 4] = [
        IdentifierClass::Domain,
        IdentifierClass::Ip,
        IdentifierClass::Md5,
        IdentifierClass::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierClass::Domain => "domain",
            IdentifierClass::Ip => "ip",
            IdentifierClass::Md5 => "md5",
            IdentifierClass::Email => "email",
        }
    }

    /// Name of the collection holding this class's records, e.g. `hodi-domain`.
    pub fn index_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.as_str())
    }
}

impl fmt::Display for IdentifierClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "domain" => Ok(IdentifierClass::Domain),
            "ip" => Ok(IdentifierClass::Ip),
            "md5" | "hash" => Ok(IdentifierClass::Md5),
            "email" => Ok(IdentifierClass::Email),
            _ => Err(format!("Unknown identifier class: {s}")),
        }
    }
}

/// One create-or-increment to apply against the store, produced once per cache miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub class: IdentifierClass,
    pub key: String,
    pub observed_at: OffsetDateTime,
}

impl PendingUpdate {
    pub fn new(class: IdentifierClass, key: impl Into<String>, observed_at: OffsetDateTime) -> Self {
        Self {
            class,
            key: key.into(),
            observed_at,
        }
    }
}

/// Drained contents of the accumulator. Insertion ordered, but the upserts
/// commute so the order carries no meaning.
pub type Batch = Vec<PendingUpdate>;

/// The per-identifier document kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRecord {
    pub count: u64,
    pub first_seen: OffsetDateTime,
    pub last_seen: OffsetDateTime,
}

impl HistoryRecord {
    pub fn first(observed_at: OffsetDateTime) -> Self {
        Self {
            count: 1,
            first_seen: observed_at,
            last_seen: observed_at,
        }
    }

    /// The upsert every flushed update expresses: create with a count of one,
    /// or bump the count and move `last_seen` forward to the observation.
    pub fn apply(existing: Option<HistoryRecord>, observed_at: OffsetDateTime) -> HistoryRecord {
        match existing {
            None => HistoryRecord::first(observed_at),
            Some(record) => HistoryRecord {
                count: record.count + 1,
                first_seen: record.first_seen,
                last_seen: observed_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn class_parsing_accepts_hash_alias() {
        assert_eq!("md5".parse(), Ok(IdentifierClass::Md5));
        assert_eq!("Hash".parse(), Ok(IdentifierClass::Md5));
        assert_eq!(" ip ".parse(), Ok(IdentifierClass::Ip));
        assert!("url".parse::<IdentifierClass>().is_err());
    }

    #[test]
    fn index_names_are_prefixed_per_class() {
        let names: Vec<String> = IdentifierClass::ALL
            .iter()
            .map(|c| c.index_name("hodi"))
            .collect();
        assert_eq!(names, vec!["hodi-domain", "hodi-ip", "hodi-md5", "hodi-email"]);
    }

    #[test]
    fn apply_creates_then_increments() {
        let first = datetime!(2024-03-01 10:00 UTC);
        let later = datetime!(2024-03-01 10:07 UTC);

        let created = HistoryRecord::apply(None, first);
        assert_eq!(created, HistoryRecord::first(first));

        let bumped = HistoryRecord::apply(Some(created), later);
        assert_eq!(bumped.count, 2);
        assert_eq!(bumped.first_seen, first);
        assert_eq!(bumped.last_seen, later);
    }
}
