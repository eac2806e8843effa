use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SpriteLedgerError};

/// Parses the digits after a key prefix. Leading zeros are rejected so that
/// every key has exactly one spelling (`s7`, never `s007`).
pub(crate) fn canonical_digits(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

macro_rules! prefixed_key {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const PREFIX: char = $prefix;

            pub fn index(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.strip_prefix($prefix)
                    .and_then(canonical_digits)
                    .map(Self)
                    .ok_or_else(|| format!("expected `{}<digits>`, got {:?}", $prefix, s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

prefixed_key!(
    /// Identifier of an asset before migration (`s<legacy id>`).
    LegacyKey,
    's'
);
prefixed_key!(
    /// Permanent identifier of an asset in the packed scheme (`e<global index>`).
    GlobalKey,
    'e'
);

/// Semantic registry version `vMAJOR.MINOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const INITIAL: Version = Version { major: 1, minor: 0 };

    /// Next minor version. Major bumps are reserved for manual schema changes.
    pub fn next_minor(self) -> Self {
        Self {
            major: self.major,
            minor: self.minor + 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || format!("expected `vMAJOR.MINOR`, got {s:?}");
        let rest = s.strip_prefix('v').ok_or_else(bad)?;
        let (major, minor) = rest.split_once('.').ok_or_else(bad)?;
        Ok(Self {
            major: major.parse().map_err(|_| bad())?,
            minor: minor.parse().map_err(|_| bad())?,
        })
    }
}

/// Current local time, as stored in the registry.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// ISO-8601 local timestamp with microseconds (`2024-05-01T09:30:00.000000`).
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Accepts naive ISO-8601 date-times and RFC 3339 with an offset (converted to local time).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    s.parse::<NaiveDateTime>().ok().or_else(|| {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Local).naive_local())
    })
}

/// One packed sprite sheet and the contiguous block of global indices it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasPage {
    pub id: u32,
    pub filename: String,
    /// Public URL once uploaded; empty until then.
    pub url: String,
    /// First global index on the page (inclusive).
    pub range_start: u64,
    /// Last global index on the page (inclusive).
    pub range_end: u64,
    /// Historical page; informational only.
    pub frozen: bool,
    pub created_at: NaiveDateTime,
    /// Pixel size `(width, height)`.
    pub size: (u32, u32),
}

impl AtlasPage {
    /// Number of assets on the page.
    pub fn len(&self) -> u64 {
        self.range_end - self.range_start + 1
    }

    /// Always false; a page owns at least one index.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn range(&self) -> RangeInclusive<u64> {
        self.range_start..=self.range_end
    }

    pub fn contains(&self, index: u64) -> bool {
        self.range().contains(&index)
    }
}

/// The whole registry state, persisted as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: Version,
    /// Number of global indices ever allocated.
    pub total: u64,
    pub pages: Vec<AtlasPage>,
    pub created_at: NaiveDateTime,
    pub description: String,
}

impl Default for VersionRecord {
    fn default() -> Self {
        Self {
            version: Version::INITIAL,
            total: 0,
            pages: Vec::new(),
            created_at: now(),
            description: "Initial version".into(),
        }
    }
}

// ---------------- Persisted shape ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawSprite {
    pub id: u32,
    pub filename: String,
    #[serde(default)]
    pub url: String,
    pub range_start: u64,
    pub range_end: u64,
    #[serde(default)]
    pub frozen: bool,
    pub created_at: String,
    pub size: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawVersionRecord {
    pub version: String,
    pub total_emojis: u64,
    #[serde(default)]
    pub sprites: Vec<RawSprite>,
    pub created_at: String,
    #[serde(default)]
    pub description: String,
}

impl VersionRecord {
    /// Converts the loosely-typed file contents into checked types.
    /// `origin` names the file in error messages.
    pub(crate) fn from_raw(raw: RawVersionRecord, origin: &str) -> Result<Self> {
        let version: Version = raw
            .version
            .parse()
            .map_err(|e: String| SpriteLedgerError::schema(origin, format!("version: {e}")))?;
        let created_at = parse_timestamp(&raw.created_at).ok_or_else(|| {
            SpriteLedgerError::schema(origin, format!("created_at: bad timestamp {:?}", raw.created_at))
        })?;

        let mut seen = HashSet::new();
        let mut pages = Vec::with_capacity(raw.sprites.len());
        for s in raw.sprites {
            let ctx = |field: &str, msg: String| {
                SpriteLedgerError::schema(origin, format!("sprite {}: {field}: {msg}", s.id))
            };
            if !seen.insert(s.id) {
                return Err(ctx("id", "duplicate page id".into()));
            }
            if s.range_end < s.range_start {
                return Err(ctx(
                    "range_end",
                    format!("{} precedes range_start {}", s.range_end, s.range_start),
                ));
            }
            let size = match s.size.as_slice() {
                [w, h] => (*w, *h),
                other => return Err(ctx("size", format!("expected [w, h], got {other:?}"))),
            };
            let created_at = parse_timestamp(&s.created_at)
                .ok_or_else(|| ctx("created_at", format!("bad timestamp {:?}", s.created_at)))?;
            pages.push(AtlasPage {
                id: s.id,
                filename: s.filename,
                url: s.url,
                range_start: s.range_start,
                range_end: s.range_end,
                frozen: s.frozen,
                created_at,
                size,
            });
        }

        Ok(Self {
            version,
            total: raw.total_emojis,
            pages,
            created_at,
            description: raw.description,
        })
    }

    pub(crate) fn to_raw(&self) -> RawVersionRecord {
        RawVersionRecord {
            version: self.version.to_string(),
            total_emojis: self.total,
            sprites: self
                .pages
                .iter()
                .map(|p| RawSprite {
                    id: p.id,
                    filename: p.filename.clone(),
                    url: p.url.clone(),
                    range_start: p.range_start,
                    range_end: p.range_end,
                    frozen: p.frozen,
                    created_at: format_timestamp(&p.created_at),
                    size: vec![p.size.0, p.size.1],
                })
                .collect(),
            created_at: format_timestamp(&self.created_at),
            description: self.description.clone(),
        }
    }
}
