use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// The local version marker persisted once per store: wall-clock milliseconds
/// plus a counter that breaks ties within the same millisecond.
///
/// The string form is 24 lowercase hex digits (16 for `wall_ms`, 8 for
/// `counter`), so comparing two stamps as strings gives the same answer as
/// comparing them as values.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct VersionStamp {
    wall_ms: u64,
    counter: u32,
}

impl VersionStamp {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// The next stamp: strictly greater than `prev` and not behind `now_ms`.
    ///
    /// `prev` is whatever the store currently holds, which may have been
    /// written by another context with a clock ahead of ours.
    pub fn next_after(prev: Option<&VersionStamp>, now_ms: u64) -> VersionStamp {
        match prev {
            Some(prev) if prev.wall_ms >= now_ms => match prev.counter.checked_add(1) {
                Some(counter) => VersionStamp::new(prev.wall_ms, counter),
                None => VersionStamp::new(prev.wall_ms + 1, 0),
            },
            _ => VersionStamp::new(now_ms, 0),
        }
    }
}

impl Ord for VersionStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.wall_ms, self.counter).cmp(&(other.wall_ms, other.counter))
    }
}

impl PartialOrd for VersionStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:08x}", self.wall_ms, self.counter)
    }
}

impl FromStr for VersionStamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 || !s.is_ascii() {
            return Err(CoreError::InvalidVersion(s.to_string()));
        }
        let wall_ms = u64::from_str_radix(&s[..16], 16)
            .map_err(|_| CoreError::InvalidVersion(s.to_string()))?;
        let counter = u32::from_str_radix(&s[16..], 16)
            .map_err(|_| CoreError::InvalidVersion(s.to_string()))?;
        Ok(Self { wall_ms, counter })
    }
}

impl Serialize for VersionStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionStamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
