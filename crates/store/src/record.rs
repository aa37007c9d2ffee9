use std::fmt::Display;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Version number of a stored record, used for optimistic concurrency control.
///
/// A freshly inserted record is at version 1 and every successful update
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version (1) of a freshly inserted record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A record that can be kept in a [`Repository`](crate::Repository).
pub trait Record: Clone + Send + Sync + 'static {
    /// Primary key of the record.
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// Short type name used in errors and logs.
    fn record_type() -> &'static str;

    /// Returns the primary key of this record.
    fn key(&self) -> Self::Key;
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<R> {
    pub record: R,
    pub version: Version,
}

impl<R> Versioned<R> {
    pub fn new(record: R, version: Version) -> Self {
        Self { record, version }
    }

    /// Discards the version.
    pub fn into_inner(self) -> R {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn first_version_is_one() {
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::default().next(), Version::first());
    }

    #[test]
    fn version_serializes_transparently() {
        assert_eq!(serde_json::to_string(&Version::new(7)).unwrap(), "7");
    }
}
