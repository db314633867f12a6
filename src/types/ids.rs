//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! RevisionId where a PageId is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An event registration ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(n: u64) -> Self {
        EventId(n)
    }
}

/// A wiki page ID.
///
/// Stable across moves: renaming a page changes its title, never its ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(n: u64) -> Self {
        PageId(n)
    }
}

/// A revision ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u64> for RevisionId {
    fn from(n: u64) -> Self {
        RevisionId(n)
    }
}

/// A wiki identifier (database name, e.g. `enwiki`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WikiId(pub String);

impl WikiId {
    pub fn new(s: impl Into<String>) -> Self {
        WikiId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WikiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WikiId {
    fn from(s: &str) -> Self {
        WikiId(s.to_string())
    }
}

impl From<String> for WikiId {
    fn from(s: String) -> Self {
        WikiId(s)
    }
}

/// A central (cross-wiki) user ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CentralUserId(pub u64);

impl fmt::Display for CentralUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CentralUserId {
    fn from(n: u64) -> Self {
        CentralUserId(n)
    }
}
