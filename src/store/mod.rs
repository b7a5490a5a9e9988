//! The shared record store seen from the relay: a content-style address plus
//! four primitives. Backends own persistence and enforce the single-row
//! invariant themselves.

pub mod memory;
pub mod os_keyring;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use crate::record::{Column, Row};

pub use self::memory::{Fault, MemoryRecordStore};
pub use self::os_keyring::KeyringRecordStore;
pub use self::sqlite::SqliteRecordStore;

const SCHEME: &str = "content://";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("a record already exists at this address")]
    Conflict,
    #[error("invalid store address: {0}")]
    InvalidAddress(String),
    #[error("record store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// `content://<authority>/<path>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreAddress {
    authority: String,
    path: String,
}

impl StoreAddress {
    pub fn parse(input: &str) -> StoreResult<Self> {
        let rest = input
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| StoreError::InvalidAddress(format!("{input}: expected {SCHEME} scheme")))?;
        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| StoreError::InvalidAddress(format!("{input}: missing path")))?;
        let path = path.trim_end_matches('/');

        if authority.is_empty() {
            return Err(StoreError::InvalidAddress(format!("{input}: empty authority")));
        }
        if path.is_empty() {
            return Err(StoreError::InvalidAddress(format!("{input}: empty path")));
        }
        let segment_ok = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        };
        if !segment_ok(authority) || !path.split('/').all(segment_ok) {
            return Err(StoreError::InvalidAddress(format!(
                "{input}: unsupported characters"
            )));
        }

        Ok(Self {
            authority: authority.to_string(),
            path: path.to_string(),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn last_segment(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Identifier of an inserted row, e.g. `content://auth/accounts/1`.
    pub fn row_identifier(&self, id: impl fmt::Display) -> String {
        format!("{self}/{id}")
    }
}

impl fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.authority, self.path)
    }
}

impl FromStr for StoreAddress {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The external record store.
///
/// `insert` on an address that already holds a row must fail with
/// [`StoreError::Conflict`]; `update` and `delete` act on every row at the
/// address and report how many were touched.
pub trait RecordStore: Send + Sync {
    /// `fields: None` selects every column.
    fn query(&self, address: &StoreAddress, fields: Option<&[Column]>) -> StoreResult<Vec<Row>>;
    fn insert(&self, address: &StoreAddress, values: &Row) -> StoreResult<Option<String>>;
    fn update(&self, address: &StoreAddress, values: &Row) -> StoreResult<usize>;
    fn delete(&self, address: &StoreAddress) -> StoreResult<usize>;
}
