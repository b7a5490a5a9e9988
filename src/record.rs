//! The shared account row: its columns, their schema versions and the
//! typed record the relay hands to callers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Columns of the shared account row, in the order they were introduced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "accountName")]
    AccountName,
    #[serde(rename = "authToken")]
    AuthToken,
    #[serde(rename = "refreshToken")]
    RefreshToken,
    #[serde(rename = "jsonData")]
    JsonData,
    #[serde(rename = "baseUrl", alias = "kBaseUrl")]
    BaseUrl,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::AccountName,
        Column::AuthToken,
        Column::RefreshToken,
        Column::JsonData,
        Column::BaseUrl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::AccountName => "accountName",
            Column::AuthToken => "authToken",
            Column::RefreshToken => "refreshToken",
            Column::JsonData => "jsonData",
            Column::BaseUrl => "baseUrl",
        }
    }

    /// Accepts current column names plus `kBaseUrl`, the name older providers use.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "kBaseUrl" => Some(Column::BaseUrl),
            other => Self::ALL.into_iter().find(|c| c.as_str() == other),
        }
    }

    pub fn introduced_in(self) -> SchemaVersion {
        match self {
            Column::AccountName | Column::AuthToken | Column::RefreshToken => SchemaVersion::V1,
            Column::JsonData => SchemaVersion::V2,
            Column::BaseUrl => SchemaVersion::V3,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the account row over time.
///
/// V1 carried the identity fields only, V2 added the opaque JSON blob and V3
/// added the base URL override. Fields are only ever added.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V3;

    pub fn number(self) -> i64 {
        self as i64
    }

    pub fn columns(self) -> impl Iterator<Item = Column> {
        Column::ALL
            .into_iter()
            .filter(move |c| c.introduced_in() <= self)
    }
}

/// Field values for a single store row.
///
/// A column missing from the map was not selected (on reads) or not written
/// (on writes). A present column with `None` is a stored null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<Column, Option<String>>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: Column, value: impl Into<String>) -> Self {
        self.values.insert(column, Some(value.into()));
        self
    }

    pub fn set(&mut self, column: Column, value: Option<String>) {
        self.values.insert(column, value);
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.values.get(&column).and_then(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, Option<&str>)> {
        self.values.iter().map(|(c, v)| (*c, v.as_deref()))
    }

    /// Overwrites the columns present in `other`, leaving the rest untouched.
    pub fn merge(&mut self, other: &Row) {
        for (column, value) in &other.values {
            self.values.insert(*column, value.clone());
        }
    }

    /// Restricts the row to `fields`; `None` keeps every column.
    /// Requested columns the row never stored come back as nulls.
    pub fn project(&self, fields: Option<&[Column]>) -> Row {
        let Some(fields) = fields else {
            let mut all = self.clone();
            for column in Column::ALL {
                all.values.entry(column).or_insert(None);
            }
            return all;
        };
        let mut out = Row::new();
        for column in fields {
            out.set(*column, self.get(*column).map(str::to_owned));
        }
        out
    }
}

/// The single logical account held by the shared store.
///
/// Every field is optional: a row created by a blob or base URL upsert has no
/// identity fields yet. Absent fields are skipped when serialized, so a
/// record reads back with exactly the fields that were written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "jsonData", alias = "jsonBlob", default, skip_serializing_if = "Option::is_none")]
    pub json_blob: Option<String>,
    #[serde(alias = "kBaseUrl", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl AccountRecord {
    pub fn identity(
        account_name: impl Into<String>,
        auth_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            account_name: Some(account_name.into()),
            auth_token: Some(auth_token.into()),
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    pub fn from_row(row: &Row) -> Self {
        let field = |c: Column| row.get(c).map(str::to_owned);
        Self {
            account_name: field(Column::AccountName),
            auth_token: field(Column::AuthToken),
            refresh_token: field(Column::RefreshToken),
            json_blob: field(Column::JsonData),
            base_url: field(Column::BaseUrl),
        }
    }

    /// Row holding only the fields that are set.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        for column in Column::ALL {
            if let Some(value) = self.field(column) {
                row.set(column, Some(value.to_owned()));
            }
        }
        row
    }

    pub fn field(&self, column: Column) -> Option<&str> {
        match column {
            Column::AccountName => self.account_name.as_deref(),
            Column::AuthToken => self.auth_token.as_deref(),
            Column::RefreshToken => self.refresh_token.as_deref(),
            Column::JsonData => self.json_blob.as_deref(),
            Column::BaseUrl => self.base_url.as_deref(),
        }
    }
}
