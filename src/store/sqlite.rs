//! SQLite backend: one singleton table per address, migrated in place.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params_from_iter, Connection, ErrorCode};
use tracing::{debug, info};

use crate::record::{Column, Row, SchemaVersion};
use crate::store::{RecordStore, StoreAddress, StoreError, StoreResult};

/// Every account table holds at most this one row.
const SINGLETON_ID: i64 = 1;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation => StoreError::Conflict,
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied => {
                    StoreError::PermissionDenied(err.to_string())
                }
                _ => StoreError::Backend(err.to_string()),
            },
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

struct Inner {
    conn: Connection,
    // Tables already brought up to the current schema on this connection.
    migrated: HashSet<String>,
}

/// SQLite-backed store. Each address maps to one table whose primary key is
/// pinned to a single value, so a second row cannot exist.
pub struct SqliteRecordStore {
    inner: Mutex<Inner>,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened sqlite record store");
        Ok(Self::from_connection(conn))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn,
                migrated: HashSet::new(),
            }),
        }
    }

    /// Schema of the table behind `address`, or `None` if it was never created.
    pub fn schema_version(&self, address: &StoreAddress) -> StoreResult<Option<SchemaVersion>> {
        let table = table_name(address)?;
        let inner = self.lock()?;
        if !table_exists(&inner.conn, &table)? {
            return Ok(None);
        }
        let mut version = SchemaVersion::V1;
        for column in Column::ALL {
            if column_exists(&inner.conn, &table, column.as_str())? {
                version = version.max(column.introduced_in());
            }
        }
        Ok(Some(version))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("poisoned sqlite lock".to_string()))
    }

    /// Locks the connection with the address's table migrated.
    fn table(&self, address: &StoreAddress) -> StoreResult<(MutexGuard<'_, Inner>, String)> {
        let table = table_name(address)?;
        let mut inner = self.lock()?;
        if !inner.migrated.contains(&table) {
            migrate(&inner.conn, &table)?;
            inner.migrated.insert(table.clone());
        }
        Ok((inner, table))
    }
}

fn table_name(address: &StoreAddress) -> StoreResult<String> {
    let name = address.last_segment();
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(StoreError::InvalidAddress(format!(
            "{address}: `{name}` is not usable as a table name"
        )))
    }
}

fn create_table(conn: &Connection, table: &str) -> StoreResult<()> {
    conn.execute_batch(&format!(
        r#"
        create table if not exists "{table}" (
          id integer primary key check (id = {SINGLETON_ID}),
          accountName text null,
          authToken text null,
          refreshToken text null
        );
        "#
    ))?;
    Ok(())
}

fn migrate(conn: &Connection, table: &str) -> StoreResult<()> {
    if table_exists(conn, table)? && !is_singleton(conn, table)? {
        rebuild_as_singleton(conn, table)?;
    }
    create_table(conn, table)?;

    // Older providers named the base URL column `kBaseUrl`.
    if column_exists(conn, table, "kBaseUrl")? && !column_exists(conn, table, "baseUrl")? {
        conn.execute(
            &format!(r#"alter table "{table}" rename column kBaseUrl to baseUrl"#),
            [],
        )?;
        info!(table, "renamed legacy kBaseUrl column");
    }

    for column in SchemaVersion::CURRENT.columns() {
        if !column_exists(conn, table, column.as_str())? {
            conn.execute(
                &format!(r#"alter table "{table}" add column {column} text null"#),
                [],
            )?;
            info!(table, %column, "added column");
        }
    }

    conn.pragma_update(None, "user_version", SchemaVersion::CURRENT.number())?;
    Ok(())
}

/// Whether the table's key is pinned to the singleton id.
fn is_singleton(conn: &Connection, table: &str) -> StoreResult<bool> {
    let sql: String = conn.query_row(
        "select sql from sqlite_master where type = 'table' and name = ?1",
        [table],
        |r| r.get(0),
    )?;
    let compact: String = sql
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    Ok(compact.contains(&format!("check(id={SINGLETON_ID})")))
}

/// Replaces a table with any other key (a provider's `_id` autoincrement,
/// say) by a singleton table holding its first row's known columns.
fn rebuild_as_singleton(conn: &Connection, table: &str) -> StoreResult<()> {
    let mut carried: BTreeMap<Column, String> = BTreeMap::new();
    for name in table_columns(conn, table)? {
        let Some(column) = Column::parse(&name) else {
            continue;
        };
        if name == column.as_str() || !carried.contains_key(&column) {
            carried.insert(column, name);
        }
    }

    let legacy = format!("{table}_legacy");
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(r#"alter table "{table}" rename to "{legacy}";"#))?;
    create_table(&tx, table)?;
    for column in SchemaVersion::CURRENT
        .columns()
        .filter(|c| c.introduced_in() > SchemaVersion::V1)
    {
        tx.execute(
            &format!(r#"alter table "{table}" add column {column} text null"#),
            [],
        )?;
    }
    if !carried.is_empty() {
        let targets = carried
            .keys()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let sources = carried
            .values()
            .map(|name| format!(r#""{name}""#))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!(
                r#"insert into "{table}" (id, {targets})
                   select {SINGLETON_ID}, {sources} from "{legacy}" limit 1"#
            ),
            [],
        )?;
    }
    tx.execute_batch(&format!(r#"drop table "{legacy}";"#))?;
    tx.commit()?;
    info!(table, "rebuilt legacy table with a singleton key");
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let count: i64 = conn.query_row(
        "select count(1) from sqlite_master where type = 'table' and name = ?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(r#"pragma table_info("{table}")"#))?;
    let names = stmt.query_map([], |r| r.get::<_, String>(1))?;
    let mut out = Vec::new();
    for name in names {
        out.push(name?);
    }
    Ok(out)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    Ok(table_columns(conn, table)?
        .iter()
        .any(|name| name.eq_ignore_ascii_case(column)))
}

impl RecordStore for SqliteRecordStore {
    fn query(&self, address: &StoreAddress, fields: Option<&[Column]>) -> StoreResult<Vec<Row>> {
        let columns: Vec<Column> = match fields {
            Some(f) if !f.is_empty() => f.to_vec(),
            _ => Column::ALL.to_vec(),
        };
        let (inner, table) = self.table(address)?;
        let select = columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = inner
            .conn
            .prepare(&format!(r#"select {select} from "{table}" where id = ?1"#))?;
        let rows = stmt.query_map([SINGLETON_ID], |r| {
            let mut row = Row::new();
            for (i, column) in columns.iter().enumerate() {
                row.set(*column, r.get(i)?);
            }
            Ok(row)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn insert(&self, address: &StoreAddress, values: &Row) -> StoreResult<Option<String>> {
        let (inner, table) = self.table(address)?;
        let mut names = String::from("id");
        let mut placeholders = SINGLETON_ID.to_string();
        for (i, (column, _)) in values.iter().enumerate() {
            names.push_str(&format!(", {column}"));
            placeholders.push_str(&format!(", ?{}", i + 1));
        }
        inner.conn.execute(
            &format!(r#"insert into "{table}" ({names}) values ({placeholders})"#),
            params_from_iter(values.iter().map(|(_, v)| v)),
        )?;
        Ok(Some(address.row_identifier(SINGLETON_ID)))
    }

    fn update(&self, address: &StoreAddress, values: &Row) -> StoreResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let (inner, table) = self.table(address)?;
        let assignments = values
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = inner.conn.execute(
            &format!(r#"update "{table}" set {assignments}"#),
            params_from_iter(values.iter().map(|(_, v)| v)),
        )?;
        Ok(changed)
    }

    fn delete(&self, address: &StoreAddress) -> StoreResult<usize> {
        let (inner, table) = self.table(address)?;
        let removed = inner.conn.execute(&format!(r#"delete from "{table}""#), [])?;
        Ok(removed)
    }
}
