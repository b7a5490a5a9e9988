//! OS credential store backend.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;

use crate::record::{AccountRecord, Column, Row};
use crate::store::{RecordStore, StoreAddress, StoreError, StoreResult};

/// Keeps the account row in the OS secure store (Windows Credential Manager,
/// macOS Keychain, the Linux kernel keyring), serialized as JSON under one
/// credential per address: service = authority, user = path.
///
/// Entries come from keyring's default credential builder, so anything that
/// replaces it with [`keyring::set_default_credential_builder`] changes where
/// rows live.
///
/// The credential is the row, so at most one can exist per address.
pub struct KeyringRecordStore {
    entries: Mutex<HashMap<StoreAddress, keyring::Entry>>,
}

impl KeyringRecordStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entry<T>(
        &self,
        address: &StoreAddress,
        f: impl FnOnce(&keyring::Entry) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("poisoned keyring lock".to_string()))?;
        if !entries.contains_key(address) {
            let entry = keyring::Entry::new(address.authority(), address.path())
                .map_err(store_error)?;
            entries.insert(address.clone(), entry);
        }
        match entries.get(address) {
            Some(entry) => f(entry),
            None => Err(StoreError::Backend("keyring entry vanished".to_string())),
        }
    }
}

impl Default for KeyringRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn store_error(err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoStorageAccess(e) => StoreError::PermissionDenied(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn load(entry: &keyring::Entry) -> StoreResult<Option<AccountRecord>> {
    match entry.get_password() {
        Ok(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Backend(format!("corrupt account credential: {e}"))),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(store_error(e)),
    }
}

fn save(entry: &keyring::Entry, record: &AccountRecord) -> StoreResult<()> {
    let json = serde_json::to_string(record).map_err(|e| StoreError::Backend(e.to_string()))?;
    entry.set_password(&json).map_err(store_error)
}

impl RecordStore for KeyringRecordStore {
    fn query(&self, address: &StoreAddress, fields: Option<&[Column]>) -> StoreResult<Vec<Row>> {
        self.with_entry(address, |entry| {
            Ok(load(entry)?
                .map(|record| record.to_row().project(fields))
                .into_iter()
                .collect())
        })
    }

    fn insert(&self, address: &StoreAddress, values: &Row) -> StoreResult<Option<String>> {
        self.with_entry(address, |entry| {
            if load(entry)?.is_some() {
                return Err(StoreError::Conflict);
            }
            save(entry, &AccountRecord::from_row(values))?;
            debug!(%address, "stored account credential");
            Ok(Some(address.row_identifier(Uuid::new_v4())))
        })
    }

    fn update(&self, address: &StoreAddress, values: &Row) -> StoreResult<usize> {
        self.with_entry(address, |entry| {
            let Some(record) = load(entry)? else {
                return Ok(0);
            };
            let mut row = record.to_row();
            row.merge(values);
            save(entry, &AccountRecord::from_row(&row))?;
            Ok(1)
        })
    }

    fn delete(&self, address: &StoreAddress) -> StoreResult<usize> {
        self.with_entry(address, |entry| match entry.delete_credential() {
            Ok(()) => Ok(1),
            Err(keyring::Error::NoEntry) => Ok(0),
            Err(e) => Err(store_error(e)),
        })
    }
}
