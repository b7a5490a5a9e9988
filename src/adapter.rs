//! Record Store Adapter: maps account operations onto store round trips.
//!
//! Reads hand back the store's error so the router can decide how to degrade.
//! Writes collapse every store failure to `false`, except the single-row
//! conflict on add, which callers need to see.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::error::RelayError;
use crate::record::{AccountRecord, Column, Row};
use crate::store::{RecordStore, StoreAddress, StoreError, StoreResult};

pub struct AccountStore {
    store: Box<dyn RecordStore>,
    address: StoreAddress,
    // Serializes this process's writes so overlapping upserts cannot both
    // take the insert branch.
    writes: Mutex<()>,
}

impl AccountStore {
    pub fn new(store: Box<dyn RecordStore>, address: StoreAddress) -> Self {
        Self {
            store,
            address,
            writes: Mutex::new(()),
        }
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn account(&self) -> StoreResult<Option<AccountRecord>> {
        debug!(address = %self.address, "querying account");
        let rows = self.store.query(&self.address, None)?;
        Ok(rows.first().map(AccountRecord::from_row))
    }

    pub fn email(&self) -> StoreResult<Option<String>> {
        Ok(self.account()?.and_then(|account| account.account_name))
    }

    pub fn json_blob(&self) -> StoreResult<Option<String>> {
        self.field(Column::JsonData)
    }

    pub fn base_url(&self) -> StoreResult<Option<String>> {
        self.field(Column::BaseUrl)
    }

    fn field(&self, column: Column) -> StoreResult<Option<String>> {
        debug!(address = %self.address, %column, "querying field");
        let rows = self.store.query(&self.address, Some(&[column]))?;
        Ok(rows
            .first()
            .and_then(|row| row.get(column))
            .map(str::to_owned))
    }

    /// Inserts the identity fields without checking for an existing row.
    /// The store rejects a second row, which surfaces as [`RelayError::Conflict`].
    pub fn add_account(
        &self,
        account_name: &str,
        auth_token: &str,
        refresh_token: &str,
    ) -> Result<bool, RelayError> {
        let values = AccountRecord::identity(account_name, auth_token, refresh_token).to_row();
        let _guard = self.write_guard();
        match self.store.insert(&self.address, &values) {
            Ok(Some(id)) => {
                debug!(%id, "account added");
                Ok(true)
            }
            Ok(None) => {
                error!(address = %self.address, "failed to add account, insert returned no identifier");
                Ok(false)
            }
            Err(StoreError::Conflict) => {
                warn!(address = %self.address, "refusing to add a second account");
                Err(RelayError::Conflict)
            }
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to add account");
                Ok(false)
            }
        }
    }

    /// Updates the auth token of the existing account. Never creates a row.
    pub fn update_access_token(&self, auth_token: &str) -> bool {
        let values = Row::new().with(Column::AuthToken, auth_token);
        let _guard = self.write_guard();
        match self.store.update(&self.address, &values) {
            Ok(0) => {
                error!(address = %self.address, "failed to update access token, no rows updated");
                false
            }
            Ok(rows) => {
                debug!(rows, "access token updated");
                true
            }
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to update access token");
                false
            }
        }
    }

    pub fn set_json_blob(&self, json_text: &str) -> bool {
        self.upsert_field(Column::JsonData, json_text)
    }

    pub fn set_base_url(&self, base_url: &str) -> bool {
        self.upsert_field(Column::BaseUrl, base_url)
    }

    /// Removes every row at the address; `false` if there was nothing to remove.
    pub fn delete_account(&self) -> bool {
        let _guard = self.write_guard();
        match self.store.delete(&self.address) {
            Ok(0) => {
                error!(address = %self.address, "failed to delete account, no rows deleted");
                false
            }
            Ok(rows) => {
                debug!(rows, "account deleted");
                true
            }
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to delete account");
                false
            }
        }
    }

    fn upsert_field(&self, column: Column, value: &str) -> bool {
        let values = Row::new().with(column, value);
        let _guard = self.write_guard();
        match self.try_upsert(&values) {
            Ok(done) => done,
            Err(e) => {
                error!(address = %self.address, %column, error = %e, "failed to store field");
                false
            }
        }
    }

    fn try_upsert(&self, values: &Row) -> StoreResult<bool> {
        let rows = self.store.update(&self.address, values)?;
        if rows > 0 {
            debug!(rows, "field updated");
            return Ok(true);
        }

        debug!("no rows updated, attempting insert");
        match self.store.insert(&self.address, values) {
            Ok(Some(id)) => {
                debug!(%id, "field inserted");
                Ok(true)
            }
            Ok(None) => {
                error!(address = %self.address, "insert returned no identifier");
                Ok(false)
            }
            // Another process created the row between our update and insert.
            Err(StoreError::Conflict) => {
                warn!(address = %self.address, "row appeared concurrently, retrying update");
                Ok(self.store.update(&self.address, values)? > 0)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fault, MemoryRecordStore};

    fn address() -> StoreAddress {
        StoreAddress::parse("content://test.provider/accounts").unwrap()
    }

    fn adapter() -> (AccountStore, MemoryRecordStore) {
        let store = MemoryRecordStore::new();
        (AccountStore::new(Box::new(store.clone()), address()), store)
    }

    /// Reports zero updated rows once, as if the row were created by another
    /// process right after.
    struct RacingStore {
        inner: MemoryRecordStore,
        raced: Mutex<bool>,
    }

    impl RecordStore for RacingStore {
        fn query(&self, address: &StoreAddress, fields: Option<&[Column]>) -> StoreResult<Vec<Row>> {
            self.inner.query(address, fields)
        }

        fn insert(&self, address: &StoreAddress, values: &Row) -> StoreResult<Option<String>> {
            self.inner.insert(address, values)
        }

        fn update(&self, address: &StoreAddress, values: &Row) -> StoreResult<usize> {
            let mut raced = self.raced.lock().unwrap();
            if !*raced {
                *raced = true;
                self.inner.seed(address, Row::new().with(Column::AccountName, "other"));
                return Ok(0);
            }
            self.inner.update(address, values)
        }

        fn delete(&self, address: &StoreAddress) -> StoreResult<usize> {
            self.inner.delete(address)
        }
    }

    #[test]
    fn upsert_inserts_only_the_written_field() {
        let (accounts, store) = adapter();
        assert!(accounts.set_base_url("https://api.example.com"));
        let row = store.peek(&address()).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get(Column::BaseUrl), Some("https://api.example.com"));
        // update, then insert
        assert_eq!(store.round_trips(), 2);
    }

    #[test]
    fn upsert_retries_update_after_conflict() {
        let inner = MemoryRecordStore::new();
        let racing = RacingStore {
            inner: inner.clone(),
            raced: Mutex::new(false),
        };
        let accounts = AccountStore::new(Box::new(racing), address());

        assert!(accounts.set_json_blob("{}"));
        let row = inner.peek(&address()).unwrap();
        assert_eq!(row.get(Column::AccountName), Some("other"));
        assert_eq!(row.get(Column::JsonData), Some("{}"));
    }

    #[test]
    fn upsert_fails_when_insert_returns_no_identifier() {
        let (accounts, store) = adapter();
        store.set_fault(Some(Fault::InsertReturnsNone));
        assert!(!accounts.set_json_blob("{}"));
    }

    #[test]
    fn add_account_surfaces_conflict() {
        let (accounts, _store) = adapter();
        assert!(accounts.add_account("a", "at", "rt").unwrap());
        assert!(matches!(
            accounts.add_account("b", "at", "rt"),
            Err(RelayError::Conflict)
        ));
    }

    #[test]
    fn write_failures_become_false() {
        let (accounts, store) = adapter();
        store.set_fault(Some(Fault::PermissionDenied));
        assert!(!accounts.add_account("a", "at", "rt").unwrap());
        assert!(!accounts.update_access_token("at"));
        assert!(!accounts.set_base_url("https://x"));
        assert!(!accounts.delete_account());
    }

    #[test]
    fn read_failures_are_kept_for_the_caller() {
        let (accounts, store) = adapter();
        store.set_fault(Some(Fault::Backend));
        assert!(matches!(accounts.account(), Err(StoreError::Backend(_))));
        assert!(matches!(accounts.json_blob(), Err(StoreError::Backend(_))));
    }
}
