//! In-process store with fault injection, shared across clones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::record::{Column, Row};
use crate::store::{RecordStore, StoreAddress, StoreError, StoreResult};

/// Failure injected into every primitive until cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    PermissionDenied,
    Backend,
    /// `insert` succeeds at the store level but hands back no identifier.
    InsertReturnsNone,
}

#[derive(Default)]
struct MemoryState {
    rows: HashMap<StoreAddress, Row>,
    fault: Option<Fault>,
}

/// In-process store holding one row per address.
///
/// Clones share state, so a caller can keep a handle for inspection after
/// boxing another into the relay.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
    round_trips: Arc<AtomicUsize>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of primitives issued against this store.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn set_fault(&self, fault: Option<Fault>) {
        if let Ok(mut state) = self.state.lock() {
            state.fault = fault;
        }
    }

    /// Current row at `address`, read without counting a round trip.
    pub fn peek(&self, address: &StoreAddress) -> Option<Row> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.rows.get(address).cloned())
    }

    /// Places a row directly, bypassing the singleton check.
    pub fn seed(&self, address: &StoreAddress, row: Row) {
        if let Ok(mut state) = self.state.lock() {
            state.rows.insert(address.clone(), row);
        }
    }

    /// Counts the round trip and fails it if a fault is armed.
    fn begin(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("poisoned memory store lock".to_string()))?;
        let fault = state.fault;
        match fault {
            Some(Fault::PermissionDenied) => Err(StoreError::PermissionDenied(
                "caller lacks access to the record store".to_string(),
            )),
            Some(Fault::Backend) => Err(StoreError::Backend("record store unavailable".to_string())),
            Some(Fault::InsertReturnsNone) | None => Ok(state),
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn query(&self, address: &StoreAddress, fields: Option<&[Column]>) -> StoreResult<Vec<Row>> {
        let state = self.begin()?;
        Ok(state
            .rows
            .get(address)
            .map(|row| row.project(fields))
            .into_iter()
            .collect())
    }

    fn insert(&self, address: &StoreAddress, values: &Row) -> StoreResult<Option<String>> {
        let mut state = self.begin()?;
        if state.fault == Some(Fault::InsertReturnsNone) {
            return Ok(None);
        }
        if state.rows.contains_key(address) {
            return Err(StoreError::Conflict);
        }
        state.rows.insert(address.clone(), values.clone());
        Ok(Some(address.row_identifier(Uuid::new_v4())))
    }

    fn update(&self, address: &StoreAddress, values: &Row) -> StoreResult<usize> {
        let mut state = self.begin()?;
        match state.rows.get_mut(address) {
            Some(row) => {
                row.merge(values);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete(&self, address: &StoreAddress) -> StoreResult<usize> {
        let mut state = self.begin()?;
        Ok(state.rows.remove(address).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> StoreAddress {
        StoreAddress::parse("content://test.provider/accounts").unwrap()
    }

    #[test]
    fn counts_every_primitive() {
        let store = MemoryRecordStore::new();
        store.query(&address(), None).unwrap();
        store.update(&address(), &Row::new().with(Column::AuthToken, "at")).unwrap();
        store.delete(&address()).unwrap();
        assert_eq!(store.round_trips(), 3);
        store.peek(&address());
        assert_eq!(store.round_trips(), 3);
    }

    #[test]
    fn addresses_are_isolated() {
        let store = MemoryRecordStore::new();
        let other = StoreAddress::parse("content://test.provider/other").unwrap();
        store
            .insert(&address(), &Row::new().with(Column::AccountName, "a"))
            .unwrap();
        assert!(store.query(&other, None).unwrap().is_empty());
        assert!(store.insert(&other, &Row::new()).unwrap().is_some());
    }

    #[test]
    fn faults_fail_until_cleared() {
        let store = MemoryRecordStore::new();
        store.set_fault(Some(Fault::PermissionDenied));
        assert!(matches!(
            store.query(&address(), None),
            Err(StoreError::PermissionDenied(_))
        ));
        store.set_fault(Some(Fault::InsertReturnsNone));
        assert_eq!(store.insert(&address(), &Row::new()).unwrap(), None);
        assert!(store.peek(&address()).is_none());
        store.set_fault(None);
        assert!(store.insert(&address(), &Row::new()).unwrap().is_some());
    }
}
