//! Relays typed account-management calls to a shared record store that holds
//! at most one account.
//!
//! [`Relay::dispatch`] is the entry point for any transport: it takes a method
//! name and an argument map and returns a [`CallResult`]. The `tauri` feature
//! wraps it as a Tauri plugin.

mod adapter;
pub mod companion;
pub mod config;
pub mod error;
#[cfg(feature = "tauri")]
mod plugin;
pub mod record;
mod router;
pub mod store;

pub use adapter::AccountStore;
pub use config::RelayConfig;
pub use error::RelayError;
#[cfg(feature = "tauri")]
pub use plugin::init;
pub use record::{AccountRecord, Column, SchemaVersion};
pub use router::{CallResult, Operation, Relay};
