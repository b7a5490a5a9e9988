//! Tauri v2 plugin exposing the relay as a single `call` command.

use std::sync::Arc;

use serde_json::{Map, Value};
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Manager, Runtime, State};

use crate::config::{Backend, RelayConfig};
use crate::error::RelayError;
use crate::router::{Operation, Relay};

// Tauri commands only have a success/error channel, so an unknown method
// travels as a NOT_IMPLEMENTED error.
#[tauri::command]
fn call(
    state: State<'_, Arc<Relay>>,
    method: String,
    args: Option<Map<String, Value>>,
) -> Result<Value, RelayError> {
    let op = Operation::from_name(&method).ok_or(RelayError::NotImplemented(method))?;
    state.call(op, &args.unwrap_or_default())
}

/// Tauri plugin exposing the relay as the `call` command of `account-relay`.
///
/// Reads [`RelayConfig`] from the plugin's config block; environment
/// overrides apply on top, and a SQLite store without an explicit path lives
/// in the app data directory.
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<RelayConfig>> {
    Builder::<R, Option<RelayConfig>>::new("account-relay")
        .invoke_handler(tauri::generate_handler![call])
        .setup(|app, api| {
            let mut config = api.config().clone().unwrap_or_default().with_env_overrides()?;
            if config.backend == Backend::Sqlite {
                let dir = app.path().app_data_dir()?;
                config = config.with_default_database_in(&dir);
            }
            let relay = Relay::open(&config)?;
            app.manage(Arc::new(relay));
            Ok(())
        })
        .build()
}
