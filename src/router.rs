//! Call Router: validates a named call and its argument bag, runs it against
//! the adapter and reports the outcome in the caller's result protocol.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::adapter::AccountStore;
use crate::companion::{CompanionProbe, PathProbe};
use crate::config::{Backend, RelayConfig};
use crate::error::RelayError;
use crate::store::{
    KeyringRecordStore, MemoryRecordStore, RecordStore, SqliteRecordStore, StoreAddress,
    StoreResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAccount,
    AddAccount,
    GetEmail,
    UpdateAccessToken,
    IsCompanionInstalled,
    GetJsonBlob,
    InsertJsonBlob,
    UpdateBaseUrl,
    GetBaseUrl,
    DeleteAccount,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::GetAccount,
        Operation::AddAccount,
        Operation::GetEmail,
        Operation::UpdateAccessToken,
        Operation::IsCompanionInstalled,
        Operation::GetJsonBlob,
        Operation::InsertJsonBlob,
        Operation::UpdateBaseUrl,
        Operation::GetBaseUrl,
        Operation::DeleteAccount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::GetAccount => "get-account",
            Operation::AddAccount => "add-account",
            Operation::GetEmail => "get-email",
            Operation::UpdateAccessToken => "update-access-token",
            Operation::IsCompanionInstalled => "is-companion-installed",
            Operation::GetJsonBlob => "get-json-blob",
            Operation::InsertJsonBlob => "insert-json-blob",
            Operation::UpdateBaseUrl => "update-base-url",
            Operation::GetBaseUrl => "get-base-url",
            Operation::DeleteAccount => "delete-account",
        }
    }

    /// Method name older clients send; still accepted.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Operation::GetAccount => "getAccount",
            Operation::AddAccount => "addAccount",
            Operation::GetEmail => "getEmail",
            Operation::UpdateAccessToken => "updateAccessToken",
            Operation::IsCompanionInstalled => "isPackageInstalled",
            Operation::GetJsonBlob => "getJsonText",
            Operation::InsertJsonBlob => "insertJsonText",
            Operation::UpdateBaseUrl => "updateBaseUrl",
            Operation::GetBaseUrl => "getBaseUrl",
            Operation::DeleteAccount => "deleteAccount",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name || op.legacy_name() == name)
    }

    fn required_args(self) -> &'static [Arg] {
        match self {
            Operation::AddAccount => &[NAME, AUTH_TOKEN, REFRESH_TOKEN],
            Operation::UpdateAccessToken => &[AUTH_TOKEN],
            Operation::InsertJsonBlob => &[JSON_TEXT],
            Operation::UpdateBaseUrl => &[BASE_URL],
            _ => &[],
        }
    }
}

struct Arg {
    name: &'static str,
    aliases: &'static [&'static str],
}

const NAME: Arg = Arg { name: "name", aliases: &["username"] };
const AUTH_TOKEN: Arg = Arg { name: "authToken", aliases: &[] };
const REFRESH_TOKEN: Arg = Arg { name: "refreshToken", aliases: &[] };
const JSON_TEXT: Arg = Arg { name: "jsonText", aliases: &[] };
const BASE_URL: Arg = Arg { name: "baseUrl", aliases: &["kBaseUrl"] };

impl Arg {
    fn lookup<'a>(&self, args: &'a Map<String, Value>) -> Option<&'a str> {
        std::iter::once(self.name)
            .chain(self.aliases.iter().copied())
            .find_map(|key| args.get(key).and_then(Value::as_str))
    }
}

/// Extracts every required string argument, or names all that are missing.
fn required<'a>(op: Operation, args: &'a Map<String, Value>) -> Result<Vec<&'a str>, RelayError> {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for arg in op.required_args() {
        match arg.lookup(args) {
            Some(value) => found.push(value),
            None => missing.push(arg.name),
        }
    }
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(RelayError::InvalidArguments(missing))
    }
}

/// One response per call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum CallResult {
    Success(Value),
    Error { code: String, message: String },
    NotImplemented(String),
}

impl From<RelayError> for CallResult {
    fn from(err: RelayError) -> Self {
        CallResult::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<Result<Value, RelayError>> for CallResult {
    fn from(result: Result<Value, RelayError>) -> Self {
        match result {
            Ok(value) => CallResult::Success(value),
            Err(err) => err.into(),
        }
    }
}

pub struct Relay {
    accounts: AccountStore,
    companion: Box<dyn CompanionProbe>,
    companion_id: String,
}

impl Relay {
    pub fn new(
        store: Box<dyn RecordStore>,
        address: StoreAddress,
        companion: Box<dyn CompanionProbe>,
        companion_id: impl Into<String>,
    ) -> Self {
        Self {
            accounts: AccountStore::new(store, address),
            companion,
            companion_id: companion_id.into(),
        }
    }

    /// Builds the configured store and the `PATH` companion probe.
    pub fn open(config: &RelayConfig) -> Result<Self, RelayError> {
        let address = StoreAddress::parse(&config.address)?;
        let store: Box<dyn RecordStore> = match config.backend {
            Backend::Sqlite => {
                let path = config.database_path.as_ref().ok_or_else(|| {
                    RelayError::Config("the sqlite backend needs a database path".to_string())
                })?;
                Box::new(SqliteRecordStore::open(path)?)
            }
            Backend::Keyring => Box::new(KeyringRecordStore::new()),
            Backend::Memory => Box::new(MemoryRecordStore::new()),
        };
        debug!(backend = %config.backend, %address, "relay opened");
        Ok(Self::new(
            store,
            address,
            Box::new(PathProbe::new()),
            config.companion_id.clone(),
        ))
    }

    pub fn dispatch(&self, method: &str, args: &Map<String, Value>) -> CallResult {
        let Some(op) = Operation::from_name(method) else {
            warn!(method, "method not implemented");
            return CallResult::NotImplemented(method.to_string());
        };
        debug!(method = op.name(), "dispatching");
        self.call(op, args).into()
    }

    pub fn call(&self, op: Operation, args: &Map<String, Value>) -> Result<Value, RelayError> {
        let values = required(op, args).inspect_err(|err| {
            warn!(method = op.name(), error = %err, "invalid arguments");
        })?;

        match (op, values.as_slice()) {
            (Operation::GetAccount, _) => match degrade(op, self.accounts.account()) {
                Some(account) => Ok(serde_json::to_value(account)?),
                None => Ok(Value::Null),
            },
            (Operation::AddAccount, [name, auth_token, refresh_token]) => {
                debug!(
                    method = op.name(),
                    auth_token_len = auth_token.len(),
                    refresh_token_len = refresh_token.len(),
                    "adding account"
                );
                Ok(Value::Bool(self.accounts.add_account(
                    name,
                    auth_token,
                    refresh_token,
                )?))
            }
            (Operation::GetEmail, _) => degrade(op, self.accounts.email())
                .map(Value::String)
                .ok_or(RelayError::NoAccount),
            (Operation::UpdateAccessToken, [auth_token]) => {
                Ok(Value::Bool(self.accounts.update_access_token(auth_token)))
            }
            (Operation::IsCompanionInstalled, _) => self
                .companion
                .is_installed(&self.companion_id)
                .map(Value::Bool)
                .map_err(|e| RelayError::Unexpected(e.to_string())),
            (Operation::GetJsonBlob, _) => Ok(degrade(op, self.accounts.json_blob())
                .map_or(Value::Null, Value::String)),
            (Operation::InsertJsonBlob, [json_text]) => {
                debug!(method = op.name(), len = json_text.len(), "storing json blob");
                Ok(Value::Bool(self.accounts.set_json_blob(json_text)))
            }
            (Operation::UpdateBaseUrl, [base_url]) => {
                Ok(Value::Bool(self.accounts.set_base_url(base_url)))
            }
            (Operation::GetBaseUrl, _) => Ok(degrade(op, self.accounts.base_url())
                .map_or(Value::Null, Value::String)),
            (Operation::DeleteAccount, _) => Ok(Value::Bool(self.accounts.delete_account())),
            (op, values) => Err(RelayError::Unexpected(format!(
                "{} received {} arguments",
                op.name(),
                values.len()
            ))),
        }
    }
}

/// Reads report a store failure to the caller as "no value".
fn degrade<T>(op: Operation, read: StoreResult<Option<T>>) -> Option<T> {
    read.unwrap_or_else(|err| {
        warn!(method = op.name(), error = %err, "store read failed, reporting no value");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_current_and_legacy_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
            assert_eq!(Operation::from_name(op.legacy_name()), Some(op));
        }
        assert_eq!(Operation::from_name("getAccounts"), None);
    }

    #[test]
    fn lists_every_missing_argument() {
        let args = Map::from_iter([("authToken".to_string(), Value::from("at"))]);
        match required(Operation::AddAccount, &args) {
            Err(RelayError::InvalidArguments(missing)) => {
                assert_eq!(missing, vec!["name", "refreshToken"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_string_argument_counts_as_missing() {
        let args = Map::from_iter([("jsonText".to_string(), Value::from(42))]);
        assert!(matches!(
            required(Operation::InsertJsonBlob, &args),
            Err(RelayError::InvalidArguments(_))
        ));
    }

    #[test]
    fn accepts_legacy_argument_names() {
        let args = Map::from_iter([("kBaseUrl".to_string(), Value::from("https://k"))]);
        assert_eq!(required(Operation::UpdateBaseUrl, &args).unwrap(), vec!["https://k"]);
    }

    #[test]
    fn result_serializes_with_status_tag() {
        let json = serde_json::to_value(CallResult::Success(Value::Bool(true))).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "success", "result": true }));
        let json = serde_json::to_value(CallResult::from(RelayError::NoAccount)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "result": { "code": "NO_ACCOUNT", "message": "No account found" }
            })
        );
    }
}
