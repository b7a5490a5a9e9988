use account_relay_lib::companion::PathProbe;
use account_relay_lib::config::Backend;
use account_relay_lib::store::{SqliteRecordStore, StoreAddress};
use account_relay_lib::{CallResult, Relay, RelayConfig, SchemaVersion};
use serde_json::{json, Map, Value};

const ADDRESS: &str = "content://com.leywin.accountunifier.provider/accounts";

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn open(path: &std::path::Path) -> Relay {
    let store = SqliteRecordStore::open(path).unwrap();
    Relay::new(
        Box::new(store),
        StoreAddress::parse(ADDRESS).unwrap(),
        Box::new(PathProbe::new()),
        "com.leywin.accountunifier",
    )
}

#[test]
fn account_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("relay.db");

    let relay = open(&path);
    let added = relay.dispatch(
        "add-account",
        &args(json!({ "name": "ada@example.com", "authToken": "at", "refreshToken": "rt" })),
    );
    assert_eq!(added, CallResult::Success(Value::Bool(true)));
    assert_eq!(
        relay.dispatch("update-base-url", &args(json!({ "baseUrl": "https://api" }))),
        CallResult::Success(Value::Bool(true))
    );
    drop(relay);

    let relay = open(&path);
    assert_eq!(
        relay.dispatch("get-account", &Map::new()),
        CallResult::Success(json!({
            "accountName": "ada@example.com",
            "authToken": "at",
            "refreshToken": "rt",
            "baseUrl": "https://api",
        }))
    );
}

#[test]
fn sqlite_keeps_a_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let relay = open(&dir.path().join("relay.db"));

    assert_eq!(
        relay.dispatch("insert-json-blob", &args(json!({ "jsonText": "{}" }))),
        CallResult::Success(Value::Bool(true))
    );
    // The blob upsert already created the row.
    let result = relay.dispatch(
        "add-account",
        &args(json!({ "name": "a", "authToken": "at", "refreshToken": "rt" })),
    );
    assert!(matches!(result, CallResult::Error { ref code, .. } if code == "CONFLICT"));

    assert_eq!(
        relay.dispatch("update-access-token", &args(json!({ "authToken": "at-2" }))),
        CallResult::Success(Value::Bool(true))
    );
    assert_eq!(
        relay.dispatch("delete-account", &Map::new()),
        CallResult::Success(Value::Bool(true))
    );
    assert_eq!(
        relay.dispatch("get-json-blob", &Map::new()),
        CallResult::Success(Value::Null)
    );
}

#[test]
fn open_from_config_creates_current_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.db");
    let config = RelayConfig {
        backend: Backend::Sqlite,
        database_path: Some(path.clone()),
        ..RelayConfig::default()
    };

    let relay = Relay::open(&config).unwrap();
    assert_eq!(
        relay.dispatch("get-base-url", &Map::new()),
        CallResult::Success(Value::Null)
    );
    drop(relay);

    let store = SqliteRecordStore::open(&path).unwrap();
    assert_eq!(
        store
            .schema_version(&StoreAddress::parse(ADDRESS).unwrap())
            .unwrap(),
        Some(SchemaVersion::CURRENT)
    );
}

#[test]
fn sqlite_config_without_path_is_rejected() {
    let config = RelayConfig::default();
    assert!(Relay::open(&config).is_err());
}

#[test]
fn provider_table_with_row_ids_is_adopted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            create table accounts (
              _id integer primary key autoincrement,
              accountName text,
              authToken text,
              refreshToken text
            );
            insert into accounts (accountName, authToken, refreshToken)
              values ('old@example.com', 'at', 'rt');
            "#,
        )
        .unwrap();
    }

    let relay = open(&path);
    assert_eq!(
        relay.dispatch("get-email", &Map::new()),
        CallResult::Success(json!("old@example.com"))
    );
    assert_eq!(
        relay.dispatch("update-base-url", &args(json!({ "baseUrl": "https://api" }))),
        CallResult::Success(Value::Bool(true))
    );
    assert_eq!(
        relay.dispatch("get-account", &Map::new()),
        CallResult::Success(json!({
            "accountName": "old@example.com",
            "authToken": "at",
            "refreshToken": "rt",
            "baseUrl": "https://api",
        }))
    );
}

#[test]
fn keyword_path_segment_works_as_table() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteRecordStore::open(dir.path().join("relay.db")).unwrap();
    let relay = Relay::new(
        Box::new(store),
        StoreAddress::parse("content://auth/order").unwrap(),
        Box::new(PathProbe::new()),
        "com.leywin.accountunifier",
    );

    assert_eq!(
        relay.dispatch(
            "add-account",
            &args(json!({ "name": "a", "authToken": "at", "refreshToken": "rt" })),
        ),
        CallResult::Success(Value::Bool(true))
    );
    assert_eq!(
        relay.dispatch("get-email", &Map::new()),
        CallResult::Success(json!("a"))
    );
}
