//! Integration tests for the built-in providers, driven through SQL.

use std::fs;

use tablebridge_providers::{ConfigError, ProviderEntry, ProviderKind, ProvidersConfig};
use tablebridge_sqlite::{Error, ProviderConnection, TableKind};

fn connection() -> ProviderConnection {
    let mut conn = ProviderConnection::open_in_memory().unwrap();
    ProvidersConfig::default().apply(&mut conn).unwrap();
    conn
}

fn integers(conn: &ProviderConnection, sql: &str) -> Vec<i64> {
    let mut stmt = conn.prepare(sql).unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<i64>>>()
        .unwrap()
}

fn query_plan(conn: &ProviderConnection, sql: &str) -> String {
    let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}")).unwrap();
    stmt.query_map([], |row| row.get::<_, String>(3))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
        .join("\n")
}

const PEOPLE: &str = r#"CREATE VIRTUAL TABLE people USING records(
    columns='name, age',
    data='[["ann", 31], {"age": 40, "name": "bob"}, ["cy"]]'
)"#;

// ---------------------------------------------------------------------------
// generate_series
// ---------------------------------------------------------------------------

#[test]
fn test_series_with_step() {
    let conn = connection();
    assert_eq!(
        integers(&conn, "SELECT value FROM generate_series(1, 10, 3)"),
        vec![1, 4, 7, 10]
    );
    assert_eq!(
        integers(&conn, "SELECT value FROM generate_series(0, 10, -5)"),
        vec![10, 5, 0]
    );
}

#[test]
fn test_series_aggregate() {
    let conn = connection();
    let total: i64 = conn
        .query_row("SELECT sum(value) FROM generate_series(1, 100)", [], |row| row.get(0))
        .unwrap();
    assert_eq!(total, 5050);
}

#[test]
fn test_series_value_range_is_pushed_down() {
    let conn = connection();
    let sql = "SELECT value FROM generate_series(0, 100) WHERE value > 95 AND value <= 98";
    assert_eq!(integers(&conn, sql), vec![96, 97, 98]);
}

#[test]
fn test_series_large_integer_bounds_are_exact() {
    let conn = connection();
    let sql = "SELECT value FROM generate_series(9007199254740990, 9007199254741000) \
               WHERE value = 9007199254740995";
    assert_eq!(integers(&conn, sql), vec![9_007_199_254_740_995]);

    let sql = "SELECT value FROM generate_series(9007199254740990, 9007199254741000) \
               WHERE value >= 9007199254740995 AND value <= 9007199254740997";
    assert_eq!(
        integers(&conn, sql),
        vec![9_007_199_254_740_995, 9_007_199_254_740_996, 9_007_199_254_740_997]
    );

    let sql = "SELECT value FROM generate_series(9223372036854775800, 9223372036854775807) \
               WHERE value > 9223372036854775805";
    assert_eq!(integers(&conn, sql), vec![i64::MAX - 1, i64::MAX]);
}

#[test]
fn test_series_order_by_needs_no_sort() {
    let conn = connection();
    let sql = "SELECT value FROM generate_series(1, 5) ORDER BY value DESC";
    assert_eq!(integers(&conn, sql), vec![5, 4, 3, 2, 1]);
    assert!(!query_plan(&conn, sql).contains("TEMP B-TREE"));

    let sql = "SELECT value FROM generate_series(0, 10, -5) ORDER BY value";
    assert_eq!(integers(&conn, sql), vec![0, 5, 10]);
}

#[test]
fn test_series_hidden_columns() {
    let conn = connection();
    let (start, stop, step): (i64, i64, i64) = conn
        .query_row(
            "SELECT start, stop, step FROM generate_series(2, 8, 0) LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!((start, stop, step), (2, 8, 1));
}

#[test]
fn test_series_without_start_has_no_plan() {
    let conn = connection();
    let err = conn
        .prepare("SELECT value FROM generate_series")
        .err()
        .unwrap();
    assert!(err.to_string().contains("no query solution"), "{err}");
}

#[test]
fn test_series_null_argument_is_empty() {
    let conn = connection();
    assert!(integers(&conn, "SELECT value FROM generate_series(1, NULL)").is_empty());
}

#[test]
fn test_series_usable_in_view_without_trusted_schema() {
    let conn = connection();
    conn.execute_batch(
        "PRAGMA trusted_schema = OFF;
         CREATE VIEW small AS SELECT value FROM generate_series(1, 3);",
    )
    .unwrap();
    assert_eq!(integers(&conn, "SELECT value FROM small"), vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// records
// ---------------------------------------------------------------------------

#[test]
fn test_records_inline_data() {
    let conn = connection();
    conn.execute_batch(PEOPLE).unwrap();
    let mut stmt = conn.prepare("SELECT rowid, name, age FROM people").unwrap();
    let rows: Vec<(i64, String, Option<i64>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "ann".to_string(), Some(31)),
            (2, "bob".to_string(), Some(40)),
            (3, "cy".to_string(), None),
        ]
    );
}

#[test]
fn test_records_rowid_lookup() {
    let conn = connection();
    conn.execute_batch(PEOPLE).unwrap();
    let name: String = conn
        .query_row("SELECT name FROM people WHERE rowid = 2", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "bob");
    assert!(integers(&conn, "SELECT rowid FROM people WHERE rowid = 9").is_empty());
    assert_eq!(
        integers(&conn, "SELECT age FROM people WHERE age > 35"),
        vec![40]
    );
}

#[test]
fn test_records_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    fs::write(&path, r#"[{"id": 7, "kind": "start"}, {"id": 8, "kind": "stop"}]"#).unwrap();

    let conn = connection();
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE events USING records(columns='id, kind', file='{}')",
        path.display()
    ))
    .unwrap();
    assert_eq!(integers(&conn, "SELECT id FROM events ORDER BY rowid"), vec![7, 8]);
}

#[test]
fn test_records_construction_errors_surface() {
    let conn = connection();
    let err = conn
        .execute_batch("CREATE VIRTUAL TABLE t USING records(data='[]')")
        .unwrap_err();
    assert!(err.to_string().contains("missing required argument 'columns'"), "{err}");

    let err = conn
        .execute_batch("CREATE VIRTUAL TABLE t USING records(columns=a, data='[1]')")
        .unwrap_err();
    assert!(err.to_string().contains("record 1"), "{err}");
}

#[test]
fn test_records_are_direct_only() {
    let conn = connection();
    conn.execute_batch(PEOPLE).unwrap();
    conn.execute_batch("CREATE VIEW names AS SELECT name FROM people")
        .unwrap();
    let err = conn.prepare("SELECT * FROM names").err().unwrap();
    assert!(err.to_string().contains("unsafe use of virtual table"), "{err}");
}

#[test]
fn test_records_reconnect_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.db");
    {
        let mut conn = ProviderConnection::open(&db).unwrap();
        ProvidersConfig::default().apply(&mut conn).unwrap();
        conn.execute_batch(PEOPLE).unwrap();
        conn.close().unwrap();
    }
    let mut conn = ProviderConnection::open(&db).unwrap();
    ProvidersConfig::default().apply(&mut conn).unwrap();
    assert_eq!(integers(&conn, "SELECT count(*) FROM people"), vec![3]);
    conn.execute_batch("DROP TABLE people").unwrap();
    let ledger = conn.ledger();
    conn.close().unwrap();
    assert!(ledger.stats().balanced());
}

#[test]
fn test_correlated_series_per_record() {
    let conn = connection();
    conn.execute_batch(PEOPLE).unwrap();
    let sql = "SELECT s.value FROM people p, generate_series(1, p.age / 10) s WHERE p.age IS NOT NULL";
    assert_eq!(integers(&conn, sql), vec![1, 2, 3, 1, 2, 3, 4]);
}

// ---------------------------------------------------------------------------
// configuration
// ---------------------------------------------------------------------------

#[test]
fn test_apply_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("providers.yml");
    fs::write(
        &path,
        "version: \"1.0\"\nproviders:\n  - name: seq\n    kind: series\n    eponymous_only: true\n  - name: rows\n    kind: records\n",
    )
    .unwrap();

    let config = ProvidersConfig::load(&path).unwrap();
    let mut conn = ProviderConnection::open_in_memory().unwrap();
    config.apply(&mut conn).unwrap();

    let registry = conn.registry();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("seq").unwrap().kind, TableKind::EponymousOnly);
    assert_eq!(registry.get("rows").unwrap().kind, TableKind::Creatable);
    assert_eq!(integers(&conn, "SELECT value FROM seq(1, 3)"), vec![1, 2, 3]);
}

#[test]
fn test_apply_stops_at_duplicate() {
    let mut config = ProvidersConfig::default();
    config
        .providers
        .push(ProviderEntry::new("RECORDS", ProviderKind::Records, false));
    config
        .providers
        .push(ProviderEntry::new("later", ProviderKind::Series, true));

    let mut conn = ProviderConnection::open_in_memory().unwrap();
    let err = config.apply(&mut conn).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::RegistrationError(Error::DuplicateName(ref name)) if name == "RECORDS"
    ));
    assert_eq!(conn.registry().len(), 2);
    assert!(!conn.registry().contains("later"));
}

#[test]
fn test_every_box_released() {
    let conn = connection();
    conn.execute_batch(PEOPLE).unwrap();
    integers(&conn, "SELECT value FROM generate_series(1, 3)");
    integers(&conn, "SELECT rowid FROM people");
    let ledger = conn.ledger();
    conn.close().unwrap();
    let stats = ledger.stats();
    assert!(stats.balanced(), "{stats:?}");
    assert_eq!(stats.registrations.created, 2);
}
