use roster_core::db::open_db_in_memory;
use roster_core::{AncestryUpdate, SqliteUnitStore, StoreError, Unit, UnitStore, UnitType};
use rusqlite::Connection;

const UNITS: &str = "units";

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn seed(store: &SqliteUnitStore<'_>, units: Vec<Unit>) {
    for unit in units {
        store.create_unit(UNITS, &unit).unwrap();
    }
}

fn update(id: &str, expected: Option<&str>, ancestry_id: Option<&str>) -> AncestryUpdate {
    AncestryUpdate {
        id: id.to_string(),
        expected: expected.map(str::to_string),
        ancestry_id: ancestry_id.map(str::to_string),
    }
}

fn battalion_and_company() -> Vec<Unit> {
    vec![
        Unit::with_id("A", UnitType::Battalion, "1st Bn")
            .unwrap()
            .with_ancestry("A"),
        Unit::with_id("B", UnitType::Company, "Bravo")
            .unwrap()
            .with_parent("A"),
        Unit::with_id("C", UnitType::Company, "Charlie")
            .unwrap()
            .with_parent("A")
            .with_ancestry("STALE"),
    ]
}

#[test]
fn create_and_get_roundtrip() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();

    let unit = Unit::new(UnitType::Platoon, "1st Plt").with_parent("ghost");
    let created = store.create_unit(UNITS, &unit).unwrap();

    assert_eq!(created.id, unit.id);
    assert!(created.updated_at.is_some());
    let loaded = store.get_by_id(UNITS, &unit.id).unwrap().unwrap();
    assert_eq!(loaded.unit_type, UnitType::Platoon);
    assert_eq!(loaded.parent_id.as_deref(), Some("ghost"));
    assert_eq!(loaded.name, "1st Plt");
    assert!(store.get_by_id(UNITS, "missing").unwrap().is_none());
}

#[test]
fn create_rejects_duplicate_and_blank_units() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    let unit = Unit::with_id("A", UnitType::Battalion, "1st Bn").unwrap();
    store.create_unit(UNITS, &unit).unwrap();

    let err = store.create_unit(UNITS, &unit).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateUnit(ref id) if id == "A"));

    let mut blank = Unit::new(UnitType::Company, "x");
    blank.name = "   ".to_string();
    let err = store.create_unit(UNITS, &blank).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn list_all_returns_insertion_order() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(
        &store,
        vec![
            Unit::with_id("Z", UnitType::Company, "Zulu").unwrap(),
            Unit::with_id("A", UnitType::Battalion, "1st Bn").unwrap(),
            Unit::with_id("M", UnitType::Squad, "Mike").unwrap(),
        ],
    );

    let ids: Vec<String> = store
        .list_all(UNITS)
        .unwrap()
        .into_iter()
        .map(|unit| unit.id)
        .collect();
    assert_eq!(ids, vec!["Z", "A", "M"]);
}

#[test]
fn commit_batch_updates_ancestry_and_refreshes_updated_at() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(&store, battalion_and_company());
    conn.execute("UPDATE units SET updated_at = 0;", []).unwrap();

    let written = store
        .commit_batch(
            UNITS,
            &[update("B", None, Some("A")), update("C", Some("STALE"), Some("A"))],
            10,
        )
        .unwrap();

    assert_eq!(written, 2);
    for id in ["B", "C"] {
        let unit = store.get_by_id(UNITS, id).unwrap().unwrap();
        assert_eq!(unit.ancestry_id.as_deref(), Some("A"));
        assert!(unit.updated_at.unwrap() > 0);
    }
    let untouched = store.get_by_id(UNITS, "A").unwrap().unwrap();
    assert_eq!(untouched.updated_at, Some(0));
}

#[test]
fn commit_batch_can_clear_ancestry() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(&store, battalion_and_company());

    store
        .commit_batch(UNITS, &[update("C", Some("STALE"), None)], 1)
        .unwrap();

    let unit = store.get_by_id(UNITS, "C").unwrap().unwrap();
    assert_eq!(unit.ancestry_id, None);
}

#[test]
fn commit_batch_failed_condition_rolls_back_whole_group() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(&store, battalion_and_company());

    let err = store
        .commit_batch(
            UNITS,
            &[update("B", None, Some("A")), update("C", Some("OTHER"), Some("A"))],
            10,
        )
        .unwrap_err();

    match err {
        StoreError::ConditionFailed {
            id,
            expected,
            actual,
        } => {
            assert_eq!(id, "C");
            assert_eq!(expected.as_deref(), Some("OTHER"));
            assert_eq!(actual.as_deref(), Some("STALE"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let first = store.get_by_id(UNITS, "B").unwrap().unwrap();
    assert_eq!(first.ancestry_id, None);
}

#[test]
fn commit_batch_missing_unit_rolls_back_whole_group() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(&store, battalion_and_company());

    let err = store
        .commit_batch(
            UNITS,
            &[update("B", None, Some("A")), update("gone", None, Some("A"))],
            10,
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::UnitNotFound(ref id) if id == "gone"));
    assert_eq!(store.get_by_id(UNITS, "B").unwrap().unwrap().ancestry_id, None);
}

#[test]
fn commit_batch_rejects_oversized_group_without_writing() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();
    seed(&store, battalion_and_company());

    let err = store
        .commit_batch(
            UNITS,
            &[update("B", None, Some("A")), update("C", Some("STALE"), Some("A"))],
            1,
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::BatchTooLarge { len: 2, max: 1 }));
    assert_eq!(store.get_by_id(UNITS, "B").unwrap().unwrap().ancestry_id, None);
}

#[test]
fn empty_batch_is_a_no_op() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();

    assert_eq!(store.commit_batch(UNITS, &[], 1).unwrap(), 0);
}

#[test]
fn collection_must_be_a_known_identifier() {
    let conn = setup();
    let store = SqliteUnitStore::try_new(&conn).unwrap();

    let err = store.list_all("units; DROP TABLE units").unwrap_err();
    assert!(matches!(err, StoreError::InvalidCollection(_)));

    let err = store.list_all("squadrons").unwrap_err();
    assert!(matches!(err, StoreError::MissingRequiredTable(ref table) if table == "squadrons"));
}

#[test]
fn collection_table_must_have_unit_columns() {
    let conn = setup();
    conn.execute_batch("CREATE TABLE legacy_units (id TEXT PRIMARY KEY, name TEXT);")
        .unwrap();
    let store = SqliteUnitStore::try_new(&conn).unwrap();

    let err = store.list_all("legacy_units").unwrap_err();
    assert!(matches!(
        err,
        StoreError::MissingRequiredColumn {
            column: "unit_type",
            ..
        }
    ));
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = match SqliteUnitStore::try_new(&conn) {
        Ok(_) => panic!("unmigrated connection must be rejected"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        StoreError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}
