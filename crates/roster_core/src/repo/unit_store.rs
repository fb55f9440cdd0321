//! Unit document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the bulk read, point read and batched conditional write that
//!   the reconciler needs from the shared document store.
//! - Keep SQL details and ordering behavior inside the store boundary.
//!
//! # Invariants
//! - `list_all` returns units in insertion order.
//! - `commit_batch` is all-or-nothing: every update's precondition is checked
//!   inside one immediate transaction before it commits.
//! - A batch larger than the supplied limit is rejected without writing.

use crate::config::is_valid_collection_name;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::unit::{Unit, UnitId, UnitType, UnitValidationError};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-commit write limit of the hosted document store. Stores that do not
/// advertise their own limit use this one, so a plan checked against SQLite
/// partitions the same way it would in production.
pub const STORE_WRITE_GROUP_LIMIT: usize = 500;

const UNIT_COLUMNS: [&str; 7] = [
    "id",
    "unit_type",
    "parent_id",
    "ancestry_id",
    "name",
    "created_at",
    "updated_at",
];

/// Result type used by unit store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from unit store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Collection name is not a plain identifier.
    InvalidCollection(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Collection table is missing.
    MissingRequiredTable(String),
    /// Required column is missing from the collection table.
    MissingRequiredColumn {
        table: String,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid unit.
    InvalidData(String),
    /// Unit failed record validation before insert.
    Validation(UnitValidationError),
    /// Insert collided with an existing id.
    DuplicateUnit(UnitId),
    /// Write group exceeds the supplied batch limit.
    BatchTooLarge { len: usize, max: usize },
    /// Update targets a unit that does not exist.
    UnitNotFound(UnitId),
    /// Stored ancestry changed since the snapshot was read.
    ConditionFailed {
        id: UnitId,
        expected: Option<UnitId>,
        actual: Option<UnitId>,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidCollection(name) => write!(f, "invalid collection name `{name}`"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "unit store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "unit store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "unit store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid unit data: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateUnit(id) => write!(f, "unit already exists: {id}"),
            Self::BatchTooLarge { len, max } => {
                write!(f, "write group of {len} updates exceeds batch limit {max}")
            }
            Self::UnitNotFound(id) => write!(f, "unit not found: {id}"),
            Self::ConditionFailed {
                id,
                expected,
                actual,
            } => write!(
                f,
                "ancestry of unit {id} changed since read: expected {}, found {}",
                display_ancestry(expected.as_deref()),
                display_ancestry(actual.as_deref())
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<UnitValidationError> for StoreError {
    fn from(value: UnitValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Renders an optional ancestry value the way reports print it.
///
/// Present ids are quoted so a unit literally named `none` stays
/// distinguishable from an absent value.
pub fn display_ancestry(value: Option<&str>) -> String {
    match value {
        Some(id) => format!("{id:?}"),
        None => "none".to_string(),
    }
}

/// One conditional field update inside a write group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AncestryUpdate {
    /// Target unit.
    pub id: UnitId,
    /// Stored ancestry the write expects to replace.
    pub expected: Option<UnitId>,
    /// New ancestry value.
    pub ancestry_id: Option<UnitId>,
}

/// Document store contract consumed by the reconciler.
pub trait UnitStore {
    /// Reads every unit in a collection, in insertion order.
    fn list_all(&self, collection: &str) -> StoreResult<Vec<Unit>>;

    /// Reads one unit by id.
    fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Unit>>;

    /// Applies one write group atomically and returns the number of units
    /// written.
    ///
    /// Fails without writing when `updates.len() > max_batch_size`, when a
    /// target is missing, or when a target's stored ancestry differs from
    /// `expected`.
    fn commit_batch(
        &self,
        collection: &str,
        updates: &[AncestryUpdate],
        max_batch_size: usize,
    ) -> StoreResult<usize>;

    /// Upper bound on updates per write group imposed by the store.
    fn max_batch_size(&self) -> usize {
        STORE_WRITE_GROUP_LIMIT
    }
}

impl<S: UnitStore + ?Sized> UnitStore for &S {
    fn list_all(&self, collection: &str) -> StoreResult<Vec<Unit>> {
        (**self).list_all(collection)
    }

    fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Unit>> {
        (**self).get_by_id(collection, id)
    }

    fn commit_batch(
        &self,
        collection: &str,
        updates: &[AncestryUpdate],
        max_batch_size: usize,
    ) -> StoreResult<usize> {
        (**self).commit_batch(collection, updates, max_batch_size)
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}

/// SQLite-backed unit store. Each collection is one table.
pub struct SqliteUnitStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUnitStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(StoreError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    /// Inserts one unit. Application-side write; the reconciler never calls it.
    pub fn create_unit(&self, collection: &str, unit: &Unit) -> StoreResult<Unit> {
        unit.validate()?;
        let table = ensure_collection_ready(self.conn, collection)?;

        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO {table} (
                    id,
                    unit_type,
                    parent_id,
                    ancestry_id,
                    name,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);"
            ),
            params![
                unit.id.as_str(),
                unit.unit_type.as_str(),
                unit.parent_id.as_deref(),
                unit.ancestry_id.as_deref(),
                unit.name.as_str(),
                now_epoch_ms(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateUnit(unit.id.clone()));
            }
            Err(err) => return Err(err.into()),
        }

        self.get_by_id(table, unit.id.as_str())?
            .ok_or_else(|| StoreError::UnitNotFound(unit.id.clone()))
    }
}

impl UnitStore for SqliteUnitStore<'_> {
    fn list_all(&self, collection: &str) -> StoreResult<Vec<Unit>> {
        let table = ensure_collection_ready(self.conn, collection)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, unit_type, parent_id, ancestry_id, name, updated_at
             FROM {table}
             ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;

        let mut units = Vec::new();
        while let Some(row) = rows.next()? {
            units.push(parse_unit_row(row, table)?);
        }
        Ok(units)
    }

    fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Unit>> {
        let table = ensure_collection_ready(self.conn, collection)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, unit_type, parent_id, ancestry_id, name, updated_at
             FROM {table}
             WHERE id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_unit_row(row, table)?));
        }
        Ok(None)
    }

    fn commit_batch(
        &self,
        collection: &str,
        updates: &[AncestryUpdate],
        max_batch_size: usize,
    ) -> StoreResult<usize> {
        if updates.len() > max_batch_size {
            return Err(StoreError::BatchTooLarge {
                len: updates.len(),
                max: max_batch_size,
            });
        }
        let table = ensure_collection_ready(self.conn, collection)?;
        if updates.is_empty() {
            return Ok(0);
        }

        // Dropping `tx` on any early return rolls the whole group back.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let written_at = now_epoch_ms();
        for update in updates {
            let stored: Option<Option<String>> = tx
                .query_row(
                    &format!("SELECT ancestry_id FROM {table} WHERE id = ?1;"),
                    [update.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(actual) = stored else {
                return Err(StoreError::UnitNotFound(update.id.clone()));
            };
            if actual != update.expected {
                return Err(StoreError::ConditionFailed {
                    id: update.id.clone(),
                    expected: update.expected.clone(),
                    actual,
                });
            }

            tx.execute(
                &format!(
                    "UPDATE {table}
                     SET ancestry_id = ?2,
                         updated_at = ?3
                     WHERE id = ?1;"
                ),
                params![
                    update.id.as_str(),
                    update.ancestry_id.as_deref(),
                    written_at
                ],
            )?;
        }
        tx.commit()?;

        Ok(updates.len())
    }
}

fn parse_unit_row(row: &Row<'_>, table: &str) -> StoreResult<Unit> {
    let unit_type_text: String = row.get("unit_type")?;
    let unit_type = UnitType::parse(&unit_type_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid unit type `{unit_type_text}` in {table}.unit_type"
        ))
    })?;

    Ok(Unit {
        id: row.get("id")?,
        unit_type,
        parent_id: row.get("parent_id")?,
        ancestry_id: row.get("ancestry_id")?,
        name: row.get("name")?,
        updated_at: Some(row.get("updated_at")?),
    })
}

/// Validates the collection name and its table shape.
///
/// Returns the name back so callers can splice it into SQL; only names that
/// pass `is_valid_collection_name` ever reach a query string.
fn ensure_collection_ready<'a>(conn: &Connection, collection: &'a str) -> StoreResult<&'a str> {
    if !is_valid_collection_name(collection) {
        return Err(StoreError::InvalidCollection(collection.to_string()));
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [collection],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(StoreError::MissingRequiredTable(collection.to_string()));
    }

    let mut present = Vec::new();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({collection});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        present.push(row.get::<_, String>(1)?);
    }
    for column in UNIT_COLUMNS {
        if !present.iter().any(|name| name == column) {
            return Err(StoreError::MissingRequiredColumn {
                table: collection.to_string(),
                column,
            });
        }
    }

    Ok(collection)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
