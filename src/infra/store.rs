use crate::domain::{ContainerRecord, ImageRecord};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same natural key is already catalogued.
    #[error("{0} already exists")]
    Duplicate(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Encoding(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A record kind the catalog knows how to persist.
///
/// Each kind maps to one table holding one JSON document per row; the
/// key clauses identify a record by its natural key within that table.
pub trait CatalogRecord: Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const COLUMN: &'static str;

    /// Natural key as (json field, value) equality pairs.
    fn key_clauses(&self) -> Vec<(&'static str, String)>;

    /// Human-readable key, used in duplicate errors.
    fn describe_key(&self) -> String;

    fn uuid(&self) -> Uuid;
}

impl CatalogRecord for ImageRecord {
    const TABLE: &'static str = "service_image";
    const COLUMN: &'static str = "serviceimage";

    fn key_clauses(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("tag", self.tag.clone())]
    }

    fn describe_key(&self) -> String {
        format!("image {}:{}", self.name, self.tag)
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl CatalogRecord for ContainerRecord {
    const TABLE: &'static str = "service_container";
    const COLUMN: &'static str = "servicecontainer";

    fn key_clauses(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone())]
    }

    fn describe_key(&self) -> String {
        format!("container {}", self.name)
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Equality filters for image lookups. Unset fields do not constrain
/// the result; `limit` of zero means no limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageQuery {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub runtime_id: Option<String>,
    pub tag: Option<String>,
    pub limit: u32,
}

/// Equality filters for container lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerQuery {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub runtime_id: Option<String>,
    pub limit: u32,
}

impl ContainerQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Durable, queryable cache of image and container records, backed by a
/// local SQLite file. One JSON document per row.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        debug!("opened catalog at {:?}", path.as_ref());
        Ok(Self { conn })
    }

    /// Ephemeral store for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the catalog tables. Idempotent.
    pub fn init_tables(&self) -> StoreResult<()> {
        for (table, column) in [
            (ImageRecord::TABLE, ImageRecord::COLUMN),
            (ContainerRecord::TABLE, ContainerRecord::COLUMN),
        ] {
            self.conn.execute(
                &format!("CREATE TABLE IF NOT EXISTS {table} ({column} TEXT NOT NULL)"),
                [],
            )?;
        }
        Ok(())
    }

    /// A record with the same natural key is present in the catalog.
    pub fn exists<R: CatalogRecord>(&self, record: &R) -> StoreResult<bool> {
        let clauses = record.key_clauses();
        let wheres = key_where(R::COLUMN, &clauses);
        let sql = format!("SELECT COUNT({}) FROM {} WHERE {}", R::COLUMN, R::TABLE, wheres);
        let params: Vec<String> = clauses.into_iter().map(|(_, value)| value).collect();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Insert records, failing with a duplicate error if any natural key
    /// is already present. Returns the number of records inserted before
    /// the first error.
    pub fn add<R: CatalogRecord>(&self, records: &[R]) -> StoreResult<usize> {
        let mut count = 0;
        for record in records {
            if self.exists(record)? {
                return Err(StoreError::Duplicate(record.describe_key()));
            }
            self.insert_row(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Overwrite the documents matching each record's natural key.
    ///
    /// Zero matched rows is not an error; the write simply affects
    /// nothing.
    pub fn update<R: CatalogRecord>(&self, records: &[R]) -> StoreResult<usize> {
        let mut count = 0;
        for record in records {
            self.update_row(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Insert-or-update each record under its natural key.
    ///
    /// Each record's existence check and write run in one transaction.
    /// The batch itself is not transactional: on error, earlier records
    /// stay committed and the count reflects only those.
    pub fn put<R: CatalogRecord>(&self, records: &[R]) -> StoreResult<usize> {
        let mut count = 0;
        for record in records {
            let tx = self.conn.unchecked_transaction()?;
            if self.exists(record)? {
                self.update_row(record)?;
            } else {
                self.insert_row(record)?;
            }
            tx.commit()?;
            count += 1;
        }
        Ok(count)
    }

    /// Delete records by uuid. Returns the number of delete statements
    /// executed, whether or not a row matched.
    pub fn delete<R: CatalogRecord>(&self, records: &[R]) -> StoreResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE json_extract({}, '$.uuid') = ?1",
            R::TABLE,
            R::COLUMN
        );
        let mut count = 0;
        for record in records {
            self.conn.execute(&sql, params![record.uuid().to_string()])?;
            count += 1;
        }
        Ok(count)
    }

    /// Find image records matching every set filter.
    pub fn find_images(&self, query: &ImageQuery) -> StoreResult<Vec<ImageRecord>> {
        let mut clauses: Vec<(&str, String)> = Vec::new();
        if let Some(uuid) = query.uuid {
            clauses.push(("uuid", uuid.to_string()));
        }
        if let Some(name) = &query.name {
            clauses.push(("name", name.clone()));
        }
        if let Some(runtime_id) = &query.runtime_id {
            clauses.push(("runtime_id", runtime_id.clone()));
        }
        if let Some(tag) = &query.tag {
            clauses.push(("tag", tag.clone()));
        }
        self.find_rows(&clauses, query.limit)
    }

    /// Find container records matching every set filter.
    pub fn find_containers(&self, query: &ContainerQuery) -> StoreResult<Vec<ContainerRecord>> {
        let mut clauses: Vec<(&str, String)> = Vec::new();
        if let Some(uuid) = query.uuid {
            clauses.push(("uuid", uuid.to_string()));
        }
        if let Some(name) = &query.name {
            clauses.push(("name", name.clone()));
        }
        if let Some(runtime_id) = &query.runtime_id {
            clauses.push(("runtime_id", runtime_id.clone()));
        }
        self.find_rows(&clauses, query.limit)
    }

    fn insert_row<R: CatalogRecord>(&self, record: &R) -> StoreResult<()> {
        let doc = serde_json::to_string(record)?;
        let sql = format!("INSERT INTO {} ({}) VALUES (?1)", R::TABLE, R::COLUMN);
        self.conn.execute(&sql, params![doc])?;
        Ok(())
    }

    fn update_row<R: CatalogRecord>(&self, record: &R) -> StoreResult<()> {
        let doc = serde_json::to_string(record)?;
        let clauses = record.key_clauses();
        let wheres = key_where_offset(R::COLUMN, &clauses, 2);
        let sql = format!("UPDATE {} SET {} = ?1 WHERE {}", R::TABLE, R::COLUMN, wheres);

        let mut params: Vec<Value> = vec![Value::Text(doc)];
        params.extend(clauses.into_iter().map(|(_, value)| Value::Text(value)));
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    fn find_rows<R: CatalogRecord>(
        &self,
        clauses: &[(&str, String)],
        limit: u32,
    ) -> StoreResult<Vec<R>> {
        let mut sql = format!("SELECT {} FROM {}", R::COLUMN, R::TABLE);
        let mut params: Vec<Value> = Vec::new();

        if !clauses.is_empty() {
            let wheres: Vec<String> = clauses
                .iter()
                .enumerate()
                .map(|(i, (field, _))| {
                    format!("json_extract({}, '$.{}') = ?{}", R::COLUMN, field, i + 1)
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
            params.extend(clauses.iter().map(|(_, value)| Value::Text(value.clone())));
        }

        if limit != 0 {
            sql.push_str(&format!(" LIMIT ?{}", params.len() + 1));
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }
}

fn key_where(column: &str, clauses: &[(&'static str, String)]) -> String {
    key_where_offset(column, clauses, 1)
}

fn key_where_offset(column: &str, clauses: &[(&'static str, String)], first: usize) -> String {
    clauses
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("json_extract({}, '$.{}') = ?{}", column, field, i + first))
        .collect::<Vec<_>>()
        .join(" AND ")
}
