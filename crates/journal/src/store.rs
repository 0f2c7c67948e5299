//! SQLite journal backend.

use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::key::{Entity, Key};
use crate::query::{FilterOp, Query, QueryPage, encode_cursor, project};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// SQLite-based journal. Entities are stored as JSON text.
pub struct SqliteJournal {
    pool: Pool<Sqlite>,
}

impl SqliteJournal {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> JournalResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Writers wait rather than fail with "database is locked".
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        let journal = Self { pool };
        journal.migrate().await?;
        tracing::debug!(path = %path.display(), "opened sqlite journal");
        Ok(journal)
    }

    /// Apply the schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> JournalResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    fn decode_row(key: Key, data: &str) -> JournalResult<Entity> {
        let data: Value = serde_json::from_str(data)?;
        Ok(Entity::new(key, data))
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

#[async_trait]
impl Journal for SqliteJournal {
    async fn get(&self, key: &Key) -> JournalResult<Option<Entity>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data FROM entities WHERE namespace = ? AND kind = ? AND name = ?",
        )
        .bind(&key.namespace)
        .bind(&key.kind)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data,)| Self::decode_row(key.clone(), &data))
            .transpose()
    }

    async fn save(&self, entity: &Entity) -> JournalResult<()> {
        let data = serde_json::to_string(&entity.data)?;
        sqlx::query(
            "INSERT INTO entities (namespace, kind, name, data, updated_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(namespace, kind, name) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&entity.key.namespace)
        .bind(&entity.key.kind)
        .bind(&entity.key.name)
        .bind(data)
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, entity: &Entity) -> JournalResult<()> {
        let data = serde_json::to_string(&entity.data)?;
        let result = sqlx::query(
            "INSERT INTO entities (namespace, kind, name, data, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entity.key.namespace)
        .bind(&entity.key.kind)
        .bind(&entity.key.name)
        .bind(data)
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(JournalError::AlreadyExists(entity.key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &Key) -> JournalResult<bool> {
        let result =
            sqlx::query("DELETE FROM entities WHERE namespace = ? AND kind = ? AND name = ?")
                .bind(&key.namespace)
                .bind(&key.kind)
                .bind(&key.name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn run_query(&self, query: &Query) -> JournalResult<QueryPage> {
        let start = query.validate()?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT name, data FROM entities WHERE namespace = ");
        qb.push_bind(&query.namespace);
        qb.push(" AND kind = ");
        qb.push_bind(&query.kind);
        if let Some(start) = &start {
            qb.push(" AND name > ");
            qb.push_bind(start.clone());
        }

        for filter in &query.filters {
            let path = json_path(&filter.field);
            let value = serde_json::to_string(&filter.value)?;
            match filter.op {
                FilterOp::Eq => {
                    qb.push(" AND json_extract(data, ");
                    qb.push_bind(path);
                    qb.push(") = json_extract(");
                    qb.push_bind(value);
                    qb.push(", '$')");
                }
                FilterOp::Contains => {
                    // json_each yields array elements, or the scalar itself.
                    qb.push(" AND EXISTS (SELECT 1 FROM json_each(entities.data, ");
                    qb.push_bind(path);
                    qb.push(") AS je WHERE je.value = json_extract(");
                    qb.push_bind(value);
                    qb.push(", '$'))");
                }
                FilterOp::Prefix => {
                    let prefix = filter.value.as_str().unwrap_or_default().to_string();
                    qb.push(" AND json_type(data, ");
                    qb.push_bind(path.clone());
                    qb.push(") = 'text' AND substr(json_extract(data, ");
                    qb.push_bind(path);
                    qb.push("), 1, ");
                    qb.push_bind(prefix.chars().count() as i64);
                    qb.push(") = ");
                    qb.push_bind(prefix);
                }
            }
        }

        qb.push(" ORDER BY name");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind((limit + 1) as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut entities = Vec::with_capacity(rows.len());
        let mut more = false;
        for row in rows {
            if query.limit.is_some_and(|limit| entities.len() == limit) {
                more = true;
                break;
            }
            let name: String = row.try_get("name")?;
            let data: String = row.try_get("data")?;
            let key = Key::new(&query.namespace, &query.kind, name);
            let mut entity = Self::decode_row(key, &data)?;
            entity.data = project(entity.data, query.select.as_deref());
            entities.push(entity);
        }

        let end_cursor = if more {
            entities.last().map(|e| encode_cursor(&e.key.name))
        } else {
            None
        };
        Ok(QueryPage {
            entities,
            end_cursor,
        })
    }

    async fn health_check(&self) -> JournalResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    namespace TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, kind, name)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open() -> (tempfile::TempDir, SqliteJournal) {
        let dir = tempfile::tempdir().unwrap();
        let journal = SqliteJournal::new(dir.path().join("journal.db"), 1)
            .await
            .unwrap();
        (dir, journal)
    }

    fn entity(name: &str, data: Value) -> Entity {
        Entity::new(Key::new("seismic-store-t-s", "datasets", name), data)
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, journal) = open().await;
        journal.migrate().await.unwrap();
        journal.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_maps_unique_violation() {
        let (_dir, journal) = open().await;
        let e = entity("/d1", json!({"name": "d1"}));
        journal.insert(&e).await.unwrap();
        let err = journal.insert(&e).await.unwrap_err();
        assert!(matches!(err, JournalError::AlreadyExists(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let (_dir, journal) = open().await;
        let e = entity("/d1", json!({"name": "d1", "gtags": ["a"]}));
        journal.save(&e).await.unwrap();
        journal
            .save(&entity("/d1", json!({"name": "d1", "gtags": ["b"]})))
            .await
            .unwrap();

        let got = journal.get(&e.key).await.unwrap().unwrap();
        assert_eq!(got.data["gtags"], json!(["b"]));

        assert!(journal.delete(&e.key).await.unwrap());
        assert!(journal.get(&e.key).await.unwrap().is_none());
        assert!(!journal.delete(&e.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_filters_match_memory_semantics() {
        let (_dir, journal) = open().await;
        journal
            .save(&entity("/a/d1", json!({"path": "/a/", "gtags": ["x", "y"], "readonly": false})))
            .await
            .unwrap();
        journal
            .save(&entity("/a/b/d2", json!({"path": "/a/b/", "gtags": ["y"], "readonly": true})))
            .await
            .unwrap();
        journal
            .save(&entity("/c/d3", json!({"path": "/c/", "gtags": []})))
            .await
            .unwrap();

        let names = |page: QueryPage| -> Vec<String> {
            page.entities.into_iter().map(|e| e.key.name).collect()
        };

        let q = Query::new("seismic-store-t-s", "datasets").filter("path", FilterOp::Eq, "/a/");
        assert_eq!(names(journal.run_query(&q).await.unwrap()), vec!["/a/d1"]);

        let q = Query::new("seismic-store-t-s", "datasets").filter("gtags", FilterOp::Contains, "y");
        assert_eq!(
            names(journal.run_query(&q).await.unwrap()),
            vec!["/a/b/d2", "/a/d1"]
        );

        let q = Query::new("seismic-store-t-s", "datasets").filter("path", FilterOp::Prefix, "/a/");
        assert_eq!(
            names(journal.run_query(&q).await.unwrap()),
            vec!["/a/b/d2", "/a/d1"]
        );

        let q = Query::new("seismic-store-t-s", "datasets").filter("readonly", FilterOp::Eq, true);
        assert_eq!(names(journal.run_query(&q).await.unwrap()), vec!["/a/b/d2"]);
    }

    #[tokio::test]
    async fn test_pagination_cursor() {
        let (_dir, journal) = open().await;
        for i in 0..5 {
            journal
                .save(&entity(&format!("/d{i}"), json!({"n": i})))
                .await
                .unwrap();
        }

        let base = Query::new("seismic-store-t-s", "datasets").limit(2);
        let first = journal.run_query(&base).await.unwrap();
        assert_eq!(first.entities.len(), 2);
        let cursor = first.end_cursor.unwrap();

        let second = journal.run_query(&base.clone().start(cursor)).await.unwrap();
        assert_eq!(second.entities[0].key.name, "/d2");

        let last = journal
            .run_query(&base.clone().start(second.end_cursor.unwrap()))
            .await
            .unwrap();
        assert_eq!(last.entities.len(), 1);
        assert!(last.end_cursor.is_none());
    }
}
