//! In-process journal backend.

use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::key::{Entity, Key};
use crate::query::{Query, QueryPage, encode_cursor, project};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tokio::sync::RwLock;

/// Journal backed by an ordered map. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryJournal {
    entities: RwLock<BTreeMap<Key, Value>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn get(&self, key: &Key) -> JournalResult<Option<Entity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(key)
            .map(|data| Entity::new(key.clone(), data.clone())))
    }

    async fn save(&self, entity: &Entity) -> JournalResult<()> {
        self.entities
            .write()
            .await
            .insert(entity.key.clone(), entity.data.clone());
        Ok(())
    }

    async fn insert(&self, entity: &Entity) -> JournalResult<()> {
        match self.entities.write().await.entry(entity.key.clone()) {
            Entry::Occupied(_) => Err(JournalError::AlreadyExists(entity.key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(entity.data.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &Key) -> JournalResult<bool> {
        Ok(self.entities.write().await.remove(key).is_some())
    }

    async fn run_query(&self, query: &Query) -> JournalResult<QueryPage> {
        let start = query.validate()?;
        let entities = self.entities.read().await;

        let lower = Key::new(&query.namespace, &query.kind, start.clone().unwrap_or_default());
        let mut matched = entities
            .range(lower..)
            .take_while(|(key, _)| key.namespace == query.namespace && key.kind == query.kind)
            .filter(|(key, _)| start.as_deref().is_none_or(|s| key.name.as_str() > s))
            .filter(|(_, data)| query.filters.iter().all(|f| f.matches(data)));

        let mut page = Vec::new();
        let mut more = false;
        for (key, data) in matched.by_ref() {
            if query.limit.is_some_and(|limit| page.len() == limit) {
                more = true;
                break;
            }
            page.push(Entity::new(
                key.clone(),
                project(data.clone(), query.select.as_deref()),
            ));
        }

        let end_cursor = if more {
            page.last().map(|e| encode_cursor(&e.key.name))
        } else {
            None
        };
        Ok(QueryPage {
            entities: page,
            end_cursor,
        })
    }

    async fn health_check(&self) -> JournalResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterOp;
    use serde_json::json;

    fn entity(name: &str, data: Value) -> Entity {
        Entity::new(Key::new("ns", "datasets", name), data)
    }

    #[tokio::test]
    async fn test_insert_conflicts_and_save_overwrites() {
        let journal = MemoryJournal::new();
        let e = entity("/a/d1", json!({"v": 1}));
        journal.insert(&e).await.unwrap();
        assert!(matches!(
            journal.insert(&e).await,
            Err(JournalError::AlreadyExists(_))
        ));

        journal.save(&entity("/a/d1", json!({"v": 2}))).await.unwrap();
        let got = journal.get(&e.key).await.unwrap().unwrap();
        assert_eq!(got.data, json!({"v": 2}));

        assert!(journal.delete(&e.key).await.unwrap());
        assert!(!journal.delete(&e.key).await.unwrap());
        assert!(journal.is_empty().await);
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_namespace_and_kind() {
        let journal = MemoryJournal::new();
        journal.save(&entity("a", json!({}))).await.unwrap();
        journal
            .save(&Entity::new(Key::new("ns", "subprojects", "b"), json!({})))
            .await
            .unwrap();
        journal
            .save(&Entity::new(Key::new("ns2", "datasets", "c"), json!({})))
            .await
            .unwrap();

        let page = journal.run_query(&Query::new("ns", "datasets")).await.unwrap();
        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.entities[0].key.name, "a");
        assert!(page.end_cursor.is_none());
    }

    #[tokio::test]
    async fn test_query_pages_through_filtered_results() {
        let journal = MemoryJournal::new();
        for i in 0..7 {
            let tags = if i % 2 == 0 { json!(["even"]) } else { json!(["odd"]) };
            journal
                .save(&entity(&format!("d{i}"), json!({"gtags": tags, "n": i})))
                .await
                .unwrap();
        }

        let base = Query::new("ns", "datasets")
            .filter("gtags", FilterOp::Contains, "even")
            .limit(2);
        let mut names = Vec::new();
        let mut query = base.clone();
        loop {
            let page = journal.run_query(&query).await.unwrap();
            names.extend(page.entities.into_iter().map(|e| e.key.name));
            match page.end_cursor {
                Some(cursor) => query = base.clone().start(cursor),
                None => break,
            }
        }
        assert_eq!(names, vec!["d0", "d2", "d4", "d6"]);
    }

    #[tokio::test]
    async fn test_query_select_projects_fields() {
        let journal = MemoryJournal::new();
        journal
            .save(&entity("d", json!({"name": "d", "path": "/"})))
            .await
            .unwrap();
        let page = journal
            .run_query(&Query::new("ns", "datasets").select(["name"]))
            .await
            .unwrap();
        assert_eq!(page.entities[0].data, json!({"name": "d"}));
    }
}
