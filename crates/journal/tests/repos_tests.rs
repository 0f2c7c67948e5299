//! Typed repository behaviour, run against every journal backend.

use sdms_core::{Acls, DatasetId, DatasetRecord, SubprojectRecord, TenantRecord};
use sdms_journal::{
    ContentMode, DatasetListing, DatasetRepo, Journal, JournalError, MemoryJournal,
    SqliteJournal, SubprojectRepo, TenantRepo,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Backend {
    name: &'static str,
    journal: Arc<dyn Journal>,
    _dir: Option<TempDir>,
}

async fn backends() -> Vec<Backend> {
    let dir = tempfile::tempdir().expect("tempdir");
    let sqlite = SqliteJournal::new(dir.path().join("journal.db"), 1)
        .await
        .expect("open sqlite journal");
    vec![
        Backend {
            name: "memory",
            journal: Arc::new(MemoryJournal::new()),
            _dir: None,
        },
        Backend {
            name: "sqlite",
            journal: Arc::new(sqlite),
            _dir: Some(dir),
        },
    ]
}

fn dataset(path: &str, name: &str, gtags: &[&str]) -> DatasetRecord {
    let id = DatasetId::new("tenanta", "subb", path, name).unwrap();
    let mut record = DatasetRecord::new(&id, "user@example.com");
    record.merge_gtags(gtags.iter().copied());
    record
}

#[tokio::test]
async fn test_tenant_roundtrip() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        let tenant = TenantRecord {
            name: "tenanta".to_string(),
            esd: "opendes.example.com".to_string(),
            gcpid: "project-a".to_string(),
            default_acls: "users.datalake.admins@opendes.example.com".to_string(),
        };

        journal.insert_tenant(&tenant).await.unwrap();
        let err = journal.insert_tenant(&tenant).await.unwrap_err();
        assert!(
            matches!(err, JournalError::AlreadyExists(_)),
            "{}: {err:?}",
            backend.name
        );

        assert_eq!(journal.get_tenant("tenanta").await.unwrap(), Some(tenant.clone()));
        assert_eq!(journal.list_tenants().await.unwrap(), vec![tenant]);
        assert!(journal.get_tenant("missing").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_subprojects_are_scoped_by_tenant() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        let sub = SubprojectRecord {
            tenant: "tenanta".to_string(),
            name: "subb".to_string(),
            admin: "owner@example.com".to_string(),
            acls: Acls {
                admins: vec!["admins@example.com".to_string()],
                viewers: vec![],
            },
            ltag: Some("legal-tag".to_string()),
            gcs_bucket: "tenanta-subb-bucket".to_string(),
            storage_class: None,
            storage_location: None,
            access_policy: Default::default(),
            enforce_key: false,
        };
        journal.insert_subproject(&sub).await.unwrap();

        let other = SubprojectRecord {
            tenant: "tenantz".to_string(),
            ..sub.clone()
        };
        journal.insert_subproject(&other).await.unwrap();

        assert_eq!(journal.list_subprojects("tenanta").await.unwrap(), vec![sub.clone()]);
        assert!(journal.delete_subproject("tenanta", "subb").await.unwrap());
        assert!(journal.get_subproject("tenanta", "subb").await.unwrap().is_none());
        assert!(journal.get_subproject("tenantz", "subb").await.unwrap().is_some(), "{}", backend.name);
    }
}

#[tokio::test]
async fn test_same_name_in_different_paths_does_not_collide() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        journal.insert_dataset(&dataset("/x/", "y.seg", &[])).await.unwrap();
        journal.insert_dataset(&dataset("/z/", "y.seg", &[])).await.unwrap();

        let err = journal
            .insert_dataset(&dataset("/x/", "y.seg", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::AlreadyExists(_)), "{}", backend.name);

        let id = DatasetId::new("tenanta", "subb", "/x/", "y.seg").unwrap();
        assert!(journal.dataset_exists(&id).await.unwrap());
        assert!(journal.delete_dataset(&id).await.unwrap());
        assert!(!journal.dataset_exists(&id).await.unwrap());
    }
}

#[tokio::test]
async fn test_list_datasets_pages_and_filters_by_gtags() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        for i in 0..5 {
            let tags: &[&str] = if i % 2 == 0 { &["raw", "2024"] } else { &["raw"] };
            journal
                .save_dataset(&dataset("/a/", &format!("d{i}"), tags))
                .await
                .unwrap();
        }

        let mut listing = DatasetListing {
            limit: Some(2),
            ..Default::default()
        };
        let mut names = Vec::new();
        loop {
            let page = journal.list_datasets("tenanta", "subb", &listing).await.unwrap();
            names.extend(page.datasets.into_iter().map(|d| d.name));
            match page.next_cursor {
                Some(cursor) => listing.cursor = Some(cursor),
                None => break,
            }
        }
        assert_eq!(names, vec!["d0", "d1", "d2", "d3", "d4"], "{}", backend.name);

        let tagged = DatasetListing {
            gtags: vec!["raw".to_string(), "2024".to_string()],
            ..Default::default()
        };
        let page = journal.list_datasets("tenanta", "subb", &tagged).await.unwrap();
        let names: Vec<_> = page.datasets.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["d0", "d2", "d4"], "{}", backend.name);
        assert!(page.next_cursor.is_none());
    }
}

#[tokio::test]
async fn test_list_content_returns_datasets_and_directories() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        journal.save_dataset(&dataset("/a/", "top.seg", &[])).await.unwrap();
        journal.save_dataset(&dataset("/a/b/", "one", &[])).await.unwrap();
        journal.save_dataset(&dataset("/a/b/c/", "two", &[])).await.unwrap();
        journal.save_dataset(&dataset("/a/d/", "three", &[])).await.unwrap();
        journal.save_dataset(&dataset("/ab/", "other", &[])).await.unwrap();

        let content = journal
            .list_content("tenanta", "subb", "/a/", ContentMode::All)
            .await
            .unwrap();
        assert_eq!(content.datasets, vec!["top.seg"], "{}", backend.name);
        assert_eq!(content.directories, vec!["b/", "d/"], "{}", backend.name);

        let dirs_only = journal
            .list_content("tenanta", "subb", "/a/", ContentMode::Directories)
            .await
            .unwrap();
        assert!(dirs_only.datasets.is_empty());
        assert_eq!(dirs_only.directories.len(), 2);
    }
}

#[tokio::test]
async fn test_delete_all_datasets_only_touches_one_subproject() {
    for backend in backends().await {
        let journal = backend.journal.as_ref();
        for i in 0..3 {
            journal
                .save_dataset(&dataset("/", &format!("d{i}"), &[]))
                .await
                .unwrap();
        }
        let id = DatasetId::new("tenanta", "other", "/", "keep").unwrap();
        journal
            .save_dataset(&DatasetRecord::new(&id, "user@example.com"))
            .await
            .unwrap();

        assert_eq!(journal.delete_all_datasets("tenanta", "subb").await.unwrap(), 3);
        assert!(journal.dataset_exists(&id).await.unwrap(), "{}", backend.name);
    }
}
