//! Snapshot write and read tests against both backends.

mod common;

use common::{
    AUTHORS, CREATOR, EDITOR, MANAGERS, TestMetadata, TestResource, project, publish_date,
    run_metadata_test_both, title,
};
use quire_core::{ContentId, Property, ResourceState};
use quire_metadata::{MetadataError, RetentionManager, StaticDirectory};
use std::sync::Arc;
use time::macros::datetime;
use uuid::Uuid;

fn directory() -> Arc<StaticDirectory> {
    Arc::new(
        StaticDirectory::new()
            .with_user(CREATOR, "Admin")
            .with_user(EDITOR, "Editor")
            .with_group(AUTHORS, "Authors")
            .with_group(MANAGERS, "Project Managers"),
    )
}

#[tokio::test]
async fn test_read_backup_returns_header_and_content() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store).with_directory(directory());
        let page = TestResource::new("/sites/default/index.html");

        let mut snapshot = page.file(b"<h1>Hello</h1>");
        snapshot.state = ResourceState::New;
        snapshot.date_released = Some(datetime!(2024-02-01 0:00 UTC));
        let content_id = snapshot.content().unwrap().0;

        let outcome = manager
            .create_snapshot(&snapshot, &[], 4, publish_date(4), 10)
            .await
            .unwrap();
        assert_eq!(outcome.version_id, 1);

        let file = manager.read_backup(4, page.structure_id).await.unwrap();
        assert_eq!(file.header.backup_id, outcome.backup_id);
        assert_eq!(file.header.tag_id, 4);
        assert_eq!(file.header.root_path, "/sites/default/index.html");
        assert_eq!(file.header.state, ResourceState::New);
        assert_eq!(file.header.user_created_name, "Admin");
        assert_eq!(file.header.user_last_modified_name, "Editor");
        assert_eq!(file.header.date_published, publish_date(4));
        assert_eq!(file.header.date_released, Some(datetime!(2024-02-01 0:00 UTC)));
        assert_eq!(file.header.date_expired, None);
        assert_eq!(file.header.size, 14);
        assert_eq!(file.content_id, content_id);
        assert_eq!(file.content, b"<h1>Hello</h1>");

        let by_path = manager
            .read_backup_by_path(4, "/sites/default/index.html")
            .await
            .unwrap();
        assert_eq!(by_path.header.backup_id, outcome.backup_id);
    })
    .await;
}

#[tokio::test]
async fn test_folder_backup_has_no_content() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        let folder = TestResource::new("/sites/default/images/");

        manager
            .create_snapshot(&folder.folder(), &[], 1, publish_date(1), 10)
            .await
            .unwrap();

        let file = manager.read_backup(1, folder.structure_id).await.unwrap();
        assert_eq!(file.header.type_id, 0);
        assert!(file.content.is_empty());
        assert_eq!(file.content_id, ContentId::nil());
    })
    .await;
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        let page = TestResource::new("/missing.html");

        assert!(matches!(
            manager.read_backup(1, page.structure_id).await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            manager.read_backup_by_path(1, "/missing.html").await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            manager.read_project(1).await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            manager.read_property_definition("Title").await,
            Err(MetadataError::NotFound(_))
        ));

        // Present under another tag only.
        manager
            .create_snapshot(&page.file(b"x"), &[], 2, publish_date(2), 10)
            .await
            .unwrap();
        assert!(matches!(
            manager.read_backup(1, page.structure_id).await,
            Err(MetadataError::NotFound(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn test_failed_name_lookup_leaves_only_that_name_blank() {
    run_metadata_test_both(|store| async move {
        // Knows the creator but not the last modifier.
        let directory = Arc::new(StaticDirectory::new().with_user(CREATOR, "Admin"));
        let manager = RetentionManager::new(store).with_directory(directory);
        let page = TestResource::new("/names.html");

        manager
            .create_snapshot(&page.file(b"n"), &[], 1, publish_date(1), 10)
            .await
            .unwrap();

        let header = &manager.read_backup(1, page.structure_id).await.unwrap().header;
        assert_eq!(header.user_created_name, "Admin");
        assert_eq!(header.user_last_modified_name, "");
        assert_eq!(header.user_created, CREATOR);
        assert_eq!(header.user_last_modified, EDITOR);
    })
    .await;
}

#[tokio::test]
async fn test_list_latest_one_header_per_resource() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        let busy = TestResource::new("/busy.html");
        let quiet = TestResource::new("/quiet.html");

        manager
            .create_snapshot(&quiet.file(b"q"), &[], 1, publish_date(1), 10)
            .await
            .unwrap();
        for tag in 2..=4 {
            manager
                .create_snapshot(&busy.file(b"b"), &[], tag, publish_date(tag), 10)
                .await
                .unwrap();
        }
        // Republished under the same tag: the higher version wins.
        manager
            .create_snapshot(&busy.file(b"b2"), &[], 4, publish_date(4), 10)
            .await
            .unwrap();

        let latest = manager.list_headers(None).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].root_path, "/busy.html");
        assert_eq!(latest[0].tag_id, 4);
        assert_eq!(latest[0].version_id, 4);
        assert_eq!(latest[1].root_path, "/quiet.html");

        let history = manager
            .list_headers(Some(&busy.history_key()))
            .await
            .unwrap();
        let tags: Vec<i32> = history.iter().map(|h| h.tag_id).collect();
        assert_eq!(tags, vec![2, 3, 4, 4]);
    })
    .await;
}

#[tokio::test]
async fn test_properties_round_trip() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        manager.create_property_definition("Title").await.unwrap();
        manager.create_property_definition("Keywords").await.unwrap();
        let page = TestResource::new("/props.html");

        let properties = vec![
            title("Home", "Start"),
            Property::new("Keywords")
                .with_structure_value("")
                .with_resource_value("cms, history"),
        ];
        manager
            .create_snapshot(&page.file(b"p"), &properties, 1, publish_date(1), 10)
            .await
            .unwrap();

        let header = manager.read_backup(1, page.structure_id).await.unwrap().header;
        let stored = manager.read_properties(&header).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "Keywords");
        assert_eq!(stored[0].structure_value, None);
        assert_eq!(stored[0].resource_value.as_deref(), Some("cms, history"));
        assert_eq!(stored[1], title("Home", "Start"));
    })
    .await;
}

#[tokio::test]
async fn test_unknown_property_definition_rolls_back_write() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        let page = TestResource::new("/rollback.html");

        let err = manager
            .create_snapshot(&page.file(b"r"), &[title("a", "b")], 1, publish_date(1), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));

        assert!(manager.list_headers(None).await.unwrap().is_empty());
        assert_eq!(manager.max_tag(page.resource_id).await.unwrap(), 0);
        assert_eq!(manager.next_tag().await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_version_and_tag_counters() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store);
        let page = TestResource::new("/counters.html");

        assert_eq!(manager.next_tag().await.unwrap(), 1);
        assert_eq!(manager.max_version(page.resource_id).await.unwrap(), 0);

        for tag in [3, 5] {
            manager
                .create_snapshot(&page.file(b"c"), &[], tag, publish_date(tag), 10)
                .await
                .unwrap();
        }

        assert_eq!(manager.max_version(page.resource_id).await.unwrap(), 2);
        assert_eq!(manager.max_tag(page.resource_id).await.unwrap(), 5);
        assert_eq!(manager.next_tag().await.unwrap(), 6);
    })
    .await;
}

#[tokio::test]
async fn test_project_records() {
    run_metadata_test_both(|store| async move {
        let manager = RetentionManager::new(store).with_directory(directory());

        for tag in 1..=3 {
            let record = manager
                .write_project(tag, publish_date(tag), &project(&["/b.html", "/a.html"]), EDITOR)
                .await
                .unwrap();
            assert_eq!(record.owner_name, "Admin");
            assert_eq!(record.published_by_name, "Editor");
            assert_eq!(record.group_name, "Authors");
            assert_eq!(record.manager_group_name, "Project Managers");
        }

        let stored = manager.read_project(2).await.unwrap();
        assert_eq!(stored.name, "Offline");
        assert_eq!(stored.publish_date, publish_date(2));
        assert_eq!(stored.resources, vec!["/a.html", "/b.html"]);

        let listed = manager.list_projects().await.unwrap();
        let tags: Vec<i32> = listed.iter().map(|p| p.tag_id).collect();
        assert_eq!(tags, vec![3, 2, 1]);
        assert_eq!(listed[0].resources.len(), 2);

        assert_eq!(manager.tag_for_date(publish_date(2)).await.unwrap(), 2);
        assert_eq!(
            manager
                .tag_for_date(publish_date(2) + time::Duration::hours(12))
                .await
                .unwrap(),
            2
        );
        assert_eq!(manager.tag_for_date(publish_date(0)).await.unwrap(), 0);
        assert_eq!(manager.next_tag().await.unwrap(), 4);

        let err = manager
            .write_project(3, publish_date(3), &project(&[]), EDITOR)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
    })
    .await;
}

#[tokio::test]
async fn test_project_list_is_capped() {
    let metadata = TestMetadata::new().await.unwrap();
    let manager = RetentionManager::new(metadata.store())
        .with_directory(directory())
        .with_project_list_limit(2);

    for tag in 1..=4 {
        manager
            .write_project(tag, publish_date(tag), &project(&["/x.html"]), EDITOR)
            .await
            .unwrap();
    }

    let listed = manager.list_projects().await.unwrap();
    let tags: Vec<i32> = listed.iter().map(|p| p.tag_id).collect();
    assert_eq!(tags, vec![4, 3]);
    assert!(listed.iter().all(|p| p.resources == vec!["/x.html"]));
}

#[tokio::test]
async fn test_project_owner_must_resolve() {
    let metadata = TestMetadata::new().await.unwrap();
    // Groups are unknown, the owner is too.
    let directory = Arc::new(StaticDirectory::new().with_user(EDITOR, "Editor"));
    let manager = RetentionManager::new(metadata.store()).with_directory(directory);

    let err = manager
        .write_project(1, publish_date(1), &project(&[]), EDITOR)
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
    assert_eq!(metadata.count_rows("backup_projects").await, 0);

    let mut owned_by_editor = project(&[]);
    owned_by_editor.owner_id = EDITOR;
    let record = manager
        .write_project(1, publish_date(1), &owned_by_editor, Uuid::nil())
        .await
        .unwrap();
    assert_eq!(record.owner_name, "Editor");
    assert_eq!(record.published_by_name, "");
    assert_eq!(record.group_name, "");
}

#[tokio::test]
async fn test_unknown_state_code_is_consistency_error() {
    let metadata = TestMetadata::new().await.unwrap();
    let manager = RetentionManager::new(metadata.store());
    let page = TestResource::new("/corrupt.html");

    manager
        .create_snapshot(&page.file(b"c"), &[], 1, publish_date(1), 10)
        .await
        .unwrap();
    sqlx::query("UPDATE backup_structure SET structure_state = 9")
        .execute(metadata.pool())
        .await
        .unwrap();

    let err = manager.read_backup(1, page.structure_id).await.unwrap_err();
    assert!(matches!(err, MetadataError::Consistency(_)));
}

#[tokio::test]
async fn test_unknown_mapping_code_is_consistency_error() {
    let metadata = TestMetadata::new().await.unwrap();
    let manager = RetentionManager::new(metadata.store());
    manager.create_property_definition("Title").await.unwrap();
    let page = TestResource::new("/mapping.html");

    let outcome = manager
        .create_snapshot(&page.file(b"m"), &[title("s", "r")], 1, publish_date(1), 10)
        .await
        .unwrap();
    sqlx::query("UPDATE backup_properties SET property_mapping_type = 7 WHERE property_mapping_type = 2")
        .execute(metadata.pool())
        .await
        .unwrap();

    let header = manager.read_backup(1, page.structure_id).await.unwrap().header;
    assert_eq!(header.backup_id, outcome.backup_id);
    let err = manager.read_properties(&header).await.unwrap_err();
    assert!(matches!(err, MetadataError::Consistency(_)));
}
