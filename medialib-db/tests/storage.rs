use medialib_db::schema::table_exists;
use medialib_db::storage::{create_storage_table, drop_storage_table, storage_set_version};
use medialib_db::*;
use rusqlite::Connection;

fn sd_card(id: &str) -> NewStorage {
    NewStorage {
        storage_id: id.to_string(),
        name: format!("Card {id}"),
        root_path: format!("/mnt/{id}"),
        kind: StorageKind::External,
    }
}

fn insert_media(conn: &Connection, storage_id: &str, media_id: &str, path: &str) {
    let mut media = MediaRecord::new(storage_id, "folder", path).unwrap();
    media.media_id = media_id.to_string();
    conn.execute_batch(&media::render_insert_media(&media).unwrap())
        .unwrap();
}

#[test]
fn register_creates_table_and_record() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();

    let record = register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    assert_eq!(record.root_path, "/mnt/sd");
    assert!(record.validity);
    assert_eq!(record.scan_status, ScanStatus::Idle);
    assert!(table_exists(&conn, "media_sd").unwrap());
    assert_eq!(list_storages(&conn).unwrap().len(), 1);
}

#[test]
fn registering_again_revalidates() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    set_storage_validity(&conn, "sd", false).unwrap();

    let mut again = sd_card("sd");
    again.name = "Renamed".into();
    let record = register_storage(&conn, &registry, &again).unwrap();
    assert!(record.validity);
    assert_eq!(record.name, "Renamed");
}

#[test]
fn union_view_follows_table_create_and_drop() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    create_storage_table(&conn, &registry, "sd").unwrap();

    insert_media(&conn, "sd", "m1", "/mnt/sd/p.jpg");
    rebuild_union_view(&conn, &registry).unwrap();
    assert_eq!(get_media(&conn, "m1").unwrap().path, "/mnt/sd/p.jpg");

    drop_storage_table(&conn, "sd").unwrap();
    let report = rebuild_union_view(&conn, &registry).unwrap();
    assert_eq!(report.skipped, vec!["sd".to_string()]);
    assert!(matches!(get_media(&conn, "m1"), Err(DbError::NotFound { .. })));
    assert_eq!(count_media(&conn).unwrap(), 0);
}

#[test]
fn soft_detach_hides_rows_without_touching_them() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    ensure_union_view(&conn, &registry).unwrap();
    insert_media(&conn, "sd", "m1", "/mnt/sd/a.jpg");
    insert_media(&conn, "sd", "m2", "/mnt/sd/b.jpg");
    assert_eq!(count_media(&conn).unwrap(), 2);

    set_storage_validity(&conn, "sd", false).unwrap();
    assert!(ensure_union_view(&conn, &registry).unwrap());
    assert_eq!(count_media(&conn).unwrap(), 0);
    assert!(table_exists(&conn, "media_sd").unwrap());
    let raw: i64 = conn
        .query_row("SELECT COUNT(*) FROM \"media_sd\"", [], |row| row.get(0))
        .unwrap();
    assert_eq!(raw, 2);

    set_storage_validity(&conn, "sd", true).unwrap();
    assert!(ensure_union_view(&conn, &registry).unwrap());
    assert_eq!(get_media(&conn, "m1").unwrap().path, "/mnt/sd/a.jpg");
    assert_eq!(get_media(&conn, "m2").unwrap().path, "/mnt/sd/b.jpg");
}

#[test]
fn view_is_rebuilt_only_when_storage_set_changes() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    assert!(!ensure_union_view(&conn, &registry).unwrap());

    let before = storage_set_version(&conn).unwrap();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    assert!(storage_set_version(&conn).unwrap() > before);
    assert!(ensure_union_view(&conn, &registry).unwrap());
    assert!(!ensure_union_view(&conn, &registry).unwrap());

    // Scan status is not part of the storage set.
    set_storage_scan_status(&conn, "sd", ScanStatus::Processing).unwrap();
    assert!(!ensure_union_view(&conn, &registry).unwrap());
}

#[test]
fn remove_storage_drops_everything_it_owned() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    register_storage(&conn, &registry, &sd_card("usb")).unwrap();
    ensure_union_view(&conn, &registry).unwrap();

    let roots = VolumeRoots::from_storages(&conn).unwrap();
    let folder = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM").unwrap();
    insert_media(&conn, "sd", "m1", "/mnt/sd/DCIM/a.jpg");
    insert_media(&conn, "usb", "m2", "/mnt/usb/b.jpg");
    add_tag(&conn, "m1", "beach").unwrap();

    remove_storage(&conn, "sd").unwrap();
    ensure_union_view(&conn, &registry).unwrap();

    assert!(!table_exists(&conn, "media_sd").unwrap());
    assert!(matches!(get_storage(&conn, "sd"), Err(DbError::NotFound { .. })));
    assert!(get_folder(&conn, &folder).is_err());
    assert!(list_tags(&conn).unwrap().is_empty());
    assert_eq!(count_media(&conn).unwrap(), 1);
    assert_eq!(get_media(&conn, "m2").unwrap().storage_id, "usb");
}

#[test]
fn internal_storage_is_protected() {
    let conn = open_memory().unwrap();
    assert!(matches!(
        remove_storage(&conn, INTERNAL_STORAGE_ID),
        Err(DbError::InvalidParameter(_))
    ));
    assert!(drop_storage_table(&conn, INTERNAL_STORAGE_ID).is_err());
    assert!(table_exists(&conn, "media").unwrap());
}

#[test]
fn bad_storage_ids_are_rejected_before_any_write() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    let bad = sd_card("x\"; DROP TABLE folder; --");
    assert!(matches!(
        register_storage(&conn, &registry, &bad),
        Err(DbError::InvalidParameter(_))
    ));
    assert!(list_storages(&conn).unwrap().is_empty());
    assert!(table_exists(&conn, "folder").unwrap());
}

#[test]
fn storage_ids_differing_only_in_case_are_rejected() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(&conn, &registry, &sd_card("sd")).unwrap();
    insert_media(&conn, "sd", "m1", "/mnt/sd/a.jpg");

    assert!(matches!(
        register_storage(&conn, &registry, &sd_card("SD")),
        Err(DbError::InvalidParameter(_))
    ));
    assert!(matches!(
        remove_storage(&conn, "SD"),
        Err(DbError::NotFound { .. })
    ));

    assert!(table_exists(&conn, "media_sd").unwrap());
    assert_eq!(list_storages(&conn).unwrap().len(), 1);
    let kept: i64 = conn
        .query_row("SELECT COUNT(*) FROM \"media_sd\"", [], |row| row.get(0))
        .unwrap();
    assert_eq!(kept, 1);
}

#[test]
fn storage_ids_naming_catalog_objects_are_rejected() {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    ensure_union_view(&conn, &registry).unwrap();

    for id in ["view", "VIEW"] {
        assert!(matches!(
            register_storage(&conn, &registry, &sd_card(id)),
            Err(DbError::InvalidParameter(_))
        ));
    }
    assert!(list_storages(&conn).unwrap().is_empty());
    assert_eq!(count_media(&conn).unwrap(), 0);
}
