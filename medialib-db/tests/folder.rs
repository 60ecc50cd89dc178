use medialib_db::*;
use rusqlite::Connection;

fn setup() -> (Connection, VolumeRoots) {
    let conn = open_memory().unwrap();
    let registry = SchemaRegistry::standard();
    register_storage(
        &conn,
        &registry,
        &NewStorage {
            storage_id: "sd".into(),
            name: "SD".into(),
            root_path: "/mnt/sd".into(),
            kind: StorageKind::External,
        },
    )
    .unwrap();
    ensure_union_view(&conn, &registry).unwrap();
    let roots = VolumeRoots::from_storages(&conn).unwrap();
    (conn, roots)
}

fn folder_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM folder", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn every_created_folder_reaches_the_volume_root() {
    let (conn, roots) = setup();
    let leaf = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM/2024/trip").unwrap();
    assert_eq!(folder_count(&conn), 4);

    let mut seen = vec![];
    let mut current = get_folder(&conn, &leaf).unwrap();
    while let Some(parent) = current.parent_folder_id.clone() {
        seen.push(current.path.clone());
        assert!(seen.len() < 10, "parent chain does not terminate");
        let next = get_folder(&conn, &parent).unwrap();
        assert_eq!(next.storage_id, "sd");
        current = next;
    }
    assert_eq!(current.path, "/mnt/sd");
    assert_eq!(
        seen,
        vec!["/mnt/sd/DCIM/2024/trip", "/mnt/sd/DCIM/2024", "/mnt/sd/DCIM"]
    );
}

#[test]
fn resolving_twice_returns_the_same_row() {
    let (conn, roots) = setup();
    let first = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM").unwrap();
    let second = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM/").unwrap();
    assert_eq!(first, second);
    assert_eq!(folder_count(&conn), 2);

    // A sibling reuses the existing parent.
    let sibling = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/Music").unwrap();
    let sibling = get_folder(&conn, &sibling).unwrap();
    let root = find_folder_by_path(&conn, "sd", "/mnt/sd").unwrap().unwrap();
    assert_eq!(sibling.parent_folder_id.as_deref(), Some(root.folder_id.as_str()));
    assert_eq!(list_child_folders(&conn, &root.folder_id).unwrap().len(), 2);
}

#[test]
fn stale_folder_is_revalidated() {
    let (conn, roots) = setup();
    let id = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM").unwrap();
    set_folder_validity(&conn, &id, false).unwrap();
    assert!(!get_folder(&conn, &id).unwrap().validity);

    assert_eq!(get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM").unwrap(), id);
    assert!(get_folder(&conn, &id).unwrap().validity);
}

#[test]
fn revalidating_a_folder_revalidates_its_ancestors() {
    let (conn, roots) = setup();
    let deep = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/a/b/c").unwrap();
    let other = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/ab").unwrap();
    conn.execute("UPDATE folder SET validity = 0", []).unwrap();

    get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/a/b/c").unwrap();
    for path in ["/mnt/sd", "/mnt/sd/a", "/mnt/sd/a/b"] {
        let folder = find_folder_by_path(&conn, "sd", path).unwrap().unwrap();
        assert!(folder.validity, "{path} should be valid again");
    }
    assert!(get_folder(&conn, &deep).unwrap().validity);
    assert!(!get_folder(&conn, &other).unwrap().validity);
}

#[test]
fn path_outside_the_volume_fails_without_writes() {
    let (conn, roots) = setup();
    for path in ["/mnt/sdcard/x", "/home/user", "relative/path"] {
        assert!(matches!(
            get_or_create_folder(&conn, &roots, "sd", path),
            Err(DbError::InvalidParameter(_))
        ));
    }
    assert!(get_or_create_folder(&conn, &roots, "unknown", "/mnt/sd/x").is_err());
    assert_eq!(folder_count(&conn), 0);
}

#[test]
fn missing_parent_link_is_repaired_on_lookup() {
    let (conn, roots) = setup();
    conn.execute_batch(
        "INSERT INTO folder (folder_id, path, name, storage_id) VALUES ('old-root', '/mnt/sd', 'sd', 'sd');
         INSERT INTO folder (folder_id, path, name, storage_id) VALUES ('old-dcim', '/mnt/sd/DCIM', 'DCIM', 'sd');
         INSERT INTO folder (folder_id, path, name, storage_id) VALUES ('old-deep', '/mnt/sd/DCIM/a/b', 'b', 'sd');",
    )
    .unwrap();

    assert_eq!(
        get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM").unwrap(),
        "old-dcim"
    );
    assert_eq!(
        get_folder(&conn, "old-dcim").unwrap().parent_folder_id.as_deref(),
        Some("old-root")
    );

    // Repair creates the missing intermediate folder.
    get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/DCIM/a/b").unwrap();
    let deep = get_folder(&conn, "old-deep").unwrap();
    let middle = get_folder(&conn, deep.parent_folder_id.as_deref().unwrap()).unwrap();
    assert_eq!(middle.path, "/mnt/sd/DCIM/a");
    assert_eq!(middle.parent_folder_id.as_deref(), Some("old-dcim"));
    assert_eq!(get_folder(&conn, "old-root").unwrap().parent_folder_id, None);
}

#[test]
fn rename_moves_the_subtree_and_its_media() {
    let (conn, roots) = setup();
    let a = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/a").unwrap();
    let b = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/a/b").unwrap();
    let mut media = MediaRecord::new("sd", &b, "/mnt/sd/a/b/x.jpg").unwrap();
    media.media_id = "m1".into();
    conn.execute_batch(&media::render_insert_media(&media).unwrap())
        .unwrap();
    let mut outside = MediaRecord::new("sd", &a, "/mnt/sd/ab.jpg").unwrap();
    outside.media_id = "m2".into();
    conn.execute_batch(&media::render_insert_media(&outside).unwrap())
        .unwrap();

    rename_folder(&conn, &roots, &a, "/mnt/sd/archive/z").unwrap();

    let moved = get_folder(&conn, &a).unwrap();
    assert_eq!(moved.path, "/mnt/sd/archive/z");
    assert_eq!(moved.name, "z");
    let archive = find_folder_by_path(&conn, "sd", "/mnt/sd/archive").unwrap().unwrap();
    assert_eq!(moved.parent_folder_id.as_deref(), Some(archive.folder_id.as_str()));

    assert_eq!(get_folder(&conn, &b).unwrap().path, "/mnt/sd/archive/z/b");
    assert_eq!(get_media(&conn, "m1").unwrap().path, "/mnt/sd/archive/z/b/x.jpg");
    assert_eq!(get_media(&conn, "m2").unwrap().path, "/mnt/sd/ab.jpg");
}

#[test]
fn rename_leaves_a_case_twin_alone() {
    let (conn, roots) = setup();
    let upper = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/Photos").unwrap();
    let twin = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/photos/deep").unwrap();
    let mut media = MediaRecord::new("sd", &twin, "/mnt/sd/photos/deep/x.jpg").unwrap();
    media.media_id = "m1".into();
    conn.execute_batch(&media::render_insert_media(&media).unwrap())
        .unwrap();

    rename_folder(&conn, &roots, &upper, "/mnt/sd/Album").unwrap();

    assert_eq!(get_folder(&conn, &upper).unwrap().path, "/mnt/sd/Album");
    assert_eq!(get_folder(&conn, &twin).unwrap().path, "/mnt/sd/photos/deep");
    assert_eq!(get_media(&conn, "m1").unwrap().path, "/mnt/sd/photos/deep/x.jpg");
}

#[test]
fn rename_rejects_bad_targets() {
    let (conn, roots) = setup();
    let a = get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/a").unwrap();
    get_or_create_folder(&conn, &roots, "sd", "/mnt/sd/b").unwrap();
    let root = find_folder_by_path(&conn, "sd", "/mnt/sd").unwrap().unwrap();

    assert!(rename_folder(&conn, &roots, &a, "/mnt/sd/b").is_err());
    assert!(rename_folder(&conn, &roots, &a, "/mnt/sd/a/inner").is_err());
    assert!(rename_folder(&conn, &roots, &a, "/elsewhere/a").is_err());
    assert!(rename_folder(&conn, &roots, &root.folder_id, "/mnt/sd/r").is_err());
    assert_eq!(get_folder(&conn, &a).unwrap().path, "/mnt/sd/a");
}

#[test]
fn render_insert_folder_is_executable() {
    let (conn, _) = setup();
    let record = FolderRecord {
        folder_id: "f-1".into(),
        path: "/mnt/sd/it's".into(),
        name: "it's".into(),
        storage_id: "sd".into(),
        parent_folder_id: None,
        modified_time: 7,
        validity: true,
        scan_status: ScanStatus::Idle,
    };
    conn.execute_batch(&folder::render_insert_folder(&record).unwrap())
        .unwrap();
    assert_eq!(get_folder(&conn, "f-1").unwrap(), record);
}
