use std::sync::Arc;
use std::thread;

use medialib_db::settings::VolumeSettings;
use medialib_db::*;

fn sd_card() -> NewStorage {
    NewStorage {
        storage_id: "sd".into(),
        name: "SD".into(),
        root_path: "/mnt/sd".into(),
        kind: StorageKind::External,
    }
}

#[test]
fn concurrent_flushes_are_serialised() {
    let catalog = Arc::new(Catalog::open_in_memory(CatalogSettings::default()).unwrap());
    catalog.register_storage(&sd_card()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let dir = format!("/mnt/sd/thread{t}");
                let folder = catalog.resolve_folder("sd", &dir).unwrap();
                let mut session = BatchSession::begin(BatchKind::InsertItem, 25);
                for i in 0..25 {
                    let media =
                        MediaRecord::new("sd", &folder, &format!("{dir}/{i}.jpg")).unwrap();
                    session.insert_item(&media).unwrap();
                }
                catalog.flush(session).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().statements, 25);
    }
    assert_eq!(catalog.with_conn(count_media).unwrap(), 100);
    let folders: i64 = catalog
        .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM folder", [], |row| row.get(0))?))
        .unwrap();
    assert_eq!(folders, 5);
}

#[test]
fn storage_changes_refresh_the_view() {
    let catalog = Catalog::open_in_memory(CatalogSettings::default()).unwrap();
    catalog.register_storage(&sd_card()).unwrap();
    catalog
        .with_conn(|conn| {
            let media = MediaRecord::new("sd", "f", "/mnt/sd/a.jpg")?;
            conn.execute_batch(&media::render_insert_media(&media)?)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(catalog.with_conn(count_media).unwrap(), 1);

    catalog.set_storage_validity("sd", false).unwrap();
    assert_eq!(catalog.with_conn(count_media).unwrap(), 0);
    assert!(!catalog.refresh_union_view().unwrap());

    catalog.set_storage_validity("sd", true).unwrap();
    assert_eq!(catalog.with_conn(count_media).unwrap(), 1);

    catalog.remove_storage("sd").unwrap();
    assert_eq!(catalog.with_conn(count_media).unwrap(), 0);
    assert!(catalog.list_storages().unwrap().is_empty());
}

#[test]
fn configured_volumes_resolve_before_registration() {
    let settings = CatalogSettings {
        volumes: vec![VolumeSettings {
            storage_id: "usb".into(),
            name: "USB stick".into(),
            root: "/media/usb".into(),
            kind: StorageKind::External,
        }],
        ..CatalogSettings::default()
    };
    let catalog = Catalog::open_in_memory(settings).unwrap();
    assert_eq!(catalog.volume_roots().unwrap().len(), 1);

    let id = catalog.resolve_folder("usb", "/media/usb/photos").unwrap();
    let folder = catalog.with_conn(|conn| get_folder(conn, &id)).unwrap();
    assert_eq!(folder.path, "/media/usb/photos");
    assert!(folder.parent_folder_id.is_some());
}

#[test]
fn on_disk_catalog_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = CatalogSettings::default();
    settings.database.path = Some(dir.path().join("nested").join("catalog.db"));

    let catalog = Catalog::open(settings.clone()).unwrap();
    catalog.register_storage(&sd_card()).unwrap();
    assert_eq!(catalog.schema_version().unwrap(), LATEST_SCHEMA_VERSION);
    catalog.check_integrity().unwrap();
    catalog.close().unwrap();

    let catalog = Catalog::open(settings).unwrap();
    let storages = catalog.list_storages().unwrap();
    assert_eq!(storages.len(), 1);
    assert_eq!(storages[0].root_path, "/mnt/sd");
}

#[test]
fn settings_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medialib").join("settings.toml");

    let mut settings = CatalogSettings::default();
    settings.busy.max_attempts = 4;
    settings.batch.flush_threshold = 10;
    settings.thumbnails.default_assets = vec!["/usr/share/medialib/default.png".into()];
    settings.volumes.push(VolumeSettings {
        storage_id: "sd".into(),
        name: "SD".into(),
        root: "/mnt/sd".into(),
        kind: StorageKind::External,
    });
    settings.save(&path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = CatalogSettings::load(&path).unwrap();
    assert_eq!(loaded, settings);
    assert!(loaded.is_default_asset("/usr/share/medialib/default.png"));
    assert_eq!(loaded.batch_options().busy.max_attempts, 4);
}

#[test]
fn missing_settings_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = CatalogSettings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, CatalogSettings::default());
}

#[test]
fn malformed_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "[busy]\nmax_attempts = \"lots\"\n").unwrap();
    assert!(matches!(
        CatalogSettings::load(&path),
        Err(SettingsError::Parse { .. })
    ));
}
