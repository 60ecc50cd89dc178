use medialib_db::*;
use rusqlite::Connection;

fn with_media(ids: &[&str]) -> Connection {
    let conn = open_memory().unwrap();
    for id in ids {
        let mut media =
            MediaRecord::new(INTERNAL_STORAGE_ID, "f", &format!("/data/{id}.mp3")).unwrap();
        media.media_id = id.to_string();
        media.media_type = MediaType::Music;
        conn.execute_batch(&media::render_insert_media(&media).unwrap())
            .unwrap();
    }
    conn
}

#[test]
fn albums_are_unique_per_name_and_artist() {
    let conn = open_memory().unwrap();
    let a = get_or_create_album(&conn, "Blue", Some("Joni")).unwrap();
    let b = get_or_create_album(&conn, "Blue", Some("Joni")).unwrap();
    let c = get_or_create_album(&conn, "Blue", None).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(get_album(&conn, c).unwrap().artist, "");
    assert!(get_or_create_album(&conn, "", None).is_err());
}

#[test]
fn album_art_lookup_is_non_fatal() {
    let conn = open_memory().unwrap();
    let id = get_or_create_album(&conn, "Blue", Some("Joni")).unwrap();
    assert_eq!(find_album_art(&conn, id).unwrap(), None);
    assert_eq!(find_album_art(&conn, 9999).unwrap(), None);

    set_album_art(&conn, id, Some("/thumbs/blue.jpg")).unwrap();
    assert_eq!(find_album_art(&conn, id).unwrap().as_deref(), Some("/thumbs/blue.jpg"));
    assert!(matches!(
        set_album_art(&conn, 9999, None),
        Err(DbError::NotFound { .. })
    ));
}

#[test]
fn tag_counts_follow_membership() {
    let conn = with_media(&["m1", "m2"]);
    add_tag(&conn, "m1", "live").unwrap();
    add_tag(&conn, "m2", "live").unwrap();
    add_tag(&conn, "m2", " live ").unwrap();
    add_tag(&conn, "m2", "demo").unwrap();

    let tags = list_tags(&conn).unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name, "demo");
    assert_eq!(tags[0].media_count, 1);
    assert_eq!(tags[1].name, "live");
    assert_eq!(tags[1].media_count, 2);
    assert_eq!(tags_for_media(&conn, "m2").unwrap(), vec!["demo", "live"]);
}

#[test]
fn tag_disappears_with_its_last_member() {
    let conn = with_media(&["m1", "m2"]);
    add_tag(&conn, "m1", "live").unwrap();
    add_tag(&conn, "m2", "live").unwrap();

    assert!(remove_tag(&conn, "m1", "live").unwrap());
    assert_eq!(list_tags(&conn).unwrap()[0].media_count, 1);

    assert!(remove_tag(&conn, "m2", "live").unwrap());
    assert!(list_tags(&conn).unwrap().is_empty());
    assert!(!remove_tag(&conn, "m2", "live").unwrap());
}

#[test]
fn media_lookups() {
    let conn = with_media(&["m1", "m2"]);
    let found = find_media_by_path(&conn, INTERNAL_STORAGE_ID, "/data/m1.mp3")
        .unwrap()
        .unwrap();
    assert_eq!(found.media_id, "m1");
    assert_eq!(found.media_type, MediaType::Music);
    assert_eq!(found.file_name, "m1.mp3");
    assert!(find_media_by_path(&conn, INTERNAL_STORAGE_ID, "/data/none.mp3")
        .unwrap()
        .is_none());
    assert!(matches!(
        find_media_by_path(&conn, "ghost", "/x"),
        Err(DbError::NotFound { .. })
    ));

    assert_eq!(list_media_in_folder(&conn, "f").unwrap().len(), 2);
    assert!(matches!(get_media(&conn, "m9"), Err(DbError::NotFound { .. })));

    assert_eq!(count_storage_media(&conn, INTERNAL_STORAGE_ID).unwrap(), Some(2));
    assert_eq!(count_storage_media(&conn, "ghost").unwrap(), None);
}
