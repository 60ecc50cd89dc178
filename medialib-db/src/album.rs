//! Album rows shared by every storage.

use rusqlite::{Connection, OptionalExtension, params};

use crate::busy::execute_retrying;
use crate::error::{DbError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRecord {
    pub album_id: i64,
    pub name: String,
    pub artist: String,
    pub album_art: Option<String>,
}

/// Find the album for `(name, artist)`, creating it when missing.
///
/// A missing artist is stored as the empty string so the pair stays unique.
pub fn get_or_create_album(conn: &Connection, name: &str, artist: Option<&str>) -> Result<i64> {
    if name.is_empty() {
        return Err(DbError::invalid("album name must not be empty"));
    }
    let artist = artist.unwrap_or("");
    execute_retrying(
        conn,
        "INSERT OR IGNORE INTO album (name, artist) VALUES (?1, ?2)",
        params![name, artist],
    )?;
    let id = conn.query_row(
        "SELECT album_id FROM album WHERE name = ?1 AND artist = ?2",
        params![name, artist],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_album(conn: &Connection, album_id: i64) -> Result<AlbumRecord> {
    conn.query_row(
        "SELECT album_id, name, artist, album_art FROM album WHERE album_id = ?1",
        params![album_id],
        |row| {
            Ok(AlbumRecord {
                album_id: row.get(0)?,
                name: row.get(1)?,
                artist: row.get(2)?,
                album_art: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::not_found("album", album_id.to_string()))
}

pub fn set_album_art(conn: &Connection, album_id: i64, art_path: Option<&str>) -> Result<()> {
    let n = execute_retrying(
        conn,
        "UPDATE album SET album_art = ?1 WHERE album_id = ?2",
        params![art_path, album_id],
    )?;
    if n == 0 {
        return Err(DbError::not_found("album", album_id.to_string()));
    }
    Ok(())
}

/// Album art path, or `None` when the album has none or does not exist.
pub fn find_album_art(conn: &Connection, album_id: i64) -> Result<Option<String>> {
    let art: Option<Option<String>> = conn
        .query_row(
            "SELECT album_art FROM album WHERE album_id = ?1",
            params![album_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(art.flatten())
}
