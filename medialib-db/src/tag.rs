//! Tags and their membership map.
//!
//! A tag lives only while at least one media row carries it: deleting the
//! last `tag_map` row fires the cascade trigger that removes the tag itself.

use rusqlite::{Connection, OptionalExtension, params};

use crate::busy::{execute_retrying, in_savepoint};
use crate::error::{DbError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub tag_id: i64,
    pub name: String,
    pub media_count: i64,
}

/// Attach `name` to a media row, creating the tag if needed. Returns the tag id.
pub fn add_tag(conn: &Connection, media_id: &str, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::invalid("tag name must not be empty"));
    }
    in_savepoint(conn, "add_tag", |conn| {
        conn.execute("INSERT OR IGNORE INTO tag (name) VALUES (?1)", params![name])?;
        let tag_id: i64 = conn.query_row(
            "SELECT tag_id FROM tag WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO tag_map (tag_id, media_id) VALUES (?1, ?2)",
            params![tag_id, media_id],
        )?;
        Ok(tag_id)
    })
}

/// Detach a tag from a media row. Returns `false` if it was not attached.
pub fn remove_tag(conn: &Connection, media_id: &str, name: &str) -> Result<bool> {
    let tag_id: Option<i64> = conn
        .query_row(
            "SELECT tag_id FROM tag WHERE name = ?1",
            params![name.trim()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(tag_id) = tag_id else {
        return Ok(false);
    };
    let n = execute_retrying(
        conn,
        "DELETE FROM tag_map WHERE tag_id = ?1 AND media_id = ?2",
        params![tag_id, media_id],
    )?;
    Ok(n > 0)
}

/// Every tag with the number of media rows carrying it.
pub fn list_tags(conn: &Connection) -> Result<Vec<TagSummary>> {
    let mut stmt =
        conn.prepare("SELECT tag_id, name, media_count FROM tag_view ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(TagSummary {
            tag_id: row.get(0)?,
            name: row.get(1)?,
            media_count: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub fn tags_for_media(conn: &Connection, media_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM tag t JOIN tag_map m ON m.tag_id = t.tag_id \
         WHERE m.media_id = ?1 ORDER BY t.name",
    )?;
    let rows = stmt.query_map(params![media_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Drop every tag link of the given media rows; returns the rows removed.
pub fn delete_tag_links(conn: &Connection, media_ids: &[String]) -> Result<usize> {
    let mut stmt = conn.prepare_cached("DELETE FROM tag_map WHERE media_id = ?1")?;
    let mut removed = 0;
    for id in media_ids {
        removed += stmt.execute(params![id])?;
    }
    Ok(removed)
}
