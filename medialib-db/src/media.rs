//! Media rows: record types, statement rendering and lookups.
//!
//! Writes are rendered into self-contained SQL text so they can sit in a
//! [`BatchSession`](crate::batch::BatchSession) until it is flushed. Reads of
//! a single storage go to its own table; catalog-wide reads go through the
//! union view.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{DbError, Result};
use crate::folder::{base_name, normalize_path};
use crate::schema::table_exists;
use crate::sql::{literal, opt_int, opt_real, opt_text, quote_ident};
use crate::storage::{UNION_VIEW, storage_table_name, validate_storage_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    Image,
    Video,
    Sound,
    Music,
    #[default]
    Other,
}

impl MediaType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Image => 0,
            Self::Video => 1,
            Self::Sound => 2,
            Self::Music => 3,
            Self::Other => 4,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => Self::Image,
            1 => Self::Video,
            2 => Self::Sound,
            3 => Self::Music,
            _ => Self::Other,
        }
    }
}

/// Descriptive metadata extracted outside the catalog. `None` leaves the
/// column at its default on insert and untouched on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub album_id: Option<i64>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub year: Option<String>,
    pub recorded_date: Option<String>,
    pub copyright: Option<String>,
    pub track_num: Option<String>,
    pub description: Option<String>,
    pub bitrate: Option<i64>,
    pub bitpersample: Option<i64>,
    pub samplerate: Option<i64>,
    pub channels: Option<i64>,
    pub duration: Option<i64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub altitude: Option<f64>,
    pub exposure_time: Option<String>,
    pub fnumber: Option<f64>,
    pub iso: Option<i64>,
    pub model: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub datetaken: Option<String>,
    pub orientation: Option<i64>,
    pub is_drm: Option<i64>,
    pub favourite: Option<i64>,
    pub timeline: Option<i64>,
    pub played_count: Option<i64>,
    pub last_played_time: Option<i64>,
    pub last_played_position: Option<i64>,
    pub rating: Option<i64>,
    pub is_360: Option<i64>,
}

impl MediaMetadata {
    /// Column/value pairs for every field that is set.
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        let texts: [(&'static str, &Option<String>); 14] = [
            ("title", &self.title),
            ("album", &self.album),
            ("artist", &self.artist),
            ("album_artist", &self.album_artist),
            ("genre", &self.genre),
            ("composer", &self.composer),
            ("year", &self.year),
            ("recorded_date", &self.recorded_date),
            ("copyright", &self.copyright),
            ("track_num", &self.track_num),
            ("description", &self.description),
            ("exposure_time", &self.exposure_time),
            ("model", &self.model),
            ("datetaken", &self.datetaken),
        ];
        let ints: [(&'static str, Option<i64>); 18] = [
            ("album_id", self.album_id),
            ("bitrate", self.bitrate),
            ("bitpersample", self.bitpersample),
            ("samplerate", self.samplerate),
            ("channels", self.channels),
            ("duration", self.duration),
            ("iso", self.iso),
            ("width", self.width),
            ("height", self.height),
            ("orientation", self.orientation),
            ("is_drm", self.is_drm),
            ("favourite", self.favourite),
            ("timeline", self.timeline),
            ("played_count", self.played_count),
            ("last_played_time", self.last_played_time),
            ("last_played_position", self.last_played_position),
            ("rating", self.rating),
            ("is_360", self.is_360),
        ];
        let reals: [(&'static str, Option<f64>); 4] = [
            ("longitude", self.longitude),
            ("latitude", self.latitude),
            ("altitude", self.altitude),
            ("fnumber", self.fnumber),
        ];

        let mut out = Vec::new();
        out.extend(texts.into_iter().filter(|(_, v)| v.is_some()).map(|(c, v)| (c, opt_text(v))));
        out.extend(ints.into_iter().filter(|(_, v)| v.is_some()).map(|(c, v)| (c, opt_int(v))));
        out.extend(reals.into_iter().filter(|(_, v)| v.is_some()).map(|(c, v)| (c, opt_real(v))));
        out
    }

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            title: row.get("title")?,
            album_id: row.get("album_id")?,
            album: row.get("album")?,
            artist: row.get("artist")?,
            album_artist: row.get("album_artist")?,
            genre: row.get("genre")?,
            composer: row.get("composer")?,
            year: row.get("year")?,
            recorded_date: row.get("recorded_date")?,
            copyright: row.get("copyright")?,
            track_num: row.get("track_num")?,
            description: row.get("description")?,
            bitrate: row.get("bitrate")?,
            bitpersample: row.get("bitpersample")?,
            samplerate: row.get("samplerate")?,
            channels: row.get("channels")?,
            duration: row.get("duration")?,
            longitude: row.get("longitude")?,
            latitude: row.get("latitude")?,
            altitude: row.get("altitude")?,
            exposure_time: row.get("exposure_time")?,
            fnumber: row.get("fnumber")?,
            iso: row.get("iso")?,
            model: row.get("model")?,
            width: row.get("width")?,
            height: row.get("height")?,
            datetaken: row.get("datetaken")?,
            orientation: row.get("orientation")?,
            is_drm: row.get("is_drm")?,
            favourite: row.get("favourite")?,
            timeline: row.get("timeline")?,
            played_count: row.get("played_count")?,
            last_played_time: row.get("last_played_time")?,
            last_played_position: row.get("last_played_position")?,
            rating: row.get("rating")?,
            is_360: row.get("is_360")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub media_id: String,
    pub path: String,
    pub file_name: String,
    pub folder_id: String,
    pub storage_id: String,
    pub media_type: MediaType,
    pub mime_type: Option<String>,
    pub size: i64,
    pub added_time: i64,
    pub modified_time: i64,
    pub thumbnail_path: Option<String>,
    pub validity: bool,
    pub metadata: MediaMetadata,
}

impl MediaRecord {
    /// A fresh record with a new id, valid, named after the last path segment.
    pub fn new(storage_id: &str, folder_id: &str, path: &str) -> Result<Self> {
        let path = normalize_path(path)?;
        Ok(Self {
            media_id: uuid::Uuid::new_v4().to_string(),
            file_name: base_name(&path).to_string(),
            path,
            folder_id: folder_id.to_string(),
            storage_id: storage_id.to_string(),
            media_type: MediaType::Other,
            mime_type: None,
            size: 0,
            added_time: 0,
            modified_time: 0,
            thumbnail_path: None,
            validity: true,
            metadata: MediaMetadata::default(),
        })
    }

    fn core_columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("media_id", Value::Text(self.media_id.clone())),
            ("path", Value::Text(self.path.clone())),
            ("file_name", Value::Text(self.file_name.clone())),
            ("folder_id", Value::Text(self.folder_id.clone())),
            ("storage_id", Value::Text(self.storage_id.clone())),
            ("media_type", Value::Integer(self.media_type.as_i64())),
            ("mime_type", opt_text(&self.mime_type)),
            ("size", Value::Integer(self.size)),
            ("added_time", Value::Integer(self.added_time)),
            ("modified_time", Value::Integer(self.modified_time)),
            ("thumbnail_path", opt_text(&self.thumbnail_path)),
            ("validity", Value::Integer(self.validity as i64)),
        ]
    }
}

pub(crate) fn media_from_row(row: &rusqlite::Row) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        media_id: row.get("media_id")?,
        path: row.get("path")?,
        file_name: row.get("file_name")?,
        folder_id: row.get::<_, Option<String>>("folder_id")?.unwrap_or_default(),
        storage_id: row.get::<_, Option<String>>("storage_id")?.unwrap_or_default(),
        media_type: MediaType::from_i64(row.get("media_type")?),
        mime_type: row.get("mime_type")?,
        size: row.get("size")?,
        added_time: row.get("added_time")?,
        modified_time: row.get("modified_time")?,
        thumbnail_path: row.get("thumbnail_path")?,
        validity: row.get::<_, i64>("validity")? != 0,
        metadata: MediaMetadata::from_row(row)?,
    })
}

fn table_for(storage_id: &str) -> Result<String> {
    validate_storage_id(storage_id)?;
    Ok(quote_ident(&storage_table_name(storage_id)))
}

fn render_assignments(columns: &[(&'static str, Value)]) -> Result<String> {
    let parts = columns
        .iter()
        .map(|(c, v)| Ok(format!("{} = {}", quote_ident(c), literal(v)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(", "))
}

// ── Statement rendering ─────────────────────────────────────────────────────

pub fn render_insert_media(media: &MediaRecord) -> Result<String> {
    let table = table_for(&media.storage_id)?;
    let mut columns = media.core_columns();
    columns.extend(media.metadata.columns());

    let names: Vec<String> = columns.iter().map(|(c, _)| quote_ident(c)).collect();
    let values = columns
        .iter()
        .map(|(_, v)| literal(v))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        values.join(", ")
    ))
}

/// Overwrite a row's file facts and any metadata that is set; marks it valid.
pub fn render_update_media(media: &MediaRecord) -> Result<String> {
    let table = table_for(&media.storage_id)?;
    let mut columns: Vec<(&'static str, Value)> = media
        .core_columns()
        .into_iter()
        .filter(|(c, _)| !matches!(*c, "media_id" | "added_time"))
        .collect();
    columns.retain(|(c, _)| *c != "validity");
    columns.push(("validity", Value::Integer(1)));
    columns.extend(media.metadata.columns());

    Ok(format!(
        "UPDATE {table} SET {} WHERE media_id = {}",
        render_assignments(&columns)?,
        literal(&Value::Text(media.media_id.clone()))?
    ))
}

/// Move a row to another path and folder of the same storage.
pub fn render_move_media(
    storage_id: &str,
    media_id: &str,
    new_path: &str,
    new_folder_id: &str,
) -> Result<String> {
    let table = table_for(storage_id)?;
    let new_path = normalize_path(new_path)?;
    let columns = [
        ("path", Value::Text(new_path.clone())),
        ("file_name", Value::Text(base_name(&new_path).to_string())),
        ("folder_id", Value::Text(new_folder_id.to_string())),
    ];
    Ok(format!(
        "UPDATE {table} SET {} WHERE media_id = {}",
        render_assignments(&columns)?,
        literal(&Value::Text(media_id.to_string()))?
    ))
}

pub fn render_set_media_validity(storage_id: &str, media_id: &str, valid: bool) -> Result<String> {
    let table = table_for(storage_id)?;
    Ok(format!(
        "UPDATE {table} SET validity = {} WHERE media_id = {}",
        valid as i64,
        literal(&Value::Text(media_id.to_string()))?
    ))
}

// ── Lookups ─────────────────────────────────────────────────────────────────

/// Look a path up in its storage's own table, whatever the row's validity.
pub fn find_media_by_path(
    conn: &Connection,
    storage_id: &str,
    path: &str,
) -> Result<Option<MediaRecord>> {
    let table = storage_table_name(storage_id);
    validate_storage_id(storage_id)?;
    if !table_exists(conn, &table)? {
        return Err(DbError::not_found("media table", table));
    }
    let mut stmt =
        conn.prepare_cached(&format!("SELECT * FROM {} WHERE path = ?1", quote_ident(&table)))?;
    Ok(stmt.query_row(params![path], media_from_row).optional()?)
}

/// Fetch a row through the union view.
pub fn get_media(conn: &Connection, media_id: &str) -> Result<MediaRecord> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT * FROM {} WHERE media_id = ?1",
        quote_ident(UNION_VIEW)
    ))?;
    stmt.query_row(params![media_id], media_from_row)
        .optional()?
        .ok_or_else(|| DbError::not_found("media", media_id))
}

pub fn list_media_in_folder(conn: &Connection, folder_id: &str) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} WHERE folder_id = ?1 ORDER BY path",
        quote_ident(UNION_VIEW)
    ))?;
    let rows = stmt.query_map(params![folder_id], media_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Number of rows visible through the union view.
pub fn count_media(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(UNION_VIEW)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Rows in one storage's own table, stale or not; `None` if the table is missing.
pub fn count_storage_media(conn: &Connection, storage_id: &str) -> Result<Option<i64>> {
    validate_storage_id(storage_id)?;
    let table = storage_table_name(storage_id);
    if !table_exists(conn, &table)? {
        return Ok(None);
    }
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(&table)),
        [],
        |row| row.get(0),
    )?;
    Ok(Some(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaRecord {
        let mut media = MediaRecord::new("sd", "f1", "/mnt/sd/it's.jpg").unwrap();
        media.media_id = "m1".into();
        media.media_type = MediaType::Image;
        media.metadata.title = Some("Beach".into());
        media.metadata.latitude = Some(37.5);
        media
    }

    #[test]
    fn insert_renders_literals_for_set_fields() {
        let sql = render_insert_media(&sample()).unwrap();
        assert!(sql.starts_with("INSERT INTO \"media_sd\" ("));
        assert!(sql.contains("'/mnt/sd/it''s.jpg'"));
        assert!(sql.contains("\"title\""));
        assert!(sql.contains("37.5"));
        assert!(!sql.contains("\"artist\""));
    }

    #[test]
    fn update_keeps_id_and_added_time() {
        let sql = render_update_media(&sample()).unwrap();
        assert!(sql.ends_with("WHERE media_id = 'm1'"));
        assert!(!sql.contains("\"added_time\""));
        assert!(sql.contains("\"validity\" = 1"));
    }

    #[test]
    fn non_finite_metadata_fails_rendering() {
        let mut media = sample();
        media.metadata.altitude = Some(f64::INFINITY);
        assert!(matches!(
            render_insert_media(&media),
            Err(DbError::InvalidParameter(_))
        ));
    }

    #[test]
    fn media_type_codes() {
        assert_eq!(MediaType::from_i64(MediaType::Music.as_i64()), MediaType::Music);
        assert_eq!(MediaType::from_i64(42), MediaType::Other);
    }
}
