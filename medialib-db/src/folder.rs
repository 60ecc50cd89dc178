//! Folder hierarchy: UUID-keyed folder rows materialised lazily from paths.
//!
//! [`get_or_create_folder`] walks up from the requested path until it meets
//! an existing folder or the storage's volume root, then inserts the missing
//! segments top-down so every row's parent exists before the row itself.

use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::busy::{execute_retrying, in_savepoint};
use crate::error::{DbError, Result};
use crate::sql::{descendant_prefix, quote_ident};
use crate::storage::{ScanStatus, list_storages, storage_table_name, validate_storage_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub folder_id: String,
    pub path: String,
    pub name: String,
    pub storage_id: String,
    /// `None` only for a volume root (or a row written before parent links existed).
    pub parent_folder_id: Option<String>,
    pub modified_time: i64,
    pub validity: bool,
    pub scan_status: ScanStatus,
}

// ── Volume roots ────────────────────────────────────────────────────────────

/// Reports where each storage's volume is mounted.
pub trait VolumeClassifier {
    fn volume_root(&self, storage_id: &str) -> Option<&str>;

    fn is_volume_root(&self, storage_id: &str, path: &str) -> bool {
        self.volume_root(storage_id) == Some(path)
    }

    /// Whether `path` is the root of `storage_id` or lies beneath it.
    fn contains(&self, storage_id: &str, path: &str) -> bool {
        self.volume_root(storage_id)
            .is_some_and(|root| is_within(root, path))
    }
}

/// Volume roots keyed by storage id.
#[derive(Debug, Clone, Default)]
pub struct VolumeRoots {
    roots: HashMap<String, String>,
}

impl VolumeRoots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, storage_id: &str, root: &str) -> Result<()> {
        validate_storage_id(storage_id)?;
        self.roots
            .insert(storage_id.to_string(), normalize_path(root)?);
        Ok(())
    }

    pub fn with(mut self, storage_id: &str, root: &str) -> Result<Self> {
        self.insert(storage_id, root)?;
        Ok(self)
    }

    /// Roots of every registered storage.
    pub fn from_storages(conn: &Connection) -> Result<Self> {
        let mut roots = Self::new();
        for storage in list_storages(conn)? {
            roots.insert(&storage.storage_id, &storage.root_path)?;
        }
        Ok(roots)
    }

    /// Add roots from `other` for storages not already known.
    pub fn merge(&mut self, other: &VolumeRoots) {
        for (id, root) in &other.roots {
            self.roots.entry(id.clone()).or_insert_with(|| root.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl VolumeClassifier for VolumeRoots {
    fn volume_root(&self, storage_id: &str) -> Option<&str> {
        self.roots.get(storage_id).map(String::as_str)
    }
}

// ── Paths ───────────────────────────────────────────────────────────────────

/// Normalise an absolute `/`-separated path: no trailing slash, no empty,
/// `.` or `..` segments.
pub fn normalize_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(DbError::invalid(format!("path '{path}' is not absolute")));
    }
    if path.contains('\0') {
        return Err(DbError::invalid("path contains a NUL byte"));
    }
    let mut out = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(DbError::invalid(format!("path '{path}' is not normalised")));
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Parent directory of a normalised path; `None` for `/`.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Last segment of a normalised path (`/` for the filesystem root).
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) if i + 1 < path.len() => &path[i + 1..],
        _ => path,
    }
}

/// Whether `path` equals `root` or lies beneath it.
pub fn is_within(root: &str, path: &str) -> bool {
    if root == "/" {
        return path.starts_with('/');
    }
    path == root
        || (path.starts_with(root) && path.as_bytes().get(root.len()) == Some(&b'/'))
}

fn folder_mtime(path: &str) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ── Lookups ─────────────────────────────────────────────────────────────────

const FOLDER_SELECT: &str = "SELECT folder_id, path, name, storage_id, parent_folder_id,
        modified_time, validity, scan_status FROM folder";

pub(crate) fn folder_from_row(row: &rusqlite::Row) -> rusqlite::Result<FolderRecord> {
    Ok(FolderRecord {
        folder_id: row.get("folder_id")?,
        path: row.get("path")?,
        name: row.get("name")?,
        storage_id: row.get("storage_id")?,
        parent_folder_id: row.get("parent_folder_id")?,
        modified_time: row.get("modified_time")?,
        validity: row.get::<_, i64>("validity")? != 0,
        scan_status: ScanStatus::from_i64(row.get("scan_status")?),
    })
}

pub fn find_folder_by_path(
    conn: &Connection,
    storage_id: &str,
    path: &str,
) -> Result<Option<FolderRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "{FOLDER_SELECT} WHERE storage_id = ?1 AND path = ?2"
    ))?;
    Ok(stmt
        .query_row(params![storage_id, path], folder_from_row)
        .optional()?)
}

pub fn get_folder(conn: &Connection, folder_id: &str) -> Result<FolderRecord> {
    let mut stmt = conn.prepare_cached(&format!("{FOLDER_SELECT} WHERE folder_id = ?1"))?;
    stmt.query_row(params![folder_id], folder_from_row)
        .optional()?
        .ok_or_else(|| DbError::not_found("folder", folder_id))
}

pub fn list_child_folders(conn: &Connection, folder_id: &str) -> Result<Vec<FolderRecord>> {
    let mut stmt = conn.prepare(&format!(
        "{FOLDER_SELECT} WHERE parent_folder_id = ?1 ORDER BY path"
    ))?;
    let rows = stmt.query_map(params![folder_id], folder_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub fn set_folder_validity(conn: &Connection, folder_id: &str, valid: bool) -> Result<()> {
    let changed = execute_retrying(
        conn,
        "UPDATE folder SET validity = ?2 WHERE folder_id = ?1",
        params![folder_id, valid as i64],
    )?;
    if changed == 0 {
        return Err(DbError::not_found("folder", folder_id));
    }
    Ok(())
}

pub fn set_folder_scan_status(conn: &Connection, folder_id: &str, status: ScanStatus) -> Result<()> {
    let changed = execute_retrying(
        conn,
        "UPDATE folder SET scan_status = ?2 WHERE folder_id = ?1",
        params![folder_id, status.as_i64()],
    )?;
    if changed == 0 {
        return Err(DbError::not_found("folder", folder_id));
    }
    Ok(())
}

// ── Resolver ────────────────────────────────────────────────────────────────

/// Return the id of the folder at `path`, creating it and any missing
/// ancestors up to the storage's volume root.
///
/// An existing folder is marked valid again. A path outside the storage's
/// root fails with `InvalidParameter` before anything is written.
pub fn get_or_create_folder(
    conn: &Connection,
    volumes: &dyn VolumeClassifier,
    storage_id: &str,
    path: &str,
) -> Result<String> {
    resolve(conn, volumes, storage_id, path, true)
}

fn resolve(
    conn: &Connection,
    volumes: &dyn VolumeClassifier,
    storage_id: &str,
    path: &str,
    repair: bool,
) -> Result<String> {
    let path = normalize_path(path)?;
    let root = volumes.volume_root(storage_id).ok_or_else(|| {
        DbError::invalid(format!("no volume root known for storage '{storage_id}'"))
    })?;
    if !is_within(root, &path) {
        return Err(DbError::invalid(format!(
            "'{path}' is outside the volume root '{root}' of storage '{storage_id}'"
        )));
    }

    if let Some(found) = find_folder_by_path(conn, storage_id, &path)? {
        return revalidate(conn, volumes, found, repair);
    }

    in_savepoint(conn, "resolve_folder", |conn| {
        // Missing segments, deepest first.
        let mut missing = vec![path.clone()];
        let mut parent_id = None;
        let mut cursor = path.as_str();
        while cursor != root {
            let Some(parent) = parent_path(cursor) else {
                break;
            };
            if let Some(found) = find_folder_by_path(conn, storage_id, parent)? {
                parent_id = Some(revalidate(conn, volumes, found, false)?);
                break;
            }
            missing.push(parent.to_string());
            cursor = parent;
        }

        let mut last = parent_id;
        for segment in missing.iter().rev() {
            last = Some(insert_folder(conn, storage_id, segment, last.as_deref())?);
        }
        last.ok_or_else(|| DbError::invalid(format!("nothing to create for '{path}'")))
    })
}

/// Mark a found folder valid and, if it predates parent links, persist its link.
fn revalidate(
    conn: &Connection,
    volumes: &dyn VolumeClassifier,
    folder: FolderRecord,
    repair: bool,
) -> Result<String> {
    if !folder.validity {
        // The folder and every stale ancestor on its path.
        execute_retrying(
            conn,
            "UPDATE folder SET validity = 1
             WHERE storage_id = ?1 AND validity = 0
               AND (path = ?2 OR substr(?2, 1, length(path) + 1) = path || '/')",
            params![folder.storage_id, folder.path],
        )?;
    }
    if repair
        && folder.parent_folder_id.is_none()
        && !volumes.is_volume_root(&folder.storage_id, &folder.path)
    {
        if let Some(parent) = parent_path(&folder.path) {
            let parent_id = resolve(conn, volumes, &folder.storage_id, parent, false)?;
            execute_retrying(
                conn,
                "UPDATE folder SET parent_folder_id = ?2 WHERE folder_id = ?1",
                params![folder.folder_id, parent_id],
            )?;
            log::debug!("linked folder {} to parent {}", folder.path, parent_id);
        }
    }
    Ok(folder.folder_id)
}

fn insert_folder(
    conn: &Connection,
    storage_id: &str,
    path: &str,
    parent_id: Option<&str>,
) -> Result<String> {
    let folder_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO folder (folder_id, path, name, storage_id, parent_folder_id, modified_time, validity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        params![
            folder_id,
            path,
            base_name(path),
            storage_id,
            parent_id,
            folder_mtime(path)
        ],
    )?;
    log::debug!("created folder {} ({})", path, folder_id);
    Ok(folder_id)
}

/// Render an insert for a folder row whose id and parent are already known.
pub fn render_insert_folder(folder: &FolderRecord) -> Result<String> {
    use crate::sql::{literal, opt_text};
    use rusqlite::types::Value;

    let values = [
        Value::Text(folder.folder_id.clone()),
        Value::Text(normalize_path(&folder.path)?),
        Value::Text(folder.name.clone()),
        Value::Text(folder.storage_id.clone()),
        opt_text(&folder.parent_folder_id),
        Value::Integer(folder.modified_time),
        Value::Integer(folder.validity as i64),
        Value::Integer(folder.scan_status.as_i64()),
    ];
    let rendered = values.iter().map(literal).collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "INSERT INTO folder (folder_id, path, name, storage_id, parent_folder_id, modified_time, validity, scan_status) VALUES ({})",
        rendered.join(", ")
    ))
}

// ── Rename ──────────────────────────────────────────────────────────────────

/// Move a folder subtree to `new_path` within the same storage.
///
/// Descendant folders and media keep their ids; their paths are rewritten by
/// prefix and the moved folder is linked to its new parent.
pub fn rename_folder(
    conn: &Connection,
    volumes: &dyn VolumeClassifier,
    folder_id: &str,
    new_path: &str,
) -> Result<()> {
    let folder = get_folder(conn, folder_id)?;
    let new_path = normalize_path(new_path)?;
    let old_path = folder.path.clone();

    if volumes.is_volume_root(&folder.storage_id, &old_path) {
        return Err(DbError::invalid("a volume root cannot be renamed"));
    }
    if !volumes.contains(&folder.storage_id, &new_path)
        || volumes.is_volume_root(&folder.storage_id, &new_path)
    {
        return Err(DbError::invalid(format!(
            "'{new_path}' is not a folder path inside storage '{}'",
            folder.storage_id
        )));
    }
    if is_within(&old_path, &new_path) {
        return Err(DbError::invalid("a folder cannot be moved into itself"));
    }
    if find_folder_by_path(conn, &folder.storage_id, &new_path)?.is_some() {
        return Err(DbError::invalid(format!("folder '{new_path}' already exists")));
    }
    let Some(new_parent) = parent_path(&new_path) else {
        return Err(DbError::invalid("the filesystem root cannot be a folder target"));
    };

    let table = storage_table_name(&folder.storage_id);
    in_savepoint(conn, "rename_folder", |conn| {
        let parent_id = resolve(conn, volumes, &folder.storage_id, new_parent, true)?;
        let prefix = descendant_prefix(&old_path);

        conn.execute(
            "UPDATE folder SET path = ?2 || substr(path, length(?1) + 1)
             WHERE storage_id = ?3 AND substr(path, 1, length(?4)) = ?4",
            params![old_path, new_path, folder.storage_id, prefix],
        )?;
        conn.execute(
            "UPDATE folder SET path = ?2, name = ?3, parent_folder_id = ?4 WHERE folder_id = ?1",
            params![folder.folder_id, new_path, base_name(&new_path), parent_id],
        )?;
        conn.execute(
            &format!(
                "UPDATE {} SET path = ?2 || substr(path, length(?1) + 1)
                 WHERE substr(path, 1, length(?3)) = ?3",
                quote_ident(&table)
            ),
            params![old_path, new_path, prefix],
        )?;
        log::info!("renamed folder {} -> {}", old_path, new_path);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_paths() {
        assert_eq!(normalize_path("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert!(normalize_path("relative/x").is_err());
        assert!(normalize_path("/a/../b").is_err());
    }

    #[test]
    fn walks_parents() {
        assert_eq!(parent_path("/a/b/c"), Some("/a/b"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(base_name("/a/b/c"), "c");
        assert_eq!(base_name("/"), "/");
    }

    #[test]
    fn containment_respects_segment_boundaries() {
        assert!(is_within("/mnt/sd", "/mnt/sd"));
        assert!(is_within("/mnt/sd", "/mnt/sd/DCIM"));
        assert!(!is_within("/mnt/sd", "/mnt/sdcard"));
        assert!(is_within("/", "/anything"));
    }

    #[test]
    fn classifier_defaults() {
        let roots = VolumeRoots::new().with("sd", "/mnt/sd/").unwrap();
        assert!(roots.is_volume_root("sd", "/mnt/sd"));
        assert!(roots.contains("sd", "/mnt/sd/x"));
        assert!(!roots.contains("other", "/mnt/sd/x"));
    }
}
