//! What a scan covers, and the SQL that selects it.
//!
//! A folder scope is matched by path prefix rather than by walking child
//! ids, so rows whose parent links were never written are still covered.

use std::fmt;

use medialib_db::folder::{is_within, parent_path};
use medialib_db::sql::{descendant_prefix, quote_ident};
use medialib_db::{
    FolderRecord, Result, ScanStatus, VolumeClassifier, get_folder, get_storage,
    set_folder_scan_status, set_storage_scan_status, storage_table_name,
};
use rusqlite::{Connection, params_from_iter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanScope {
    /// Every row of one storage.
    Storage(String),
    /// The media directly in a folder, or its whole subtree.
    Folder { folder_id: String, recursive: bool },
}

impl fmt::Display for ScanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(id) => write!(f, "storage {id}"),
            Self::Folder {
                folder_id,
                recursive: true,
            } => write!(f, "folder {folder_id} (recursive)"),
            Self::Folder { folder_id, .. } => write!(f, "folder {folder_id}"),
        }
    }
}

/// A scope bound to its storage, media table and (for folder scopes) folder row.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedScope {
    pub scope: ScanScope,
    pub storage_id: String,
    pub table: String,
    pub folder: Option<FolderRecord>,
}

struct Filter {
    clause: String,
    params: Vec<String>,
}

impl ResolvedScope {
    pub fn resolve(conn: &Connection, scope: &ScanScope) -> Result<Self> {
        let (storage_id, folder) = match scope {
            ScanScope::Storage(id) => (get_storage(conn, id)?.storage_id, None),
            ScanScope::Folder { folder_id, .. } => {
                let folder = get_folder(conn, folder_id)?;
                (folder.storage_id.clone(), Some(folder))
            }
        };
        Ok(Self {
            scope: scope.clone(),
            table: storage_table_name(&storage_id),
            storage_id,
            folder,
        })
    }

    fn recursive(&self) -> bool {
        matches!(self.scope, ScanScope::Folder { recursive: true, .. })
    }

    fn media_filter(&self) -> Filter {
        match &self.folder {
            None => Filter {
                clause: "1 = 1".into(),
                params: vec![],
            },
            Some(folder) if self.recursive() => Filter {
                clause: "(folder_id = ?1 OR substr(path, 1, length(?2)) = ?2)".into(),
                params: vec![folder.folder_id.clone(), descendant_prefix(&folder.path)],
            },
            Some(folder) => Filter {
                clause: "folder_id = ?1".into(),
                params: vec![folder.folder_id.clone()],
            },
        }
    }

    /// Folders the scan may mark stale and later delete. A non-recursive
    /// folder scan never touches folders.
    fn folder_filter(&self) -> Option<Filter> {
        match &self.folder {
            None => Some(Filter {
                clause: "storage_id = ?1".into(),
                params: vec![self.storage_id.clone()],
            }),
            Some(folder) if self.recursive() => Some(Filter {
                clause: "storage_id = ?1 AND substr(path, 1, length(?2)) = ?2".into(),
                params: vec![self.storage_id.clone(), descendant_prefix(&folder.path)],
            }),
            Some(_) => None,
        }
    }

    /// Whether a file at `path` belongs to this scope.
    pub fn contains_file(&self, volumes: &dyn VolumeClassifier, path: &str) -> bool {
        match &self.folder {
            None => volumes.contains(&self.storage_id, path),
            Some(folder) if self.recursive() => is_within(&folder.path, path) && path != folder.path,
            Some(folder) => parent_path(path) == Some(folder.path.as_str()),
        }
    }

    /// Whether a directory at `path` belongs to this scope.
    pub fn contains_folder(&self, volumes: &dyn VolumeClassifier, path: &str) -> bool {
        match &self.folder {
            None => volumes.contains(&self.storage_id, path),
            Some(folder) if self.recursive() => is_within(&folder.path, path),
            Some(folder) => path == folder.path,
        }
    }

    /// Flip every media row and folder in scope to stale. Returns the media count.
    pub fn mark_stale(&self, conn: &Connection) -> Result<usize> {
        let media = self.media_filter();
        let marked = conn.execute(
            &format!(
                "UPDATE {} SET validity = 0 WHERE {}",
                quote_ident(&self.table),
                media.clause
            ),
            params_from_iter(media.params.iter()),
        )?;
        if let Some(folders) = self.folder_filter() {
            conn.execute(
                &format!("UPDATE folder SET validity = 0 WHERE {}", folders.clause),
                params_from_iter(folders.params.iter()),
            )?;
        }
        Ok(marked)
    }

    /// Ids and thumbnails of media rows in scope still marked stale.
    pub fn stale_media(&self, conn: &Connection) -> Result<Vec<(String, Option<String>)>> {
        let media = self.media_filter();
        let mut stmt = conn.prepare(&format!(
            "SELECT media_id, thumbnail_path FROM {} WHERE validity = 0 AND {}",
            quote_ident(&self.table),
            media.clause
        ))?;
        let rows = stmt
            .query_map(params_from_iter(media.params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_stale_media(&self, conn: &Connection) -> Result<usize> {
        let media = self.media_filter();
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {} WHERE validity = 0 AND {}",
                quote_ident(&self.table),
                media.clause
            ),
            params_from_iter(media.params.iter()),
        )?;
        Ok(deleted)
    }

    /// Stale folders in scope, deepest first.
    pub fn stale_folders(&self, conn: &Connection) -> Result<Vec<(String, String)>> {
        let Some(folders) = self.folder_filter() else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT folder_id, path FROM folder WHERE validity = 0 AND {} ORDER BY length(path) DESC",
            folders.clause
        ))?;
        let rows = stmt
            .query_map(params_from_iter(folders.params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_scan_status(&self, conn: &Connection, status: ScanStatus) -> Result<()> {
        match &self.folder {
            None => set_storage_scan_status(conn, &self.storage_id, status)?,
            Some(folder) => set_folder_scan_status(conn, &folder.folder_id, status)?,
        }
        Ok(())
    }
}
