//! Batched, transactional mutation queue.
//!
//! A [`BatchSession`] collects fully-rendered statements of one kind and
//! replays them in enqueue order inside a single transaction when it is
//! finished. Sessions are owned values: each caller holds its own queue, and
//! commits from different threads are sequenced by whoever owns the
//! connection (see `Catalog::flush`).

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::busy::{BusyPolicy, in_transaction};
use crate::error::{DbError, Result};
use crate::folder::{FolderRecord, render_insert_folder};
use crate::media::{
    MediaRecord, render_insert_media, render_move_media, render_set_media_validity,
    render_update_media,
};
use crate::sql::literal;

/// Default upper bound for one submitted chunk of statements.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    InsertItem,
    InsertFolder,
    UpdateItem,
    MoveItem,
    SetValidity,
}

impl BatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertItem => "insert-item",
            Self::InsertFolder => "insert-folder",
            Self::UpdateItem => "update-item",
            Self::MoveItem => "move-item",
            Self::SetValidity => "set-validity",
        }
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStatement {
    pub kind: BatchKind,
    pub sql: String,
    pub affected_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub chunk_bytes: usize,
    pub busy: BusyPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            busy: BusyPolicy::default(),
        }
    }
}

/// Outcome of a successful flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub kind: BatchKind,
    pub statements: usize,
    pub chunks: usize,
    pub affected_ids: Vec<String>,
}

#[derive(Debug)]
pub struct BatchSession {
    kind: BatchKind,
    pending: Vec<PendingStatement>,
}

impl BatchSession {
    /// Open an empty queue for `kind`, reserving room for `hint` statements.
    pub fn begin(kind: BatchKind, hint: usize) -> Self {
        log::debug!("begin {} batch (hint {})", kind, hint);
        Self {
            kind,
            pending: Vec::with_capacity(hint),
        }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[PendingStatement] {
        &self.pending
    }

    /// Append an already-rendered statement. Its kind must match the session.
    pub fn push(&mut self, statement: PendingStatement) -> Result<()> {
        if statement.kind != self.kind {
            return Err(DbError::invalid(format!(
                "{} statement pushed to a {} batch",
                statement.kind, self.kind
            )));
        }
        self.pending.push(statement);
        Ok(())
    }

    fn enqueue(&mut self, kind: BatchKind, sql: Result<String>, id: &str) -> Result<()> {
        if kind != self.kind {
            return Err(DbError::invalid(format!(
                "{} statement pushed to a {} batch",
                kind, self.kind
            )));
        }
        let sql = sql?;
        self.pending.push(PendingStatement {
            kind,
            sql,
            affected_id: Some(id.to_string()),
        });
        Ok(())
    }

    pub fn insert_item(&mut self, media: &MediaRecord) -> Result<()> {
        self.enqueue(BatchKind::InsertItem, render_insert_media(media), &media.media_id)
    }

    pub fn update_item(&mut self, media: &MediaRecord) -> Result<()> {
        self.enqueue(BatchKind::UpdateItem, render_update_media(media), &media.media_id)
    }

    pub fn move_item(
        &mut self,
        storage_id: &str,
        media_id: &str,
        new_path: &str,
        new_folder_id: &str,
    ) -> Result<()> {
        let sql = render_move_media(storage_id, media_id, new_path, new_folder_id);
        self.enqueue(BatchKind::MoveItem, sql, media_id)
    }

    pub fn set_item_validity(&mut self, storage_id: &str, media_id: &str, valid: bool) -> Result<()> {
        let sql = render_set_media_validity(storage_id, media_id, valid);
        self.enqueue(BatchKind::SetValidity, sql, media_id)
    }

    pub fn set_folder_validity(&mut self, folder_id: &str, valid: bool) -> Result<()> {
        let sql = literal(&Value::Text(folder_id.to_string())).map(|id| {
            format!("UPDATE folder SET validity = {} WHERE folder_id = {}", valid as i64, id)
        });
        self.enqueue(BatchKind::SetValidity, sql, folder_id)
    }

    pub fn insert_folder(&mut self, folder: &FolderRecord) -> Result<()> {
        self.enqueue(
            BatchKind::InsertFolder,
            render_insert_folder(folder),
            &folder.folder_id,
        )
    }

    /// Replay the queue in one transaction.
    ///
    /// On failure everything this session attempted is rolled back. The queue
    /// is consumed either way.
    pub fn finish(mut self, conn: &Connection, options: &BatchOptions) -> Result<FlushReport> {
        let pending = std::mem::take(&mut self.pending);
        let kind = self.kind;
        if pending.is_empty() {
            return Ok(FlushReport {
                kind,
                statements: 0,
                chunks: 0,
                affected_ids: Vec::new(),
            });
        }

        let chunks = chunk_statements(&pending, options.chunk_bytes);
        log::debug!(
            "flushing {} batch: {} statements in {} chunks",
            kind,
            pending.len(),
            chunks.len()
        );
        in_transaction(conn, &options.busy, |conn| {
            for chunk in &chunks {
                conn.execute_batch(chunk)?;
            }
            Ok(())
        })
        .inspect_err(|e| log::warn!("{} batch rolled back: {}", kind, e))?;

        Ok(FlushReport {
            kind,
            statements: pending.len(),
            chunks: chunks.len(),
            affected_ids: pending.into_iter().filter_map(|s| s.affected_id).collect(),
        })
    }

    /// Drop every queued statement without executing it.
    pub fn discard(mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

impl Drop for BatchSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "{} batch dropped with {} unflushed statements",
                self.kind,
                self.pending.len()
            );
        }
    }
}

/// Join statements into `;`-terminated chunks of at most `limit` bytes,
/// keeping enqueue order. A statement longer than `limit` gets a chunk of
/// its own.
pub(crate) fn chunk_statements(statements: &[PendingStatement], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for stmt in statements {
        let piece_len = stmt.sql.len() + 2;
        if !current.is_empty() && current.len() + piece_len > limit {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&stmt.sql);
        current.push_str(";\n");
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(sql: &str) -> PendingStatement {
        PendingStatement {
            kind: BatchKind::InsertItem,
            sql: sql.to_string(),
            affected_id: None,
        }
    }

    #[test]
    fn chunks_respect_limit_and_order() {
        let statements: Vec<_> = (0..10).map(|i| stmt(&format!("SELECT {i}"))).collect();
        let chunks = chunk_statements(&statements, 24);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 24);
        }
        let joined: String = chunks.concat();
        let expected: String = (0..10).map(|i| format!("SELECT {i};\n")).collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn oversized_statement_stands_alone() {
        let long = "x".repeat(100);
        let chunks = chunk_statements(&[stmt("a"), stmt(&long), stmt("b")], 16);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("{long};\n"));
    }

    #[test]
    fn push_rejects_other_kind() {
        let mut session = BatchSession::begin(BatchKind::UpdateItem, 0);
        assert!(matches!(
            session.push(stmt("SELECT 1")),
            Err(DbError::InvalidParameter(_))
        ));
        assert!(session.is_empty());
    }

    #[test]
    fn typed_enqueue_checks_kind() {
        let mut session = BatchSession::begin(BatchKind::InsertItem, 0);
        assert!(session.set_folder_validity("f1", false).is_err());
        assert_eq!(session.discard(), 0);
    }
}
