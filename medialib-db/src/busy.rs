//! Bounded busy-retry and transaction helpers.
//!
//! rusqlite's own busy timeout is switched off when a catalog connection is
//! opened, so a locked database surfaces as `SQLITE_BUSY` immediately and the
//! policy here decides how long to keep trying. Every write goes through one
//! of these helpers: batches and scans through [`in_transaction`] with the
//! configured policy, standalone operations through [`in_savepoint`] or
//! [`execute_retrying`].

use std::thread;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{DbError, Result, is_busy_error};

/// Sleep-and-retry policy for lock conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Run `op`, retrying while SQLite reports the database busy or locked.
///
/// Returns `LockTimeout` once `max_attempts` tries have all hit a lock.
pub fn with_busy_retry<T>(
    policy: &BusyPolicy,
    mut op: impl FnMut() -> rusqlite::Result<T>,
) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) => {
                log::debug!("database busy (attempt {}/{})", attempt, attempts);
                if attempt < attempts {
                    thread::sleep(policy.backoff);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(DbError::LockTimeout { attempts })
}

/// Run `body` inside `BEGIN IMMEDIATE` ... `COMMIT`.
///
/// Any error from `body` or from the commit rolls the whole transaction back.
pub fn in_transaction<T>(
    conn: &Connection,
    policy: &BusyPolicy,
    body: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    with_busy_retry(policy, || conn.execute_batch("BEGIN IMMEDIATE"))?;

    let result = body(conn).and_then(|v| {
        with_busy_retry(policy, || conn.execute_batch("COMMIT"))?;
        Ok(v)
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            log::warn!("rollback failed: {}", e);
        }
    }
    result
}

/// Execute one write statement outside batching, retrying lock conflicts
/// under the default policy.
pub fn execute_retrying<P: rusqlite::Params + Copy>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<usize> {
    with_busy_retry(&BusyPolicy::default(), || conn.execute(sql, params))
}

/// Run `body` inside a named savepoint when a transaction is already open,
/// or inside its own `BEGIN IMMEDIATE` transaction under the default policy
/// when the connection is in autocommit mode.
pub fn in_savepoint<T>(
    conn: &Connection,
    name: &str,
    body: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    if conn.is_autocommit() {
        return in_transaction(conn, &BusyPolicy::default(), body);
    }
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match body(conn) {
        Ok(v) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rb) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
                log::warn!("rollback to savepoint {} failed: {}", name, rb);
            }
            Err(e)
        }
    }
}
