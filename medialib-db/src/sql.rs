//! Identifier quoting and literal rendering for fully-rendered statements.

use rusqlite::types::Value;

use crate::error::{DbError, Result};

/// Quote an identifier (`"name"`), doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as an SQL literal.
///
/// Non-finite doubles have no literal form and are rejected.
pub fn literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Real(f) => {
            if !f.is_finite() {
                return Err(DbError::invalid(format!("cannot render non-finite double {f}")));
            }
            // `{:?}` keeps a decimal point so SQLite reads it back as REAL.
            Ok(format!("{f:?}"))
        }
        Value::Text(s) => Ok(text_literal(s)),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            Ok(format!("X'{hex}'"))
        }
    }
}

pub fn text_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Convert an optional value into an SQL value.
pub(crate) fn opt_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

pub(crate) fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

pub(crate) fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

/// Prefix shared by every path strictly below `dir`.
///
/// Match it with `substr(path, 1, length(?)) = ?`; `LIKE` would fold ASCII
/// case and pull in sibling folders that differ only in case.
pub fn descendant_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("media"), "\"media\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn renders_literals() {
        assert_eq!(literal(&Value::Null).unwrap(), "NULL");
        assert_eq!(literal(&Value::Integer(-4)).unwrap(), "-4");
        assert_eq!(literal(&Value::Real(1.0)).unwrap(), "1.0");
        assert_eq!(literal(&Value::Text("it's".into())).unwrap(), "'it''s'");
        assert_eq!(literal(&Value::Blob(vec![0xab, 0x01])).unwrap(), "X'AB01'");
    }

    #[test]
    fn rejects_nan() {
        assert!(matches!(
            literal(&Value::Real(f64::NAN)),
            Err(DbError::InvalidParameter(_))
        ));
    }

    #[test]
    fn descendant_prefix_ends_in_one_slash() {
        assert_eq!(descendant_prefix("/a_b/50%"), "/a_b/50%/");
        assert_eq!(descendant_prefix("/"), "/");
    }
}
