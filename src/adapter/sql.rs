//! Embedded SQL adapter.
//!
//! Executes a route's parameterized query against the embedded database,
//! binding arguments positionally in descriptor order. Statements that
//! produce no result columns execute and return null; otherwise rows come
//! back as objects keyed by column name, with `return: "object"` routes
//! limited to the first row.
//!
//! Database calls are short and local, so they run inline on the async
//! path without a blocking pool.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value};
use tracing::{debug, trace, warn};

use crate::config::DatabaseSettings;
use crate::error::{Error, Result};
use crate::routes::{Protocol, ReturnShape, RouteEntry};

use super::{CallArgs, ConnectionParams};

// ============================================================================
// SqliteAdapter
// ============================================================================

/// The embedded SQL protocol adapter.
#[derive(Clone)]
pub struct SqliteAdapter {
    conn: Option<Arc<Mutex<Connection>>>,
}

impl SqliteAdapter {
    /// Opens the database from settings.
    ///
    /// Missing settings or an open failure leave the adapter unconfigured:
    /// startup proceeds and every call fails until the configuration is
    /// corrected.
    #[must_use]
    pub fn open(settings: Option<&DatabaseSettings>) -> Self {
        let conn = match settings {
            Some(settings) => match open_database(settings) {
                Ok(conn) => Some(Arc::new(Mutex::new(conn))),
                Err(err) => {
                    warn!(error = %err, name = %settings.name, "Database open failed; adapter starts unconfigured");
                    None
                }
            },
            None => {
                warn!("No database configured; adapter starts unconfigured");
                None
            }
        };

        Self { conn }
    }

    /// Creates an adapter over an already-open connection.
    #[must_use]
    pub fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        }
    }

    /// Accepts and ignores connection parameters; the database is local.
    pub fn configure(&self, _params: ConnectionParams) {
        trace!("SQL adapter holds no connection parameters");
    }

    /// Executes a route against the database.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolUnsupported`] if the entry lacks a sqlite descriptor
    /// - [`Error::Unconfigured`] if no database is open
    /// - [`Error::Database`] for SQL failures
    pub async fn execute(&self, name: &str, entry: &RouteEntry, args: CallArgs) -> Result<Value> {
        let descriptor = entry
            .sqlite
            .as_ref()
            .ok_or_else(|| Error::protocol_unsupported(name, Protocol::Sqlite))?;

        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| Error::unconfigured(Protocol::Sqlite))?;

        let bound: Vec<rusqlite::types::Value> = descriptor
            .args
            .iter()
            .map(|arg| to_sql_value(args.get(arg)))
            .collect();

        let conn = conn.lock();
        let mut stmt = conn.prepare(&descriptor.query)?;

        if stmt.column_count() == 0 {
            let affected = stmt.execute(rusqlite::params_from_iter(bound))?;
            trace!(route = name, affected, "Statement executed");
            return Ok(Value::Null);
        }

        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|column| (*column).to_string())
            .collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(bound))?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (index, column) in columns.iter().enumerate() {
                object.insert(column.clone(), from_sql_value(row.get_ref(index)?));
            }
            out.push(Value::Object(object));

            // A route declared as a single object reads only the first row.
            if entry.return_shape == ReturnShape::Object {
                break;
            }
        }

        trace!(route = name, rows = out.len(), "Query executed");

        if entry.return_shape == ReturnShape::Object {
            Ok(out.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ok(Value::Array(out))
        }
    }
}

// ============================================================================
// Database Open
// ============================================================================

/// Opens (and if needed seeds) the database described by settings.
fn open_database(settings: &DatabaseSettings) -> Result<Connection> {
    if settings.name != ":memory:"
        && let Some(template) = &settings.create_from_location
        && !Path::new(&settings.name).exists()
        && template.exists()
    {
        fs::copy(template, &settings.name)?;
        debug!(
            name = %settings.name,
            template = %template.display(),
            "Database created from template"
        );
    }

    let conn = Connection::open(&settings.name)?;

    if let Some(version) = settings.version {
        conn.pragma_update(None, "user_version", version)?;
    }

    debug!(name = %settings.name, "Database open");
    Ok(conn)
}

// ============================================================================
// Value Conversion
// ============================================================================

/// Maps a call argument onto an SQL parameter.
fn to_sql_value(value: Option<&Value>) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        None | Some(Value::Null) => Sql::Null,
        Some(Value::Bool(b)) => Sql::Integer(i64::from(*b)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Some(Value::String(s)) => Sql::Text(s.clone()),
        // Structured arguments are stored as their JSON text.
        Some(other) => Sql::Text(other.to_string()),
    }
}

/// Maps a result cell onto a JSON value.
fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(BASE64.encode(blob)),
    }
}

// ============================================================================
// Tests
// ============================================================================
