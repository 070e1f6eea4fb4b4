use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::models::{EnrichedTable, QueryResult, Value};

/// SQLite connection scope for the relational sink and the query runner.
///
/// The pool holds a single connection so that in-memory databases stay
/// alive between calls. Dropping the manager releases the connection;
/// [`DatabaseManager::close`] does so explicitly and waits for it.
pub struct DatabaseManager {
    pool: SqlitePool,
    target: String,
}

impl DatabaseManager {
    /// Open (creating if needed) the SQLite file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let target = path.display().to_string();
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        Self::connect(options, target).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let target = "sqlite::memory:".to_string();
        let options = SqliteConnectOptions::from_str(&target).map_err(|source| EtlError::Storage {
            target: target.clone(),
            source,
        })?;
        Self::connect(options, target).await
    }

    async fn connect(options: SqliteConnectOptions, target: String) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| EtlError::Storage {
                target: target.clone(),
                source,
            })?;

        info!("💾 Database opened at {}", target);
        Ok(Self { pool, target })
    }

    /// Close the connection and wait until it is released
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Database {} closed", self.target);
    }

    /// Replace `table_name` with the contents of `table`.
    ///
    /// Drop, create and insert run in one transaction; on failure the
    /// transaction rolls back and the previous table is left untouched.
    pub async fn save_table(&self, table: &EnrichedTable, table_name: &str) -> Result<()> {
        let storage = |source| EtlError::Storage {
            target: table_name.to_string(),
            source,
        };

        let quoted_table = quote_identifier(table_name);
        let column_defs: Vec<String> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} {}", quote_identifier(name), table.column_kind(i).sql_type()))
            .collect();
        let placeholders = vec!["?"; table.column_count()].join(", ");
        let insert_sql = format!("INSERT INTO {} VALUES ({})", quoted_table, placeholders);

        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted_table))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query(&format!("CREATE TABLE {} ({})", quoted_table, column_defs.join(", ")))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for row in table.rows() {
            let mut query = sqlx::query(&insert_sql);
            for value in row {
                query = match value {
                    Value::Null => query.bind(None::<String>),
                    Value::Integer(v) => query.bind(*v),
                    Value::Real(v) => query.bind(*v),
                    Value::Text(text) => query.bind(text.as_str()),
                };
            }
            query.execute(&mut *tx).await.map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        info!("✅ Loaded {} rows into table {}", table.row_count(), table_name);
        Ok(())
    }

    /// Run `sql` verbatim and return every row.
    pub async fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let query_error = |source| EtlError::Query {
            sql: sql.to_string(),
            source,
        };

        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(query_error)?;
        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(query_error)?;

        debug!("Query returned {} rows: {}", rows.len(), sql);
        Ok(QueryResult::new(rows))
    }
}

/// Decode each column by its SQLite storage class.
fn decode_row(row: &SqliteRow) -> std::result::Result<Vec<Value>, sqlx::Error> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let storage_class = raw.type_info().name().to_string();
            Ok(match storage_class.as_str() {
                "INTEGER" => Value::Integer(row.try_get(i)?),
                "REAL" => Value::Real(row.try_get(i)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(i)?;
                    Value::Text(bytes.iter().map(|b| format!("{:02x}", b)).collect())
                }
                _ => Value::Text(row.try_get(i)?),
            })
        })
        .collect()
}

/// Always-quoted SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Identifier as written in hand-made queries: bare when it is a plain word.
pub fn sql_name(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(quote_identifier(name))
    }
}
