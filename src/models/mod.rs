use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::database::sql_name;
use crate::error::{EtlError, Result};

/// Currencies derived by the transformer, in column order.
pub const DERIVED_CURRENCIES: [(&str, &str); 3] = [
    ("GBP", "MC_GBP_Billion"),
    ("EUR", "MC_EUR_Billion"),
    ("INR", "MC_INR_Billion"),
];

// ============================================================================
// Cell values
// ============================================================================

/// A single scalar cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell. Text is accepted when it parses as a finite
    /// number, with `,` thousands separators removed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) if v.is_finite() => Some(*v),
            Value::Text(text) => parse_real(text, Some(',')),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text written to a CSV field. `Null` becomes an empty field.
    pub fn to_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format_real(*v),
            Value::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => f.write_str(&format_real(*v)),
            Value::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Integral reals keep a `.0` suffix so they read back as reals.
fn format_real(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn strip_separator(text: &str, thousands: Option<char>) -> String {
    match thousands {
        Some(sep) => text.trim().chars().filter(|c| *c != sep).collect(),
        None => text.trim().to_string(),
    }
}

fn parse_integer(text: &str, thousands: Option<char>) -> Option<i64> {
    strip_separator(text, thousands).parse().ok()
}

fn parse_real(text: &str, thousands: Option<char>) -> Option<f64> {
    strip_separator(text, thousands)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Storage type of a whole column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    /// Type a column of raw text cells. Empty cells do not take part.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>, thousands: Option<char>) -> Self {
        let mut kind = None;
        for cell in cells.into_iter().filter(|c| !c.trim().is_empty()) {
            let cell_kind = if parse_integer(cell, thousands).is_some() {
                ColumnKind::Integer
            } else if parse_real(cell, thousands).is_some() {
                ColumnKind::Real
            } else {
                return ColumnKind::Text;
            };
            kind = Some(match (kind, cell_kind) {
                (Some(ColumnKind::Real), _) | (_, ColumnKind::Real) => ColumnKind::Real,
                _ => ColumnKind::Integer,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }

    fn parse_cell(self, cell: String, thousands: Option<char>) -> Value {
        if cell.trim().is_empty() {
            return Value::Null;
        }
        let parsed = match self {
            ColumnKind::Integer => parse_integer(&cell, thousands).map(Value::Integer),
            ColumnKind::Real => parse_real(&cell, thousands).map(Value::Real),
            ColumnKind::Text => None,
        };
        parsed.unwrap_or(Value::Text(cell))
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table has no columns")]
    NoColumns,
    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),
    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("column `{column}` has {found} values, expected {expected}")]
    ColumnLength {
        column: String,
        found: usize,
        expected: usize,
    },
}

/// Ordered columns and ordered rows; every row has one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        check_columns(&columns)?;
        check_widths(columns.len(), rows.iter().map(Vec::len))?;
        Ok(Self { columns, rows })
    }

    /// Build a table from raw text cells, typing each column as a whole.
    pub fn from_text_rows(
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        thousands: Option<char>,
    ) -> Result<Self, TableError> {
        check_columns(&columns)?;
        check_widths(columns.len(), rows.iter().map(Vec::len))?;

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|i| ColumnKind::infer(rows.iter().map(|row| row[i].as_str()), thousands))
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&kinds)
                    .map(|(cell, kind)| kind.parse_cell(cell, thousands))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Storage type of a column, from the values it holds.
    pub fn column_kind(&self, index: usize) -> ColumnKind {
        let mut kind = None;
        for row in &self.rows {
            match &row[index] {
                Value::Text(_) => return ColumnKind::Text,
                Value::Real(_) => kind = Some(ColumnKind::Real),
                Value::Integer(_) if kind.is_none() => kind = Some(ColumnKind::Integer),
                _ => {}
            }
        }
        kind.unwrap_or(ColumnKind::Text)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<(), TableError> {
        let name = name.into();
        if self.columns.contains(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::ColumnLength {
                column: name,
                found: values.len(),
                expected: self.rows.len(),
            });
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(name);
        Ok(())
    }
}

fn check_columns(columns: &[String]) -> Result<(), TableError> {
    if columns.is_empty() {
        return Err(TableError::NoColumns);
    }
    let mut seen = HashSet::new();
    for name in columns {
        if !seen.insert(name.as_str()) {
            return Err(TableError::DuplicateColumn(name.clone()));
        }
    }
    Ok(())
}

fn check_widths(expected: usize, widths: impl Iterator<Item = usize>) -> Result<(), TableError> {
    for (row, found) in widths.enumerate() {
        if found != expected {
            return Err(TableError::RowWidth { row, found, expected });
        }
    }
    Ok(())
}

/// A table carrying the three currency columns. Only the transformer builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTable {
    table: Table,
}

impl EnrichedTable {
    pub(crate) fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

impl Deref for EnrichedTable {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

// ============================================================================
// Exchange rates
// ============================================================================

/// Currency code to rate, loaded once and read-only afterwards
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRateMap {
    rates: BTreeMap<String, f64>,
}

impl ExchangeRateMap {
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut rates = BTreeMap::new();
        for (code, rate) in pairs {
            let code = code.into();
            if !rate.is_finite() || rate <= 0.0 {
                return Err(EtlError::Transform(format!(
                    "rate for {} must be a positive number, got {}",
                    code, rate
                )));
            }
            if rates.insert(code.clone(), rate).is_some() {
                return Err(EtlError::Transform(format!("duplicate currency code {}", code)));
            }
        }
        Ok(Self { rates })
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Rows returned by one query, values in projection order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryResult {
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, for aggregate queries.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

impl fmt::Display for QueryResult {
    /// Renders a grid with a row index column and positional headers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return f.write_str("(no rows)");
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let width = cells.iter().map(Vec::len).max().unwrap_or(0);
        let index_width = (cells.len() - 1).to_string().len();

        let mut widths: Vec<usize> = (0..width).map(|i| i.to_string().len()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        write!(f, "{:index_width$}", "")?;
        for (i, w) in widths.iter().enumerate() {
            write!(f, "  {:>w$}", i, w = *w)?;
        }
        for (n, row) in cells.iter().enumerate() {
            write!(f, "\n{:<index_width$}", n)?;
            for (cell, w) in row.iter().zip(&widths) {
                write!(f, "  {:>w$}", cell, w = *w)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_SOURCE_URL: &str =
    "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks";
pub const DEFAULT_MARKER_TEXT: &str = "By market capitalization";
pub const DEFAULT_BASE_COLUMN: &str = "Market cap (US$ billion)";
pub const DEFAULT_NAME_COLUMN: &str = "Bank name";

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_url: String,
    pub marker_text: String,
    pub rates_path: PathBuf,
    pub csv_path: PathBuf,
    pub database_path: PathBuf,
    pub table_name: String,
    pub log_path: PathBuf,
    pub base_column: String,
    pub name_column: String,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            marker_text: DEFAULT_MARKER_TEXT.to_string(),
            rates_path: PathBuf::from("data/exchange_rate.csv"),
            csv_path: PathBuf::from("./Largest_banks_data.csv"),
            database_path: PathBuf::from("Banks.db"),
            table_name: "Largest_banks".to_string(),
            log_path: PathBuf::from("code_log.txt"),
            base_column: DEFAULT_BASE_COLUMN.to_string(),
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Call [`Config::validate`]
    /// once any overrides have been applied.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup; unset keys keep defaults.
    /// Only the timeout is checked here, since it has to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let http_timeout = match lookup("ETL_HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                EtlError::Config(format!("ETL_HTTP_TIMEOUT_SECS must be whole seconds, got `{}`", raw))
            })?),
            None => defaults.http_timeout,
        };

        Ok(Config {
            source_url: lookup("ETL_SOURCE_URL").unwrap_or(defaults.source_url),
            marker_text: lookup("ETL_MARKER_TEXT").unwrap_or(defaults.marker_text),
            rates_path: lookup("ETL_RATES_PATH").map(PathBuf::from).unwrap_or(defaults.rates_path),
            csv_path: lookup("ETL_CSV_PATH").map(PathBuf::from).unwrap_or(defaults.csv_path),
            database_path: lookup("DATABASE_PATH").map(PathBuf::from).unwrap_or(defaults.database_path),
            table_name: lookup("ETL_TABLE_NAME").unwrap_or(defaults.table_name),
            log_path: lookup("ETL_LOG_PATH").map(PathBuf::from).unwrap_or(defaults.log_path),
            base_column: lookup("ETL_BASE_COLUMN").unwrap_or(defaults.base_column),
            name_column: lookup("ETL_NAME_COLUMN").unwrap_or(defaults.name_column),
            http_timeout,
        })
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source_url)
            .map_err(|e| EtlError::Config(format!("invalid source url `{}`: {}", self.source_url, e)))?;
        if self.table_name.trim().is_empty() {
            return Err(EtlError::Config("table name must not be empty".to_string()));
        }
        if self.http_timeout.is_zero() {
            return Err(EtlError::Config("http timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Full dump, GBP average and the first five names.
    pub fn default_queries(&self) -> Vec<String> {
        let table = sql_name(&self.table_name);
        vec![
            format!("SELECT * FROM {}", table),
            format!("SELECT AVG({}) FROM {}", sql_name(DERIVED_CURRENCIES[0].1), table),
            format!("SELECT {} FROM {} LIMIT 5", sql_name(&self.name_column), table),
        ]
    }
}
