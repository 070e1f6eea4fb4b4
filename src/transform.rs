//! Currency conversion of the market-cap column.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::models::{EnrichedTable, ExchangeRateMap, Table, Value, DERIVED_CURRENCIES};

/// Load `currency,rate` pairs from a CSV file with a header row.
pub fn load_rates(path: impl AsRef<Path>) -> Result<ExchangeRateMap> {
    let path = path.as_ref();
    let malformed = |detail: String| EtlError::Transform(format!("{}: {}", path.display(), detail));

    let mut reader = csv::Reader::from_path(path).map_err(|e| malformed(e.to_string()))?;
    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?;
    if headers.len() != 2 {
        return Err(malformed(format!("expected 2 columns, found {}", headers.len())));
    }

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        if record.len() != 2 {
            return Err(malformed(format!("expected 2 fields, found {}", record.len())));
        }
        let code = record[0].trim().to_string();
        let rate = record[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(format!("rate for {} is not a number: `{}`", code, &record[1])))?;
        pairs.push((code, rate));
    }

    let rates = ExchangeRateMap::from_pairs(pairs).map_err(|e| match e {
        EtlError::Transform(detail) => malformed(detail),
        other => other,
    })?;
    debug!("Loaded {} exchange rates from {}", rates.len(), path.display());
    Ok(rates)
}

/// Append the GBP, EUR and INR columns derived from `base_column`.
///
/// Each derived value is `round(base * rate, 2)` with [`round_half_away`]. A
/// base cell that is not a number yields `Null` for that row only. So does a
/// finite base whose product with the rate overflows to infinity, which needs
/// a base beyond roughly `f64::MAX / rate`.
pub fn transform(mut table: Table, rates: &ExchangeRateMap, base_column: &str) -> Result<EnrichedTable> {
    let mut resolved = Vec::with_capacity(DERIVED_CURRENCIES.len());
    for (code, column) in DERIVED_CURRENCIES {
        let rate = rates
            .get(code)
            .ok_or_else(|| EtlError::Transform(format!("exchange rate for {} is missing", code)))?;
        resolved.push((column, rate));
    }

    let base: Vec<Option<f64>> = table
        .column_values(base_column)
        .ok_or_else(|| EtlError::Transform(format!("base column `{}` not found", base_column)))?
        .map(Value::as_f64)
        .collect();

    for (column, rate) in resolved {
        let values = base
            .iter()
            .map(|v| Value::from(v.and_then(|v| round_half_away(v * rate, 2))))
            .collect();
        table.push_column(column, values).map_err(EtlError::transform)?;
    }

    info!("✅ Derived {} currency columns for {} rows", DERIVED_CURRENCIES.len(), table.row_count());
    Ok(EnrichedTable::new(table))
}

/// Round to `places` decimals, halves away from zero.
///
/// Works on the shortest decimal representation of `value`, so a product
/// printed as `1.005` rounds to `1.01` even though its binary value sits just
/// below the midpoint. Returns `None` for non-finite input.
pub fn round_half_away(value: f64, places: usize) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    if frac_part.len() <= places {
        return Some(value);
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();
    if frac_part.as_bytes()[places] >= b'5' {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - places;
    let text: String = digits[..split]
        .iter()
        .map(|d| char::from(b'0' + d))
        .chain(std::iter::once('.'))
        .chain(digits[split..].iter().map(|d| char::from(b'0' + d)))
        .collect();
    let rounded: f64 = text.parse().ok()?;
    Some(if value.is_sign_negative() { -rounded } else { rounded })
}
