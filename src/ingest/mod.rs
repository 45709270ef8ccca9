use anyhow::{Context, Result};
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{info, warn};

/// Encoding labels tried in priority order. The first one that decodes the
/// whole file without malformed sequences wins.
const ENCODING_LABELS: [&str; 4] = ["utf-8", "latin-1", "cp1252", "iso-8859-1"];

/// Year substituted when a row carries no year indicator.
const FALLBACK_YEAR: i64 = 2003;
/// Month substituted when a row carries no month indicator.
const FALLBACK_MONTH: i64 = 1;

#[derive(Debug, Error)]
#[error("no supported encoding decodes {path} (tried {tried})")]
pub struct DecodeError {
    pub path: String,
    pub tried: String,
}

/// A single row failed field coercion. The row is skipped, not fatal.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{field} value {value:?} is not an integer")]
    NotInteger { field: &'static str, value: String },
    #[error("{field} value {value:?} is not a number")]
    NotNumeric { field: &'static str, value: String },
    #[error("malformed record: {0}")]
    Malformed(#[from] csv::Error),
}

/// A source row coerced into the fixed shape the store accepts.
/// Absent fields stay absent (SQL NULL), never a sentinel zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub order_id: Option<i64>,
    pub order_date: String,
    pub amount: Option<f64>,
    pub product_id: Option<String>,
}

/// Everything ingestion hands downstream: the normalized rows in source
/// order, the column set discovered in the header, the encoding that won,
/// and how many rows were dropped by coercion.
#[derive(Debug)]
pub struct Ingested {
    pub records: Vec<SalesRecord>,
    pub columns: Vec<String>,
    pub encoding: &'static str,
    pub skipped: usize,
}

/// Header aliases per semantic role, matched case-insensitively.
const ORDER_ALIASES: [&str; 2] = ["ORDERNUMBER", "ORDER_ID"];
const YEAR_ALIASES: [&str; 2] = ["YEAR_ID", "YEAR"];
const MONTH_ALIASES: [&str; 2] = ["MONTH_ID", "MONTH"];
const SALES_ALIASES: [&str; 2] = ["SALES", "AMOUNT"];
const PRODUCT_ALIASES: [&str; 2] = ["PRODUCTCODE", "PRODUCT_ID"];

/// Positions of the five semantic roles within the header row.
#[derive(Debug)]
struct ColumnRoles {
    order_number: Option<usize>,
    year: Option<usize>,
    month: Option<usize>,
    sales: Option<usize>,
    product_code: Option<usize>,
}

impl ColumnRoles {
    fn resolve(headers: &[String]) -> Self {
        let find = |aliases: &[&str], role: &str| {
            let idx = headers.iter().position(|h| {
                aliases
                    .iter()
                    .any(|a| h.trim().eq_ignore_ascii_case(a))
            });
            if idx.is_none() {
                warn!(role, "no column resolves to this role; values read as absent");
            }
            idx
        };

        ColumnRoles {
            order_number: find(&ORDER_ALIASES, "order-number"),
            year: find(&YEAR_ALIASES, "year-indicator"),
            month: find(&MONTH_ALIASES, "month-indicator"),
            sales: find(&SALES_ALIASES, "sales-amount"),
            product_code: find(&PRODUCT_ALIASES, "product-code"),
        }
    }
}

/// Decode `bytes` with the first encoding in the fixed list that reports no
/// malformed sequences. Returns the text and the winning label.
fn decode_bytes(bytes: &[u8]) -> Option<(String, &'static str)> {
    for label in ENCODING_LABELS {
        let enc = Encoding::for_label(label.as_bytes())?;
        let (text, _, had_errors) = enc.decode(bytes);
        if !had_errors {
            return Some((text.into_owned(), label));
        }
    }
    None
}

/// Pull a field by resolved role position. Missing or blank fields are
/// absent, which is distinct from present-but-unparseable.
fn field<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    let raw = record.get(idx?)?.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Integer cast. A plain integer parse is preferred; a real parse truncated
/// toward zero is accepted because the source data passes order numbers and
/// date parts through a real-valued representation.
fn parse_int(fieldname: &'static str, raw: &str) -> Result<i64, RowError> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(f as i64),
        _ => Err(RowError::NotInteger {
            field: fieldname,
            value: raw.to_string(),
        }),
    }
}

fn parse_real(fieldname: &'static str, raw: &str) -> Result<f64, RowError> {
    raw.parse::<f64>().map_err(|_| RowError::NotNumeric {
        field: fieldname,
        value: raw.to_string(),
    })
}

/// Coerce one raw row. `order_date` construction never fails: absent year
/// and month fall back to fixed constants and the result is pure formatting,
/// with no range validation.
///
/// An unparseable order-number degrades to absent instead of dropping the
/// row: the row still carries a usable amount and date, and must keep
/// contributing to the amount aggregates.
fn normalize_row(record: &csv::StringRecord, roles: &ColumnRoles) -> Result<SalesRecord, RowError> {
    let order_id = field(record, roles.order_number).and_then(|raw| {
        match parse_int("order-number", raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(%e, "order-number degraded to absent");
                None
            }
        }
    });
    let year = match field(record, roles.year) {
        Some(raw) => parse_int("year", raw)?,
        None => FALLBACK_YEAR,
    };
    let month = match field(record, roles.month) {
        Some(raw) => parse_int("month", raw)?,
        None => FALLBACK_MONTH,
    };
    let amount = match field(record, roles.sales) {
        Some(raw) => Some(parse_real("sales", raw)?),
        None => None,
    };
    let product_id = field(record, roles.product_code).map(str::to_string);

    Ok(SalesRecord {
        order_id,
        order_date: format!("{:04}-{:02}-01", year, month),
        amount,
        product_id,
    })
}

/// Read the delimited source file at `path` and produce normalized records.
///
/// Rows whose coercion fails are skipped with a warning; a file that no
/// supported encoding can decode is fatal.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_sales_csv<P: AsRef<Path>>(path: P) -> Result<Ingested> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let (text, encoding) = decode_bytes(&bytes).ok_or_else(|| DecodeError {
        path: path.display().to_string(),
        tried: ENCODING_LABELS.join(", "),
    })?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = rdr
        .headers()
        .context("reading header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let roles = ColumnRoles::resolve(&columns);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        // header occupies line 1
        let line = idx + 2;
        let outcome = result
            .map_err(RowError::from)
            .and_then(|record| normalize_row(&record, &roles));
        match outcome {
            Ok(rec) => records.push(rec),
            Err(e) => {
                warn!(line, %e, "skipping row");
                skipped += 1;
            }
        }
    }

    info!(
        rows = records.len(),
        skipped,
        columns = columns.len(),
        encoding,
        "loaded source file"
    );
    info!(?columns, "discovered columns");

    Ok(Ingested {
        records,
        columns,
        encoding,
        skipped,
    })
}
