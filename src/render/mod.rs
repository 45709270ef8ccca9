use anyhow::{Context, Result};
use rusqlite::types::Value;
use std::fmt::Write as _;
use std::{fs, path::Path};
use tracing::{info, warn};

use crate::query::ResultSet;

// Table geometry. Widths scale with content length; heights are fixed.
const CHAR_W: usize = 9;
const CELL_PAD: usize = 16;
const ROW_H: usize = 30;
const TITLE_H: usize = 44;
const MARGIN: usize = 12;

const HEADER_FILL: &str = "#4caf50";
const STRIPE_FILL: &str = "#f0f0f0";
const GRID_STROKE: &str = "#cccccc";

/// Display form of a single SQL value. NULL stays visible as a literal,
/// since the NULL-handling query exists to show exactly that.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => {
            if *r == r.trunc() && r.abs() < 1e15 {
                format!("{r:.1}")
            } else {
                format!("{r}")
            }
        }
        Value::Text(t) => t.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render `result` as a styled SVG table at `out_path`. Returns `false`
/// (and writes nothing) when the result set is empty.
pub fn save_table_svg(result: &ResultSet, out_path: &Path, title: &str) -> Result<bool> {
    if result.is_empty() {
        warn!(title, "result set is empty; no artifact rendered");
        return Ok(false);
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let body = cells.iter().map(|row| row[i].len()).max().unwrap_or(0);
            name.len().max(body).max(4) * CHAR_W + 2 * CELL_PAD
        })
        .collect();

    let table_w: usize = widths.iter().sum();
    let total_w = table_w + 2 * MARGIN;
    let total_h = TITLE_H + ROW_H * (cells.len() + 1) + 2 * MARGIN;

    let mut svg = String::new();
    write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{total_w}\" height=\"{total_h}\" \
         viewBox=\"0 0 {total_w} {total_h}\" font-family=\"Helvetica, Arial, sans-serif\">\n"
    )?;
    write!(
        svg,
        "  <rect width=\"{total_w}\" height=\"{total_h}\" fill=\"#ffffff\"/>\n"
    )?;
    write!(
        svg,
        "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"16\" font-weight=\"bold\">{}</text>\n",
        total_w / 2,
        MARGIN + 22,
        xml_escape(title)
    )?;

    // header row, then data rows with alternating shading
    let header: Vec<String> = result.columns.clone();
    for (row_idx, row) in std::iter::once(&header).chain(cells.iter()).enumerate() {
        let top = MARGIN + TITLE_H + ROW_H * row_idx;
        let (fill, text_fill, weight) = if row_idx == 0 {
            (HEADER_FILL, "#ffffff", " font-weight=\"bold\"")
        } else if row_idx % 2 == 0 {
            (STRIPE_FILL, "#000000", "")
        } else {
            ("#ffffff", "#000000", "")
        };

        let mut x = MARGIN;
        for (col_idx, cell) in row.iter().enumerate() {
            let w = widths[col_idx];
            write!(
                svg,
                "  <rect x=\"{x}\" y=\"{top}\" width=\"{w}\" height=\"{ROW_H}\" \
                 fill=\"{fill}\" stroke=\"{GRID_STROKE}\"/>\n"
            )?;
            write!(
                svg,
                "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-size=\"13\" \
                 fill=\"{text_fill}\"{weight}>{}</text>\n",
                x + w / 2,
                top + ROW_H / 2 + 5,
                xml_escape(cell)
            )?;
            x += w;
        }
    }
    svg.push_str("</svg>\n");

    fs::write(out_path, svg).with_context(|| format!("writing {}", out_path.display()))?;
    info!(path = %out_path.display(), rows = result.rows.len(), "saved table artifact");
    Ok(true)
}

/// Plain-text rendering of a result set for console output.
pub fn format_text_table(result: &ResultSet) -> String {
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();
    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let body = cells.iter().map(|row| row[i].len()).max().unwrap_or(0);
            name.len().max(body)
        })
        .collect();

    let mut out = String::new();
    let render_row = |out: &mut String, row: &[String]| {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };

    render_row(&mut out, &result.columns);
    for row in &cells {
        render_row(&mut out, row);
    }
    out
}

/// The static companion document: conceptual Q&A on the aggregation
/// techniques the catalog demonstrates. Not derived from query results.
const REFERENCE_NOTES: &str = r#"# SQL Aggregation Questions and Answers

## 1. How do you group data by month/year?
Extract the year and month from the date column, then `GROUP BY` both.
With dates stored as `YYYY-MM-01` text, `substr(order_date, 1, 4)` gives
the year and `substr(order_date, 6, 2)` the month (SQLite's
`strftime('%Y', ...)` / `strftime('%m', ...)` are equivalent).
`GROUP BY year, month` then groups records by these time periods.

## 2. Difference between COUNT(*) and COUNT(DISTINCT col)?
- `COUNT(*)`: counts all rows, including duplicates and NULLs
- `COUNT(DISTINCT col)`: counts unique non-NULL values in the column
- Example: for orders [1, 1, 2, NULL], `COUNT(*)` = 4 while
  `COUNT(DISTINCT col)` = 2

## 3. How do you calculate monthly revenue?
```sql
SELECT
    substr(order_date, 1, 7) AS month,
    SUM(amount) AS monthly_revenue
FROM online_sales
GROUP BY month;
```
Use the `SUM()` aggregate function with `GROUP BY` month/year.

## 4. What are aggregate functions in SQL?
Functions that compute a single result over many rows:
- `SUM()`: total of numeric values
- `COUNT()`: number of rows
- `AVG()`: average value
- `MIN()` / `MAX()`: minimum / maximum values
- `GROUP_CONCAT()`: concatenate values

## 5. How to handle NULLs in aggregates?
- `SUM(amount)`: ignores NULL values
- `SUM(COALESCE(amount, 0))`: treats NULLs as 0
- `COUNT(amount)`: counts non-NULL values only
- `COUNT(*)`: counts all rows including NULLs

## 6. What's the role of ORDER BY and GROUP BY?
- `GROUP BY` collapses rows with the same key into summary rows
- `ORDER BY` sorts the final result set
- `ORDER BY` runs after `GROUP BY` in query execution order, and can sort
  by grouped columns or by aggregate results

## 7. How to get the top 3 months by sales?
```sql
SELECT month, SUM(amount) AS revenue
FROM online_sales
GROUP BY month
ORDER BY revenue DESC
LIMIT 3;
```
Use `ORDER BY ... DESC` with `LIMIT` to keep only the top results.
"#;

/// Write the static reference document. Content is fixed, not derived from
/// any query result.
pub fn write_reference_doc(out_path: &Path) -> Result<()> {
    fs::write(out_path, REFERENCE_NOTES)
        .with_context(|| format!("writing {}", out_path.display()))?;
    info!(path = %out_path.display(), "saved reference document");
    Ok(())
}
