use anyhow::{Context, Result};
use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::debug;

/// One rectangular query result: ordered column names, ordered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The closed catalog of aggregation queries this pipeline runs. The set is
/// fixed and finite; parameters live on the variants, not in a registry.
///
/// Year and month are extracted from `order_date` by position, which the
/// loader's `YYYY-MM-01` format guarantees is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    /// Revenue and order volume per (year, month) across all years.
    MonthlyRevenue,
    /// Same projection restricted to one year, ordered by month.
    MonthlyRevenueForYear(i32),
    /// Top N (year, month) groups by revenue, ties broken chronologically.
    TopMonths(u32),
    /// Sum-skipping-NULLs vs. sum-treating-NULLs-as-zero per group.
    MonthlyNulls,
}

impl Catalog {
    /// The fixed set executed on every run, in execution order.
    pub fn all() -> [Catalog; 4] {
        [
            Catalog::MonthlyRevenue,
            Catalog::MonthlyRevenueForYear(2004),
            Catalog::TopMonths(3),
            Catalog::MonthlyNulls,
        ]
    }

    /// Artifact key; doubles as the output filename stem.
    pub fn key(&self) -> String {
        match self {
            Catalog::MonthlyRevenue => "monthly_revenue".into(),
            Catalog::MonthlyRevenueForYear(year) => format!("monthly_revenue_{year}"),
            Catalog::TopMonths(n) => format!("top{n}_months"),
            Catalog::MonthlyNulls => "monthly_nulls".into(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Catalog::MonthlyRevenue => "Monthly Revenue & Order Volume (All Years)".into(),
            Catalog::MonthlyRevenueForYear(year) => {
                format!("Monthly Revenue & Order Volume ({year})")
            }
            Catalog::TopMonths(n) => format!("Top {n} Months by Sales"),
            Catalog::MonthlyNulls => "Monthly Revenue with NULL Handling".into(),
        }
    }

    pub fn purpose(&self) -> &'static str {
        match self {
            Catalog::MonthlyRevenue => {
                "Track total revenue and number of orders per calendar month across all years"
            }
            Catalog::MonthlyRevenueForYear(_) => {
                "Focus on one year's monthly performance to analyze trends and seasonality"
            }
            Catalog::TopMonths(_) => {
                "Identify the strongest months by revenue to inform business planning"
            }
            Catalog::MonthlyNulls => {
                "Demonstrate different approaches to handling NULL values in aggregations"
            }
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Catalog::MonthlyRevenue => {
                "SELECT
                    substr(order_date, 1, 4) AS year,
                    substr(order_date, 6, 2) AS month,
                    ROUND(SUM(COALESCE(amount, 0)), 2) AS monthly_revenue,
                    COUNT(*) AS order_count
                 FROM online_sales
                 GROUP BY year, month
                 ORDER BY year, month;"
            }
            Catalog::MonthlyRevenueForYear(_) => {
                "SELECT
                    substr(order_date, 1, 4) AS year,
                    substr(order_date, 6, 2) AS month,
                    ROUND(SUM(COALESCE(amount, 0)), 2) AS monthly_revenue,
                    COUNT(*) AS order_count
                 FROM online_sales
                 WHERE substr(order_date, 1, 4) = ?1
                 GROUP BY year, month
                 ORDER BY month;"
            }
            Catalog::TopMonths(_) => {
                "WITH monthly AS (
                    SELECT
                        substr(order_date, 1, 4) AS year,
                        substr(order_date, 6, 2) AS month,
                        SUM(COALESCE(amount, 0)) AS monthly_revenue
                    FROM online_sales
                    GROUP BY year, month
                 )
                 SELECT year, month, ROUND(monthly_revenue, 2) AS monthly_revenue
                 FROM monthly
                 ORDER BY monthly_revenue DESC, year, month
                 LIMIT ?1;"
            }
            Catalog::MonthlyNulls => {
                "SELECT
                    substr(order_date, 1, 4) AS year,
                    substr(order_date, 6, 2) AS month,
                    ROUND(SUM(amount), 2) AS sum_skipping_nulls,
                    ROUND(SUM(COALESCE(amount, 0)), 2) AS sum_treating_nulls_as_zero,
                    COUNT(*) AS total_orders,
                    COUNT(amount) AS orders_with_amount
                 FROM online_sales
                 GROUP BY year, month
                 ORDER BY year, month;"
            }
        }
    }

    fn params(&self) -> Vec<Value> {
        match self {
            Catalog::MonthlyRevenueForYear(year) => vec![Value::Text(format!("{year:04}"))],
            Catalog::TopMonths(n) => vec![Value::Integer(i64::from(*n))],
            _ => Vec::new(),
        }
    }
}

/// Execute one catalog entry and collect its full result set. Failures here
/// are isolated by the caller; the rest of the catalog still runs.
pub fn run_query(conn: &Connection, entry: Catalog) -> Result<ResultSet> {
    let mut stmt = conn
        .prepare(entry.sql())
        .with_context(|| format!("preparing {}", entry.key()))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query(params_from_iter(entry.params()))
        .with_context(|| format!("executing {}", entry.key()))?;

    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(row.get::<_, Value>(i)?);
        }
        collected.push(values);
    }
    debug!(query = %entry.key(), rows = collected.len(), "query complete");

    Ok(ResultSet {
        columns,
        rows: collected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SalesRecord;
    use crate::store::SalesStore;
    use anyhow::Result;

    fn rec(year: i32, month: u32, amount: Option<f64>) -> SalesRecord {
        SalesRecord {
            order_id: Some(10_000 + i64::from(month)),
            order_date: format!("{year:04}-{month:02}-01"),
            amount,
            product_id: Some("S10_1678".into()),
        }
    }

    fn store_with(records: &[SalesRecord]) -> Result<SalesStore> {
        let mut store = SalesStore::open_in_memory()?;
        store.rebuild_table()?;
        store.load(records)?;
        Ok(store)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn monthly_revenue_groups_and_orders() -> Result<()> {
        let store = store_with(&[
            rec(2004, 1, Some(100.5)),
            rec(2004, 1, None),
            rec(2004, 2, Some(50.0)),
        ])?;

        let rs = run_query(store.connection(), Catalog::MonthlyRevenue)?;
        assert_eq!(
            rs.columns,
            vec!["year", "month", "monthly_revenue", "order_count"]
        );
        assert_eq!(
            rs.rows,
            vec![
                vec![text("2004"), text("01"), Value::Real(100.5), Value::Integer(2)],
                vec![text("2004"), text("02"), Value::Real(50.0), Value::Integer(1)],
            ]
        );
        Ok(())
    }

    #[test]
    fn monthly_revenue_orders_year_before_month() -> Result<()> {
        let store = store_with(&[rec(2004, 1, Some(1.0)), rec(2003, 12, Some(1.0))])?;

        let rs = run_query(store.connection(), Catalog::MonthlyRevenue)?;
        assert_eq!(rs.rows[0][0], text("2003"));
        assert_eq!(rs.rows[0][1], text("12"));
        assert_eq!(rs.rows[1][0], text("2004"));
        Ok(())
    }

    #[test]
    fn filtered_year_restricts_and_orders_by_month() -> Result<()> {
        let store = store_with(&[
            rec(2003, 5, Some(10.0)),
            rec(2004, 2, Some(20.0)),
            rec(2004, 1, Some(30.0)),
        ])?;

        let rs = run_query(store.connection(), Catalog::MonthlyRevenueForYear(2004))?;
        assert_eq!(rs.rows.len(), 2);
        for row in &rs.rows {
            assert_eq!(row[0], text("2004"));
        }
        assert_eq!(rs.rows[0][1], text("01"));
        assert_eq!(rs.rows[1][1], text("02"));
        Ok(())
    }

    #[test]
    fn top_months_ranks_by_revenue_with_chronological_ties() -> Result<()> {
        let store = store_with(&[
            rec(2003, 1, Some(300.0)),
            rec(2003, 2, Some(50.0)),
            rec(2004, 1, Some(500.0)),
            rec(2004, 2, Some(500.0)),
            rec(2005, 3, Some(100.0)),
        ])?;

        let rs = run_query(store.connection(), Catalog::TopMonths(3))?;
        assert_eq!(rs.columns, vec!["year", "month", "monthly_revenue"]);
        assert_eq!(
            rs.rows,
            vec![
                vec![text("2004"), text("01"), Value::Real(500.0)],
                vec![text("2004"), text("02"), Value::Real(500.0)],
                vec![text("2003"), text("01"), Value::Real(300.0)],
            ]
        );
        Ok(())
    }

    #[test]
    fn top_months_is_a_subset_of_monthly_revenue() -> Result<()> {
        let store = store_with(&[
            rec(2003, 1, Some(300.0)),
            rec(2004, 1, Some(500.0)),
            rec(2004, 2, None),
        ])?;

        let monthly = run_query(store.connection(), Catalog::MonthlyRevenue)?;
        let top = run_query(store.connection(), Catalog::TopMonths(3))?;

        assert!(top.rows.len() <= 3);
        for row in &top.rows {
            let matched = monthly.rows.iter().any(|m| {
                m[0] == row[0] && m[1] == row[1] && m[2] == row[2]
            });
            assert!(matched, "top row {row:?} missing from monthly_revenue");
        }
        Ok(())
    }

    #[test]
    fn monthly_nulls_separates_omission_from_zero() -> Result<()> {
        let store = store_with(&[
            rec(2004, 1, Some(100.5)),
            rec(2004, 1, None),
            rec(2004, 2, Some(50.0)),
        ])?;

        let rs = run_query(store.connection(), Catalog::MonthlyNulls)?;
        assert_eq!(
            rs.columns,
            vec![
                "year",
                "month",
                "sum_skipping_nulls",
                "sum_treating_nulls_as_zero",
                "total_orders",
                "orders_with_amount"
            ]
        );
        // (2004, 01): one present amount, one absent
        assert_eq!(
            rs.rows[0],
            vec![
                text("2004"),
                text("01"),
                Value::Real(100.5),
                Value::Real(100.5),
                Value::Integer(2),
                Value::Integer(1),
            ]
        );
        Ok(())
    }

    #[test]
    fn monthly_nulls_all_absent_group_sums_to_null_vs_zero() -> Result<()> {
        let store = store_with(&[rec(2003, 7, None), rec(2003, 7, None)])?;

        let rs = run_query(store.connection(), Catalog::MonthlyNulls)?;
        let row = &rs.rows[0];
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[3], Value::Real(0.0));
        assert_eq!(row[4], Value::Integer(2));
        assert_eq!(row[5], Value::Integer(0));
        Ok(())
    }

    #[test]
    fn empty_table_yields_empty_result_sets() -> Result<()> {
        let store = store_with(&[])?;
        for entry in Catalog::all() {
            let rs = run_query(store.connection(), entry)?;
            assert!(rs.is_empty(), "{} should be empty", entry.key());
        }
        Ok(())
    }

    #[test]
    fn missing_table_is_an_isolated_query_error() -> Result<()> {
        let store = SalesStore::open_in_memory()?;
        assert!(run_query(store.connection(), Catalog::MonthlyRevenue).is_err());
        Ok(())
    }

    #[test]
    fn catalog_keys_name_the_artifacts() {
        let keys: Vec<String> = Catalog::all().iter().map(Catalog::key).collect();
        assert_eq!(
            keys,
            vec![
                "monthly_revenue",
                "monthly_revenue_2004",
                "top3_months",
                "monthly_nulls"
            ]
        );
    }
}
