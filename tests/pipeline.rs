use anyhow::Result;
use rusqlite::types::Value;
use salestrend::ingest::load_sales_csv;
use salestrend::query::{run_query, Catalog, ResultSet};
use salestrend::render::{save_table_svg, write_reference_doc};
use salestrend::store::SalesStore;
use std::fs;
use std::path::Path;

const FIXTURE: &str = "\
ORDERNUMBER,YEAR_ID,MONTH_ID,SALES,PRODUCTCODE
10107,2004,1,100.5,S10_1678
10108,2004,1,,S10_1949
10109,2004,2,50,S12_1099
garbage,2004,2,10,S12_3148
10110,2004,2,ten,S12_4473
,2003,11,25,S18_2248
";

fn text(s: &str) -> Value {
    Value::Text(s.into())
}

fn run_pipeline(dir: &Path) -> Result<Vec<ResultSet>> {
    let input = dir.join("sales.csv");
    fs::write(&input, FIXTURE)?;

    let ingested = load_sales_csv(&input)?;
    let mut store = SalesStore::create(dir.join("online_sales.db"))?;
    store.rebuild_table()?;
    store.load(&ingested.records)?;

    let mut results = Vec::new();
    for entry in Catalog::all() {
        let rs = run_query(store.connection(), entry)?;
        save_table_svg(&rs, &dir.join(format!("{}.svg", entry.key())), &entry.title())?;
        results.push(rs);
    }
    write_reference_doc(&dir.join("sql_aggregation_notes.md"))?;
    store.close()?;
    Ok(results)
}

#[test]
fn pipeline_produces_the_expected_aggregates() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let input = dir.path().join("sales.csv");
    fs::write(&input, FIXTURE)?;
    let ingested = load_sales_csv(&input)?;

    // the unparseable-amount row is dropped; the garbage order-number row
    // survives with order_id absent and still counts toward revenue
    assert_eq!(ingested.skipped, 1);
    assert_eq!(ingested.records.len(), 5);
    assert_eq!(ingested.records[3].order_id, None);
    assert_eq!(ingested.records[3].amount, Some(10.0));

    let mut store = SalesStore::create(dir.path().join("online_sales.db"))?;
    store.rebuild_table()?;
    store.load(&ingested.records)?;

    let monthly = run_query(store.connection(), Catalog::MonthlyRevenue)?;
    assert_eq!(
        monthly.rows,
        vec![
            vec![text("2003"), text("11"), Value::Real(25.0), Value::Integer(1)],
            vec![text("2004"), text("01"), Value::Real(100.5), Value::Integer(2)],
            vec![text("2004"), text("02"), Value::Real(60.0), Value::Integer(2)],
        ]
    );

    let filtered = run_query(store.connection(), Catalog::MonthlyRevenueForYear(2004))?;
    assert_eq!(filtered.rows.len(), 2);
    assert!(filtered.rows.iter().all(|r| r[0] == text("2004")));

    let nulls = run_query(store.connection(), Catalog::MonthlyNulls)?;
    // (2004, 01): one present amount, one absent — omission and
    // zero-substitution agree on the sum but not on the counts
    assert_eq!(
        nulls.rows[1],
        vec![
            text("2004"),
            text("01"),
            Value::Real(100.5),
            Value::Real(100.5),
            Value::Integer(2),
            Value::Integer(1),
        ]
    );

    store.close()?;
    Ok(())
}

#[test]
fn rerunning_the_pipeline_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let first = run_pipeline(dir.path())?;
    let second = run_pipeline(dir.path())?;
    assert_eq!(first, second);

    for key in [
        "monthly_revenue",
        "monthly_revenue_2004",
        "top3_months",
        "monthly_nulls",
    ] {
        assert!(dir.path().join(format!("{key}.svg")).exists(), "{key} artifact missing");
    }
    assert!(dir.path().join("sql_aggregation_notes.md").exists());
    Ok(())
}
