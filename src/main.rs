use anyhow::Result;
use clap::Parser;
use salestrend::{
    ingest,
    query::{self, Catalog},
    render,
    store::SalesStore,
};
use std::{fs, path::PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Sales trend analysis: import a delimited sales file into SQLite and render the aggregation catalog"
)]
struct Args {
    /// Delimited source file of raw sales rows
    #[arg(long, default_value = "sales_data_sample.csv")]
    input: PathBuf,

    /// SQLite store file, rebuilt from scratch on every run
    #[arg(long, default_value = "online_sales.db")]
    db: PathBuf,

    /// Directory for rendered table artifacts and the reference document
    #[arg(long, default_value = "./output")]
    output: PathBuf,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    fs::create_dir_all(&args.output)?;

    // ─── 2) ingest the source file ───────────────────────────────────
    let ingested = ingest::load_sales_csv(&args.input)?;

    // ─── 3) rebuild and load the store ───────────────────────────────
    let mut store = SalesStore::create(&args.db)?;
    store.rebuild_table()?;
    store.load(&ingested.records)?;

    // ─── 4) run the catalog, rendering each result ───────────────────
    for entry in Catalog::all() {
        let result = match query::run_query(store.connection(), entry) {
            Ok(r) => r,
            Err(e) => {
                error!(query = %entry.key(), "query failed: {e:#}");
                continue;
            }
        };
        if result.is_empty() {
            warn!(query = %entry.key(), "no data returned");
            continue;
        }

        let out_path = args.output.join(format!("{}.svg", entry.key()));
        if let Err(e) = render::save_table_svg(&result, &out_path, &entry.title()) {
            error!(query = %entry.key(), "rendering failed: {e:#}");
            continue;
        }

        println!("\n{}", entry.title());
        println!("Purpose: {}", entry.purpose());
        print!("{}", render::format_text_table(&result));
        println!("{}", "-".repeat(50));
    }

    // ─── 5) companion reference document ─────────────────────────────
    render::write_reference_doc(&args.output.join("sql_aggregation_notes.md"))?;

    store.close()?;
    info!("pipeline complete");
    Ok(())
}
