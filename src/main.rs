use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use zakscraper::context::RunContext;
use zakscraper::fetch::Fetcher;
use zakscraper::search::{self, normalize_years};
use zakscraper::store::{Cell, Workbook, STORE_FILE};
use zakscraper::{docs, enrich};

#[derive(Parser, Debug)]
#[command(
    name = "zakscraper",
    version,
    about = "Collects and enriches procurement records from zakupki.gov.ru"
)]
struct Args {
    /// Pipeline stage: 1 collects search results, 2 enriches each lot,
    /// 3 downloads documents for flagged lots
    #[arg(value_parser = clap::value_parser!(u8).range(1..=3), default_value_t = 1)]
    stage: u8,

    /// Tax ids (INN) to collect on stage 1; ignored by stages 2-3
    #[arg(short, long, num_args = 1..)]
    inn: Vec<String>,

    /// Years to search on stage 1, two-digit values meaning 20xx; defaults
    /// to the current year. Ignored by stages 2-3
    #[arg(short, long, num_args = 1.., allow_negative_numbers = true)]
    year: Vec<i32>,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let ctx = RunContext::capture();
    let store_path = Path::new(STORE_FILE);

    // ─── 2) open the workbook ────────────────────────────────────────
    if store_path.exists() {
        info!("{STORE_FILE} found, it will be extended");
    } else {
        info!("{STORE_FILE} not found, it will be created at the end of the run");
    }
    let mut wb = Workbook::load(store_path)?;
    let fetcher = Fetcher::new()?;

    let mut log_entry: Vec<(String, Cell)> = vec![
        (
            "Date time".to_string(),
            Cell::from(ctx.started.format("%Y-%m-%d %H:%M:%S").to_string()),
        ),
        ("Version".to_string(), Cell::from(env!("CARGO_PKG_VERSION"))),
        (
            "Command line".to_string(),
            Cell::from(serde_json::to_string(&ctx.command_line)?),
        ),
        ("Stage".to_string(), Cell::from(args.stage as i64)),
    ];

    // ─── 3) run the selected stage ───────────────────────────────────
    match args.stage {
        1 => {
            info!("stage 1: collecting search results");
            let years = normalize_years(&args.year, ctx.current_year());
            if args.inn.is_empty() {
                info!("no INN given; only previously scheduled jobs will be processed");
            } else {
                for (i, inn) in args.inn.iter().enumerate() {
                    info!("{:3}: {inn}", i + 1);
                }
                info!("search years: {years:?}");
                log_entry.push((
                    "INN list".to_string(),
                    Cell::from(serde_json::to_string(&args.inn)?),
                ));
                log_entry.push((
                    "Years".to_string(),
                    Cell::from(serde_json::to_string(&years)?),
                ));
            }
            search::run(&mut wb, &fetcher, store_path, &args.inn, &years, &ctx)?;
        }
        2 => {
            info!("stage 2: enriching collected lots");
            enrich::run(&mut wb, &fetcher, store_path)?;
        }
        3 => {
            info!("stage 3: downloading documents for flagged lots");
            docs::run(&mut wb, &fetcher, store_path, Path::new("."))?;
        }
        _ => unreachable!("clap bounds the stage to 1..=3"),
    }

    // ─── 4) audit entry + final save ─────────────────────────────────
    wb.log().append(log_entry);

    let written = wb.save_with_fallback(store_path)?;
    if written == store_path {
        info!("workbook saved to {}", written.display());
    } else {
        warn!(
            "primary file was not writable; workbook saved to {}",
            written.display()
        );
    }
    Ok(())
}
