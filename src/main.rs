use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;

use aggregate_patterns::{
    clear_database, count_rows, generate_matches, run_benchmark, seed_database, setup_database,
    Approach, BenchConfig, BenchmarkReport, Expectations,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = BenchConfig::from_env()?;

    match parse_command(&args) {
        Ok(Command::Seed) => run_seed(&config)?,
        Ok(Command::Run { json }) => run_benchmarks(&config, json)?,
        Err(other) => {
            eprintln!("❌ Unknown command: {}", other);
            eprintln!("   Usage: aggregate-patterns [seed | run] [--json]");
            std::process::exit(2);
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Seed,
    Run { json: bool },
}

/// `run` is the default command; `--json` may appear anywhere.
/// Returns the offending argument when it is not understood.
fn parse_command(args: &[String]) -> std::result::Result<Command, String> {
    let json = args.iter().any(|a| a == "--json");
    let mut words = args.iter().filter(|a| a.as_str() != "--json");

    let command = match words.next().map(String::as_str) {
        Some("seed") if !json => Command::Seed,
        Some("run") | None => Command::Run { json },
        Some(other) => return Err(other.to_string()),
    };

    match words.next() {
        Some(extra) => Err(extra.clone()),
        None => Ok(command),
    }
}

fn run_seed(config: &BenchConfig) -> Result<()> {
    println!("🗄️  Seeding fixtures → {}", config.database_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    setup_database(&conn)?;

    println!("\n🧹 Clearing previous fixtures...");
    clear_database(&conn)?;

    println!(
        "\n💾 Inserting {} matches ({} trade + {} clearance adjustments each)...",
        config.match_count, config.trade_adjustment_count, config.clearance_adjustment_count
    );
    let matches = generate_matches(config);
    let written = seed_database(&mut conn, &matches)?;

    println!("\n🔍 Verifying database...");
    let counts = count_rows(&conn)?;
    if counts != written {
        bail!("database holds {:?}, expected {:?}", counts, written);
    }
    println!(
        "✓ {} matches, {} trades, {} clearances, {} adjustments",
        counts.matches, counts.trades, counts.clearances, counts.adjustments
    );

    Ok(())
}

fn run_benchmarks(config: &BenchConfig, json: bool) -> Result<()> {
    if !config.database_path.exists() {
        eprintln!("❌ Database not found: {}", config.database_path.display());
        eprintln!("   Run: aggregate-patterns seed");
        std::process::exit(1);
    }

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    let mut reports: Vec<BenchmarkReport> = Vec::new();
    for approach in Approach::all() {
        if !json {
            println!("⏱️  {}", approach);
        }
        let expected = Expectations::for_shape(config, approach.shape());
        let report = run_benchmark(&conn, approach, &expected)?;
        if !json {
            println!("   ✓ {}", report);
        }
        reports.push(report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("\n✅ {} runs verified", reports.len());
    }

    Ok(())
}
