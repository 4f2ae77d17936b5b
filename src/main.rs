// Fleet Earnings - command-line back office
//
// Configuration comes from FLEET_* environment variables (or .env).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use fleet_earnings::{
    init_tracing, Config, DeleteOutcome, ImportService, Platform, RawImportFile,
    ReportQuery, SqliteStore, WeekStart,
};

#[derive(Parser)]
#[command(name = "fleet-earnings", version, about = "Weekly driver earnings: import, reconcile, pay")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Bolt/Uber CSV or Heetch PDF export
    Import {
        /// Path to the export file
        file: PathBuf,
        /// Any date within the week (defaults to the current week)
        #[arg(long)]
        week: Option<NaiveDate>,
        /// bolt, uber or heetch (detected from the content when omitted)
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Parse and validate an export without importing it
    Preview {
        file: PathBuf,
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Delete one platform's import for a week
    Delete {
        platform: Platform,
        #[arg(long)]
        week: Option<NaiveDate>,
    },
    /// Upload status of every platform for a week
    Status {
        #[arg(long)]
        week: Option<NaiveDate>,
    },
    /// Payment reports for a week
    Reports {
        #[arg(long)]
        week: Option<NaiveDate>,
        /// Filter by driver name
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long)]
        per_page: Option<usize>,
        /// Recompute the week's reports first
        #[arg(long)]
        rebuild: bool,
    },
    /// Week totals, change vs. previous week, revenue split
    Dashboard {
        #[arg(long)]
        week: Option<NaiveDate>,
    },
    /// Revenue per month over the last N weeks
    Monthly {
        #[arg(long, default_value = "12")]
        weeks: u32,
    },
    /// Mark a payment report as paid
    Pay {
        report_id: Uuid,
    },
    /// Show or set the commission deducted from every report
    Commission {
        amount: Option<Decimal>,
    },
}

fn resolve_week(date: Option<NaiveDate>) -> WeekStart {
    date.map(WeekStart::containing).unwrap_or_else(WeekStart::current)
}

fn read_export(path: &Path, week: WeekStart, platform: Option<Platform>) -> Result<RawImportFile> {
    let content = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let file = match platform {
        Some(platform) => RawImportFile::new(platform, week, content),
        None => RawImportFile::detect(week, content)
            .with_context(|| format!("Could not recognise {}; pass --platform", path.display()))?,
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(file.with_file_name(&name))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing("fleet_earnings=info");

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    let service = ImportService::new(store, &config.owner_id)
        .with_default_commission(config.default_commission);

    match cli.command {
        Commands::Import { file, week, platform } => {
            let raw = read_export(&file, resolve_week(week), platform)?;
            println!("📂 Importing {} export for week {} ({})", raw.platform, raw.week_start, raw.week_start.label());

            match service.import(&raw) {
                Ok(outcome) => {
                    if cli.json {
                        return print_json(&outcome);
                    }
                    println!("✓ {}", outcome.summary());
                    for err in &outcome.rejected {
                        println!("  ✗ {}", err);
                    }
                    if outcome.out_of_order {
                        println!("⚠️  Recommended order is Bolt → Uber → Heetch");
                    }
                    match &outcome.reports_error {
                        Some(err) => println!("⚠️  Payment reports not rebuilt ({}); run `reports --rebuild`", err),
                        None => println!("✓ {} payment reports rebuilt", outcome.reports_rebuilt),
                    }
                }
                Err(err) => {
                    for row in err.row_errors() {
                        eprintln!("  ✗ {}", row);
                    }
                    return Err(err).context("Import failed");
                }
            }
        }
        Commands::Preview { file, week, platform } => {
            let raw = read_export(&file, resolve_week(week), platform)?;
            let batch = service.preview(&raw)?;

            if cli.json {
                return print_json(&batch);
            }
            println!("🔍 {} rows, {} valid, total {} €", batch.total_rows(), batch.records.len(), batch.total_revenue());
            for record in &batch.records {
                println!("  {:<32} {:>10} €", record.full_name, record.total_revenue);
            }
            for err in &batch.errors {
                println!("  ✗ {}", err);
            }
        }
        Commands::Delete { platform, week } => {
            let week = resolve_week(week);
            match service.delete(platform, week)? {
                DeleteOutcome::Deleted { rows, .. } => {
                    println!("🗑️  Deleted {} {} rows for week {}", rows, platform, week)
                }
                DeleteOutcome::NotUploaded => {
                    println!("Nothing to delete: {} was not uploaded for week {}", platform, week)
                }
            }
        }
        Commands::Status { week } => {
            let week = resolve_week(week);
            let statuses = service.import_status(week)?;

            if cli.json {
                return print_json(&statuses);
            }
            println!("📋 Week {} ({})", week, week.label());
            for status in &statuses {
                let mark = if status.uploaded { "✅" } else { "⬜" };
                println!("  {} {:<7} {} ({} rows)", mark, status.platform.name(), status.state().as_str(), status.row_count);
            }
        }
        Commands::Reports { week, search, page, per_page, rebuild } => {
            let week = resolve_week(week);
            if rebuild {
                service.rebuild_reports(week)?;
            }

            let query = ReportQuery::new(search, page, per_page.unwrap_or(config.page_size));
            let reports = service.reports(week, &query)?;

            if cli.json {
                return print_json(&reports);
            }
            println!("💶 Week {} - page {}/{} ({} reports)", week, reports.page, reports.total_pages().max(1), reports.total);
            for report in &reports.items {
                let flag = if report.is_overdrawn() { " ⚠️" } else { "" };
                println!(
                    "  {} {:<28} bolt {:>9} uber {:>9} heetch {:>9} | due {:>9} [{}]{}",
                    report.id,
                    report.driver_name,
                    report.bolt_earnings,
                    report.uber_earnings,
                    report.heetch_earnings,
                    report.total_due,
                    report.status.as_str(),
                    flag
                );
            }
        }
        Commands::Dashboard { week } => {
            let dashboard = service.dashboard(resolve_week(week))?;

            if cli.json {
                return print_json(&dashboard);
            }
            let current = &dashboard.comparison.current;
            println!("📊 Week {} ({})", dashboard.week_start, dashboard.week_label);
            println!("  Drivers:    {} ({}%)", current.driver_count, dashboard.comparison.driver_change_pct);
            println!("  Earnings:   {} € ({}%)", current.total_earnings, dashboard.comparison.earnings_change_pct);
            println!("  Commission: {} €", current.total_commission);
            println!("  Due:        {} € ({}%)", current.total_due, dashboard.comparison.due_change_pct);
            println!("  Overdrawn:  {}", current.overdrawn_count);
            println!(
                "  Split:      Bolt {} € / Uber {} € / Heetch {} €",
                dashboard.distribution.bolt, dashboard.distribution.uber, dashboard.distribution.heetch
            );
            if let Some(next) = dashboard.recommended_next {
                println!("  Next import: {}", next);
            }
        }
        Commands::Monthly { weeks } => {
            let to = WeekStart::current();
            let from = (1..weeks.max(1)).fold(to, |w, _| w.previous());
            let months = service.monthly_revenue(from, to)?;

            if cli.json {
                return print_json(&months);
            }
            for month in &months {
                println!(
                    "  {}-{:02}: {} € earned, {} € due ({} reports)",
                    month.year, month.month, month.total_earnings, month.total_due, month.report_count
                );
            }
        }
        Commands::Pay { report_id } => match service.mark_paid(report_id)? {
            Some(report) => println!("✅ {} marked paid ({} €)", report.driver_name, report.total_due),
            None => anyhow::bail!("No payment report with id {}", report_id),
        },
        Commands::Commission { amount } => {
            if let Some(amount) = amount {
                service.set_commission(amount)?;
                println!("✓ Commission set to {} €", amount);
            } else {
                println!("Commission: {} €", service.commission()?);
            }
        }
    }

    Ok(())
}
