//! Chairside CLI
//!
//! Inspect clinic record exports without the app: build the indexes over
//! a JSON file and query them from the command line, or run the cached
//! adapter demo.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chairside::adapters::{AdapterConfig, ExpenseAdapter, PatientAdapter, RevenueAdapter};
use chairside::cache::CacheManager;
use chairside::config::{generate_default_config, Config, LoggingConfig};
use chairside::index::SearchOptions;
use chairside::query::{
    AmountPreset, DatePreset, FilterEngine, RecordFilter, SortBy, SortOrder,
};
use chairside::records::{
    expense_search_text, payment_search_text, Expense, Indexable, MemorySource, Payment,
    RecordSource,
};

#[derive(Parser)]
#[command(name = "chairside")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-memory indexing and caching engine for clinic records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a record file and print build and filter statistics
    Stats {
        /// JSON file holding an array of records
        file: PathBuf,
        /// Treat the file as payments instead of expenses
        #[arg(long)]
        payments: bool,
    },
    /// Filter records and print one page
    Filter {
        file: PathBuf,
        #[arg(long)]
        payments: bool,
        /// Category (expense category / payment method)
        #[arg(short, long)]
        category: Option<String>,
        /// Keep only records with this paid status
        #[arg(long)]
        paid: Option<bool>,
        /// Date preset: today, week, month, quarter, year
        #[arg(long)]
        date: Option<String>,
        /// Amount preset: low, medium, high
        #[arg(long)]
        amount: Option<String>,
        /// Search term
        #[arg(short, long)]
        term: Option<String>,
        /// Sort key: date, amount, category
        #[arg(long, default_value = "date")]
        sort: String,
        /// Sort order: asc, desc
        #[arg(long, default_value = "desc")]
        order: String,
        /// Page number (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Items per page
        #[arg(short = 'n', long, default_value_t = 20)]
        per_page: usize,
    },
    /// Search the text index
    Search {
        file: PathBuf,
        /// Query words
        query: String,
        #[arg(long)]
        payments: bool,
        /// Match the query as a substring of the full record text
        #[arg(long)]
        exact: bool,
        /// Widen word matching with the character-overlap heuristic
        #[arg(long)]
        fuzzy: bool,
        /// Restrict results to one category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Run the cached-adapter demo over generated records
    Demo,
    /// Print a default configuration file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Stats { file, payments } => {
            if payments {
                let engine = FilterEngine::new(load_records::<Payment>(&file)?, payment_search_text);
                print_stats(&engine, &cli.format)?;
            } else {
                let engine = FilterEngine::new(load_records::<Expense>(&file)?, expense_search_text);
                print_stats(&engine, &cli.format)?;
            }
        }

        Commands::Filter {
            file,
            payments,
            category,
            paid,
            date,
            amount,
            term,
            sort,
            order,
            page,
            per_page,
        } => {
            let mut filter = RecordFilter::new();
            if let Some(category) = category {
                filter = filter.category(category);
            }
            if let Some(paid) = paid {
                filter = filter.paid(paid);
            }
            if let Some(date) = &date {
                let preset = DatePreset::from_str(date)
                    .context("unknown date preset (today, week, month, quarter, year)")?;
                filter = filter.date_preset(preset);
            }
            if let Some(amount) = &amount {
                let preset = AmountPreset::from_str(amount)
                    .context("unknown amount preset (low, medium, high)")?;
                filter = filter.amount_preset(preset);
            }
            if let Some(term) = term {
                filter = filter.search(term);
            }
            let sort_by = SortBy::from_str(&sort).context("unknown sort key")?;
            let sort_order = SortOrder::from_str(&order).context("unknown sort order")?;
            filter = filter.sort(sort_by, sort_order);

            if payments {
                let engine = FilterEngine::new(load_records::<Payment>(&file)?, payment_search_text);
                print_page(&engine, &filter, page, per_page, &cli.format)?;
            } else {
                let engine = FilterEngine::new(load_records::<Expense>(&file)?, expense_search_text);
                print_page(&engine, &filter, page, per_page, &cli.format)?;
            }
        }

        Commands::Search {
            file,
            query,
            payments,
            exact,
            fuzzy,
            category,
        } => {
            let mut options = SearchOptions::default();
            if exact {
                options = options.exact();
            }
            if fuzzy {
                options = options.fuzzy();
            }
            if let Some(category) = category {
                options = options.category(category);
            }

            if payments {
                let engine = FilterEngine::new(load_records::<Payment>(&file)?, payment_search_text);
                print_records(&engine.advanced_search(&query, &options), &cli.format)?;
            } else {
                let engine = FilterEngine::new(load_records::<Expense>(&file)?, expense_search_text);
                print_records(&engine.advanced_search(&query, &options), &cli.format)?;
            }
        }

        Commands::Demo => run_demo(&config).await,

        Commands::Config => {
            println!("{}", generate_default_config());
        }
    }

    Ok(())
}

/// Initialize logging from the config, honoring `RUST_LOG` when set
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chairside={}", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading record file {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing record file {:?}", path))
}

fn print_stats<R: Indexable + Clone>(engine: &FilterEngine<R>, format: &str) -> Result<()> {
    let build = engine.engine().stats();
    let filters = engine.filter_stats();
    if format == "json" {
        let combined = serde_json::json!({
            "build": build,
            "filters": filters,
        });
        println!("{}", serde_json::to_string_pretty(&combined)?);
    } else {
        println!("{build}");
        println!();
        println!("{filters}");
    }
    Ok(())
}

fn print_page<R: Indexable + Clone + Serialize>(
    engine: &FilterEngine<R>,
    filter: &RecordFilter,
    page: usize,
    per_page: usize,
    format: &str,
) -> Result<()> {
    let result = engine.paginate_filters(filter, page, per_page);
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_record_table(&result.items);
    println!(
        "Page {}/{} ({} records total)",
        result.current_page, result.total_pages, result.total_items
    );
    Ok(())
}

fn print_records<R: Indexable + Serialize>(records: &[R], format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    print_record_table(records);
    println!("{} records", records.len());
    Ok(())
}

fn print_record_table<R: Indexable>(records: &[R]) {
    println!(
        "{:<8} {:<12} {:<16} {:>10} {:<6}",
        "ID", "Date", "Category", "Amount", "Paid"
    );
    println!("{}", "-".repeat(56));
    for record in records {
        println!(
            "{:<8} {:<12} {:<16} {:>10} {:<6}",
            record.id(),
            record.date().unwrap_or("-"),
            record.category().unwrap_or("-"),
            record
                .amount()
                .map(|a| format!("{a:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            record
                .is_paid()
                .map(|p| if p { "yes" } else { "no" })
                .unwrap_or("-"),
        );
    }
}

/// Exercise the adapters end to end over generated records
async fn run_demo(config: &Config) {
    tracing::info!("Chairside demo v{}", env!("CARGO_PKG_VERSION"));

    let expenses = Arc::new(MemorySource::with_records(demo_expenses()));
    let payments = Arc::new(MemorySource::with_records(demo_payments()));
    let manager = Arc::new(CacheManager::new(config.cache.memory_limits()));

    let expense_adapter = ExpenseAdapter::new(
        Arc::clone(&expenses) as Arc<dyn RecordSource<Expense>>,
        Arc::clone(&manager),
        config.cache.expenses.adapter_config(),
    );
    let revenue_adapter = RevenueAdapter::new(
        Arc::clone(&payments) as Arc<dyn RecordSource<Payment>>,
        Arc::clone(&manager),
        config.cache.revenue.adapter_config(),
    );
    let patient_adapter = PatientAdapter::new(
        Arc::clone(&payments) as Arc<dyn RecordSource<Payment>>,
        Arc::clone(&manager),
        config.cache.patients.adapter_config(),
    );
    expense_adapter.start();
    revenue_adapter.start();
    patient_adapter.start();
    expense_adapter.schedule_cleanup(config.cache.cleanup_interval());
    revenue_adapter.schedule_cleanup(config.cache.cleanup_interval());
    patient_adapter.schedule_cleanup(config.cache.cleanup_interval());
    let sweeper = Arc::clone(&manager);
    manager.schedule_periodic_cleanup("global_sweep", config.cache.cleanup_interval(), move || {
        sweeper.global_cleanup();
    });

    let summary = expense_adapter
        .monthly_summary_progressively("2024-03", |stage| tracing::info!(stage, "loading"))
        .await;
    println!(
        "March expenses: {} records, {:.2} total ({:.2} unpaid)",
        summary.count, summary.total, summary.unpaid_total
    );
    for (category, total) in &summary.by_category {
        println!("  {category:<16} {total:>10.2}");
    }

    let day = revenue_adapter.daily_revenue("2024-03-05").await;
    println!(
        "Revenue on {}: {:.2} across {} payments",
        day.date, day.total, day.count
    );

    let sara = patient_adapter.patient_summary("Sara").await;
    println!(
        "Patient {}: {} visits, {:.2} total, active months {:?}",
        sara.patient, sara.visit_count, sara.total, sara.months
    );

    // A mutation invalidates through the change stream
    expenses
        .insert(Expense::new(100, "2024-03-28").category("supplies").amount(420.0).paid(false))
        .await;
    tokio::task::yield_now().await;
    let refreshed = expense_adapter.monthly_summary("2024-03").await;
    println!(
        "After adding an expense: {} records, {:.2} total",
        refreshed.count, refreshed.total
    );

    println!("{}", manager.memory_stats());

    expense_adapter.shutdown();
    revenue_adapter.shutdown();
    patient_adapter.shutdown();
    manager.stop_all_cleanup_timers();
    tracing::info!("demo complete");
}

fn demo_expenses() -> Vec<Expense> {
    vec![
        Expense::new(1, "2024-03-01").category("supplies").amount(250.0).paid(true)
            .description("Composite refill kit"),
        Expense::new(2, "2024-03-05").category("lab").amount(1200.0).paid(false)
            .description("Crown fabrication batch"),
        Expense::new(3, "2024-03-12").category("equipment").amount(15500.0).paid(false)
            .description("Autoclave service contract"),
        Expense::new(4, "2024-03-19").category("supplies").amount(89.5).paid(true)
            .description("Disposable gloves"),
        Expense::new(5, "2024-02-27").category("rent").amount(9000.0).paid(true),
    ]
}

fn demo_payments() -> Vec<Payment> {
    vec![
        Payment::new(1, "2024-03-05").patient("Sara").treatment("تنظيف")
            .method("cash").amount(300.0).paid(true),
        Payment::new(2, "2024-03-05").patient("Omar").treatment("crown")
            .method("card").amount(2500.0).paid(false),
        Payment::new(3, "2024-03-12").patient("Sara").treatment("filling")
            .method("cash").amount(450.0).paid(true),
        Payment::new(4, "2024-02-20").patient("Lina").treatment("whitening")
            .method("transfer").amount(1800.0).paid(true),
    ]
}
