//! appmine — Command-line front end for the AppMine ranking engine.
//!
//! Imports periods, reviewer reports and entries into the local store,
//! prints composite rankings and payouts, reconciles payout transactions
//! against the public ledger and performs the few administrative edits the
//! engine allows.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use appmine_core::amount::{format_units, format_usd, usd_to_micros};
use appmine_core::traits::PayoutStore;
use appmine_core::types::{Currency, EntryId, PeriodKey};
use appmine_node_lib::storage::{Dataset, PayoutAddresses, RocksStore};
use appmine_node_lib::{
    BlockExplorerClient, LedgerClient, NodeConfig, PaymentReconciler, ReconcileReport,
};
use appmine_score::{Composite, CompositeEngine, PeriodRanking};

/// AppMine composite ranking and payout tool.
#[derive(Parser)]
#[command(name = "appmine")]
#[command(version, about = "Composite rankings and reward payouts for App Mining")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import entries, periods and reviewer reports from a JSON dataset.
    Import(ImportArgs),
    /// List stored periods.
    Periods,
    /// Print the composite ranking of a period.
    Rankings(ReportArgs),
    /// Print the composite ranking of a period with payouts.
    Payouts(ReportArgs),
    /// Match a payout transaction's outputs to entries and record them.
    Reconcile(ReconcileArgs),
    /// Entry administration.
    Entry {
        #[command(subcommand)]
        action: EntryAction,
    },
    /// Period administration.
    Period {
        #[command(subcommand)]
        action: PeriodAction,
    },
}

#[derive(Subcommand)]
enum EntryAction {
    /// Change an entry's payout addresses.
    SetAddress(SetAddressArgs),
}

#[derive(Subcommand)]
enum PeriodAction {
    /// Delete a period with its reports and payout records.
    Delete(PeriodArg),
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the dataset file.
    file: PathBuf,
}

#[derive(Args)]
struct PeriodArg {
    /// Period as YYYY-MM.
    #[arg(short, long, value_parser = parse_period)]
    period: PeriodKey,
}

#[derive(Args)]
struct ReportArgs {
    /// Period as YYYY-MM.
    #[arg(short, long, value_parser = parse_period)]
    period: PeriodKey,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Period as YYYY-MM.
    #[arg(short, long, value_parser = parse_period)]
    period: PeriodKey,

    /// Ledger transaction id.
    #[arg(long)]
    tx: String,

    /// Currency the transaction paid out.
    #[arg(long, value_enum, default_value_t = CurrencyArg::Btc)]
    currency: CurrencyArg,
}

#[derive(Args)]
struct SetAddressArgs {
    /// Entry id.
    #[arg(long)]
    id: u64,

    /// New BTC address.
    #[arg(long)]
    btc: Option<String>,

    /// New STX address.
    #[arg(long)]
    stx: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CurrencyArg {
    Btc,
    Stx,
}

impl From<CurrencyArg> for Currency {
    fn from(arg: CurrencyArg) -> Self {
        match arg {
            CurrencyArg::Btc => Currency::Btc,
            CurrencyArg::Stx => Currency::Stx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    init_logging(&config.log_level, &config.log_format);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory: {}", config.data_dir.display()))?;
    let store = RocksStore::open(config.db_path())
        .with_context(|| format!("Failed to open store at {}", config.db_path().display()))?;

    match cli.command {
        Commands::Import(args) => import(&store, args),
        Commands::Periods => list_periods(&store),
        Commands::Rankings(args) => rankings(&store, args),
        Commands::Payouts(args) => payouts(&store, args),
        Commands::Reconcile(args) => reconcile(store, &config, args).await,
        Commands::Entry { action } => match action {
            EntryAction::SetAddress(args) => set_address(&store, args),
        },
        Commands::Period { action } => match action {
            PeriodAction::Delete(args) => delete_period(&store, args),
        },
    }
}

fn import(store: &RocksStore, args: ImportArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let dataset: Dataset = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse dataset {}", args.file.display()))?;

    let summary = store.import_dataset(&dataset).context("Import failed")?;
    store.flush()?;
    info!(
        entries = summary.entries,
        periods = summary.periods,
        reports = summary.reports,
        "import complete"
    );
    println!(
        "Imported {} entries, {} periods, {} reports",
        summary.entries, summary.periods, summary.reports
    );
    Ok(())
}

fn list_periods(store: &RocksStore) -> Result<()> {
    for period in store.periods()? {
        let tx = period.btc_transaction_id.as_deref().unwrap_or("-");
        println!(
            "{}  {:<16} {:>16}  tx {}",
            period.key,
            period.human_readable_date(),
            usd_to_micros(period.total_rewards_usd())
                .map(format_usd)
                .unwrap_or_else(|_| "invalid".to_string()),
            tx
        );
    }
    Ok(())
}

fn rankings(store: &RocksStore, args: ReportArgs) -> Result<()> {
    let ranking = CompositeEngine::new(store)
        .rank(args.period)
        .with_context(|| format!("Failed to rank {}", args.period))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
    } else {
        print_ranking(&ranking);
    }
    Ok(())
}

fn payouts(store: &RocksStore, args: ReportArgs) -> Result<()> {
    let composite = CompositeEngine::new(store)
        .compute(args.period)
        .with_context(|| format!("Failed to compute payouts for {}", args.period))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&composite)?);
    } else {
        print_composite(&composite);
    }
    Ok(())
}

async fn reconcile(store: RocksStore, config: &NodeConfig, args: ReconcileArgs) -> Result<()> {
    let currency = Currency::from(args.currency);
    let ledger = BlockExplorerClient::new(&config.ledger).context("Failed to build ledger client")?;
    let store = Arc::new(store);
    let report =
        reconcile_and_record(Arc::clone(&store), Arc::new(ledger), args.period, &args.tx, currency)
            .await?;

    println!("Transaction: {}", config.ledger.transaction_url(&report.transaction_id));
    for record in &report.matched {
        let value = record.value(currency).unwrap_or_default();
        println!(
            "  entry {:>6}  {}",
            record.entry_id,
            format_units(value, currency.decimals())
        );
    }
    for address in &report.unmatched {
        println!("  unmatched {address}");
    }
    println!(
        "{} matched, {} unmatched, {} records for {}",
        report.matched.len(),
        report.unmatched.len(),
        store.payouts_for_period(args.period)?.len(),
        args.period
    );
    Ok(())
}

/// Reconcile, then remember a BTC transaction on its period. A failed pass
/// leaves the period untouched.
async fn reconcile_and_record(
    store: Arc<RocksStore>,
    ledger: Arc<dyn LedgerClient>,
    period: PeriodKey,
    transaction_id: &str,
    currency: Currency,
) -> Result<ReconcileReport> {
    let reconciler = PaymentReconciler::new(Arc::clone(&store), ledger);
    let report = reconciler
        .reconcile(period, transaction_id, currency)
        .await
        .with_context(|| format!("Failed to reconcile {transaction_id}"))?;

    if currency == Currency::Btc {
        store
            .record_transaction(period, transaction_id)
            .with_context(|| format!("Failed to record transaction for {period}"))?;
    }
    Ok(report)
}

fn set_address(store: &RocksStore, args: SetAddressArgs) -> Result<()> {
    if args.btc.is_none() && args.stx.is_none() {
        bail!("Nothing to update: pass --btc and/or --stx");
    }
    let entry = store
        .update_payout_addresses(
            EntryId(args.id),
            PayoutAddresses {
                btc_address: args.btc,
                stx_address: args.stx,
            },
        )
        .with_context(|| format!("Failed to update entry {}", args.id))?;
    println!(
        "{} ({}): btc {} stx {}",
        entry.name,
        entry.id,
        entry.btc_address.as_deref().unwrap_or("-"),
        entry.stx_address.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn delete_period(store: &RocksStore, args: PeriodArg) -> Result<()> {
    let summary = store
        .delete_period(args.period)
        .with_context(|| format!("Failed to delete {}", args.period))?;
    println!(
        "Deleted {} with {} reports and {} payout records",
        args.period, summary.reports, summary.payouts
    );
    Ok(())
}

fn print_ranking(ranking: &PeriodRanking) {
    println!("{}", ranking.period.human_readable_date());
    println!(
        "{:>4}  {:<28} {:<28} {:>9} {:>9} {:>9}",
        "#", "Entry", "Domain", "Average", "Memory", "Previous"
    );
    for (i, ranked) in ranking.entries.iter().enumerate() {
        println!(
            "{:>4}  {:<28} {:<28} {:>9.4} {:>9.4} {:>9}",
            i + 1,
            ranked.entry.name,
            ranked.domain.as_deref().unwrap_or("-"),
            ranked.average_ranking,
            ranked.memory_ranking,
            ranked
                .previous_score
                .map(|s| format!("{s:.4}"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn print_composite(composite: &Composite) {
    println!("{}", composite.period.human_readable_date());
    if let Some(at) = composite.period.friendly_purchased_at() {
        println!(
            "BTC purchased {} on {}",
            at,
            composite.period.purchase_exchange_name.as_deref().unwrap_or("-")
        );
    }
    println!(
        "{:>4}  {:<28} {:>9} {:>14} {:>14} {:>14}",
        "#", "Entry", "Memory", "USD", "BTC", "STX"
    );
    for (i, result) in composite.results.iter().enumerate() {
        println!(
            "{:>4}  {:<28} {:>9.4} {:>14} {:>14} {:>14}",
            i + 1,
            result.ranked.entry.name,
            result.ranked.memory_ranking,
            result.payout.formatted_usd_rewards(),
            result.payout.formatted_btc_rewards(),
            result.payout.formatted_stx_rewards().unwrap_or_else(|| "-".to_string()),
        );
    }
    println!(
        "Undistributed: BTC pool {}, STX pool {}",
        format_usd(composite.btc_remaining),
        composite
            .stx_remaining
            .map(format_usd)
            .unwrap_or_else(|| "-".to_string())
    );
}

/// Parse a period written as `YYYY-MM`.
fn parse_period(s: &str) -> Result<PeriodKey, String> {
    let (year, month) = s
        .split_once('-')
        .ok_or_else(|| format!("expected YYYY-MM, got {s:?}"))?;
    let year: u16 = year.parse().map_err(|_| format!("invalid year in {s:?}"))?;
    let month: u8 = month.parse().map_err(|_| format!("invalid month in {s:?}"))?;
    PeriodKey::new(month, year).map_err(|e| e.to_string())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. `RUST_LOG` takes precedence over `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmine_core::error::LedgerError;
    use appmine_core::traits::PeriodStore;
    use appmine_core::types::{LedgerOutput, Period};

    #[test]
    fn parses_period() {
        assert_eq!(parse_period("2019-04").unwrap(), PeriodKey { year: 2019, month: 4 });
        assert_eq!(parse_period("2020-12").unwrap(), PeriodKey { year: 2020, month: 12 });
    }

    #[test]
    fn rejects_bad_periods() {
        assert!(parse_period("2019").is_err());
        assert!(parse_period("2019-13").is_err());
        assert!(parse_period("April-2019").is_err());
    }

    #[test]
    fn cli_parses_reconcile() {
        let cli = Cli::try_parse_from([
            "appmine", "reconcile", "--period", "2019-04", "--tx", "abc", "--currency", "stx",
        ])
        .unwrap();
        match cli.command {
            Commands::Reconcile(args) => {
                assert_eq!(args.tx, "abc");
                assert!(matches!(args.currency, CurrencyArg::Stx));
            }
            _ => panic!("expected reconcile"),
        }
    }

    struct FixedLedger(Result<Vec<LedgerOutput>, LedgerError>);

    #[async_trait::async_trait]
    impl LedgerClient for FixedLedger {
        async fn transaction_outputs(
            &self,
            _transaction_id: &str,
        ) -> Result<Vec<LedgerOutput>, LedgerError> {
            self.0.clone()
        }
    }

    fn store_with_april() -> (tempfile::TempDir, Arc<RocksStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        store.put_period(&Period::new(PeriodKey { year: 2019, month: 4 })).unwrap();
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn failed_reconcile_records_nothing() {
        let (_dir, store) = store_with_april();
        let april = PeriodKey { year: 2019, month: 4 };
        let ledger = Arc::new(FixedLedger(Err(LedgerError::Request("offline".into()))));

        let result = reconcile_and_record(Arc::clone(&store), ledger, april, "abc", Currency::Btc).await;
        assert!(result.is_err());
        let period = store.get_period(april).unwrap().unwrap();
        assert_eq!(period.btc_transaction_id, None);
    }

    #[tokio::test]
    async fn successful_btc_reconcile_records_transaction() {
        let (_dir, store) = store_with_april();
        let april = PeriodKey { year: 2019, month: 4 };
        let ledger = Arc::new(FixedLedger(Ok(Vec::new())));

        let report = reconcile_and_record(Arc::clone(&store), ledger, april, "abc", Currency::Btc)
            .await
            .unwrap();
        assert!(report.matched.is_empty());
        let period = store.get_period(april).unwrap().unwrap();
        assert_eq!(period.btc_transaction_id.as_deref(), Some("abc"));
    }

    #[test]
    fn cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
