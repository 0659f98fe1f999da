use xchain_ledger::config::{self, Config};
use xchain_ledger::history::{ChainFilter, HistoryView};
use xchain_ledger::ledger::{NewSubmission, SubmissionOutcome, TransactionLedger};
use xchain_ledger::notify::FileWatcher;
use xchain_ledger::storage::FileStorage;
use xchain_ledger::transaction::{Chain, NewTransaction, Status, Token, TxType};
use xchain_ledger::units;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Ok, Result};
use clap::Parser;
use colored::{Color, Colorize};
use itertools::Itertools;

/// Keeps the local history of collateral deposits, loans, repayments and collateral
/// releases submitted from the cross-chain lending dashboard. Records are stored
/// newest first and their status is kept in sync by transaction hash.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// The configuration file to use, built-in defaults apply if not given
    #[clap(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// The directory holding the ledger, overrides the configuration
    #[clap(short, long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    store_dir: Option<PathBuf>,

    #[clap(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Args)]
struct OperationArgs {
    /// The chain the operation was sent to (sepolia, Kopli)
    #[clap(long)]
    chain: Chain,
    /// The operation (deposit-collateral, borrow, repay, release-collateral)
    #[clap(long = "type", value_name = "TYPE")]
    kind: TxType,
    /// The amount in token units, e.g. 1.25
    #[clap(long, required_unless_present = "wei", conflicts_with = "wei")]
    amount: Option<f64>,
    /// The amount in wei, as returned by the contract
    #[clap(long)]
    wei: Option<String>,
    /// The token the amount is denominated in (ETH, MATIC)
    #[clap(long)]
    token: Token,
}

#[derive(Debug, clap::Args)]
struct ActionAppend {
    #[clap(flatten)]
    operation: OperationArgs,
    /// The initial status of the record
    #[clap(long, default_value = "pending")]
    status: Status,
    /// The transaction hash reported by the wallet
    #[clap(long)]
    tx_hash: String,
}

#[derive(Debug, clap::Args)]
struct ActionRecord {
    #[clap(flatten)]
    operation: OperationArgs,
    /// The transaction hash, if the wallet reported one
    #[clap(long)]
    tx_hash: Option<String>,
    /// The submission failed; the reason is logged and a record with a hash is kept as pending
    #[clap(long, value_name = "REASON")]
    failed: Option<String>,
}

#[derive(Debug, clap::Args)]
struct ActionList {
    /// Only show operations on this chain (all, sepolia, Kopli)
    #[clap(long, default_value = "all")]
    chain: ChainFilter,
    /// Print the records as JSON instead of a table
    #[clap(long)]
    json: bool,
}

#[derive(Debug, clap::Args)]
struct ActionUpdateStatus {
    /// The transaction hash to update
    tx_hash: String,
    /// The new status (pending, completed)
    status: Status,
}

#[derive(Debug, clap::Args)]
struct ActionWatch {
    /// Only show operations on this chain (all, sepolia, Kopli)
    #[clap(long, default_value = "all")]
    chain: ChainFilter,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Add a record to the front of the history
    Append(ActionAppend),
    /// Record the outcome of a contract call. Confirmed calls are stored as completed,
    /// failed calls that were broadcast are stored as pending, other failures are not stored.
    Record(ActionRecord),
    /// Print the history, newest first
    List(ActionList),
    /// Set the status of every record with the given transaction hash
    UpdateStatus(ActionUpdateStatus),
    /// Print the history again whenever another process changes it
    Watch(ActionWatch),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = try_main() {
        eprintln!("{}: {}", "error".red(), err);
        err.chain()
            .skip(1)
            .for_each(|cause| eprintln!("{}: {}", "because".yellow(), cause));
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let mut config = config::resolve(args.config.as_deref())?;
    if let Some(dir) = &args.store_dir {
        config.store.dir = dir.clone();
    }
    let storage = FileStorage::new(&config.store.dir);
    let ledger = TransactionLedger::with_key(storage, &config.store.key);

    match &args.action {
        Action::Append(action) => append(&ledger, action),
        Action::Record(action) => record(&ledger, action),
        Action::List(action) => list(&config, &ledger, action),
        Action::UpdateStatus(action) => update_status(&ledger, action),
        Action::Watch(action) => watch(&config, &ledger, action),
    }
}

fn resolve_amount(operation: &OperationArgs) -> Result<f64> {
    match (operation.amount, &operation.wei) {
        (Some(amount), _) => Ok(amount),
        (None, Some(wei)) => {
            let wei: u128 = wei
                .trim()
                .parse()
                .with_context(|| format!("Invalid wei amount {wei:?}"))?;
            Ok(units::wei_to_amount(wei))
        }
        (None, None) => Err(anyhow!("Either --amount or --wei is required")),
    }
}

fn append(ledger: &TransactionLedger<FileStorage>, action: &ActionAppend) -> Result<()> {
    let operation = &action.operation;
    let stored = ledger
        .append(NewTransaction {
            chain: operation.chain,
            kind: operation.kind,
            amount: resolve_amount(operation)?,
            token: operation.token,
            status: action.status,
            tx_hash: action.tx_hash.clone(),
        })
        .context("Could not append to the transaction history")?;
    println!(
        "{:>12} {} {} {} on {} ({})",
        "Appended".green(),
        stored.kind,
        stored.amount,
        stored.token,
        stored.chain,
        stored.id.dimmed()
    );
    Ok(())
}

fn record(ledger: &TransactionLedger<FileStorage>, action: &ActionRecord) -> Result<()> {
    let operation = &action.operation;
    let submission = NewSubmission {
        chain: operation.chain,
        kind: operation.kind,
        amount: resolve_amount(operation)?,
        token: operation.token,
    };
    let outcome = match (&action.failed, &action.tx_hash) {
        (None, Some(tx_hash)) => SubmissionOutcome::Confirmed {
            tx_hash: tx_hash.clone(),
        },
        (None, None) => return Err(anyhow!("A confirmed submission needs --tx-hash")),
        (Some(reason), tx_hash) => SubmissionOutcome::Failed {
            tx_hash: tx_hash.clone(),
            reason: reason.clone(),
        },
    };

    match ledger
        .record_submission(submission, outcome)
        .context("Could not record the submission")?
    {
        Some(stored) => println!(
            "{:>12} {} {} {} as {} ({})",
            "Recorded".green(),
            stored.kind,
            stored.amount,
            stored.token,
            stored.status.to_string().color(status_color(stored.status)),
            stored.id.dimmed()
        ),
        None => println!("{:>12} submission was never broadcast", "Skipped".yellow()),
    }
    Ok(())
}

fn update_status(ledger: &TransactionLedger<FileStorage>, action: &ActionUpdateStatus) -> Result<()> {
    let matching = ledger.find_by_hash(&action.tx_hash).len();
    ledger
        .update_status(&action.tx_hash, action.status)
        .context("Could not update the transaction history")?;
    if matching == 0 {
        println!("{:>12} no record with hash {}", "Unchanged".yellow(), action.tx_hash);
    } else {
        println!(
            "{:>12} {} record(s) with hash {} to {}",
            "Updated".green(),
            matching,
            action.tx_hash,
            action.status.to_string().color(status_color(action.status))
        );
    }
    Ok(())
}

fn list(config: &Config, ledger: &TransactionLedger<FileStorage>, action: &ActionList) -> Result<()> {
    let view = HistoryView::load(ledger, action.chain);
    if action.json {
        let records = view.records().collect_vec();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    print_history(config, &view);
    Ok(())
}

fn watch(config: &Config, ledger: &TransactionLedger<FileStorage>, action: &ActionWatch) -> Result<()> {
    let mut view = HistoryView::load(ledger, action.chain);
    let mut watcher = FileWatcher::new(ledger.storage().clone(), ledger.key(), config.watch.interval())?;
    println!(
        "{:>12} {} ({})",
        "Watching".green(),
        ledger.key(),
        config.store.dir.display()
    );
    print_history(config, &view);
    loop {
        let event = watcher.wait()?;
        if view.handle_event(&event, ledger) {
            println!();
            println!("{:>12} history changed", "Reloaded".cyan());
            print_history(config, &view);
        }
    }
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Completed => Color::Green,
        Status::Pending => Color::Yellow,
    }
}

fn print_history(config: &Config, view: &HistoryView) {
    let rows = view.rows(&config.explorer);
    if rows.is_empty() {
        println!("{:>12} no transactions found ({})", "History".blue(), view.filter());
        return;
    }

    println!(
        "{:>12} {} transaction(s) ({})",
        "History".blue(),
        rows.len(),
        view.filter()
    );
    for row in rows {
        println!(
            "  {}  {:<8} {:<19} {:>18}  {:<9}  {}",
            row.date.dimmed(),
            row.chain,
            row.kind,
            row.amount,
            row.status.to_string().color(status_color(row.status)),
            row.short_hash
        );
        println!("  {}", row.link.dimmed());
    }
}
