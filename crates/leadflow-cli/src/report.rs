use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use leadflow_core::export::{
    consolidated_file_name, render, render_table, to_records, Section, LEAD_COLUMNS,
    PHONEBOOK_COLUMNS, RATE_COLUMNS,
};
use leadflow_core::{LeadStats, LeadTypeBreakdown, LeadView, Rate, StatusCount};
use leadflow_storage::{BreakerState, RecordStore};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    stats: LeadStats,
    by_type: LeadTypeBreakdown,
    funnel: Vec<StatusCount>,
}

pub fn handle_stats(store: &mut RecordStore, args: StatsArgs) -> Result<()> {
    let dashboard = Dashboard {
        stats: store.lead_stats(),
        by_type: store.leads_by_type(),
        funnel: store.status_funnel(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    let stats = dashboard.stats;
    println!(
        "Leads: {} total, {} in negotiation, {} regular, {} dead",
        stats.total, stats.negotiation, stats.regular, stats.dead
    );
    let buckets = dashboard
        .by_type
        .buckets()
        .into_iter()
        .map(|bucket| format!("{} {}", bucket.name, bucket.value))
        .collect::<Vec<_>>();
    println!("By type: {}", buckets.join(", "));
    println!("Funnel:");
    for step in &dashboard.funnel {
        println!("- {}: {}", step.status, step.count);
    }
    Ok(())
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum RatesCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    /// Append a rate sheet row.
    Add(RateAddArgs),
}

#[derive(Args, Debug)]
pub struct RateAddArgs {
    #[arg(long)]
    item: String,
    #[arg(long = "type", default_value = "")]
    rate_type: String,
    #[arg(long, default_value = "")]
    packing: String,
    #[arg(long, default_value = "")]
    market_rate: String,
    #[arg(long, default_value = "")]
    rate_change: String,
    #[arg(long, default_value = "")]
    vendor_name: String,
    #[arg(long, default_value = "")]
    vendor_rate: String,
    #[arg(long, default_value = "")]
    transport: String,
    #[arg(long, default_value = "")]
    aikyan_rate: String,
}

impl RateAddArgs {
    fn into_rate(self) -> Rate {
        Rate {
            id: String::new(),
            item: self.item,
            rate_type: self.rate_type,
            packing: self.packing,
            market_rate: self.market_rate,
            rate_change: self.rate_change,
            vendor_name: self.vendor_name,
            vendor_rate: self.vendor_rate,
            transport: self.transport,
            aikyan_rate: self.aikyan_rate,
        }
    }
}

pub fn handle_rates_command(store: &mut RecordStore, command: RatesCommand) -> Result<()> {
    match command {
        RatesCommand::List { json } => {
            let rates = store.rates().context("failed to list rates")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rates)?);
                return Ok(());
            }
            if rates.is_empty() {
                println!("No rates found.");
            }
            for rate in &rates {
                println!(
                    "- {} ({}) market {} | vendor {} {} | aikyan {}",
                    rate.item,
                    rate.packing,
                    rate.market_rate,
                    rate.vendor_name,
                    rate.vendor_rate,
                    rate.aikyan_rate
                );
            }
            Ok(())
        }
        RatesCommand::Add(args) => {
            let rate = store
                .add_rate(&args.into_rate())
                .context("failed to add rate")?;
            println!("Added rate {} ({})", rate.item, rate.id);
            Ok(())
        }
    }
}

#[derive(Args, Debug)]
pub struct PhonebookArgs {
    #[arg(long)]
    json: bool,
}

pub fn handle_phonebook(store: &mut RecordStore, args: PhonebookArgs) -> Result<()> {
    let entries = store
        .phonebook_entries()
        .context("failed to list phonebook")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Phonebook is empty.");
    }
    for entry in &entries {
        println!("- {} <{}> {}", entry.name, entry.contact, entry.company);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportTarget {
    /// Leads, rates and phonebook in one titled file.
    #[default]
    All,
    Leads,
    Rates,
    Phonebook,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(value_enum, default_value_t = ExportTarget::All)]
    target: ExportTarget,
    /// Lead view for `leads` exports.
    #[arg(long, default_value = "all")]
    view: LeadView,
    /// Output path; defaults to the export's own file name.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print the CSV instead of writing a file.
    #[arg(long, conflicts_with = "out")]
    stdout: bool,
}

pub struct CsvExport {
    pub file_name: String,
    pub body: String,
    pub rows: usize,
}

pub fn build_export(
    store: &mut RecordStore,
    target: ExportTarget,
    view: LeadView,
) -> Result<CsvExport> {
    let export = match target {
        ExportTarget::Leads => {
            let leads = store.leads(&view.filter()).context("failed to load leads")?;
            CsvExport {
                file_name: view.export_file_name().to_string(),
                body: render_table(LEAD_COLUMNS, &to_records(&leads)?),
                rows: leads.len(),
            }
        }
        ExportTarget::Rates => {
            let rates = store.rates().context("failed to load rates")?;
            CsvExport {
                file_name: "rates.csv".to_string(),
                body: render_table(RATE_COLUMNS, &to_records(&rates)?),
                rows: rates.len(),
            }
        }
        ExportTarget::Phonebook => {
            let entries = store
                .phonebook_entries()
                .context("failed to load phonebook")?;
            CsvExport {
                file_name: "phonebook.csv".to_string(),
                body: render_table(PHONEBOOK_COLUMNS, &to_records(&entries)?),
                rows: entries.len(),
            }
        }
        ExportTarget::All => {
            let leads = store
                .leads(&LeadView::All.filter())
                .context("failed to load leads")?;
            let rates = store.rates().context("failed to load rates")?;
            let entries = store
                .phonebook_entries()
                .context("failed to load phonebook")?;
            CsvExport {
                file_name: consolidated_file_name(Utc::now()),
                body: render(&[
                    Section::from_records("LEADS DATA", LEAD_COLUMNS, &leads)?,
                    Section::from_records("RATES DATA", RATE_COLUMNS, &rates)?,
                    Section::from_records("PHONEBOOK DATA", PHONEBOOK_COLUMNS, &entries)?,
                ]),
                rows: leads.len() + rates.len() + entries.len(),
            }
        }
    };
    Ok(export)
}

pub fn handle_export(store: &mut RecordStore, args: ExportArgs) -> Result<()> {
    let export = build_export(store, args.target, args.view)?;
    if args.stdout {
        print!("{}", export.body);
        return Ok(());
    }
    let path = args
        .out
        .unwrap_or_else(|| PathBuf::from(&export.file_name));
    std::fs::write(&path, export.body.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Exported {} rows to {}", export.rows, path.display());
    Ok(())
}

#[derive(Args, Debug)]
pub struct StorageArgs {
    #[arg(long)]
    json: bool,
}

pub fn handle_storage(store: &RecordStore, args: StorageArgs) -> Result<()> {
    let status = store.status();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    let breaker = match status.breaker {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
    };
    println!(
        "configured: {} | active: {} | policy: {} | breaker: {}",
        status.configured, status.active, status.policy, breaker
    );
    for transition in &status.transitions {
        println!(
            "- {} {}: {}",
            transition.at.to_rfc3339(),
            transition.operation,
            transition.reason
        );
    }
    Ok(())
}
