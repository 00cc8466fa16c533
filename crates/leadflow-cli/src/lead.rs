use crate::AiArgs;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use leadflow_ai::{extractor_from_settings, parse_lead_text};
use leadflow_core::form::{LeadForm, ValidationErrors};
use leadflow_core::{Lead, LeadDetails, LeadDraft, LeadFilter, LeadStatus, LeadView};
use leadflow_storage::RecordStore;
use std::io::Read;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum LeadCommand {
    /// List leads, newest update first.
    List(LeadListArgs),
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Add(LeadAddArgs),
    /// Turn a free-text message into lead fields with the AI extractor.
    Parse(LeadParseArgs),
    Update(LeadUpdateArgs),
    /// Shortcut for `update --status`.
    SetStatus {
        id: String,
        status: LeadStatus,
    },
    Delete {
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct LeadListArgs {
    /// all, negotiation, bin, follow-up, sample-updates or regular.
    #[arg(long)]
    view: Option<LeadView>,
    /// Comma-separated statuses, e.g. `New,Negotiation`.
    #[arg(long, value_delimiter = ',')]
    status: Vec<LeadStatus>,
    #[arg(long)]
    json: bool,
}

impl LeadListArgs {
    fn filter(&self) -> LeadFilter {
        let view = self.view.unwrap_or_default().filter();
        if self.status.is_empty() {
            view
        } else {
            view.and_statuses(self.status.iter().copied())
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct LeadFieldArgs {
    #[arg(long)]
    lead_date: Option<String>,
    /// Buyer or Seller.
    #[arg(long = "type")]
    lead_type: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    /// WEEKLY, MONTHLY and `1-2 M` mark a regular lead.
    #[arg(long)]
    frequency: Option<String>,
    #[arg(long)]
    item: Option<String>,
    #[arg(long)]
    purity: Option<String>,
    #[arg(long)]
    packing: Option<String>,
    #[arg(long)]
    qty: Option<String>,
    #[arg(long)]
    warehouse: Option<String>,
    #[arg(long)]
    sample: Option<String>,
    #[arg(long)]
    market_rate: Option<String>,
    #[arg(long)]
    rate: Option<String>,
    #[arg(long)]
    aikyan_rate: Option<String>,
    #[arg(long)]
    note: Option<String>,
    /// High, Medium or Low.
    #[arg(long)]
    priority: Option<String>,
}

impl LeadFieldArgs {
    fn into_form(self) -> LeadForm {
        LeadForm {
            details: LeadDetails {
                lead_date: self.lead_date,
                lead_type: self.lead_type,
                seller_buyer_contact: self.contact,
                frequency: self.frequency,
                item_details: self.item,
                purity: self.purity,
                packing: self.packing,
                qty: self.qty,
                warehouse: self.warehouse,
                sample: self.sample,
                market_rate: self.market_rate,
                seller_buyer_name: self.name,
                seller_buyer_rate: self.rate,
                aikyan_rate: self.aikyan_rate,
                note: self.note,
            },
            priority: self.priority,
            ..LeadForm::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct LeadAddArgs {
    #[command(flatten)]
    fields: LeadFieldArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct LeadUpdateArgs {
    id: String,
    #[command(flatten)]
    fields: LeadFieldArgs,
    #[arg(long)]
    status: Option<String>,
    /// Sent, Received, Tested, Approved or Rejected.
    #[arg(long)]
    sample_status: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct LeadParseArgs {
    /// Message text; read from stdin when omitted.
    text: Option<String>,
    /// Store the extracted draft as a new lead.
    #[arg(long)]
    save: bool,
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    ai: AiArgs,
}

pub fn handle_lead_command(store: &mut RecordStore, command: LeadCommand) -> Result<()> {
    match command {
        LeadCommand::List(args) => list_leads(store, args),
        LeadCommand::Show { id, json } => {
            let lead = store
                .lead(&id)
                .with_context(|| format!("failed to load lead {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lead)?);
            } else {
                print_lead_detail(&lead);
            }
            Ok(())
        }
        LeadCommand::Add(args) => {
            let draft = args.fields.into_form().into_draft().map_err(invalid)?;
            let lead = store.create_lead(draft).context("failed to create lead")?;
            report_saved("Created", &lead, args.json)
        }
        LeadCommand::Parse(args) => parse_lead(store, args),
        LeadCommand::Update(args) => {
            let mut form = args.fields.into_form();
            form.status = args.status;
            form.sample_status = args.sample_status;
            let patch = form.into_patch().map_err(invalid)?;
            let lead = store
                .update_lead(&args.id, &patch)
                .with_context(|| format!("failed to update lead {}", args.id))?;
            report_saved("Updated", &lead, args.json)
        }
        LeadCommand::SetStatus { id, status } => {
            let lead = store
                .update_lead_status(&id, status)
                .with_context(|| format!("failed to update lead {id}"))?;
            report_saved("Updated", &lead, false)
        }
        LeadCommand::Delete { id } => {
            store
                .delete_lead(&id)
                .with_context(|| format!("failed to delete lead {id}"))?;
            println!("Deleted lead {id}");
            Ok(())
        }
    }
}

fn list_leads(store: &mut RecordStore, args: LeadListArgs) -> Result<()> {
    let leads = store.leads(&args.filter()).context("failed to list leads")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }
    if leads.is_empty() {
        println!("No leads found.");
        return Ok(());
    }
    for lead in &leads {
        println!("{}", lead_line(lead));
    }
    Ok(())
}

fn parse_lead(store: &mut RecordStore, args: LeadParseArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read lead text from stdin")?;
            buffer
        }
    };

    let extractor = extractor_from_settings(&args.ai.settings())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let draft = runtime.block_on(parse_lead_text(extractor.as_ref(), &text))?;

    if args.save {
        let lead = save_parsed(store, draft)?;
        return report_saved("Created", &lead, args.json);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&draft)?);
    } else {
        print_draft(&draft);
    }
    Ok(())
}

fn save_parsed(store: &mut RecordStore, draft: LeadDraft) -> Result<Lead> {
    let draft = LeadForm::from(draft).into_draft().map_err(invalid)?;
    store
        .create_lead(draft)
        .context("failed to save parsed lead")
}

fn report_saved(verb: &str, lead: &Lead, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(lead)?);
    } else {
        println!("{verb} {}", lead_line(lead));
    }
    Ok(())
}

fn invalid(errors: ValidationErrors) -> anyhow::Error {
    anyhow::Error::new(errors).context("lead fields are invalid")
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

pub(crate) fn lead_line(lead: &Lead) -> String {
    let priority = lead.priority.map(|p| p.as_str()).unwrap_or("-");
    format!(
        "- [{}] ({}/{}) {} {} | {} | {}",
        lead.lead_no,
        lead.status,
        priority,
        text(&lead.details.lead_type),
        text(&lead.details.seller_buyer_name),
        text(&lead.details.item_details),
        lead.id
    )
}

fn print_lead_detail(lead: &Lead) {
    println!("{} ({})", lead.lead_no, lead.id);
    println!("status: {}", lead.status);
    if let Some(priority) = lead.priority {
        println!("priority: {priority}");
    }
    if let Some(sample_status) = lead.sample_status {
        println!("sampleStatus: {}", sample_status.as_str());
    }
    println!("lastUpdate: {}", lead.last_update.to_rfc3339());
    print_details(&lead.details);
}

fn print_draft(draft: &LeadDraft) {
    if let Some(priority) = draft.priority {
        println!("priority: {priority}");
    }
    print_details(&draft.details);
}

fn print_details(details: &LeadDetails) {
    for (field, value) in details.fields() {
        if let Some(value) = value {
            println!("{field}: {value}");
        }
    }
}
