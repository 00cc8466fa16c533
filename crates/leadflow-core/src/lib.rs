use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod export;
pub mod extraction;
pub mod form;

/// Frequencies that mark a lead as "regular".
pub const REGULAR_FREQUENCIES: [&str; 3] = ["WEEKLY", "MONTHLY", "1-2 M"];

/// Buyer / seller markers stored in `leadType`.
pub const LEAD_TYPE_BUYER: &str = "Buyer";
pub const LEAD_TYPE_SELLER: &str = "Seller";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeadStatus {
    New,
    Negotiation,
    Dead,
    Regular,
    #[serde(rename = "Follow-up needed")]
    FollowUpNeeded,
    #[serde(rename = "GC Sent")]
    GcSent,
    Visit,
    #[serde(rename = "Seller to send sample")]
    SellerToSendSample,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Negotiation,
        LeadStatus::Dead,
        LeadStatus::Regular,
        LeadStatus::FollowUpNeeded,
        LeadStatus::GcSent,
        LeadStatus::Visit,
        LeadStatus::SellerToSendSample,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Negotiation => "Negotiation",
            LeadStatus::Dead => "Dead",
            LeadStatus::Regular => "Regular",
            LeadStatus::FollowUpNeeded => "Follow-up needed",
            LeadStatus::GcSent => "GC Sent",
            LeadStatus::Visit => "Visit",
            LeadStatus::SellerToSendSample => "Seller to send sample",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_label(input);
        match normalized.as_str() {
            "new" => Ok(LeadStatus::New),
            "negotiation" => Ok(LeadStatus::Negotiation),
            "dead" => Ok(LeadStatus::Dead),
            "regular" => Ok(LeadStatus::Regular),
            "follow up needed" | "follow up" | "followup" => Ok(LeadStatus::FollowUpNeeded),
            "gc sent" | "gcsent" => Ok(LeadStatus::GcSent),
            "visit" => Ok(LeadStatus::Visit),
            "seller to send sample" => Ok(LeadStatus::SellerToSendSample),
            _ => Err(format!("Unknown status: {}", input.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LeadPriority {
    High,
    Medium,
    Low,
}

impl Default for LeadPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl LeadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::High => "High",
            LeadPriority::Medium => "Medium",
            LeadPriority::Low => "Low",
        }
    }
}

impl fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadPriority {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match normalize_label(input).as_str() {
            "high" => Ok(LeadPriority::High),
            "medium" => Ok(LeadPriority::Medium),
            "low" => Ok(LeadPriority::Low),
            _ => Err(format!("Unknown priority: {}", input.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SampleStatus {
    Sent,
    Received,
    Tested,
    Approved,
    Rejected,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Sent => "Sent",
            SampleStatus::Received => "Received",
            SampleStatus::Tested => "Tested",
            SampleStatus::Approved => "Approved",
            SampleStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match normalize_label(input).as_str() {
            "sent" => Ok(SampleStatus::Sent),
            "received" => Ok(SampleStatus::Received),
            "tested" => Ok(SampleStatus::Tested),
            "approved" => Ok(SampleStatus::Approved),
            "rejected" => Ok(SampleStatus::Rejected),
            _ => Err(format!("Unknown sample status: {}", input.trim())),
        }
    }
}

fn normalize_label(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The free-text descriptive fields shared by leads, drafts and patches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_buyer_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_buyer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_buyer_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aikyan_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LeadDetails {
    /// Wire names paired with values, in column order.
    pub fn fields(&self) -> [(&'static str, &Option<String>); 15] {
        [
            ("leadDate", &self.lead_date),
            ("leadType", &self.lead_type),
            ("sellerBuyerContact", &self.seller_buyer_contact),
            ("frequency", &self.frequency),
            ("itemDetails", &self.item_details),
            ("purity", &self.purity),
            ("packing", &self.packing),
            ("qty", &self.qty),
            ("warehouse", &self.warehouse),
            ("sample", &self.sample),
            ("marketRate", &self.market_rate),
            ("sellerBuyerName", &self.seller_buyer_name),
            ("sellerBuyerRate", &self.seller_buyer_rate),
            ("aikyanRate", &self.aikyan_rate),
            ("note", &self.note),
        ]
    }

    pub fn fields_mut(&mut self) -> [(&'static str, &mut Option<String>); 15] {
        [
            ("leadDate", &mut self.lead_date),
            ("leadType", &mut self.lead_type),
            ("sellerBuyerContact", &mut self.seller_buyer_contact),
            ("frequency", &mut self.frequency),
            ("itemDetails", &mut self.item_details),
            ("purity", &mut self.purity),
            ("packing", &mut self.packing),
            ("qty", &mut self.qty),
            ("warehouse", &mut self.warehouse),
            ("sample", &mut self.sample),
            ("marketRate", &mut self.market_rate),
            ("sellerBuyerName", &mut self.seller_buyer_name),
            ("sellerBuyerRate", &mut self.seller_buyer_rate),
            ("aikyanRate", &mut self.aikyan_rate),
            ("note", &mut self.note),
        ]
    }

    pub fn is_regular(&self) -> bool {
        self.frequency
            .as_deref()
            .map(|frequency| REGULAR_FREQUENCIES.contains(&frequency))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(default)]
    pub id: String,
    pub lead_no: String,
    pub status: LeadStatus,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<LeadPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_status: Option<SampleStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipboard: Option<String>,
    #[serde(flatten)]
    pub details: LeadDetails,
}

impl Lead {
    /// Both a name and a contact are needed before a phonebook entry is derived.
    pub fn phonebook_candidate(&self) -> Option<PhonebookEntry> {
        let name = non_blank(self.details.seller_buyer_name.as_deref())?;
        let contact = non_blank(self.details.seller_buyer_contact.as_deref())?;
        Some(PhonebookEntry::for_contact(name, contact))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// A lead before it has been stored: the AI extraction output and the create payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeadDraft {
    #[serde(flatten)]
    pub details: LeadDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<LeadPriority>,
}

impl LeadDraft {
    pub fn into_lead(self, lead_no: String, now: DateTime<Utc>) -> Lead {
        Lead {
            id: String::new(),
            lead_no,
            status: LeadStatus::New,
            last_update: now,
            priority: self.priority,
            sample_status: None,
            gc_image: None,
            clipboard: None,
            details: self.details,
        }
    }
}

/// Partial update. `Some("")` on a text field clears it; `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadPatch {
    pub details: LeadDetails,
    pub status: Option<LeadStatus>,
    pub sample_status: Option<SampleStatus>,
    pub priority: Option<LeadPriority>,
    pub gc_image: Option<String>,
    pub clipboard: Option<String>,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Applies every specified field. Does not touch `id`, `leadNo` or `lastUpdate`.
    pub fn apply(&self, lead: &mut Lead) {
        for ((_, target), (_, value)) in lead
            .details
            .fields_mut()
            .into_iter()
            .zip(self.details.fields())
        {
            if let Some(value) = value {
                *target = clearable(value);
            }
        }
        if let Some(value) = &self.gc_image {
            lead.gc_image = clearable(value);
        }
        if let Some(value) = &self.clipboard {
            lead.clipboard = clearable(value);
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(sample_status) = self.sample_status {
            lead.sample_status = Some(sample_status);
        }
        if let Some(priority) = self.priority {
            lead.priority = Some(priority);
        }
    }
}

fn clearable(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub item: String,
    #[serde(default, rename = "type")]
    pub rate_type: String,
    #[serde(default)]
    pub packing: String,
    #[serde(default)]
    pub market_rate: String,
    #[serde(default)]
    pub rate_change: String,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub vendor_rate: String,
    #[serde(default)]
    pub transport: String,
    #[serde(default)]
    pub aikyan_rate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhonebookEntry {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub contact: String,
    #[serde(default)]
    pub company: String,
}

impl PhonebookEntry {
    /// The company defaults to the contact's name.
    pub fn for_contact(name: &str, contact: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            contact: contact.to_string(),
            company: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    Is(LeadStatus),
    AnyOf(Vec<LeadStatus>),
}

/// Named lead filters. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    pub status: Option<StatusFilter>,
    pub regular_only: bool,
    pub needs_follow_up: bool,
    pub needs_sample_update: bool,
}

impl LeadFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = Some(StatusFilter::Is(status));
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = LeadStatus>) -> Self {
        self.status = Some(StatusFilter::AnyOf(statuses.into_iter().collect()));
        self
    }

    /// Narrows the status constraint to `statuses`. An existing constraint is intersected,
    /// so a view's status and a requested status must both hold.
    pub fn and_statuses(mut self, statuses: impl IntoIterator<Item = LeadStatus>) -> Self {
        let requested = statuses.into_iter();
        let mut narrowed: Vec<LeadStatus> = match self.status.take() {
            None => requested.collect(),
            Some(StatusFilter::Is(current)) => requested.filter(|s| *s == current).collect(),
            Some(StatusFilter::AnyOf(current)) => {
                requested.filter(|s| current.contains(s)).collect()
            }
        };
        narrowed.sort();
        narrowed.dedup();
        self.status = Some(if narrowed.len() == 1 {
            StatusFilter::Is(narrowed[0])
        } else {
            StatusFilter::AnyOf(narrowed)
        });
        self
    }

    pub fn regular(mut self) -> Self {
        self.regular_only = true;
        self
    }

    pub fn follow_up(mut self) -> Self {
        self.needs_follow_up = true;
        self
    }

    pub fn sample_update(mut self) -> Self {
        self.needs_sample_update = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && !self.regular_only
            && !self.needs_follow_up
            && !self.needs_sample_update
    }
}

/// Lead list pages, each an exportable filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeadView {
    All,
    Negotiation,
    Bin,
    FollowUp,
    SampleUpdates,
    Regular,
}

impl Default for LeadView {
    fn default() -> Self {
        Self::All
    }
}

impl LeadView {
    pub const ALL: [LeadView; 6] = [
        LeadView::All,
        LeadView::Negotiation,
        LeadView::Bin,
        LeadView::FollowUp,
        LeadView::SampleUpdates,
        LeadView::Regular,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadView::All => "all",
            LeadView::Negotiation => "negotiation",
            LeadView::Bin => "bin",
            LeadView::FollowUp => "follow-up",
            LeadView::SampleUpdates => "sample-updates",
            LeadView::Regular => "regular",
        }
    }

    pub fn filter(&self) -> LeadFilter {
        match self {
            LeadView::All => LeadFilter::all(),
            LeadView::Negotiation => LeadFilter::all().with_status(LeadStatus::Negotiation),
            LeadView::Bin => LeadFilter::all().with_status(LeadStatus::Dead),
            LeadView::FollowUp => LeadFilter::all().follow_up(),
            LeadView::SampleUpdates => LeadFilter::all().sample_update(),
            LeadView::Regular => LeadFilter::all().regular(),
        }
    }

    pub fn export_file_name(&self) -> &'static str {
        match self {
            LeadView::All => "all_leads.csv",
            LeadView::Negotiation => "negotiation_leads.csv",
            LeadView::Bin => "dead_leads.csv",
            LeadView::FollowUp => "follow_up_leads.csv",
            LeadView::SampleUpdates => "sample_update_leads.csv",
            LeadView::Regular => "regular_leads.csv",
        }
    }
}

impl fmt::Display for LeadView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadView {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match normalize_label(input).as_str() {
            "all" | "" => Ok(LeadView::All),
            "negotiation" => Ok(LeadView::Negotiation),
            "bin" | "dead" => Ok(LeadView::Bin),
            "follow up" | "followup" => Ok(LeadView::FollowUp),
            "sample updates" | "samples" => Ok(LeadView::SampleUpdates),
            "regular" => Ok(LeadView::Regular),
            _ => Err(format!("Unknown view: {}", input.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadStats {
    pub total: u64,
    pub negotiation: u64,
    pub regular: u64,
    pub dead: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadTypeBreakdown {
    pub buyers: u64,
    pub sellers: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeCount {
    pub name: String,
    pub value: u64,
}

impl LeadTypeBreakdown {
    /// `other` is whatever is neither buyer nor seller, including leads without a type.
    pub fn from_counts(total: u64, buyers: u64, sellers: u64) -> Self {
        Self {
            buyers,
            sellers,
            other: total.saturating_sub(buyers).saturating_sub(sellers),
        }
    }

    pub fn buckets(&self) -> Vec<TypeCount> {
        vec![
            TypeCount {
                name: "Buyers".to_string(),
                value: self.buyers,
            },
            TypeCount {
                name: "Sellers".to_string(),
                value: self.sellers,
            },
            TypeCount {
                name: "Other".to_string(),
                value: self.other,
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: LeadStatus,
    pub count: u64,
}

/// `L-001`, `L-042`, `L-1234`.
pub fn format_lead_no(sequence: u64) -> String {
    format!("L-{sequence:03}")
}
