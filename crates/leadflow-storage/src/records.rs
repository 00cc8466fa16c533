//! Lead, rate and phonebook operations over a [`DocumentStore`], with the
//! in-memory fallback for when the primary backend cannot serve requests.

use crate::breaker::{BreakerState, BreakerTransition, FallbackBreaker};
use crate::memory::MemoryDocumentStore;
use crate::sqlite::SqliteDocumentStore;
use crate::{
    decode_all, encode, BackendKind, Collection, DocumentStore, Predicate, StorageError,
};
use chrono::{DateTime, Utc};
use leadflow_core::{
    format_lead_no, Lead, LeadDraft, LeadFilter, LeadPatch, LeadStats, LeadStatus,
    LeadTypeBreakdown, PhonebookEntry, Rate, StatusCount, StatusFilter, LEAD_TYPE_BUYER,
    LEAD_TYPE_SELLER, REGULAR_FREQUENCIES,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

const LEAD_SEQUENCE: &str = "leads";

/// What to do when the primary backend reports itself unavailable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Surface,
    FallbackToMemory,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Surface => "surface",
            Self::FallbackToMemory => "fallback-to-memory",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "surface" => Ok(Self::Surface),
            "fallback-to-memory" | "fallback" => Ok(Self::FallbackToMemory),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub backend: BackendKind,
    pub path: PathBuf,
    pub policy: FailurePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            path: PathBuf::from("leadflow.db"),
            policy: FailurePolicy::Surface,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageStatus {
    pub configured: BackendKind,
    pub active: BackendKind,
    pub policy: FailurePolicy,
    pub breaker: BreakerState,
    pub transitions: Vec<BreakerTransition>,
}

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct RecordStore {
    primary: Option<Box<dyn DocumentStore>>,
    configured: BackendKind,
    memory: MemoryDocumentStore,
    policy: FailurePolicy,
    breaker: FallbackBreaker,
    clock: Clock,
}

impl RecordStore {
    pub fn new(primary: Box<dyn DocumentStore>, policy: FailurePolicy) -> Self {
        Self {
            configured: primary.backend(),
            primary: Some(primary),
            memory: MemoryDocumentStore::new(),
            policy,
            breaker: FallbackBreaker::new(),
            clock: Box::new(Utc::now),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            primary: None,
            configured: BackendKind::Memory,
            memory: MemoryDocumentStore::new(),
            policy: FailurePolicy::Surface,
            breaker: FallbackBreaker::new(),
            clock: Box::new(Utc::now),
        }
    }

    /// Opens the configured backend. Under the fallback policy an unavailable
    /// primary starts the store with its breaker already open.
    pub fn open(options: &StoreOptions) -> Result<Self, StorageError> {
        match options.backend {
            BackendKind::Memory => Ok(Self::in_memory()),
            BackendKind::Sqlite => match SqliteDocumentStore::open(&options.path) {
                Ok(store) => {
                    info!(
                        event = "storage_opened",
                        backend = "sqlite",
                        path = %options.path.display(),
                        policy = %options.policy
                    );
                    Ok(Self::new(Box::new(store), options.policy))
                }
                Err(err)
                    if err.is_unavailable()
                        && options.policy == FailurePolicy::FallbackToMemory =>
                {
                    let mut store = Self::in_memory();
                    store.configured = BackendKind::Sqlite;
                    store.policy = options.policy;
                    let at = (store.clock)();
                    store.breaker.trip("open", &err.to_string(), at);
                    Ok(store)
                }
                Err(err) => Err(err),
            },
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn active_backend(&self) -> BackendKind {
        match &self.primary {
            Some(primary) if !self.breaker.is_open() => primary.backend(),
            _ => BackendKind::Memory,
        }
    }

    pub fn status(&self) -> StorageStatus {
        StorageStatus {
            configured: self.configured,
            active: self.active_backend(),
            policy: self.policy,
            breaker: self.breaker.state(),
            transitions: self.breaker.transitions().to_vec(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn run<T>(
        &mut self,
        operation: &'static str,
        op: impl Fn(&mut dyn DocumentStore) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let primary = match self.primary.as_mut() {
            Some(primary) if !self.breaker.is_open() => primary,
            _ => return op(&mut self.memory),
        };

        match op(&mut **primary) {
            Ok(value) => Ok(value),
            Err(err @ StorageError::NotFound { .. }) => Err(err),
            Err(err) if err.is_unavailable() => match self.policy {
                FailurePolicy::Surface => {
                    warn!(event = "storage_unavailable", operation, error = %err);
                    Err(err)
                }
                FailurePolicy::FallbackToMemory => {
                    let at = (self.clock)();
                    self.breaker.trip(operation, &err.to_string(), at);
                    op(&mut self.memory)
                }
            },
            Err(err) => {
                error!(event = "storage_error", operation, error = %err);
                Err(err)
            }
        }
    }

    /// Leads matching every condition in `filter`, most recently updated first.
    pub fn leads(&mut self, filter: &LeadFilter) -> Result<Vec<Lead>, StorageError> {
        let predicates = lead_predicates(filter);
        let documents = self.run("leads", |store| store.find(Collection::Leads, &predicates))?;
        let mut leads = decode_all::<Lead>(documents)?;
        leads.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        Ok(leads)
    }

    pub fn lead(&mut self, id: &str) -> Result<Lead, StorageError> {
        self.run("lead", |store| store.get(Collection::Leads, id))?
            .ok_or_else(|| StorageError::NotFound {
                collection: Collection::Leads,
                id: id.to_string(),
            })?
            .decode()
    }

    /// Stores a new lead and files its contact in the phonebook when it is new.
    pub fn create_lead(&mut self, draft: LeadDraft) -> Result<Lead, StorageError> {
        let now = self.now();
        let lead = self.run("create_lead", |store| {
            let size = store.count(Collection::Leads, &[])?;
            let sequence = store.next_sequence(LEAD_SEQUENCE, size)?;
            let lead = draft.clone().into_lead(format_lead_no(sequence), now);
            store.insert(Collection::Leads, encode(&lead)?)?.decode::<Lead>()
        })?;
        info!(event = "lead_created", id = %lead.id, lead_no = %lead.lead_no);

        if let Some(entry) = lead.phonebook_candidate() {
            if let Err(err) = self.add_phonebook_entry_if_absent(&entry) {
                warn!(
                    event = "phonebook_upsert_failed",
                    lead_no = %lead.lead_no,
                    error = %err
                );
            }
        }
        Ok(lead)
    }

    pub fn update_lead(&mut self, id: &str, patch: &LeadPatch) -> Result<Lead, StorageError> {
        let now = self.now();
        let lead = self.run("update_lead", |store| {
            let mut lead: Lead = store
                .get(Collection::Leads, id)?
                .ok_or_else(|| StorageError::NotFound {
                    collection: Collection::Leads,
                    id: id.to_string(),
                })?
                .decode()?;
            patch.apply(&mut lead);
            lead.last_update = now.max(lead.last_update);
            store
                .replace(Collection::Leads, id, encode(&lead)?)?
                .decode::<Lead>()
        })?;
        debug!(event = "lead_updated", id = %lead.id, status = %lead.status);
        Ok(lead)
    }

    pub fn update_lead_status(&mut self, id: &str, status: LeadStatus) -> Result<Lead, StorageError> {
        self.update_lead(id, &LeadPatch::status(status))
    }

    /// Removing an id that does not exist is not an error.
    pub fn delete_lead(&mut self, id: &str) -> Result<(), StorageError> {
        let removed = self.run("delete_lead", |store| store.delete(Collection::Leads, id))?;
        debug!(event = "lead_deleted", id, removed);
        Ok(())
    }

    pub fn rates(&mut self) -> Result<Vec<Rate>, StorageError> {
        let documents = self.run("rates", |store| store.find(Collection::Rates, &[]))?;
        decode_all(documents)
    }

    pub fn add_rate(&mut self, rate: &Rate) -> Result<Rate, StorageError> {
        let body = encode(rate)?;
        self.run("add_rate", |store| store.insert(Collection::Rates, body.clone()))?
            .decode()
    }

    pub fn phonebook_entries(&mut self) -> Result<Vec<PhonebookEntry>, StorageError> {
        let documents = self.run("phonebook", |store| store.find(Collection::Phonebook, &[]))?;
        decode_all(documents)
    }

    /// Returns the stored entry, or `None` when the contact is already known.
    pub fn add_phonebook_entry_if_absent(
        &mut self,
        entry: &PhonebookEntry,
    ) -> Result<Option<PhonebookEntry>, StorageError> {
        let body = encode(entry)?;
        self.run("add_phonebook_entry", |store| {
            store.insert_if_absent(Collection::Phonebook, "contact", body.clone())
        })?
        .map(|document| document.decode())
        .transpose()
    }

    pub fn lead_stats(&mut self) -> LeadStats {
        let result = self.run("lead_stats", |store| {
            Ok(LeadStats {
                total: store.count(Collection::Leads, &[])?,
                negotiation: store.count(
                    Collection::Leads,
                    &[status_is(LeadStatus::Negotiation)],
                )?,
                regular: store.count(Collection::Leads, &[regular_frequency()])?,
                dead: store.count(Collection::Leads, &[status_is(LeadStatus::Dead)])?,
            })
        });
        result.unwrap_or_else(|err| {
            warn!(event = "lead_stats_failed", error = %err);
            LeadStats::default()
        })
    }

    pub fn leads_by_type(&mut self) -> LeadTypeBreakdown {
        let result = self.run("leads_by_type", |store| {
            let total = store.count(Collection::Leads, &[])?;
            let buyers = store.count(
                Collection::Leads,
                &[Predicate::eq("leadType", LEAD_TYPE_BUYER)],
            )?;
            let sellers = store.count(
                Collection::Leads,
                &[Predicate::eq("leadType", LEAD_TYPE_SELLER)],
            )?;
            Ok(LeadTypeBreakdown::from_counts(total, buyers, sellers))
        });
        result.unwrap_or_else(|err| {
            warn!(event = "leads_by_type_failed", error = %err);
            LeadTypeBreakdown::default()
        })
    }

    /// Lead count per status, in declaration order.
    pub fn status_funnel(&mut self) -> Vec<StatusCount> {
        let result = self.run("status_funnel", |store| {
            LeadStatus::ALL
                .into_iter()
                .map(|status| {
                    Ok(StatusCount {
                        status,
                        count: store.count(Collection::Leads, &[status_is(status)])?,
                    })
                })
                .collect::<Result<Vec<_>, StorageError>>()
        });
        result.unwrap_or_else(|err| {
            warn!(event = "status_funnel_failed", error = %err);
            LeadStatus::ALL
                .into_iter()
                .map(|status| StatusCount { status, count: 0 })
                .collect()
        })
    }
}

fn status_is(status: LeadStatus) -> Predicate {
    Predicate::eq("status", status.as_str())
}

fn regular_frequency() -> Predicate {
    Predicate::any_of("frequency", REGULAR_FREQUENCIES)
}

fn lead_predicates(filter: &LeadFilter) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    match &filter.status {
        Some(StatusFilter::Is(status)) => predicates.push(status_is(*status)),
        Some(StatusFilter::AnyOf(statuses)) => predicates.push(Predicate::any_of(
            "status",
            statuses.iter().map(|status| status.as_str()),
        )),
        None => {}
    }
    if filter.regular_only {
        predicates.push(regular_frequency());
    }
    if filter.needs_follow_up {
        predicates.push(status_is(LeadStatus::FollowUpNeeded));
    }
    if filter.needs_sample_update {
        predicates.push(status_is(LeadStatus::SellerToSendSample));
    }
    predicates
}
