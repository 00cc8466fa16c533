use leadflow_core::extraction::LeadExtractor;
use leadflow_storage::RecordStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The record store sits behind one async mutex so breaker state changes are never torn.
pub struct AppState {
    pub store: Mutex<RecordStore>,
    pub extractor: Arc<dyn LeadExtractor>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: RecordStore, extractor: Arc<dyn LeadExtractor>) -> SharedState {
        Arc::new(Self {
            store: Mutex::new(store),
            extractor,
        })
    }
}
