use crate::error::ApiError;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use leadflow_ai::parse_lead_text;
use leadflow_core::export::{
    consolidated_file_name, render, render_table, to_records, Section, CSV_CONTENT_TYPE,
    LEAD_COLUMNS, PHONEBOOK_COLUMNS, RATE_COLUMNS,
};
use leadflow_core::form::LeadForm;
use leadflow_core::{
    Lead, LeadDraft, LeadFilter, LeadStats, LeadStatus, LeadView, PhonebookEntry, Rate,
    StatusCount, TypeCount,
};
use leadflow_storage::StorageStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/leads", get(list_leads).post(create_lead))
        .route("/api/leads/parse", post(parse_lead))
        .route("/api/leads/export", get(export_leads))
        .route(
            "/api/leads/:id",
            get(get_lead).patch(update_lead).delete(delete_lead),
        )
        .route("/api/dashboard", get(dashboard))
        .route("/api/rates", get(list_rates))
        .route("/api/rates/export", get(export_rates))
        .route("/api/phonebook", get(list_phonebook))
        .route("/api/phonebook/export", get(export_phonebook))
        .route("/api/export", get(export_all))
        .route("/api/storage", get(storage_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    #[serde(default)]
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub data: LeadDraft,
}

/// Raw text is only forwarded to the extractor, never stored.
async fn parse_lead(
    State(state): State<SharedState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseResponse>, ApiError> {
    let data = parse_lead_text(state.extractor.as_ref(), &request.raw_text).await?;
    Ok(Json(ParseResponse { data }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQuery {
    pub view: Option<String>,
    /// Comma-separated status labels.
    pub status: Option<String>,
    pub regular: Option<bool>,
    pub follow_up: Option<bool>,
    pub sample_update: Option<bool>,
}

impl LeadQuery {
    fn view(&self) -> Result<LeadView, ApiError> {
        self.view
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(ApiError::InvalidRequest)
    }

    fn filter(&self) -> Result<LeadFilter, ApiError> {
        let mut filter = self.view()?.filter();
        if let Some(raw) = &self.status {
            let statuses = raw
                .split(',')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(|label| label.parse::<LeadStatus>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(ApiError::InvalidRequest)?;
            filter = filter.and_statuses(statuses);
        }
        if self.regular.unwrap_or(false) {
            filter = filter.regular();
        }
        if self.follow_up.unwrap_or(false) {
            filter = filter.follow_up();
        }
        if self.sample_update.unwrap_or(false) {
            filter = filter.sample_update();
        }
        Ok(filter)
    }
}

async fn list_leads(
    State(state): State<SharedState>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let filter = query.filter()?;
    let leads = state.store.lock().await.leads(&filter)?;
    Ok(Json(leads))
}

async fn create_lead(
    State(state): State<SharedState>,
    Json(form): Json<LeadForm>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let draft = form.into_draft()?;
    let lead = state.store.lock().await.create_lead(draft)?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn get_lead(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Lead>, ApiError> {
    Ok(Json(state.store.lock().await.lead(&id)?))
}

async fn update_lead(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(form): Json<LeadForm>,
) -> Result<Json<Lead>, ApiError> {
    let patch = form.into_patch()?;
    let lead = state.store.lock().await.update_lead(&id, &patch)?;
    Ok(Json(lead))
}

async fn delete_lead(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.lock().await.delete_lead(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub view: Option<String>,
}

async fn export_leads(
    State(state): State<SharedState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let view = LeadQuery {
        view: query.view,
        ..LeadQuery::default()
    }
    .view()?;
    let leads = state.store.lock().await.leads(&view.filter())?;
    let csv = render_table(LEAD_COLUMNS, &to_records(&leads)?);
    info!(event = "leads_exported", view = %view, rows = leads.len());
    Ok(csv_attachment(view.export_file_name(), csv))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: LeadStats,
    pub by_type: Vec<TypeCount>,
    pub funnel: Vec<StatusCount>,
}

async fn dashboard(State(state): State<SharedState>) -> Json<Dashboard> {
    let mut store = state.store.lock().await;
    Json(Dashboard {
        stats: store.lead_stats(),
        by_type: store.leads_by_type().buckets(),
        funnel: store.status_funnel(),
    })
}

async fn list_rates(State(state): State<SharedState>) -> Result<Json<Vec<Rate>>, ApiError> {
    Ok(Json(state.store.lock().await.rates()?))
}

async fn export_rates(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let rates = state.store.lock().await.rates()?;
    let csv = render_table(RATE_COLUMNS, &to_records(&rates)?);
    Ok(csv_attachment("rates.csv", csv))
}

async fn list_phonebook(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PhonebookEntry>>, ApiError> {
    Ok(Json(state.store.lock().await.phonebook_entries()?))
}

async fn export_phonebook(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let entries = state.store.lock().await.phonebook_entries()?;
    let csv = render_table(PHONEBOOK_COLUMNS, &to_records(&entries)?);
    Ok(csv_attachment("phonebook.csv", csv))
}

async fn export_all(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let (leads, rates, entries) = {
        let mut store = state.store.lock().await;
        (
            store.leads(&LeadFilter::all())?,
            store.rates()?,
            store.phonebook_entries()?,
        )
    };
    let csv = render(&[
        Section::from_records("LEADS DATA", LEAD_COLUMNS, &leads)?,
        Section::from_records("RATES DATA", RATE_COLUMNS, &rates)?,
        Section::from_records("PHONEBOOK DATA", PHONEBOOK_COLUMNS, &entries)?,
    ]);
    info!(
        event = "consolidated_export",
        leads = leads.len(),
        rates = rates.len(),
        phonebook = entries.len()
    );
    Ok(csv_attachment(&consolidated_file_name(Utc::now()), csv))
}

async fn storage_status(State(state): State<SharedState>) -> Json<StorageStatus> {
    Json(state.store.lock().await.status())
}

fn csv_attachment(file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use leadflow_core::extraction::{ExtractionError, ExtractionFailureKind, LeadExtractor};
    use leadflow_core::{LeadDetails, LeadPriority, StatusFilter};
    use leadflow_storage::RecordStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixedExtractor {
        fail: bool,
    }

    #[async_trait]
    impl LeadExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract(&self, _raw_text: &str) -> Result<LeadDraft, ExtractionError> {
            if self.fail {
                return Err(ExtractionError::new(
                    ExtractionFailureKind::ProviderError,
                    "upstream 500",
                ));
            }
            Ok(LeadDraft {
                details: LeadDetails {
                    lead_type: Some("Buyer".to_string()),
                    item_details: Some("Turmeric".to_string()),
                    ..LeadDetails::default()
                },
                priority: Some(LeadPriority::High),
            })
        }
    }

    fn app_with(fail: bool) -> Router {
        router(AppState::new(
            RecordStore::in_memory(),
            Arc::new(FixedExtractor { fail }),
        ))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>, Option<String>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, bytes, disposition)
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).expect("json body")
    }

    #[tokio::test]
    async fn lead_lifecycle_over_http() {
        let app = app_with(false);

        let (status, body, _) = send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({
                "leadType": "Buyer",
                "sellerBuyerName": "Asha",
                "sellerBuyerContact": "555-0101",
                "status": "Dead",
                "priority": "high"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created = json_body(&body);
        assert_eq!(created["leadNo"], "L-001");
        assert_eq!(created["status"], "New");
        assert_eq!(created["priority"], "High");
        let id = created["id"].as_str().expect("id").to_string();

        let (status, body, _) = send(
            &app,
            "PATCH",
            &format!("/api/leads/{id}"),
            Some(json!({"status": "Negotiation"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["status"], "Negotiation");

        let (status, body, _) = send(&app, "GET", "/api/leads?status=Negotiation,Dead", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body).as_array().map(Vec::len), Some(1));

        let (status, body, _) = send(&app, "GET", "/api/phonebook", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)[0]["contact"], "555-0101");

        let (status, _, _) = send(&app, "DELETE", &format!("/api/leads/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, "DELETE", &format!("/api/leads/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body, _) = send(&app, "GET", &format!("/api/leads/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["status"], 404);
    }

    #[test]
    fn status_query_narrows_the_view_instead_of_replacing_it() {
        let query = LeadQuery {
            view: Some("negotiation".to_string()),
            status: Some("Dead".to_string()),
            ..LeadQuery::default()
        };
        let filter = query.filter().expect("filter");
        assert_eq!(filter.status, Some(StatusFilter::AnyOf(Vec::new())));

        let query = LeadQuery {
            view: Some("bin".to_string()),
            status: Some("Dead, New".to_string()),
            ..LeadQuery::default()
        };
        let filter = query.filter().expect("filter");
        assert_eq!(filter.status, Some(StatusFilter::Is(LeadStatus::Dead)));
    }

    #[tokio::test]
    async fn view_and_status_combine_with_and() {
        let app = app_with(false);
        let (_, body, _) = send(&app, "POST", "/api/leads", Some(json!({"leadType": "Seller"}))).await;
        let id = json_body(&body)["id"].as_str().expect("id").to_string();
        send(
            &app,
            "PATCH",
            &format!("/api/leads/{id}"),
            Some(json!({"status": "Dead"})),
        )
        .await;

        let (status, body, _) =
            send(&app, "GET", "/api/leads?view=negotiation&status=Dead", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body).as_array().map(Vec::len), Some(0));

        let (_, body, _) = send(&app, "GET", "/api/leads?view=bin&status=Dead", None).await;
        assert_eq!(json_body(&body).as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn invalid_forms_report_every_issue() {
        let app = app_with(false);
        let (status, body, _) = send(
            &app,
            "PATCH",
            "/api/leads/anything",
            Some(json!({"status": "archived", "priority": "urgent"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let issues = json_body(&body)["issues"].clone();
        assert_eq!(issues[0]["field"], "status");
        assert_eq!(issues[1]["field"], "priority");

        let (status, _, _) = send(&app, "GET", "/api/leads?view=archive", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn parse_returns_draft_or_generic_failure() {
        let (status, body, _) = send(
            &app_with(false),
            "POST",
            "/api/leads/parse",
            Some(json!({"rawText": "Need 20MT turmeric urgently"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = json_body(&body)["data"].clone();
        assert_eq!(data["leadType"], "Buyer");
        assert_eq!(data["priority"], "High");

        let (status, body, _) = send(
            &app_with(false),
            "POST",
            "/api/leads/parse",
            Some(json!({"rawText": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"], "Input text cannot be empty.");

        let (status, body, _) = send(
            &app_with(true),
            "POST",
            "/api/leads/parse",
            Some(json!({"rawText": "Need turmeric"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(&body)["error"], "Failed to parse lead data with AI.");
    }

    #[tokio::test]
    async fn exports_are_csv_attachments() {
        let app = app_with(false);
        send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({"itemDetails": "Turmeric, fingers", "sellerBuyerName": "Asha", "sellerBuyerContact": "555"})),
        )
        .await;

        let (status, body, disposition) =
            send(&app, "GET", "/api/leads/export?view=all", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            disposition.as_deref(),
            Some("attachment; filename=\"all_leads.csv\"")
        );
        let csv = String::from_utf8(body).expect("utf8");
        assert!(csv.starts_with("Lead No,Lead Date,"));
        assert!(csv.contains("\"Turmeric, fingers\""));

        let (_, body, disposition) = send(&app, "GET", "/api/export", None).await;
        let csv = String::from_utf8(body).expect("utf8");
        assert!(csv.starts_with("\"LEADS DATA\"\n"));
        assert!(!csv.contains("RATES DATA"));
        assert!(csv.contains("\"PHONEBOOK DATA\"\nName,Contact,Company\nAsha,555,Asha\n\n"));
        assert!(disposition
            .as_deref()
            .is_some_and(|value| value.contains("leadflow_export_")));

        let (_, body, _) = send(&app, "GET", "/api/leads/export?view=bin", None).await;
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn dashboard_and_storage_status() {
        let app = app_with(false);
        for lead_type in ["Buyer", "Buyer", "Seller", "Broker"] {
            send(&app, "POST", "/api/leads", Some(json!({"leadType": lead_type}))).await;
        }

        let (status, body, _) = send(&app, "GET", "/api/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        let dashboard = json_body(&body);
        assert_eq!(dashboard["stats"]["total"], 4);
        assert_eq!(dashboard["byType"][0], json!({"name": "Buyers", "value": 2}));
        assert_eq!(dashboard["byType"][2], json!({"name": "Other", "value": 1}));
        assert_eq!(dashboard["funnel"][0], json!({"status": "New", "count": 4}));

        let (_, body, _) = send(&app, "GET", "/api/storage", None).await;
        let storage = json_body(&body);
        assert_eq!(storage["active"], "memory");
        assert_eq!(storage["breaker"], "closed");

        let (status, body, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }
}
