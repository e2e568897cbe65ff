//! # API REST
//!
//! REST API for the claims escalation service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, API key, duplicate events)
//!
//! Uses `api-shared` for request/response types and `nme-core` for everything else.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use api_shared::{
    validate_api_key, AuthError, ClaimFailureRes, CreatedClaimRes, DocumentReq, DocumentRes,
    DueReviewRes, DueReviewsRes, EligibilityRes, EscalationReq, EscalationRes, EventReq, EventRes,
    FilingReq, FilingRes, HealthRes, HealthService, ListPatientsRes, ReplyOptionRes, ReplyRes,
    TutelaReq, TutelaRes, API_KEY_HEADER,
};
use nme_core::{
    followup::{claims_due_for_review, colombia_today, record_filing},
    intake::{parse_colombian_date, TutelaDraft, TutelaField, TUTELA_FIELDS},
    model::ClaimUpdate,
    relay::{offer_escalation, relay_outcome, DeferredRenderer, OutgoingMessage, Outbox},
    requirements::validate_escalation_requirements,
    rules::decide_next_escalation,
    ChannelEvent, ClaimError, ClaimKind, CoreConfig, EscalationOrchestrator, EventGuard,
    FileClaimStore, OrchestrationOutcome, PatientClaimStore, PatientKey, TutelaOutcome,
};

type ApiError = (StatusCode, &'static str);

/// Application state shared by every handler.
///
/// Services are built once at startup; handlers only clone the `Arc`s.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn PatientClaimStore>,
    orchestrator: Arc<EscalationOrchestrator>,
    guard: Arc<EventGuard>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PatientClaimStore>,
        orchestrator: EscalationOrchestrator,
        guard: EventGuard,
    ) -> Self {
        Self {
            store,
            orchestrator: Arc::new(orchestrator),
            guard: Arc::new(guard),
        }
    }

    /// Wire the file store, prompt catalog, provider chain and idempotency guard from `cfg`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt catalog or a provider cannot be loaded.
    pub fn from_config(cfg: Arc<CoreConfig>) -> Result<Self, ClaimError> {
        let store: Arc<dyn PatientClaimStore> = Arc::new(FileClaimStore::new(cfg.clone()));
        let orchestrator = EscalationOrchestrator::from_config(cfg.clone(), store.clone())?;
        Ok(Self::new(
            store,
            orchestrator,
            EventGuard::new(cfg.idempotency_ttl()),
        ))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_escalation,
        handle_event,
        list_patients,
        eligibility,
        save_tutela,
        record_claim_filing,
        attach_document,
        due_reviews,
    ),
    components(schemas(
        HealthRes,
        EscalationReq,
        EscalationRes,
        CreatedClaimRes,
        ClaimFailureRes,
        EventReq,
        EventRes,
        ReplyRes,
        ReplyOptionRes,
        ListPatientsRes,
        EligibilityRes,
        TutelaReq,
        TutelaRes,
        FilingReq,
        FilingRes,
        DocumentReq,
        DocumentRes,
        DueReviewRes,
        DueReviewsRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/escalations", post(create_escalation))
        .route("/events", post(handle_event))
        .route("/patients", get(list_patients))
        .route("/patients/:key/eligibility/:kind", get(eligibility))
        .route("/patients/:key/tutelas", post(save_tutela))
        .route(
            "/patients/:key/claims/:claim_id/filing",
            post(record_claim_filing),
        )
        .route(
            "/patients/:key/claims/:claim_id/document",
            post(attach_document),
        )
        .route("/reviews/due", get(due_reviews))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint used for monitoring and load balancer checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/escalations",
    request_body = EscalationReq,
    responses(
        (status = 200, description = "Escalation outcome", body = EscalationRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Invalid API key"),
        (status = 409, description = "Duplicate event"),
        (status = 500, description = "Internal server error")
    )
)]
/// Run one automatic escalation for a session
///
/// Each `event_id` is accepted once within the idempotency window. The escalation itself
/// runs on the blocking pool because it calls the text oracle and writes to disk.
///
/// # Errors
/// - `409 Conflict` if `event_id` was already processed within the window.
/// - `500 Internal Server Error` if the store cannot be read.
#[axum::debug_handler]
async fn create_escalation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EscalationReq>,
) -> Result<Json<EscalationRes>, ApiError> {
    require_api_key(&headers)?;
    if req.event_id.trim().is_empty() || req.session_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "event_id and session_id are required"));
    }
    if !state.guard.try_claim(&req.event_id) {
        return Err((StatusCode::CONFLICT, "Duplicate event"));
    }

    let outcome = run_escalation(&state, req.session_id).await?;
    Ok(Json(escalation_res(&outcome)))
}

#[utoipa::path(
    post,
    path = "/events",
    request_body = EventReq,
    responses(
        (status = 200, description = "Event acknowledged", body = EventRes),
        (status = 401, description = "Invalid API key"),
        (status = 409, description = "Duplicate event"),
        (status = 500, description = "Internal server error")
    )
)]
/// Accept a channel button callback
///
/// `escalate_yes_<session>` triggers an escalation. Every other event is acknowledged with
/// its parsed kind so the channel adapter can continue the conversation.
#[axum::debug_handler]
async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventReq>,
) -> Result<Json<EventRes>, ApiError> {
    require_api_key(&headers)?;
    if req.event_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "event_id is required"));
    }
    if !state.guard.try_claim(&req.event_id) {
        return Err((StatusCode::CONFLICT, "Duplicate event"));
    }

    let event = ChannelEvent::parse(&req.callback_data);
    tracing::info!("channel event {}", event.kind());

    let (escalation, replies) = match &event {
        ChannelEvent::EscalateYes { session_id } => {
            let outcome = run_escalation(&state, session_id.clone()).await?;
            let replies = relay_replies(&state, &outcome).await?;
            (Some(escalation_res(&outcome)), replies)
        }
        ChannelEvent::MedNone { session_id } => {
            (None, escalation_offer(&state, session_id.clone()).await?)
        }
        _ => (None, Vec::new()),
    };

    Ok(Json(EventRes {
        event: event.kind().to_string(),
        session_id: event.session_id().map(str::to_string),
        escalation,
        replies: replies.into_iter().map(reply_res).collect(),
    }))
}

/// Messages telling the patient how the escalation went. Documents are attached later
/// through the document route, so tutela and desacato replies announce them as pending.
async fn relay_replies(
    state: &AppState,
    outcome: &OrchestrationOutcome,
) -> Result<Vec<OutgoingMessage>, ApiError> {
    let store = state.store.clone();
    let outcome = outcome.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let outbox = Outbox::new();
        relay_outcome(
            &outcome,
            &outbox,
            &outcome.session_id,
            &DeferredRenderer,
            store.as_ref(),
        )
        .map(|_| outbox.into_messages())
    })
    .await;
    match joined {
        Ok(Ok(messages)) => Ok(messages),
        Ok(Err(e)) => {
            tracing::error!("Relay error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
        Err(e) => {
            tracing::error!("Relay task failed: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

/// Escalate yes/no buttons naming the next step of the patient behind `session_id`.
///
/// Unknown sessions and patients with nothing left to escalate get no offer.
async fn escalation_offer(
    state: &AppState,
    session_id: String,
) -> Result<Vec<OutgoingMessage>, ApiError> {
    let store = state.store.clone();
    let joined = tokio::task::spawn_blocking(move || -> Result<Vec<OutgoingMessage>, ApiError> {
        let patient = match store.find_patient_by_session(&session_id) {
            Ok(Some(key)) => store
                .get_patient(&key)
                .map_err(|e| store_error("Load patient", e))?,
            Ok(None) => None,
            Err(e) => return Err(store_error("Find session", e)),
        };
        let Some(patient) = patient else {
            return Ok(Vec::new());
        };

        let decision = decide_next_escalation(patient.risk_category(), &patient.reclamaciones);
        let kinds = decision.claim_kinds();
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let next_step = kinds
            .iter()
            .map(|kind| kind.label())
            .collect::<Vec<_>>()
            .join(" y ");

        let outbox = Outbox::new();
        offer_escalation(&outbox, &session_id, &session_id, &next_step).map_err(|e| {
            tracing::error!("Offer error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?;
        Ok(outbox.into_messages())
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Offer task failed: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

fn reply_res(message: OutgoingMessage) -> ReplyRes {
    match message {
        OutgoingMessage::Text { text } => ReplyRes {
            kind: "text".into(),
            text,
            options: Vec::new(),
            url: None,
            filename: None,
        },
        OutgoingMessage::Buttons { text, options } => ReplyRes {
            kind: "buttons".into(),
            text,
            options: options
                .into_iter()
                .map(|o| ReplyOptionRes {
                    title: o.title,
                    callback_data: o.callback_data,
                })
                .collect(),
            url: None,
            filename: None,
        },
        OutgoingMessage::Document {
            url,
            filename,
            caption,
        } => ReplyRes {
            kind: "document".into(),
            text: caption,
            options: Vec::new(),
            url: Some(url),
            filename: Some(filename),
        },
    }
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "Patient keys", body = ListPatientsRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List every stored patient key
#[axum::debug_handler]
async fn list_patients(State(state): State<AppState>) -> Result<Json<ListPatientsRes>, ApiError> {
    match state.store.list_patients() {
        Ok(keys) => Ok(Json(ListPatientsRes {
            patients: keys.into_iter().map(|k| k.as_str().to_string()).collect(),
        })),
        Err(e) => Err(store_error("List patients", e)),
    }
}

#[utoipa::path(
    get,
    path = "/patients/{key}/eligibility/{kind}",
    params(
        ("key" = String, Path, description = "Patient key"),
        ("kind" = String, Path, description = "Claim kind, e.g. tutela")
    ),
    responses(
        (status = 200, description = "Eligibility report", body = EligibilityRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Check whether a claim kind may be drafted for a patient
#[axum::debug_handler]
async fn eligibility(
    State(state): State<AppState>,
    AxumPath((key, kind)): AxumPath<(String, String)>,
) -> Result<Json<EligibilityRes>, ApiError> {
    let key = parse_key(&key)?;
    let kind: ClaimKind = kind.parse().map_err(|e| {
        tracing::error!("Invalid claim kind: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid claim kind")
    })?;

    match validate_escalation_requirements(state.store.as_ref(), &key, kind) {
        Ok(report) => Ok(Json(EligibilityRes {
            tipo_accion: report.kind.as_str().to_string(),
            can_escalate: report.can_escalate,
            missing: report.missing,
            reason: report.reason,
        })),
        Err(e) => Err(store_error("Eligibility", e)),
    }
}

#[utoipa::path(
    post,
    path = "/patients/{key}/tutelas",
    request_body = TutelaReq,
    params(("key" = String, Path, description = "Patient key")),
    responses(
        (status = 200, description = "Tutela saved", body = TutelaRes),
        (status = 400, description = "Invalid tutela data"),
        (status = 404, description = "Patient not found"),
        (status = 409, description = "Tutela already recorded"),
        (status = 500, description = "Internal server error")
    )
)]
/// Record a tutela ruling
///
/// Dates accept `DD/MM/AAAA` or `AAAA-MM-DD`. Every ruling field is required.
#[axum::debug_handler]
async fn save_tutela(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(key): AxumPath<String>,
    Json(req): Json<TutelaReq>,
) -> Result<Json<TutelaRes>, ApiError> {
    require_api_key(&headers)?;
    let key = parse_key(&key)?;

    let resultado: TutelaOutcome = req.resultado.parse().map_err(|e| {
        tracing::error!("Invalid tutela outcome: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid tutela outcome")
    })?;

    let mut draft = TutelaDraft::new();
    for field in TUTELA_FIELDS {
        let value = match field {
            TutelaField::NumeroSentencia => &req.numero_sentencia,
            TutelaField::FechaSentencia => &req.fecha_sentencia,
            TutelaField::FechaRadicacionTutela => &req.fecha_radicacion_tutela,
            TutelaField::Juzgado => &req.juzgado,
            TutelaField::Ciudad => &req.ciudad,
        };
        draft.set(field, value).map_err(|e| {
            tracing::error!("Invalid tutela data: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid tutela data")
        })?;
    }
    let record = draft.finish(&req.tutela_id, resultado).map_err(|e| {
        tracing::error!("Invalid tutela data: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid tutela data")
    })?;

    let tutela_id = record.tutela_id.clone();
    match state.store.save_tutela(&key, record) {
        Ok(()) => Ok(Json(TutelaRes {
            tutela_id,
            resultado: req.resultado.trim().to_lowercase(),
        })),
        Err(e) => Err(store_error("Save tutela", e)),
    }
}

#[utoipa::path(
    post,
    path = "/patients/{key}/claims/{claim_id}/filing",
    request_body = FilingReq,
    params(
        ("key" = String, Path, description = "Patient key"),
        ("claim_id" = String, Path, description = "Claim id")
    ),
    responses(
        (status = 200, description = "Filing recorded", body = FilingRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient or claim not found"),
        (status = 409, description = "Claim already resolved"),
        (status = 500, description = "Internal server error")
    )
)]
/// Record the filing number issued for a claim
///
/// Moves the claim to `radicado` and schedules its review.
#[axum::debug_handler]
async fn record_claim_filing(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((key, claim_id)): AxumPath<(String, String)>,
    Json(req): Json<FilingReq>,
) -> Result<Json<FilingRes>, ApiError> {
    require_api_key(&headers)?;
    let key = parse_key(&key)?;
    let claim_id = parse_claim_id(&claim_id)?;
    if req.numero_radicado.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "numero_radicado is required"));
    }
    let Some(fecha) = parse_colombian_date(&req.fecha_radicacion) else {
        return Err((StatusCode::BAD_REQUEST, "Invalid fecha_radicacion"));
    };

    match record_filing(
        state.store.as_ref(),
        &key,
        claim_id,
        req.numero_radicado.trim(),
        fecha,
    ) {
        Ok(claim) => Ok(Json(FilingRes {
            claim_id: claim.id_reclamacion.to_string(),
            estado_reclamacion: claim.estado_reclamacion.as_str().to_string(),
            numero_radicado: claim.numero_radicado,
            fecha_revision: claim.fecha_revision.map(|d| d.to_string()),
        })),
        Err(e) => Err(store_error("Record filing", e)),
    }
}

#[utoipa::path(
    post,
    path = "/patients/{key}/claims/{claim_id}/document",
    request_body = DocumentReq,
    params(
        ("key" = String, Path, description = "Patient key"),
        ("claim_id" = String, Path, description = "Claim id")
    ),
    responses(
        (status = 200, description = "Document attached", body = DocumentRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient or claim not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Attach the URL of a rendered claim document
#[axum::debug_handler]
async fn attach_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath((key, claim_id)): AxumPath<(String, String)>,
    Json(req): Json<DocumentReq>,
) -> Result<Json<DocumentRes>, ApiError> {
    require_api_key(&headers)?;
    let key = parse_key(&key)?;
    let claim_id = parse_claim_id(&claim_id)?;
    let url = req.url.trim();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url is required"));
    }

    match state
        .store
        .update_claim(&key, claim_id, ClaimUpdate::DocumentUrl(url.to_string()))
    {
        Ok(claim) => Ok(Json(DocumentRes {
            claim_id: claim.id_reclamacion.to_string(),
            url_documento: claim.url_documento,
        })),
        Err(e) => Err(store_error("Attach document", e)),
    }
}

#[derive(Debug, Deserialize)]
struct DueQuery {
    date: Option<String>,
}

#[utoipa::path(
    get,
    path = "/reviews/due",
    params(("date" = Option<String>, Query, description = "AAAA-MM-DD, defaults to today in Colombia")),
    responses(
        (status = 200, description = "Filed claims due for review", body = DueReviewsRes),
        (status = 400, description = "Invalid date"),
        (status = 500, description = "Internal server error")
    )
)]
/// List filed claims whose review date has arrived
#[axum::debug_handler]
async fn due_reviews(
    State(state): State<AppState>,
    Query(query): Query<DueQuery>,
) -> Result<Json<DueReviewsRes>, ApiError> {
    let today = match query.date.as_deref() {
        Some(raw) => parse_colombian_date(raw).ok_or((StatusCode::BAD_REQUEST, "Invalid date"))?,
        None => colombia_today(),
    };

    match claims_due_for_review(state.store.as_ref(), today) {
        Ok(due) => Ok(Json(DueReviewsRes {
            date: today.to_string(),
            reviews: due
                .into_iter()
                .map(|r| DueReviewRes {
                    patient_key: r.patient_key.as_str().to_string(),
                    claim_id: r.claim_id.to_string(),
                    tipo_accion: r.tipo_accion.as_str().to_string(),
                    nivel_escalamiento: r.nivel_escalamiento,
                    numero_radicado: r.numero_radicado,
                    fecha_revision: r.fecha_revision.to_string(),
                    id_session: r.id_session,
                })
                .collect(),
        })),
        Err(e) => Err(store_error("Due reviews", e)),
    }
}

// Helpers

fn require_api_key(headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    validate_api_key(provided).map_err(|e| match e {
        AuthError::NotConfigured => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        AuthError::Missing | AuthError::Invalid => (StatusCode::UNAUTHORIZED, "Invalid API key"),
    })
}

fn parse_key(raw: &str) -> Result<PatientKey, ApiError> {
    PatientKey::parse(raw).map_err(|e| {
        tracing::error!("Invalid patient key: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid patient key")
    })
}

fn parse_claim_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| {
        tracing::error!("Invalid claim id: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid claim id")
    })
}

fn store_error(context: &str, e: ClaimError) -> ApiError {
    match e {
        ClaimError::PatientNotFound(_) => (StatusCode::NOT_FOUND, "Patient not found"),
        ClaimError::ClaimNotFound(_) => (StatusCode::NOT_FOUND, "Claim not found"),
        ClaimError::TutelaAlreadyExists(_) => (StatusCode::CONFLICT, "Tutela already recorded"),
        ClaimError::ClaimAlreadyResolved(_) => (StatusCode::CONFLICT, "Claim already resolved"),
        ClaimError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
        other => {
            tracing::error!("{} error: {:?}", context, other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

async fn run_escalation(
    state: &AppState,
    session_id: String,
) -> Result<OrchestrationOutcome, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let joined =
        tokio::task::spawn_blocking(move || orchestrator.auto_escalate(&session_id)).await;
    match joined {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => {
            tracing::error!("Escalation error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
        Err(e) => {
            tracing::error!("Escalation task failed: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

fn escalation_res(outcome: &OrchestrationOutcome) -> EscalationRes {
    EscalationRes {
        success: outcome.success,
        status: snake_case(&outcome.status),
        error_kind: outcome.error_kind.as_ref().map(snake_case),
        session_id: outcome.session_id.clone(),
        patient_key: outcome.patient_key.as_ref().map(|k| k.as_str().to_string()),
        nivel_escalamiento: outcome.level,
        reason: outcome.reason.clone(),
        claims: outcome
            .created
            .iter()
            .map(|c| CreatedClaimRes {
                claim_id: c.claim_id.to_string(),
                tipo_accion: c.output.kind.as_str().to_string(),
                nivel_escalamiento: c.output.level,
                flipped: c.flipped,
                plazo_respuesta: c.output.response_deadline.clone(),
                texto: c.output.text.clone(),
            })
            .collect(),
        failures: outcome
            .failures
            .iter()
            .map(|f| ClaimFailureRes {
                tipo_accion: f.kind.as_str().to_string(),
                error_kind: snake_case(&f.error_kind),
                reason: f.reason.clone(),
            })
            .collect(),
        missing_fields: outcome.missing_fields.clone(),
    }
}

/// Wire name of a unit enum that serializes as a snake_case string.
fn snake_case<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use nme_core::model::{DeliveryStatus, Medication, Patient, Prescription};
    use nme_core::oracle::ScriptedOracle;
    use nme_core::templates::MemoryPromptCatalog;
    use nme_core::{ClaimGenerator, MemoryClaimStore};
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "COCC39287966";
    const TEST_API_KEY: &str = "test-api-key";

    fn patient(tier: &str) -> Patient {
        let mut patient = Patient::new(PatientKey::parse(KEY).unwrap(), "Ana María Pérez", "CC", "39287966");
        patient.telefono_contacto = vec!["3001234567".into()];
        patient.correo = vec!["ana@example.com".into()];
        patient.direccion = "Calle 10 # 20-30".into();
        patient.ciudad = "Medellín".into();
        patient.eps_estandarizada = "Nueva EPS".into();
        patient.prescripciones.push(Prescription {
            id_session: "s1".into(),
            diagnostico: "Hipertensión arterial".into(),
            categoria_riesgo: tier.into(),
            fecha_atencion: None,
            url_prescripcion: String::new(),
            medicamentos: vec![Medication {
                nombre: "Losartán 50 mg".into(),
                dosis: "1 diaria".into(),
                cantidad: "30".into(),
                entregado: DeliveryStatus::NoEntregado,
            }],
        });
        patient
    }

    fn setup(tier: &str) -> (Arc<MemoryClaimStore>, Arc<ScriptedOracle>, Router) {
        std::env::set_var("API_KEY", TEST_API_KEY);
        let store = Arc::new(MemoryClaimStore::new());
        store.register_patient(patient(tier)).unwrap();
        let oracle = Arc::new(ScriptedOracle::new("test"));
        let mut catalog = MemoryPromptCatalog::new();
        for kind in ClaimKind::ALL {
            catalog = catalog.with(kind.as_str(), format!("{} para {{nombre_paciente}}", kind));
        }
        let generator = ClaimGenerator::new(
            store.clone(),
            Arc::new(catalog),
            oracle.clone(),
            Duration::from_secs(5),
        );
        let orchestrator = EscalationOrchestrator::new(store.clone(), generator, false);
        let state = AppState::new(
            store.clone(),
            orchestrator,
            EventGuard::new(Duration::from_secs(60)),
        );
        (store, oracle, app(state))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, TEST_API_KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_store, _oracle, app) = setup("simple");
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ok"], true);
    }

    #[tokio::test]
    async fn escalation_runs_once_per_event() {
        let (store, oracle, app) = setup("simple");
        oracle.push(Ok("Reclamación redactada".into()));

        let body = serde_json::json!({"event_id": "wamid.1", "session_id": "s1"});
        let response = app
            .clone()
            .oneshot(post_json("/escalations", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "escalated");
        assert_eq!(json["claims"][0]["tipo_accion"], "reclamacion_eps");
        assert_eq!(json["claims"][0]["nivel_escalamiento"], 1);

        let response = app.oneshot(post_json("/escalations", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let key = PatientKey::parse(KEY).unwrap();
        assert_eq!(store.get_patient(&key).unwrap().unwrap().reclamaciones.len(), 1);
    }

    #[tokio::test]
    async fn mutating_routes_require_the_api_key() {
        let (_store, _oracle, app) = setup("simple");
        let request = Request::builder()
            .method("POST")
            .uri("/escalations")
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, "wrong")
            .body(Body::from(
                serde_json::json!({"event_id": "e1", "session_id": "s1"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn events_trigger_escalation_only_for_escalate_yes() {
        let (_store, oracle, app) = setup("vital");
        oracle.push(Ok("Reclamación".into()));

        let response = app
            .clone()
            .oneshot(post_json(
                "/events",
                serde_json::json!({"event_id": "cb-1", "callback_data": "followup_no_s1"}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["event"], "followup_no");
        assert!(json["escalation"].is_null());

        let response = app
            .oneshot(post_json(
                "/events",
                serde_json::json!({"event_id": "cb-2", "callback_data": "escalate_yes_s1"}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["event"], "escalate_yes");
        assert_eq!(json["escalation"]["status"], "escalated");
        assert_eq!(json["replies"][0]["kind"], "text");
        assert!(json["replies"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Escalamiento exitoso"));
    }

    #[tokio::test]
    async fn nothing_delivered_offers_the_next_step() {
        let (_store, _oracle, app) = setup("simple");
        let response = app
            .clone()
            .oneshot(post_json(
                "/events",
                serde_json::json!({"event_id": "cb-1", "callback_data": "med_none_s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let reply = &json["replies"][0];
        assert_eq!(reply["kind"], "buttons");
        assert!(reply["text"].as_str().unwrap().contains("reclamación ante tu EPS"));
        assert_eq!(reply["options"][0]["callback_data"], "escalate_yes_s1");

        let response = app
            .oneshot(post_json(
                "/events",
                serde_json::json!({"event_id": "cb-2", "callback_data": "med_none_unknown"}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["replies"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn tutela_with_bad_date_is_rejected() {
        let (_store, _oracle, app) = setup("vital");
        let body = serde_json::json!({
            "tutela_id": "tut-1",
            "numero_sentencia": "078",
            "fecha_sentencia": "31/02/2025",
            "fecha_radicacion_tutela": "15/05/2025",
            "juzgado": "Juzgado Primero Laboral del Circuito de Medellín",
            "ciudad": "Medellín",
            "resultado": "favorable"
        });
        let response = app
            .oneshot(post_json(&format!("/patients/{KEY}/tutelas"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tutela_is_saved_once() {
        let (store, _oracle, app) = setup("vital");
        let body = serde_json::json!({
            "tutela_id": "tut-1",
            "numero_sentencia": "078",
            "fecha_sentencia": "28/05/2025",
            "fecha_radicacion_tutela": "2025-05-15",
            "juzgado": "Juzgado Primero Laboral del Circuito de Medellín",
            "ciudad": "Medellín",
            "resultado": "Favorable"
        });
        let uri = format!("/patients/{KEY}/tutelas");
        let response = app
            .clone()
            .oneshot(post_json(&uri, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(post_json(&uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let key = PatientKey::parse(KEY).unwrap();
        assert_eq!(store.tutelas(&key).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn filing_then_due_review() {
        let (store, oracle, app) = setup("simple");
        oracle.push(Ok("Reclamación".into()));
        let response = app
            .clone()
            .oneshot(post_json(
                "/escalations",
                serde_json::json!({"event_id": "e1", "session_id": "s1"}),
            ))
            .await
            .unwrap();
        let claim_id = body_json(response).await["claims"][0]["claim_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/patients/{KEY}/claims/{claim_id}/filing"),
                serde_json::json!({"numero_radicado": "EPS-77", "fecha_radicacion": "2025-03-01"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["estado_reclamacion"], "radicado");
        assert_eq!(json["fecha_revision"], "2025-03-06");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/reviews/due?date=2025-03-06")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["reviews"][0]["numero_radicado"], "EPS-77");

        let key = PatientKey::parse(KEY).unwrap();
        assert!(store.get_patient(&key).unwrap().unwrap().reclamaciones[0].is_radicated());
    }

    #[tokio::test]
    async fn eligibility_reports_missing_prerequisites() {
        let (_store, _oracle, app) = setup("vital");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/patients/{KEY}/eligibility/desacato"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["can_escalate"], false);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/patients/COCC1/eligibility/tutela")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
