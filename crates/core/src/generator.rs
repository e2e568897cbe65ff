//! Claim text generation.
//!
//! Assembles the facts of a patient's case, checks that everything the claim kind needs is
//! present, picks the prompt variant that matches the patient's history, renders it and asks
//! the text oracle for the final legal prose. Nothing is persisted here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use nme_types::PatientKey;
use serde::Serialize;

use crate::constants::{
    DIAGNOSIS_PLACEHOLDER, REQUIRED_TUTELA_FIELDS, SUPERSALUD_NAME, TUTELA_ADDRESSEE,
};
use crate::followup::colombia_today;
use crate::model::{ClaimKind, ClaimRecord, Patient, RiskCategory, TutelaRecord};
use crate::oracle::{OracleError, TextOracle};
use crate::orchestrator::OutcomeKind;
use crate::requirements::{validate_escalation_requirements, REQ_TUTELA_FAVORABLE};
use crate::store::PatientClaimStore;
use crate::templates::{render, PromptCatalog, TemplateError};
use crate::ClaimError;

const BASE_FIELDS: [&str; 5] = [
    "nombre_paciente",
    "tipo_documento",
    "numero_documento",
    "eps_estandarizada",
    "med_no_entregados",
];

const CONTACT_FIELDS: [&str; 5] = [
    "ciudad",
    "direccion",
    "telefono_contacto",
    "correo",
    "diagnostico",
];

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("patient not found: {0}")]
    NotFound(String),
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("prerequisite missing ({}): {reason}", .missing.join(", "))]
    PrerequisiteMissing { missing: Vec<String>, reason: String },
    /// The tutela ruling data needed for a desacato is absent or incomplete.
    #[error("tutela data needed: {}", .missing.join(", "))]
    NeedsTutelaData {
        /// Set to `tutela_favorable` when there is no favorable ruling at all.
        requirement: Option<String>,
        missing: Vec<String>,
    },
    #[error("prompt '{0}' is not available")]
    PromptUnavailable(String),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("text generation failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("store error: {0}")]
    Store(#[from] ClaimError),
}

impl GenerationError {
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::NotFound(_) => OutcomeKind::NotFound,
            Self::MissingFields(_)
            | Self::PrerequisiteMissing { .. }
            | Self::NeedsTutelaData { .. } => OutcomeKind::ValidationFailed,
            Self::PromptUnavailable(_) | Self::Template(_) | Self::Oracle(_) | Self::Store(_) => {
                OutcomeKind::GenerationFailed
            }
        }
    }
}

/// A generated claim, ready to persist and relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimOutput {
    pub patient_key: PatientKey,
    pub kind: ClaimKind,
    pub level: u32,
    pub text: String,
    pub generated_at: DateTime<Utc>,
    pub risk_category: String,
    /// Human deadline label for the addressee, not the review window.
    pub response_deadline: String,
    pub medications: String,
    pub prompt_used: String,
    pub metadata: BTreeMap<String, String>,
}

pub struct ClaimGenerator {
    store: Arc<dyn PatientClaimStore>,
    catalog: Arc<dyn PromptCatalog>,
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl ClaimGenerator {
    pub fn new(
        store: Arc<dyn PatientClaimStore>,
        catalog: Arc<dyn PromptCatalog>,
        oracle: Arc<dyn TextOracle>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            catalog,
            oracle,
            timeout,
        }
    }

    /// Generate the text of a `kind` claim at escalation `level`.
    ///
    /// `extra_context` values override the assembled facts.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`]; see [`GenerationError::outcome_kind`] for how each maps
    /// onto the outcome taxonomy.
    pub fn generate_claim(
        &self,
        key: &PatientKey,
        kind: ClaimKind,
        level: u32,
        extra_context: &BTreeMap<String, String>,
    ) -> Result<ClaimOutput, GenerationError> {
        tracing::info!("generating {} at level {} for {}", kind, level, key);

        let patient = self
            .store
            .get_patient(key)?
            .ok_or_else(|| GenerationError::NotFound(key.to_string()))?;

        let tutela = match kind {
            ClaimKind::Desacato => Some(self.favorable_tutela(key)?),
            ClaimKind::ReclamacionSupersalud | ClaimKind::Tutela => {
                let report = validate_escalation_requirements(self.store.as_ref(), key, kind)?;
                if !report.can_escalate {
                    return Err(GenerationError::PrerequisiteMissing {
                        missing: report.missing,
                        reason: report.reason,
                    });
                }
                None
            }
            ClaimKind::ReclamacionEps => None,
        };

        let mut facts = patient_facts(&patient, colombia_today());
        let missing = missing_fields(&patient, &facts, kind);
        if !missing.is_empty() {
            tracing::warn!("{} for {} is missing fields {:?}", kind, key, missing);
            return Err(GenerationError::MissingFields(missing));
        }

        let eps = patient.eps_estandarizada.trim().to_string();
        let mut metadata = BTreeMap::new();
        match kind {
            ClaimKind::ReclamacionEps => {
                metadata.insert("entidad_destinataria".to_string(), eps.clone());
            }
            ClaimKind::ReclamacionSupersalud => {
                facts.insert(
                    "gestiones_previas_eps".to_string(),
                    supersalud_evidence(&patient),
                );
                metadata.insert(
                    "entidad_destinataria".to_string(),
                    SUPERSALUD_NAME.to_string(),
                );
            }
            ClaimKind::Tutela => {
                facts.insert("gestiones_previas".to_string(), tutela_evidence(&patient));
                metadata.insert(
                    "entidad_destinataria".to_string(),
                    TUTELA_ADDRESSEE.to_string(),
                );
            }
            ClaimKind::Desacato => {
                if let Some(tutela) = &tutela {
                    insert_tutela_facts(&mut facts, tutela, &patient);
                    metadata.insert("entidad_destinataria".to_string(), tutela.juzgado.clone());
                    metadata.insert(
                        "numero_sentencia_referencia".to_string(),
                        tutela.numero_sentencia.clone(),
                    );
                    metadata.insert("juzgado".to_string(), tutela.juzgado.clone());
                    metadata.insert("tutela_id".to_string(), tutela.tutela_id.clone());
                }
            }
        }

        let variant = prompt_variant(&patient, kind, level);
        if variant.ends_with("_escalado") {
            facts.insert("gestiones_previas".to_string(), escalation_history(&patient));
        }
        if variant == "desacato2" || variant == "desacato3" {
            facts.extend(previous_desacatos(&patient));
        }
        facts.extend(extra_context.iter().map(|(k, v)| (k.clone(), v.clone())));

        let (prompt_name, template) = self.template_for(&variant, kind)?;
        let prompt = render(&template, &facts).map_err(|e| {
            tracing::error!("prompt {} could not be rendered: {}", prompt_name, e);
            e
        })?;

        let text = self
            .oracle
            .generate_text(&prompt, Some(self.timeout))
            .map_err(|e| {
                tracing::error!("text generation for {} of {} failed: {}", kind, key, e);
                e
            })?;

        let risk_category = patient.risk_category().trim().to_lowercase();
        let medications = facts
            .get("med_no_entregados")
            .cloned()
            .unwrap_or_default();
        metadata.insert("prompt_usado".to_string(), prompt_name.clone());
        metadata.insert("medicamentos_afectados".to_string(), medications.clone());
        if kind.needs_document() {
            metadata.insert("requiere_pdf".to_string(), "true".to_string());
            metadata.insert("requiere_firma_paciente".to_string(), "true".to_string());
        }

        let response_deadline = match kind {
            ClaimKind::ReclamacionSupersalud => supersalud_deadline(&risk_category),
            _ => eps_deadline(&risk_category),
        };

        tracing::info!("{} generated for {} with prompt {}", kind, key, prompt_name);
        Ok(ClaimOutput {
            patient_key: key.clone(),
            kind,
            level,
            text: text.trim().to_string(),
            generated_at: Utc::now(),
            risk_category,
            response_deadline: response_deadline.to_string(),
            medications,
            prompt_used: prompt_name,
            metadata,
        })
    }

    /// The favorable tutela with every field a desacato needs.
    fn favorable_tutela(&self, key: &PatientKey) -> Result<TutelaRecord, GenerationError> {
        let Some(tutela) = self.store.get_favorable_tutela(key, None)? else {
            tracing::warn!("no favorable tutela on record for {}", key);
            return Err(GenerationError::NeedsTutelaData {
                requirement: Some(REQ_TUTELA_FAVORABLE.to_string()),
                missing: REQUIRED_TUTELA_FIELDS.iter().map(|f| f.to_string()).collect(),
            });
        };
        let missing = tutela.missing_fields();
        if !missing.is_empty() {
            tracing::warn!("tutela {} of {} is incomplete: {:?}", tutela.tutela_id, key, missing);
            return Err(GenerationError::NeedsTutelaData {
                requirement: None,
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }
        Ok(tutela)
    }

    fn template_for(
        &self,
        variant: &str,
        kind: ClaimKind,
    ) -> Result<(String, String), GenerationError> {
        if let Some(template) = self.catalog.get(variant) {
            return Ok((variant.to_string(), template));
        }
        if variant != kind.as_str() {
            tracing::warn!("prompt {} not found, using base {}", variant, kind);
            if let Some(template) = self.catalog.get(kind.as_str()) {
                return Ok((kind.as_str().to_string(), template));
            }
        }
        tracing::error!("prompt {} not available", kind);
        Err(GenerationError::PromptUnavailable(kind.as_str().to_string()))
    }
}

/// EPS response deadline label for a risk tier. Unknown tiers get the simple label.
pub fn eps_deadline(risk_category: &str) -> &'static str {
    match RiskCategory::parse(risk_category) {
        Some(RiskCategory::Priorizado) => "72 horas",
        Some(RiskCategory::Vital) => "24 horas",
        _ => "5 días hábiles",
    }
}

/// Supersalud response deadline label for a risk tier. Unknown tiers get the simple label.
pub fn supersalud_deadline(risk_category: &str) -> &'static str {
    match RiskCategory::parse(risk_category) {
        Some(RiskCategory::Priorizado) => "10 días hábiles",
        Some(RiskCategory::Vital) => "5 días hábiles",
        _ => "15 días hábiles",
    }
}

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// `19 de octubre de 2026`.
pub fn long_date(date: NaiveDate) -> String {
    let month = MONTHS[date.month0() as usize];
    format!("{:02} de {} de {}", date.day(), month, date.year())
}

fn joined(values: &[String]) -> String {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn iso(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn patient_facts(patient: &Patient, today: NaiveDate) -> BTreeMap<String, String> {
    let prescription = patient.latest_prescription();
    let diagnosis = prescription
        .map(|p| p.diagnostico.trim())
        .filter(|d| !d.is_empty())
        .unwrap_or(DIAGNOSIS_PLACEHOLDER);
    let risk = patient.risk_category().trim().to_lowercase();

    let mut facts = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        facts.insert(k.to_string(), v);
    };
    put("nombre_paciente", patient.nombre_paciente.trim().to_string());
    put("tipo_documento", patient.tipo_documento.trim().to_string());
    put("numero_documento", patient.numero_documento.trim().to_string());
    put("eps_estandarizada", patient.eps_estandarizada.trim().to_string());
    put("ciudad", patient.ciudad.trim().to_string());
    put("direccion", patient.direccion.trim().to_string());
    put("telefono_contacto", joined(&patient.telefono_contacto));
    put("correo", joined(&patient.correo));
    put("diagnostico", diagnosis.to_string());
    put("med_no_entregados", patient.undelivered_medications().join(", "));
    put("farmacia", patient.farmacia.trim().to_string());
    put("sede_farmacia", patient.sede_farmacia.trim().to_string());
    put("plazo_respuesta", eps_deadline(&risk).to_string());
    put("plazo_supersalud", supersalud_deadline(&risk).to_string());
    put("categoria_riesgo", risk);
    put("fecha_actual", long_date(today));
    facts
}

/// Required fields without a value, in declaration order.
fn missing_fields(
    patient: &Patient,
    facts: &BTreeMap<String, String>,
    kind: ClaimKind,
) -> Vec<String> {
    let mut required: Vec<&str> = BASE_FIELDS.to_vec();
    if kind != ClaimKind::ReclamacionEps {
        required.extend(CONTACT_FIELDS);
    }
    let has_diagnosis = patient
        .latest_prescription()
        .is_some_and(|p| !p.diagnostico.trim().is_empty());

    required
        .into_iter()
        .filter(|field| {
            if *field == "diagnostico" {
                return !has_diagnosis;
            }
            facts.get(*field).map_or(true, |v| v.trim().is_empty())
        })
        .map(str::to_string)
        .collect()
}

fn radicated(patient: &Patient, kind: ClaimKind) -> Vec<ClaimRecord> {
    patient.radicated_claims(&[kind])
}

fn supersalud_evidence(patient: &Patient) -> String {
    radicated(patient, ClaimKind::ReclamacionEps)
        .iter()
        .map(|c| {
            format!(
                "Reclamación ante EPS radicada el {} bajo el número {}",
                iso(c.fecha_radicacion),
                c.numero_radicado
            )
        })
        .collect::<Vec<_>>()
        .join(". ")
}

fn tutela_evidence(patient: &Patient) -> String {
    let eps = match patient.eps_estandarizada.trim() {
        "" => "EPS",
        name => name,
    };
    let mut lines: Vec<String> = radicated(patient, ClaimKind::ReclamacionEps)
        .iter()
        .map(|c| {
            format!(
                "Reclamación ante {} radicada el {} bajo el número {} sin respuesta satisfactoria",
                eps,
                iso(c.fecha_radicacion),
                c.numero_radicado
            )
        })
        .collect();
    lines.extend(
        radicated(patient, ClaimKind::ReclamacionSupersalud)
            .iter()
            .map(|c| {
                format!(
                    "Queja ante {} radicada el {} bajo el número {} sin respuesta satisfactoria",
                    SUPERSALUD_NAME,
                    iso(c.fecha_radicacion),
                    c.numero_radicado
                )
            }),
    );
    lines.push("Múltiples solicitudes presenciales y telefónicas ante la EPS".to_string());
    lines.push("Agotamiento de medios ordinarios de reclamación administrativa".to_string());
    lines.join(". ")
}

/// Filing history cited by the `_escalado` prompt variants.
fn escalation_history(patient: &Patient) -> String {
    let mut lines: Vec<String> = radicated(patient, ClaimKind::ReclamacionEps)
        .iter()
        .map(|c| {
            format!(
                "Reclamación ante EPS radicada el {} (No. {}) sin respuesta satisfactoria",
                iso(c.fecha_radicacion),
                c.numero_radicado
            )
        })
        .collect();
    lines.extend(
        radicated(patient, ClaimKind::ReclamacionSupersalud)
            .iter()
            .map(|c| {
                format!(
                    "Queja ante Superintendencia radicada el {} (No. {}) sin resolución",
                    iso(c.fecha_radicacion),
                    c.numero_radicado
                )
            }),
    );
    if lines.is_empty() {
        "Gestiones previas realizadas sin éxito".to_string()
    } else {
        lines.join(". ")
    }
}

fn insert_tutela_facts(
    facts: &mut BTreeMap<String, String>,
    tutela: &TutelaRecord,
    patient: &Patient,
) {
    let city = match tutela.ciudad.trim() {
        "" => patient.ciudad.trim(),
        city => city,
    };
    let eps = match patient.eps_estandarizada.trim() {
        "" => "EPS",
        name => name,
    };
    facts.insert("numero_sentencia".to_string(), tutela.numero_sentencia.clone());
    facts.insert("juzgado".to_string(), tutela.juzgado.clone());
    facts.insert("fecha_sentencia".to_string(), iso(tutela.fecha_sentencia));
    facts.insert(
        "fecha_radicacion_tutela".to_string(),
        iso(tutela.fecha_radicacion_tutela),
    );
    facts.insert("ciudad_tutela".to_string(), city.to_string());
    facts.insert(
        "representante_legal_eps".to_string(),
        format!("Representante Legal de {eps}"),
    );
}

/// Prompt name for a claim, based on what the patient has already filed.
fn prompt_variant(patient: &Patient, kind: ClaimKind, level: u32) -> String {
    let earlier = |k: ClaimKind| {
        patient
            .reclamaciones
            .iter()
            .any(|c| c.tipo_accion == k && c.nivel_escalamiento < level)
    };
    match kind {
        ClaimKind::ReclamacionEps | ClaimKind::ReclamacionSupersalud if earlier(kind) => {
            format!("{}_escalado", kind.as_str())
        }
        ClaimKind::Desacato => {
            let count = patient
                .reclamaciones
                .iter()
                .filter(|c| c.tipo_accion == ClaimKind::Desacato)
                .count();
            match count {
                0 => "desacato".to_string(),
                1 => "desacato2".to_string(),
                _ => "desacato3".to_string(),
            }
        }
        _ => kind.as_str().to_string(),
    }
}

/// Dates and numbers of the first two desacatos, ordered by filing date.
fn previous_desacatos(patient: &Patient) -> BTreeMap<String, String> {
    let mut desacatos: Vec<&ClaimRecord> = patient
        .reclamaciones
        .iter()
        .filter(|c| c.tipo_accion == ClaimKind::Desacato)
        .collect();
    desacatos.sort_by_key(|c| c.fecha_radicacion);

    let mut data = BTreeMap::new();
    for (prefix, claim) in ["primer", "segundo"].into_iter().zip(desacatos) {
        data.insert(format!("{prefix}_desacato_fecha"), iso(claim.fecha_radicacion));
        data.insert(format!("{prefix}_desacato_numero"), claim.numero_radicado.clone());
    }
    data
}
