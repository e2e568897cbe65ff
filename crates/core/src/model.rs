//! Patient claim record model.
//!
//! One [`Patient`] per person, keyed by [`PatientKey`]. It carries identity and contact
//! fields, an append-only list of prescriptions and an append-only list of claim escalation
//! records (`reclamaciones`). Serialized names match the store of record, so the Spanish
//! field names are kept on the wire.

use chrono::{DateTime, NaiveDate, Utc};
use nme_types::PatientKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ClaimError, ClaimResult};

// ============================================================================
// Enumerations
// ============================================================================

/// Patient risk tier. Drives the ladder shape and the response-time labels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Simple,
    Priorizado,
    Vital,
}

impl RiskCategory {
    /// Case-insensitive parse. Unknown tiers give `None`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "priorizado" => Some(Self::Priorizado),
            "vital" => Some(Self::Vital),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Priorizado => "priorizado",
            Self::Vital => "vital",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The legal instrument a claim record represents (`tipo_accion`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    ReclamacionEps,
    ReclamacionSupersalud,
    Tutela,
    Desacato,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 4] = [
        Self::ReclamacionEps,
        Self::ReclamacionSupersalud,
        Self::Tutela,
        Self::Desacato,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReclamacionEps => "reclamacion_eps",
            Self::ReclamacionSupersalud => "reclamacion_supersalud",
            Self::Tutela => "tutela",
            Self::Desacato => "desacato",
        }
    }

    /// Label used in messages to the end user.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ReclamacionEps => "reclamación ante tu EPS",
            Self::ReclamacionSupersalud => "queja ante la Supersalud",
            Self::Tutela => "acción de tutela",
            Self::Desacato => "incidente de desacato",
        }
    }

    /// Tutela and desacato are filed by the patient and go out as signed documents.
    pub const fn needs_document(self) -> bool {
        matches!(self, Self::Tutela | Self::Desacato)
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimKind {
    type Err = ClaimError;

    /// Accepts the stored names and the short escalation names (`eps`, `supersalud`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reclamacion_eps" | "eps" => Ok(Self::ReclamacionEps),
            "reclamacion_supersalud" | "supersalud" => Ok(Self::ReclamacionSupersalud),
            "tutela" => Ok(Self::Tutela),
            "desacato" => Ok(Self::Desacato),
            other => Err(ClaimError::InvalidInput(format!(
                "unknown claim kind '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of a claim record (`estado_reclamacion`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    PendienteRadicacion,
    Radicado,
    Escalado,
    /// Terminal.
    Resuelto,
}

impl ClaimState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendienteRadicacion => "pendiente_radicacion",
            Self::Radicado => "radicado",
            Self::Escalado => "escalado",
            Self::Resuelto => "resuelto",
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a prescribed medication line item.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum DeliveryStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pendiente,
    #[serde(rename = "entregado")]
    Entregado,
    #[serde(rename = "no entregado")]
    NoEntregado,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub nombre: String,
    #[serde(default)]
    pub dosis: String,
    #[serde(default)]
    pub cantidad: String,
    #[serde(default)]
    pub entregado: DeliveryStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id_session: String,
    #[serde(default)]
    pub diagnostico: String,
    /// Kept raw: an unrecognised tier must reach the rule engine as an error decision.
    pub categoria_riesgo: String,
    #[serde(default)]
    pub fecha_atencion: Option<NaiveDate>,
    #[serde(default)]
    pub url_prescripcion: String,
    #[serde(default)]
    pub medicamentos: Vec<Medication>,
}

/// Person filling in the data on behalf of the patient, when it is not the patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Informant {
    pub nombre: String,
    #[serde(default)]
    pub parentesco: String,
    #[serde(default)]
    pub tipo_documento: String,
    #[serde(default)]
    pub numero_documento: String,
}

/// One escalation step (`reclamacion`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id_reclamacion: Uuid,
    pub tipo_accion: ClaimKind,
    pub nivel_escalamiento: u32,
    pub estado_reclamacion: ClaimState,
    #[serde(default)]
    pub texto_reclamacion: String,
    #[serde(default)]
    pub med_no_entregados: String,
    #[serde(default)]
    pub numero_radicado: String,
    #[serde(default)]
    pub fecha_radicacion: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_revision: Option<NaiveDate>,
    /// Calendar days between filing and review, as decided by the rule engine.
    #[serde(default)]
    pub dias_revision: u32,
    #[serde(default)]
    pub url_documento: String,
    pub id_session: String,
    pub fecha_creacion: DateTime<Utc>,
}

impl ClaimRecord {
    /// A fresh claim awaiting filing.
    pub fn pending(
        kind: ClaimKind,
        level: u32,
        review_days: u32,
        text: impl Into<String>,
        med_no_entregados: impl Into<String>,
        id_session: impl Into<String>,
    ) -> Self {
        Self {
            id_reclamacion: Uuid::new_v4(),
            tipo_accion: kind,
            nivel_escalamiento: level,
            estado_reclamacion: ClaimState::PendienteRadicacion,
            texto_reclamacion: text.into(),
            med_no_entregados: med_no_entregados.into(),
            numero_radicado: String::new(),
            fecha_radicacion: None,
            fecha_revision: None,
            dias_revision: review_days,
            url_documento: String::new(),
            id_session: id_session.into(),
            fecha_creacion: Utc::now(),
        }
    }

    pub fn is_radicated(&self) -> bool {
        !self.numero_radicado.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub paciente_clave: PatientKey,
    pub nombre_paciente: String,
    pub tipo_documento: String,
    pub numero_documento: String,
    #[serde(default)]
    pub telefono_contacto: Vec<String>,
    #[serde(default)]
    pub correo: Vec<String>,
    #[serde(default)]
    pub direccion: String,
    #[serde(default)]
    pub ciudad: String,
    #[serde(default)]
    pub eps_estandarizada: String,
    #[serde(default)]
    pub informante: Option<Informant>,
    #[serde(default)]
    pub farmacia: String,
    #[serde(default)]
    pub sede_farmacia: String,
    #[serde(default)]
    pub prescripciones: Vec<Prescription>,
    #[serde(default)]
    pub reclamaciones: Vec<ClaimRecord>,
    /// Highest escalation level persisted so far. Written in the same update as each append.
    #[serde(default)]
    pub nivel_actual: u32,
}

impl Patient {
    /// A patient with identity fields only.
    pub fn new(
        paciente_clave: PatientKey,
        nombre_paciente: impl Into<String>,
        tipo_documento: impl Into<String>,
        numero_documento: impl Into<String>,
    ) -> Self {
        Self {
            paciente_clave,
            nombre_paciente: nombre_paciente.into(),
            tipo_documento: tipo_documento.into(),
            numero_documento: numero_documento.into(),
            telefono_contacto: Vec::new(),
            correo: Vec::new(),
            direccion: String::new(),
            ciudad: String::new(),
            eps_estandarizada: String::new(),
            informante: None,
            farmacia: String::new(),
            sede_farmacia: String::new(),
            prescripciones: Vec::new(),
            reclamaciones: Vec::new(),
            nivel_actual: 0,
        }
    }

    pub fn latest_prescription(&self) -> Option<&Prescription> {
        self.prescripciones.last()
    }

    /// Risk tier of the most recent prescription, as stored.
    pub fn risk_category(&self) -> &str {
        self.latest_prescription()
            .map(|p| p.categoria_riesgo.as_str())
            .unwrap_or("")
    }

    /// Names of the latest prescription's items marked `no entregado`.
    pub fn undelivered_medications(&self) -> Vec<&str> {
        self.latest_prescription()
            .map(|p| {
                p.medicamentos
                    .iter()
                    .filter(|m| m.entregado == DeliveryStatus::NoEntregado)
                    .map(|m| m.nombre.trim())
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent claim by append order.
    pub fn last_claim(&self) -> Option<&ClaimRecord> {
        self.reclamaciones.last()
    }

    pub fn is_resolved(&self) -> bool {
        self.last_claim()
            .is_some_and(|c| c.estado_reclamacion == ClaimState::Resuelto)
    }

    /// True if any prescription or claim references `session_id`.
    pub fn references_session(&self, session_id: &str) -> bool {
        self.prescripciones.iter().any(|p| p.id_session == session_id)
            || self.reclamaciones.iter().any(|c| c.id_session == session_id)
    }

    pub fn claim(&self, claim_id: Uuid) -> Option<&ClaimRecord> {
        self.reclamaciones
            .iter()
            .find(|c| c.id_reclamacion == claim_id)
    }

    /// Radicated claims of the given kinds, in append order.
    pub fn radicated_claims(&self, kinds: &[ClaimKind]) -> Vec<ClaimRecord> {
        self.reclamaciones
            .iter()
            .filter(|c| kinds.contains(&c.tipo_accion) && c.is_radicated())
            .cloned()
            .collect()
    }
}

/// Result of a tutela ruling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutelaOutcome {
    Favorable,
    Desfavorable,
    Pendiente,
}

impl FromStr for TutelaOutcome {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "favorable" => Ok(Self::Favorable),
            "desfavorable" => Ok(Self::Desfavorable),
            "pendiente" => Ok(Self::Pendiente),
            other => Err(ClaimError::InvalidInput(format!(
                "unknown tutela outcome '{other}'"
            ))),
        }
    }
}

/// A court ruling on a tutela. Created once and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutelaRecord {
    pub tutela_id: String,
    pub numero_sentencia: String,
    pub fecha_sentencia: Option<NaiveDate>,
    pub fecha_radicacion_tutela: Option<NaiveDate>,
    pub juzgado: String,
    pub ciudad: String,
    pub resultado: TutelaOutcome,
    pub created_at: DateTime<Utc>,
}

impl TutelaRecord {
    /// Required fields that are empty on this record, in collection order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.numero_sentencia.trim().is_empty() {
            missing.push("numero_sentencia");
        }
        if self.fecha_sentencia.is_none() {
            missing.push("fecha_sentencia");
        }
        if self.fecha_radicacion_tutela.is_none() {
            missing.push("fecha_radicacion_tutela");
        }
        if self.juzgado.trim().is_empty() {
            missing.push("juzgado");
        }
        if self.ciudad.trim().is_empty() {
            missing.push("ciudad");
        }
        missing
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Selects the earlier claims that an append flips.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviousClaimFilter {
    pub id_session: String,
    pub tipo_accion: ClaimKind,
    /// Only claims strictly below this level match, so siblings of a multi-claim step are
    /// never flipped by each other.
    pub below_level: u32,
}

impl PreviousClaimFilter {
    pub fn matches(&self, claim: &ClaimRecord) -> bool {
        claim.id_session == self.id_session
            && claim.tipo_accion == self.tipo_accion
            && claim.nivel_escalamiento < self.below_level
            && !matches!(
                claim.estado_reclamacion,
                ClaimState::Resuelto | ClaimState::Escalado
            )
    }
}

/// Post-generation updates to an existing claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimUpdate {
    /// Document rendered and stored externally.
    DocumentUrl(String),
    /// Filing reference issued by the target entity.
    Filed {
        numero_radicado: String,
        fecha_radicacion: NaiveDate,
    },
    Resolved,
}

/// Apply the append-and-flip to `patient` in place.
///
/// `between` runs after the append and before the flip; stores use it as a fault-injection
/// point. Callers must apply this to a copy and only keep it on `Ok`.
///
/// # Returns
///
/// The number of earlier claims moved to `previous_new_state`.
///
/// # Errors
///
/// - `ClaimError::LevelRegression` if the new claim's level is below `nivel_actual`.
/// - Whatever `between` returns.
pub fn apply_append(
    patient: &mut Patient,
    claim: ClaimRecord,
    previous: &PreviousClaimFilter,
    previous_new_state: ClaimState,
    between: impl FnOnce() -> ClaimResult<()>,
) -> ClaimResult<usize> {
    let current = patient
        .nivel_actual
        .max(patient.reclamaciones.iter().map(|c| c.nivel_escalamiento).max().unwrap_or(0));
    if claim.nivel_escalamiento < current {
        return Err(ClaimError::LevelRegression {
            current,
            attempted: claim.nivel_escalamiento,
        });
    }

    let new_level = claim.nivel_escalamiento;
    let existing = patient.reclamaciones.len();
    patient.reclamaciones.push(claim);

    between()?;

    let mut flipped = 0;
    for earlier in patient.reclamaciones.iter_mut().take(existing) {
        if previous.matches(earlier) {
            earlier.estado_reclamacion = previous_new_state;
            flipped += 1;
        }
    }
    patient.nivel_actual = new_level;
    Ok(flipped)
}

/// Apply a [`ClaimUpdate`] to the claim `claim_id` in place and return the updated claim.
///
/// # Errors
///
/// - `ClaimError::ClaimNotFound` if no claim has that id.
/// - `ClaimError::ClaimAlreadyResolved` when resolving a resolved claim.
/// - `ClaimError::InvalidInput` for an empty radicado number or URL.
pub fn apply_update(
    patient: &mut Patient,
    claim_id: Uuid,
    update: &ClaimUpdate,
) -> ClaimResult<ClaimRecord> {
    let claim = patient
        .reclamaciones
        .iter_mut()
        .find(|c| c.id_reclamacion == claim_id)
        .ok_or(ClaimError::ClaimNotFound(claim_id))?;

    match update {
        ClaimUpdate::DocumentUrl(url) => {
            if url.trim().is_empty() {
                return Err(ClaimError::InvalidInput("document url cannot be empty".into()));
            }
            claim.url_documento = url.trim().to_string();
        }
        ClaimUpdate::Filed {
            numero_radicado,
            fecha_radicacion,
        } => {
            if numero_radicado.trim().is_empty() {
                return Err(ClaimError::InvalidInput(
                    "numero_radicado cannot be empty".into(),
                ));
            }
            if claim.estado_reclamacion == ClaimState::Resuelto {
                return Err(ClaimError::ClaimAlreadyResolved(claim_id));
            }
            claim.numero_radicado = numero_radicado.trim().to_string();
            claim.fecha_radicacion = Some(*fecha_radicacion);
            claim.fecha_revision = Some(crate::followup::review_date(
                *fecha_radicacion,
                claim.dias_revision,
            ));
            if claim.estado_reclamacion == ClaimState::PendienteRadicacion {
                claim.estado_reclamacion = ClaimState::Radicado;
            }
        }
        ClaimUpdate::Resolved => {
            if claim.estado_reclamacion == ClaimState::Resuelto {
                return Err(ClaimError::ClaimAlreadyResolved(claim_id));
            }
            claim.estado_reclamacion = ClaimState::Resuelto;
        }
    }
    Ok(claim.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Patient {
        Patient::new(
            PatientKey::parse("COCC39287966").unwrap(),
            "Ana Pérez",
            "CC",
            "39287966",
        )
    }

    #[test]
    fn wire_names_match_store() {
        assert_eq!(
            serde_json::to_string(&ClaimKind::ReclamacionSupersalud).unwrap(),
            "\"reclamacion_supersalud\""
        );
        assert_eq!(
            serde_json::to_string(&ClaimState::PendienteRadicacion).unwrap(),
            "\"pendiente_radicacion\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::NoEntregado).unwrap(),
            "\"no entregado\""
        );
    }

    #[test]
    fn claim_kind_accepts_short_names() {
        assert_eq!("supersalud".parse::<ClaimKind>().unwrap(), ClaimKind::ReclamacionSupersalud);
        assert_eq!("EPS".parse::<ClaimKind>().unwrap(), ClaimKind::ReclamacionEps);
        assert!("amparo".parse::<ClaimKind>().is_err());
    }

    #[test]
    fn risk_category_is_case_insensitive() {
        assert_eq!(RiskCategory::parse(" VITAL "), Some(RiskCategory::Vital));
        assert_eq!(RiskCategory::parse("urgente"), None);
    }

    #[test]
    fn undelivered_medications_come_from_latest_prescription() {
        let mut p = patient();
        p.prescripciones.push(Prescription {
            id_session: "s1".into(),
            diagnostico: String::new(),
            categoria_riesgo: "simple".into(),
            fecha_atencion: None,
            url_prescripcion: String::new(),
            medicamentos: vec![Medication {
                nombre: "Losartán".into(),
                dosis: String::new(),
                cantidad: String::new(),
                entregado: DeliveryStatus::NoEntregado,
            }],
        });
        p.prescripciones.push(Prescription {
            id_session: "s2".into(),
            diagnostico: "Diabetes".into(),
            categoria_riesgo: "priorizado".into(),
            fecha_atencion: None,
            url_prescripcion: String::new(),
            medicamentos: vec![
                Medication {
                    nombre: "Insulina".into(),
                    dosis: String::new(),
                    cantidad: String::new(),
                    entregado: DeliveryStatus::NoEntregado,
                },
                Medication {
                    nombre: "Metformina".into(),
                    dosis: String::new(),
                    cantidad: String::new(),
                    entregado: DeliveryStatus::Entregado,
                },
            ],
        });
        assert_eq!(p.undelivered_medications(), vec!["Insulina"]);
        assert_eq!(p.risk_category(), "priorizado");
    }

    #[test]
    fn append_flips_only_lower_levels_of_the_session() {
        let mut p = patient();
        p.reclamaciones
            .push(ClaimRecord::pending(ClaimKind::ReclamacionEps, 1, 5, "", "", "s1"));
        p.reclamaciones
            .push(ClaimRecord::pending(ClaimKind::ReclamacionEps, 1, 5, "", "", "other"));
        p.nivel_actual = 1;

        let filter = PreviousClaimFilter {
            id_session: "s1".into(),
            tipo_accion: ClaimKind::ReclamacionEps,
            below_level: 2,
        };
        let new_claim = ClaimRecord::pending(ClaimKind::ReclamacionSupersalud, 2, 20, "", "", "s1");
        let flipped = apply_append(&mut p, new_claim, &filter, ClaimState::Escalado, || Ok(())).unwrap();

        assert_eq!(flipped, 1);
        assert_eq!(p.reclamaciones[0].estado_reclamacion, ClaimState::Escalado);
        assert_eq!(p.reclamaciones[1].estado_reclamacion, ClaimState::PendienteRadicacion);
        assert_eq!(p.nivel_actual, 2);
    }

    #[test]
    fn append_rejects_level_regression() {
        let mut p = patient();
        p.reclamaciones
            .push(ClaimRecord::pending(ClaimKind::Tutela, 4, 15, "", "", "s1"));
        p.nivel_actual = 4;
        let filter = PreviousClaimFilter {
            id_session: "s1".into(),
            tipo_accion: ClaimKind::ReclamacionEps,
            below_level: 2,
        };
        let err = apply_append(
            &mut p,
            ClaimRecord::pending(ClaimKind::ReclamacionEps, 2, 5, "", "", "s1"),
            &filter,
            ClaimState::Escalado,
            || Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::LevelRegression { current: 4, attempted: 2 }));
    }

    #[test]
    fn sibling_claims_of_one_step_share_a_level() {
        let mut p = patient();
        p.reclamaciones
            .push(ClaimRecord::pending(ClaimKind::ReclamacionEps, 1, 1, "", "", "s1"));
        p.nivel_actual = 1;

        for kind in [ClaimKind::Tutela, ClaimKind::ReclamacionSupersalud] {
            let filter = PreviousClaimFilter {
                id_session: "s1".into(),
                tipo_accion: kind,
                below_level: 2,
            };
            let claim = ClaimRecord::pending(kind, 2, 1, "", "", "s1");
            apply_append(&mut p, claim, &filter, ClaimState::Escalado, || Ok(())).unwrap();
        }

        assert_eq!(p.reclamaciones.len(), 3);
        assert_eq!(p.nivel_actual, 2);
        assert_eq!(p.reclamaciones[1].estado_reclamacion, ClaimState::PendienteRadicacion);
    }

    #[test]
    fn filing_sets_review_date_from_stored_days() {
        let mut p = patient();
        let claim = ClaimRecord::pending(ClaimKind::ReclamacionSupersalud, 2, 20, "", "", "s1");
        let id = claim.id_reclamacion;
        p.reclamaciones.push(claim);

        let filed_on = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let updated = apply_update(
            &mut p,
            id,
            &ClaimUpdate::Filed {
                numero_radicado: "SS-123".into(),
                fecha_radicacion: filed_on,
            },
        )
        .unwrap();

        assert_eq!(updated.estado_reclamacion, ClaimState::Radicado);
        assert_eq!(updated.fecha_revision, NaiveDate::from_ymd_opt(2025, 3, 21));
    }

    #[test]
    fn resolving_twice_fails() {
        let mut p = patient();
        let claim = ClaimRecord::pending(ClaimKind::ReclamacionEps, 1, 5, "", "", "s1");
        let id = claim.id_reclamacion;
        p.reclamaciones.push(claim);
        apply_update(&mut p, id, &ClaimUpdate::Resolved).unwrap();
        assert!(matches!(
            apply_update(&mut p, id, &ClaimUpdate::Resolved),
            Err(ClaimError::ClaimAlreadyResolved(_))
        ));
        assert!(p.is_resolved());
    }
}
