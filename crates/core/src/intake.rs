//! Collection of tutela ruling data.
//!
//! A desacato cannot be drafted until the patient's favorable tutela carries five facts from
//! the ruling. The chat collects them one question at a time into a [`TutelaDraft`], which is
//! turned into an immutable [`TutelaRecord`] once complete.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{TutelaOutcome, TutelaRecord};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("invalid date for {field}: '{value}' (use DD/MM/AAAA or AAAA-MM-DD)")]
    InvalidDate { field: TutelaField, value: String },
    #[error("{0} cannot be empty")]
    EmptyValue(TutelaField),
    #[error("unknown tutela field '{0}'")]
    UnknownField(String),
    #[error("tutela_id cannot be empty")]
    MissingTutelaId,
    #[error("tutela data incomplete, missing: {0:?}")]
    Incomplete(Vec<&'static str>),
}

/// A field the desacato needs from the tutela ruling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutelaField {
    NumeroSentencia,
    FechaSentencia,
    FechaRadicacionTutela,
    Juzgado,
    Ciudad,
}

/// Required fields in collection order.
pub const TUTELA_FIELDS: [TutelaField; 5] = [
    TutelaField::NumeroSentencia,
    TutelaField::FechaSentencia,
    TutelaField::FechaRadicacionTutela,
    TutelaField::Juzgado,
    TutelaField::Ciudad,
];

impl TutelaField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NumeroSentencia => "numero_sentencia",
            Self::FechaSentencia => "fecha_sentencia",
            Self::FechaRadicacionTutela => "fecha_radicacion_tutela",
            Self::Juzgado => "juzgado",
            Self::Ciudad => "ciudad",
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Self::FechaSentencia | Self::FechaRadicacionTutela)
    }

    /// The question sent to the patient, with an example answer.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::NumeroSentencia => {
                "📋 Para generar el desacato necesito el *número exacto de tu acción de tutela*.\n\n\
                 Aparece en la sentencia (ejemplos: '078', 'T-05001-31-05-001-2025-10098-00').\n\n\
                 ¿Me lo compartes tal como aparece en la sentencia?"
            }
            Self::FechaSentencia => {
                "📅 ¿En qué fecha te *concedieron la tutela*?\n\n\
                 Escríbela en formato DD/MM/AAAA (ejemplo: 28/05/2025). \
                 La encuentras en el encabezado de la sentencia."
            }
            Self::FechaRadicacionTutela => {
                "📋 ¿En qué fecha *radicaste la acción de tutela*?\n\n\
                 Formato DD/MM/AAAA (ejemplo: 15/05/2025). \
                 Es la fecha en que la presentaste ante el juzgado."
            }
            Self::Juzgado => {
                "⚖️ ¿Cuál es el *nombre completo del juzgado* que te concedió la tutela?\n\n\
                 Ejemplo: 'Juzgado Primero Laboral del Circuito de Medellín'."
            }
            Self::Ciudad => {
                "🏙️ ¿En qué *ciudad* está el juzgado que concedió tu tutela?\n\n\
                 Ejemplos: Medellín, Bogotá, Cali."
            }
        }
    }
}

impl fmt::Display for TutelaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TutelaField {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TUTELA_FIELDS
            .into_iter()
            .find(|field| field.as_str() == s.trim())
            .ok_or_else(|| IntakeError::UnknownField(s.to_string()))
    }
}

/// Parse a date given as `DD/MM/AAAA` or `AAAA-MM-DD`.
pub fn parse_colombian_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Tutela facts collected so far.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutelaDraft {
    pub numero_sentencia: Option<String>,
    pub fecha_sentencia: Option<NaiveDate>,
    pub fecha_radicacion_tutela: Option<NaiveDate>,
    pub juzgado: Option<String>,
    pub ciudad: Option<String>,
}

impl TutelaDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the patient's answer for `field`, overwriting any earlier answer.
    pub fn set(&mut self, field: TutelaField, raw: &str) -> Result<(), IntakeError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(IntakeError::EmptyValue(field));
        }

        if field.is_date() {
            let date = parse_colombian_date(value).ok_or_else(|| IntakeError::InvalidDate {
                field,
                value: value.to_string(),
            })?;
            match field {
                TutelaField::FechaSentencia => self.fecha_sentencia = Some(date),
                _ => self.fecha_radicacion_tutela = Some(date),
            }
            return Ok(());
        }

        let value = Some(value.to_string());
        match field {
            TutelaField::NumeroSentencia => self.numero_sentencia = value,
            TutelaField::Juzgado => self.juzgado = value,
            _ => self.ciudad = value,
        }
        Ok(())
    }

    /// Start from a stored record, keeping only its non-empty facts.
    pub fn from_record(record: &TutelaRecord) -> Self {
        let text = |value: &str| Some(value.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            numero_sentencia: text(&record.numero_sentencia),
            fecha_sentencia: record.fecha_sentencia,
            fecha_radicacion_tutela: record.fecha_radicacion_tutela,
            juzgado: text(&record.juzgado),
            ciudad: text(&record.ciudad),
        }
    }

    pub fn has(&self, field: TutelaField) -> bool {
        match field {
            TutelaField::NumeroSentencia => self.numero_sentencia.is_some(),
            TutelaField::FechaSentencia => self.fecha_sentencia.is_some(),
            TutelaField::FechaRadicacionTutela => self.fecha_radicacion_tutela.is_some(),
            TutelaField::Juzgado => self.juzgado.is_some(),
            TutelaField::Ciudad => self.ciudad.is_some(),
        }
    }

    pub fn missing(&self) -> Vec<TutelaField> {
        TUTELA_FIELDS
            .into_iter()
            .filter(|field| !self.has(*field))
            .collect()
    }

    /// Build the immutable record.
    ///
    /// # Errors
    ///
    /// - `IntakeError::MissingTutelaId` if `tutela_id` is blank.
    /// - `IntakeError::Incomplete` listing every field still missing.
    pub fn finish(
        self,
        tutela_id: &str,
        resultado: TutelaOutcome,
    ) -> Result<TutelaRecord, IntakeError> {
        let tutela_id = tutela_id.trim();
        if tutela_id.is_empty() {
            return Err(IntakeError::MissingTutelaId);
        }
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(IntakeError::Incomplete(
                missing.iter().map(TutelaField::as_str).collect(),
            ));
        }

        Ok(TutelaRecord {
            tutela_id: tutela_id.to_string(),
            numero_sentencia: self.numero_sentencia.unwrap_or_default(),
            fecha_sentencia: self.fecha_sentencia,
            fecha_radicacion_tutela: self.fecha_radicacion_tutela,
            juzgado: self.juzgado.unwrap_or_default(),
            ciudad: self.ciudad.unwrap_or_default(),
            resultado,
            created_at: Utc::now(),
        })
    }
}

/// The next field to ask for, or `None` when the draft is complete.
pub fn next_missing_field(draft: &TutelaDraft) -> Option<TutelaField> {
    TUTELA_FIELDS.into_iter().find(|field| !draft.has(*field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_asked_in_order() {
        let mut draft = TutelaDraft::new();
        let mut asked = Vec::new();
        let answers = [
            "T-078",
            "28/05/2025",
            "2025-05-15",
            "Juzgado Primero Laboral del Circuito de Medellín",
            "Medellín",
        ];
        for answer in answers {
            let field = next_missing_field(&draft).unwrap();
            asked.push(field);
            draft.set(field, answer).unwrap();
        }
        assert_eq!(asked, TUTELA_FIELDS.to_vec());
        assert_eq!(next_missing_field(&draft), None);

        let record = draft.finish("tut-1", TutelaOutcome::Favorable).unwrap();
        assert_eq!(record.fecha_sentencia, NaiveDate::from_ymd_opt(2025, 5, 28));
        assert_eq!(
            record.fecha_radicacion_tutela,
            NaiveDate::from_ymd_opt(2025, 5, 15)
        );
        assert!(record.missing_fields().is_empty());
    }

    #[test]
    fn invalid_date_is_rejected_and_not_stored() {
        let mut draft = TutelaDraft::new();
        let err = draft
            .set(TutelaField::FechaSentencia, "31/02/2025")
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidDate { field: TutelaField::FechaSentencia, .. }));
        assert!(!draft.has(TutelaField::FechaSentencia));

        assert!(draft.set(TutelaField::FechaSentencia, "mayo 28").is_err());
    }

    #[test]
    fn blank_answers_are_rejected() {
        let mut draft = TutelaDraft::new();
        assert_eq!(
            draft.set(TutelaField::Juzgado, "   "),
            Err(IntakeError::EmptyValue(TutelaField::Juzgado))
        );
    }

    #[test]
    fn finish_requires_id_and_all_fields() {
        let mut draft = TutelaDraft::new();
        draft.set(TutelaField::NumeroSentencia, "078").unwrap();
        assert_eq!(
            draft.clone().finish(" ", TutelaOutcome::Favorable),
            Err(IntakeError::MissingTutelaId)
        );
        assert_eq!(
            draft.finish("tut-1", TutelaOutcome::Favorable),
            Err(IntakeError::Incomplete(vec![
                "fecha_sentencia",
                "fecha_radicacion_tutela",
                "juzgado",
                "ciudad"
            ]))
        );
    }

    #[test]
    fn draft_from_partial_record_resumes_at_the_gap() {
        let record = TutelaRecord {
            tutela_id: "tut-1".into(),
            numero_sentencia: "078".into(),
            fecha_sentencia: NaiveDate::from_ymd_opt(2025, 5, 28),
            fecha_radicacion_tutela: NaiveDate::from_ymd_opt(2025, 5, 15),
            juzgado: "  ".into(),
            ciudad: String::new(),
            resultado: TutelaOutcome::Favorable,
            created_at: Utc::now(),
        };
        let draft = TutelaDraft::from_record(&record);
        assert_eq!(next_missing_field(&draft), Some(TutelaField::Juzgado));
        assert_eq!(draft.missing(), vec![TutelaField::Juzgado, TutelaField::Ciudad]);
    }

    #[test]
    fn field_names_round_trip() {
        for field in TUTELA_FIELDS {
            assert_eq!(field.as_str().parse::<TutelaField>().unwrap(), field);
            assert!(!field.prompt().is_empty());
        }
        assert!("numero".parse::<TutelaField>().is_err());
    }
}
