//! Escalation rule engine.
//!
//! Pure decision over a patient's risk tier and claim history. Only the last claim by append
//! order is inspected; earlier claims matter only for evidence text later on.
//!
//! Ladders (level, kind of the last claim → next step):
//!
//! | tier       | 1 EPS        | 2 Supersalud       | 3                        | 4              | repeat            |
//! |------------|--------------|--------------------|--------------------------|----------------|-------------------|
//! | simple     | Supersalud 2 | EPS+Supersalud 3   | EPS+Supersalud n+1       |                | EPS+Supersalud    |
//! | priorizado | Supersalud 2 | EPS+Supersalud 3   | tutela 4                 | desacato 5     | desacato from 5   |
//! | vital      | Supersalud 2 | tutela 3           | desacato 4 (from tutela) |                | desacato from 4   |

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{ClaimKind, ClaimRecord, ClaimState, RiskCategory};

/// Why the engine decided not to act.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldCause {
    /// The last claim is resolved.
    Resolved,
    /// The level-3 step was filed today; waiting for its deadline.
    SameDay,
    /// No transition is defined for the last claim. Needs manual review.
    NotContemplated,
}

/// Next action for a patient.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Generate {
        claim_kind: ClaimKind,
        level: u32,
        review_days: u32,
        reason: String,
    },
    GenerateMultiple {
        claim_kinds: Vec<ClaimKind>,
        level: u32,
        review_days: u32,
        reason: String,
    },
    Hold {
        reason: String,
        cause: HoldCause,
    },
    Error {
        reason: String,
    },
}

impl Decision {
    pub fn reason(&self) -> &str {
        match self {
            Self::Generate { reason, .. }
            | Self::GenerateMultiple { reason, .. }
            | Self::Hold { reason, .. }
            | Self::Error { reason } => reason,
        }
    }

    /// Claim kinds to produce, empty for hold/error.
    pub fn claim_kinds(&self) -> Vec<ClaimKind> {
        match self {
            Self::Generate { claim_kind, .. } => vec![*claim_kind],
            Self::GenerateMultiple { claim_kinds, .. } => claim_kinds.clone(),
            Self::Hold { .. } | Self::Error { .. } => Vec::new(),
        }
    }
}

/// Decide the next escalation from the risk tier and the ordered claim history.
///
/// # Arguments
///
/// * `categoria_riesgo` - risk tier, case-insensitive (`simple`, `priorizado`, `vital`)
/// * `reclamaciones` - the patient's claims in append order
///
/// # Returns
///
/// `Decision::Error` for an unrecognised tier, `Decision::Hold` when the last claim is
/// resolved or when no transition applies, otherwise the step to generate.
pub fn decide_next_escalation(categoria_riesgo: &str, reclamaciones: &[ClaimRecord]) -> Decision {
    decide(categoria_riesgo, reclamaciones, None)
}

/// As [`decide_next_escalation`], but also holds when a level-3 step was filed on `today`.
///
/// The guard covers a level-3 EPS/Supersalud claim on any tier and a level-3 tutela on the
/// vital tier. `today` should be the calendar date in Colombia.
pub fn decide_next_escalation_on(
    categoria_riesgo: &str,
    reclamaciones: &[ClaimRecord],
    today: NaiveDate,
) -> Decision {
    decide(categoria_riesgo, reclamaciones, Some(today))
}

fn decide(categoria_riesgo: &str, reclamaciones: &[ClaimRecord], today: Option<NaiveDate>) -> Decision {
    if let Some(last) = reclamaciones.last() {
        if last.estado_reclamacion == ClaimState::Resuelto {
            return Decision::Hold {
                reason: "Caso resuelto".into(),
                cause: HoldCause::Resolved,
            };
        }
    }

    let Some(tier) = RiskCategory::parse(categoria_riesgo) else {
        return Decision::Error {
            reason: format!("Categoría de riesgo no reconocida: '{}'", categoria_riesgo.trim()),
        };
    };

    let Some(last) = reclamaciones.last() else {
        return initial_step(tier);
    };

    if let Some(today) = today {
        if same_day_guard_applies(tier, last, today) {
            return Decision::Hold {
                reason: format!(
                    "Escalamiento nivel 3 {} recién completado hoy ({today}). Esperando plazo.",
                    tier.as_str().to_uppercase()
                ),
                cause: HoldCause::SameDay,
            };
        }
    }

    let level = last.nivel_escalamiento;
    let kind = last.tipo_accion;
    let step = match tier {
        RiskCategory::Simple => simple_step(level, kind),
        RiskCategory::Priorizado => priorizado_step(level, kind),
        RiskCategory::Vital => vital_step(level, kind),
    };

    step.unwrap_or_else(|| {
        tracing::warn!(
            "unhandled escalation state: tier={} level={} kind={}",
            tier,
            level,
            kind
        );
        Decision::Hold {
            reason: format!(
                "{}: situación no contemplada (nivel {level}, {kind})",
                capitalised(tier)
            ),
            cause: HoldCause::NotContemplated,
        }
    })
}

fn initial_step(tier: RiskCategory) -> Decision {
    let review_days = if tier == RiskCategory::Vital { 1 } else { 5 };
    Decision::Generate {
        claim_kind: ClaimKind::ReclamacionEps,
        level: 1,
        review_days,
        reason: format!("Escalamiento inicial EPS - {tier} (nivel 1)"),
    }
}

fn same_day_guard_applies(tier: RiskCategory, last: &ClaimRecord, today: NaiveDate) -> bool {
    if last.nivel_escalamiento != 3 || last.fecha_radicacion != Some(today) {
        return false;
    }
    match last.tipo_accion {
        ClaimKind::ReclamacionEps | ClaimKind::ReclamacionSupersalud => true,
        ClaimKind::Tutela => tier == RiskCategory::Vital,
        ClaimKind::Desacato => false,
    }
}

fn generate(kind: ClaimKind, level: u32, review_days: u32, reason: String) -> Option<Decision> {
    Some(Decision::Generate {
        claim_kind: kind,
        level,
        review_days,
        reason,
    })
}

fn generate_both(level: u32, review_days: u32, reason: String) -> Option<Decision> {
    Some(Decision::GenerateMultiple {
        claim_kinds: vec![ClaimKind::ReclamacionEps, ClaimKind::ReclamacionSupersalud],
        level,
        review_days,
        reason,
    })
}

fn is_eps_or_supersalud(kind: ClaimKind) -> bool {
    matches!(kind, ClaimKind::ReclamacionEps | ClaimKind::ReclamacionSupersalud)
}

fn simple_step(level: u32, kind: ClaimKind) -> Option<Decision> {
    use ClaimKind::*;
    match (level, kind) {
        (1, ReclamacionEps) => generate(
            ReclamacionSupersalud,
            2,
            20,
            "Simple: EPS sin respuesta → Supersalud nivel 2".into(),
        ),
        (2, ReclamacionSupersalud) => generate_both(
            3,
            20,
            "Simple: Supersalud sin respuesta → EPS+Supersalud nivel 3".into(),
        ),
        (n, k) if n >= 3 && is_eps_or_supersalud(k) => generate_both(
            n + 1,
            20,
            format!("Simple: EPS+Supersalud sin respuesta → EPS+Supersalud nivel {}", n + 1),
        ),
        _ => None,
    }
}

fn priorizado_step(level: u32, kind: ClaimKind) -> Option<Decision> {
    use ClaimKind::*;
    match (level, kind) {
        (1, ReclamacionEps) => generate(
            ReclamacionSupersalud,
            2,
            20,
            "Priorizado: EPS sin respuesta → Supersalud nivel 2".into(),
        ),
        (2, ReclamacionSupersalud) => generate_both(
            3,
            20,
            "Priorizado: Supersalud sin respuesta → EPS+Supersalud nivel 3".into(),
        ),
        (3, k) if is_eps_or_supersalud(k) => generate(
            Tutela,
            4,
            15,
            "Priorizado: EPS+Supersalud sin respuesta → Tutela nivel 4".into(),
        ),
        (4, Tutela) => generate(
            Desacato,
            5,
            10,
            "Priorizado: Tutela incumplida → Desacato nivel 5".into(),
        ),
        (n, Desacato) if n >= 5 => generate(
            Desacato,
            n + 1,
            10,
            format!("Priorizado: Desacato previo incumplido → Desacato nivel {}", n + 1),
        ),
        _ => None,
    }
}

fn vital_step(level: u32, kind: ClaimKind) -> Option<Decision> {
    use ClaimKind::*;
    match (level, kind) {
        (1, ReclamacionEps) => generate(
            ReclamacionSupersalud,
            2,
            1,
            "Vital: EPS sin respuesta → Supersalud nivel 2".into(),
        ),
        (2, ReclamacionSupersalud) => generate(
            Tutela,
            3,
            15,
            "Vital: Supersalud sin respuesta → Tutela nivel 3".into(),
        ),
        (3, Tutela) => generate(
            Desacato,
            4,
            5,
            "Vital: Tutela incumplida → Desacato nivel 4".into(),
        ),
        (n, Desacato) if n >= 4 => generate(
            Desacato,
            n + 1,
            5,
            format!("Vital: Desacato previo incumplido → Desacato nivel {}", n + 1),
        ),
        _ => None,
    }
}

fn capitalised(tier: RiskCategory) -> &'static str {
    match tier {
        RiskCategory::Simple => "Simple",
        RiskCategory::Priorizado => "Priorizado",
        RiskCategory::Vital => "Vital",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(level: u32, kind: ClaimKind) -> ClaimRecord {
        ClaimRecord::pending(kind, level, 0, "", "", "s1")
    }

    fn assert_generate(decision: Decision, kind: ClaimKind, level: u32, days: u32) {
        match decision {
            Decision::Generate {
                claim_kind,
                level: l,
                review_days,
                ..
            } => {
                assert_eq!(claim_kind, kind);
                assert_eq!(l, level);
                assert_eq!(review_days, days);
            }
            other => panic!("expected generate, got {other:?}"),
        }
    }

    #[test]
    fn empty_history_starts_with_eps() {
        for tier in ["simple", "priorizado", "vital", "Vital", " SIMPLE "] {
            let expected_days = if tier.trim().eq_ignore_ascii_case("vital") { 1 } else { 5 };
            assert_generate(
                decide_next_escalation(tier, &[]),
                ClaimKind::ReclamacionEps,
                1,
                expected_days,
            );
        }
    }

    #[test]
    fn unknown_tier_is_an_error() {
        assert!(matches!(
            decide_next_escalation("urgente", &[]),
            Decision::Error { .. }
        ));
    }

    #[test]
    fn resolved_is_terminal_for_every_tier() {
        let mut last = claim(2, ClaimKind::ReclamacionSupersalud);
        last.estado_reclamacion = ClaimState::Resuelto;
        let history = vec![claim(1, ClaimKind::ReclamacionEps), last];
        for tier in ["simple", "priorizado", "vital"] {
            assert!(matches!(
                decide_next_escalation(tier, &history),
                Decision::Hold {
                    cause: HoldCause::Resolved,
                    ..
                }
            ));
        }
    }

    #[test]
    fn simple_ladder() {
        assert_generate(
            decide_next_escalation("simple", &[claim(1, ClaimKind::ReclamacionEps)]),
            ClaimKind::ReclamacionSupersalud,
            2,
            20,
        );

        match decide_next_escalation("simple", &[claim(2, ClaimKind::ReclamacionSupersalud)]) {
            Decision::GenerateMultiple {
                claim_kinds,
                level,
                review_days,
                ..
            } => {
                assert_eq!(
                    claim_kinds,
                    vec![ClaimKind::ReclamacionEps, ClaimKind::ReclamacionSupersalud]
                );
                assert_eq!(level, 3);
                assert_eq!(review_days, 20);
            }
            other => panic!("expected generate_multiple, got {other:?}"),
        }
    }

    #[test]
    fn simple_repeats_eps_and_supersalud_without_tutela() {
        for level in [3, 4, 7] {
            match decide_next_escalation("simple", &[claim(level, ClaimKind::ReclamacionSupersalud)]) {
                Decision::GenerateMultiple { level: l, .. } => assert_eq!(l, level + 1),
                other => panic!("expected generate_multiple, got {other:?}"),
            }
        }
        assert!(matches!(
            decide_next_escalation("simple", &[claim(4, ClaimKind::Tutela)]),
            Decision::Hold {
                cause: HoldCause::NotContemplated,
                ..
            }
        ));
    }

    #[test]
    fn priorizado_ladder() {
        assert_generate(
            decide_next_escalation("priorizado", &[claim(3, ClaimKind::ReclamacionEps)]),
            ClaimKind::Tutela,
            4,
            15,
        );
        assert_generate(
            decide_next_escalation("priorizado", &[claim(3, ClaimKind::ReclamacionSupersalud)]),
            ClaimKind::Tutela,
            4,
            15,
        );
        assert_generate(
            decide_next_escalation("priorizado", &[claim(4, ClaimKind::Tutela)]),
            ClaimKind::Desacato,
            5,
            10,
        );
        assert_generate(
            decide_next_escalation("priorizado", &[claim(6, ClaimKind::Desacato)]),
            ClaimKind::Desacato,
            7,
            10,
        );
    }

    #[test]
    fn vital_ladder() {
        assert_generate(
            decide_next_escalation("vital", &[claim(1, ClaimKind::ReclamacionEps)]),
            ClaimKind::ReclamacionSupersalud,
            2,
            1,
        );
        assert_generate(
            decide_next_escalation("vital", &[claim(2, ClaimKind::ReclamacionSupersalud)]),
            ClaimKind::Tutela,
            3,
            15,
        );
        assert_generate(
            decide_next_escalation("vital", &[claim(3, ClaimKind::Tutela)]),
            ClaimKind::Desacato,
            4,
            5,
        );
        assert_generate(
            decide_next_escalation("vital", &[claim(4, ClaimKind::Desacato)]),
            ClaimKind::Desacato,
            5,
            5,
        );
    }

    #[test]
    fn only_the_last_claim_is_inspected() {
        let history = vec![
            claim(1, ClaimKind::ReclamacionEps),
            claim(2, ClaimKind::ReclamacionSupersalud),
            claim(3, ClaimKind::Tutela),
            claim(1, ClaimKind::ReclamacionEps),
        ];
        assert_generate(
            decide_next_escalation("vital", &history),
            ClaimKind::ReclamacionSupersalud,
            2,
            1,
        );
    }

    #[test]
    fn unmatched_state_holds_for_review() {
        let decision = decide_next_escalation("vital", &[claim(2, ClaimKind::ReclamacionEps)]);
        match decision {
            Decision::Hold { reason, cause } => {
                assert_eq!(cause, HoldCause::NotContemplated);
                assert!(reason.contains("no contemplada"));
            }
            other => panic!("expected hold, got {other:?}"),
        }
    }

    #[test]
    fn same_day_guard_holds_level_three_filed_today() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let mut last = claim(3, ClaimKind::ReclamacionSupersalud);
        last.fecha_radicacion = Some(today);

        assert!(matches!(
            decide_next_escalation_on("priorizado", std::slice::from_ref(&last), today),
            Decision::Hold {
                cause: HoldCause::SameDay,
                ..
            }
        ));

        let tomorrow = today.succ_opt().unwrap();
        assert_generate(
            decide_next_escalation_on("priorizado", std::slice::from_ref(&last), tomorrow),
            ClaimKind::Tutela,
            4,
            15,
        );

        // The pure function never applies the guard.
        assert_generate(
            decide_next_escalation("priorizado", &[last]),
            ClaimKind::Tutela,
            4,
            15,
        );
    }

    #[test]
    fn same_day_guard_covers_vital_tutela() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let mut last = claim(3, ClaimKind::Tutela);
        last.fecha_radicacion = Some(today);
        assert!(matches!(
            decide_next_escalation_on("vital", &[last], today),
            Decision::Hold {
                cause: HoldCause::SameDay,
                ..
            }
        ));
    }

    #[test]
    fn decision_serializes_with_action_tag() {
        let json = serde_json::to_value(decide_next_escalation("simple", &[])).unwrap();
        assert_eq!(json["action"], "generate");
        assert_eq!(json["claim_kind"], "reclamacion_eps");
    }
}
