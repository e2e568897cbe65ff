//! Channel callback events.
//!
//! Button presses arrive as opaque callback strings such as `escalate_yes_<session>`. They are
//! parsed once at the boundary into [`ChannelEvent`]; nothing past this point matches on
//! string prefixes.

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelEvent {
    EscalateYes { session_id: String },
    EscalateNo { session_id: String },
    FollowupYes { session_id: String },
    FollowupNo { session_id: String },
    ConsentYes,
    ConsentNo,
    /// The pharmacy delivered none of the prescribed items.
    MedNone { session_id: String },
    /// The pharmacy delivered some items; ask item by item.
    MedSome { session_id: String },
    MedIndividual {
        session_id: String,
        index: usize,
        delivered: bool,
    },
    Unknown(String),
}

const SIMPLE_PREFIXES: [&str; 6] = [
    "escalate_yes_",
    "escalate_no_",
    "followup_yes_",
    "followup_no_",
    "med_none_",
    "med_some_",
];

impl ChannelEvent {
    pub fn parse(callback_data: &str) -> Self {
        let raw = callback_data.trim();
        match raw {
            "consent_yes" => return Self::ConsentYes,
            "consent_no" => return Self::ConsentNo,
            _ => {}
        }

        for (prefix, delivered) in [("med_individual_yes_", true), ("med_individual_no_", false)] {
            if let Some(rest) = raw.strip_prefix(prefix) {
                return match rest.rsplit_once('_') {
                    Some((session_id, index)) if !session_id.is_empty() => match index.parse() {
                        Ok(index) => Self::MedIndividual {
                            session_id: session_id.to_string(),
                            index,
                            delivered,
                        },
                        Err(_) => Self::Unknown(raw.to_string()),
                    },
                    _ => Self::Unknown(raw.to_string()),
                };
            }
        }

        for prefix in SIMPLE_PREFIXES {
            let Some(session_id) = raw.strip_prefix(prefix) else {
                continue;
            };
            if session_id.is_empty() {
                return Self::Unknown(raw.to_string());
            }
            let session_id = session_id.to_string();
            return match prefix {
                "escalate_yes_" => Self::EscalateYes { session_id },
                "escalate_no_" => Self::EscalateNo { session_id },
                "followup_yes_" => Self::FollowupYes { session_id },
                "followup_no_" => Self::FollowupNo { session_id },
                "med_none_" => Self::MedNone { session_id },
                _ => Self::MedSome { session_id },
            };
        }

        Self::Unknown(raw.to_string())
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::EscalateYes { session_id }
            | Self::EscalateNo { session_id }
            | Self::FollowupYes { session_id }
            | Self::FollowupNo { session_id }
            | Self::MedNone { session_id }
            | Self::MedSome { session_id }
            | Self::MedIndividual { session_id, .. } => Some(session_id),
            Self::ConsentYes | Self::ConsentNo | Self::Unknown(_) => None,
        }
    }

    /// The callback string this event was parsed from.
    pub fn callback_id(&self) -> String {
        match self {
            Self::EscalateYes { session_id } => format!("escalate_yes_{session_id}"),
            Self::EscalateNo { session_id } => format!("escalate_no_{session_id}"),
            Self::FollowupYes { session_id } => format!("followup_yes_{session_id}"),
            Self::FollowupNo { session_id } => format!("followup_no_{session_id}"),
            Self::ConsentYes => "consent_yes".to_string(),
            Self::ConsentNo => "consent_no".to_string(),
            Self::MedNone { session_id } => format!("med_none_{session_id}"),
            Self::MedSome { session_id } => format!("med_some_{session_id}"),
            Self::MedIndividual {
                session_id,
                index,
                delivered,
            } => {
                let answer = if *delivered { "yes" } else { "no" };
                format!("med_individual_{answer}_{session_id}_{index}")
            }
            Self::Unknown(raw) => raw.clone(),
        }
    }

    /// Short name for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EscalateYes { .. } => "escalate_yes",
            Self::EscalateNo { .. } => "escalate_no",
            Self::FollowupYes { .. } => "followup_yes",
            Self::FollowupNo { .. } => "followup_no",
            Self::ConsentYes => "consent_yes",
            Self::ConsentNo => "consent_no",
            Self::MedNone { .. } => "med_none",
            Self::MedSome { .. } => "med_some",
            Self::MedIndividual { .. } => "med_individual",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "TL_573226743144_20250702_091518";

    #[test]
    fn parses_escalation_with_underscored_session() {
        let event = ChannelEvent::parse(&format!("escalate_yes_{SESSION}"));
        assert_eq!(
            event,
            ChannelEvent::EscalateYes {
                session_id: SESSION.into()
            }
        );
        assert_eq!(event.session_id(), Some(SESSION));
    }

    #[test]
    fn parses_individual_medication_answers() {
        let event = ChannelEvent::parse(&format!("med_individual_no_{SESSION}_2"));
        assert_eq!(
            event,
            ChannelEvent::MedIndividual {
                session_id: SESSION.into(),
                index: 2,
                delivered: false
            }
        );
    }

    #[test]
    fn callback_id_is_the_inverse_of_parse() {
        for raw in [
            format!("escalate_yes_{SESSION}"),
            format!("escalate_no_{SESSION}"),
            format!("followup_yes_{SESSION}"),
            format!("followup_no_{SESSION}"),
            "consent_yes".to_string(),
            "consent_no".to_string(),
            format!("med_none_{SESSION}"),
            format!("med_some_{SESSION}"),
            format!("med_individual_yes_{SESSION}_0"),
        ] {
            assert_eq!(ChannelEvent::parse(&raw).callback_id(), raw);
        }
    }

    #[test]
    fn malformed_input_is_unknown() {
        for raw in ["", "escalate_yes_", "med_individual_yes_s1_x", "borrar_todo"] {
            assert!(
                matches!(ChannelEvent::parse(raw), ChannelEvent::Unknown(_)),
                "{raw} should be unknown"
            );
        }
    }
}
