use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(FilerRole {
    Advocate => "advocate",
    Party => "party",
    Government => "government",
});

str_enum!(DocumentKind {
    Plaint => "plaint",
    WrittenStatement => "written_statement",
    Appeal => "appeal",
    BailApplication => "bail_application",
    Affidavit => "affidavit",
    Other => "other",
});

str_enum!(FilingFormat {
    Pdf => "pdf",
    Jpeg => "jpeg",
    Png => "png",
    Tiff => "tiff",
});

str_enum!(FilingState {
    Ingested => "ingested",
    Scrutinizing => "scrutinizing",
    Defective => "defective",
    Remediated => "remediated",
    IntegrityPending => "integrity_pending",
    IntegrityRecording => "integrity_recording",
    AuditPending => "audit_pending",
    Auditing => "auditing",
    BriefReady => "brief_ready",
    ManualReview => "manual_review",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl FilingState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Remediated
                | Self::BriefReady
                | Self::ManualReview
                | Self::Failed
                | Self::Cancelled
        )
    }
}

str_enum!(Severity {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(Relevance {
    Relevant => "relevant",
    NotRelevant => "not_relevant",
    Unclear => "unclear",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn filing_state_round_trips() {
        for s in [
            "ingested",
            "scrutinizing",
            "defective",
            "remediated",
            "integrity_pending",
            "integrity_recording",
            "audit_pending",
            "auditing",
            "brief_ready",
            "manual_review",
            "failed",
            "cancelled",
        ] {
            let state = FilingState::from_str(s).unwrap();
            assert_eq!(state.as_str(), s);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(FilingState::BriefReady.is_terminal());
        assert!(FilingState::Remediated.is_terminal());
        assert!(FilingState::ManualReview.is_terminal());
        assert!(FilingState::Failed.is_terminal());
        assert!(FilingState::Cancelled.is_terminal());
        assert!(!FilingState::Auditing.is_terminal());
        assert!(!FilingState::Ingested.is_terminal());
    }

    #[test]
    fn unknown_value_is_rejected() {
        let err = FilerRole::from_str("clerk").unwrap_err();
        assert!(err.to_string().contains("FilerRole"));
    }
}
