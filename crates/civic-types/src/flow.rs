use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a session is in the registration flow.
///
/// `unregistered -> awaiting_verification -> profile -> id_card`. The
/// unregistered state has no session at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    AwaitingVerification,
    Profile,
    IdCard,
}

/// Things that move a session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    EmailVerified,
    CitizenRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("cannot apply {event:?} while in stage {stage}")]
    InvalidTransition { stage: FlowStage, event: FlowEvent },

    #[error("this step requires stage {expected}, session is in stage {actual}")]
    WrongStage { expected: FlowStage, actual: FlowStage },

    #[error("unknown flow stage '{0}'")]
    UnknownStage(String),
}

impl FlowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingVerification => "awaiting_verification",
            Self::Profile => "profile",
            Self::IdCard => "id_card",
        }
    }

    pub fn is_verified(self) -> bool {
        !matches!(self, Self::AwaitingVerification)
    }

    /// Stage a verified user lands on after logging in.
    pub fn after_login(has_citizen: bool) -> Self {
        if has_citizen { Self::IdCard } else { Self::Profile }
    }

    pub fn advance(self, event: FlowEvent) -> Result<Self, FlowError> {
        match (self, event) {
            (Self::AwaitingVerification, FlowEvent::EmailVerified) => Ok(Self::Profile),
            (Self::Profile, FlowEvent::CitizenRegistered) => Ok(Self::IdCard),
            (stage, event) => Err(FlowError::InvalidTransition { stage, event }),
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStage {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_verification" => Ok(Self::AwaitingVerification),
            "profile" => Ok(Self::Profile),
            "id_card" => Ok(Self::IdCard),
            other => Err(FlowError::UnknownStage(other.to_string())),
        }
    }
}

/// Minimal per-flow state, persisted server side and keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub email: String,
    pub stage: FlowStage,
    /// After this instant the session no longer resolves.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn verified(&self) -> bool {
        self.stage.is_verified()
    }

    pub fn require(&self, expected: FlowStage) -> Result<(), FlowError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(FlowError::WrongStage {
                expected,
                actual: self.stage,
            })
        }
    }
}
