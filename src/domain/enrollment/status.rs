//! Enrollment status state machine.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Access granted, subject to the expiry and grace period.
    Active,

    /// Grace period elapsed. An extension brings it back.
    Expired,

    /// Access withdrawn by a refund or a lapsed subscription. Terminal.
    Revoked,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Expired => "expired",
            EnrollmentStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "expired" => Ok(EnrollmentStatus::Expired),
            "revoked" => Ok(EnrollmentStatus::Revoked),
            other => Err(ValidationError::invalid_format(
                "enrollment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for EnrollmentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use EnrollmentStatus::*;
        matches!(
            (self, target),
            (Active, Expired) | (Active, Revoked) | (Expired, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use EnrollmentStatus::*;
        match self {
            Active => vec![Expired, Revoked],
            Expired => vec![Active],
            Revoked => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_expire_or_be_revoked() {
        let status = EnrollmentStatus::Active;
        assert_eq!(
            status.transition_to(EnrollmentStatus::Expired),
            Ok(EnrollmentStatus::Expired)
        );
        assert_eq!(
            status.transition_to(EnrollmentStatus::Revoked),
            Ok(EnrollmentStatus::Revoked)
        );
    }

    #[test]
    fn expired_can_be_resurrected() {
        assert!(EnrollmentStatus::Expired.can_transition_to(&EnrollmentStatus::Active));
    }

    #[test]
    fn expired_cannot_be_revoked_directly() {
        assert!(!EnrollmentStatus::Expired.can_transition_to(&EnrollmentStatus::Revoked));
    }

    #[test]
    fn revoked_is_terminal() {
        assert!(EnrollmentStatus::Revoked.is_terminal());
        assert!(EnrollmentStatus::Revoked
            .transition_to(EnrollmentStatus::Active)
            .is_err());
    }

    #[test]
    fn status_parses_its_own_string_form() {
        for status in [
            EnrollmentStatus::Active,
            EnrollmentStatus::Expired,
            EnrollmentStatus::Revoked,
        ] {
            assert_eq!(status.as_str().parse::<EnrollmentStatus>().unwrap(), status);
        }
        assert!("paused".parse::<EnrollmentStatus>().is_err());
    }
}
