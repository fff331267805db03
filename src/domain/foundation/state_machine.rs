//! State machine trait for status enums.
//!
//! Enrollment, payment and subscription statuses all move through a fixed
//! set of transitions; this trait gives them one way to validate a move.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// ```ignore
/// impl StateMachine for EnrollmentStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Active, Expired) | (Expired, Active) | (Active, Revoked))
///     }
///     // ...
/// }
///
/// let next = enrollment.status.transition_to(EnrollmentStatus::Revoked)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
