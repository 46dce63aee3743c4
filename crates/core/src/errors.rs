use thiserror::Error;

use crate::ml::regression::RegressionError;

/// Violations of the engine's own invariants: malformed vectors, impossible
/// state. Schema validation of incoming payloads is the API layer's job and
/// is not repeated here.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    Model(#[from] RegressionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("external service failure: {0}")]
    ExternalService(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<RegressionError> for ApplicationError {
    fn from(value: RegressionError) -> Self {
        Self::Domain(DomainError::Model(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError};
    use crate::ml::regression::RegressionError;

    #[test]
    fn regression_errors_lift_into_the_domain_tier() {
        let error: ApplicationError =
            RegressionError::FeatureLengthMismatch { expected: 29, actual: 5 }.into();
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Model(
                RegressionError::FeatureLengthMismatch { expected: 29, actual: 5 }
            ))
        ));
    }

    #[test]
    fn error_messages_name_the_failure() {
        let error = ApplicationError::ExternalService("model endpoint timed out".to_owned());
        assert_eq!(error.to_string(), "external service failure: model endpoint timed out");
    }
}
