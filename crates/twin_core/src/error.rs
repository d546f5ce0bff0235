/// Errors raised by the twin data model and registry.
///
/// All of them are ordinary, recoverable outcomes for the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwinError {
    #[error("Digital twin not found: {0}")]
    TwinNotFound(String),

    #[error("Digital twin already exists: {0}")]
    TwinAlreadyExists(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Feature already exists: {0}")]
    FeatureAlreadyExists(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl TwinError {
    /// True for the "does not exist" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TwinNotFound(_) | Self::FeatureNotFound(_) | Self::PropertyNotFound(_)
        )
    }

    /// True for identity conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TwinAlreadyExists(_) | Self::FeatureAlreadyExists(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TwinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TwinError::TwinNotFound("t1".into()).is_not_found());
        assert!(TwinError::PropertyNotFound("value".into()).is_not_found());
        assert!(!TwinError::TwinNotFound("t1".into()).is_conflict());

        assert!(TwinError::FeatureAlreadyExists("temp".into()).is_conflict());
        assert!(!TwinError::InvalidValue("x".into()).is_not_found());
        assert!(!TwinError::InvalidValue("x".into()).is_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = TwinError::TwinNotFound("sensor-1".to_string());
        assert_eq!(err.to_string(), "Digital twin not found: sensor-1");
    }
}
