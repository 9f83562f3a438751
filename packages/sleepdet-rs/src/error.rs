use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Ambiguous cross-channel merge: {0}")]
    MergeAmbiguity(String),

    #[error("Unknown detection method: {0}")]
    UnknownMethod(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse input document: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl DetectionError {
    /// Errors that abort a whole run before any unit is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnknownMethod(_) | Self::IoError(_) | Self::ParseError(_)
        )
    }

    /// Errors that only cost the unit they occurred in.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::InsufficientData(_) | Self::FilterDesign(_))
    }

    /// Short machine-readable tag used in skip diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InsufficientData(_) => "insufficient_data",
            Self::FilterDesign(_) => "filter_design",
            Self::MergeAmbiguity(_) => "merge_ambiguity",
            Self::UnknownMethod(_) => "unknown_method",
            Self::IoError(_) => "io",
            Self::ParseError(_) => "parse",
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DetectionError::Configuration("x".into()).is_fatal());
        assert!(DetectionError::UnknownMethod("x".into()).is_fatal());
        assert!(!DetectionError::InsufficientData("x".into()).is_fatal());
        assert!(DetectionError::InsufficientData("x".into()).is_skippable());
        assert!(DetectionError::FilterDesign("x".into()).is_skippable());
        assert!(!DetectionError::MergeAmbiguity("x".into()).is_skippable());
    }

    #[test]
    fn test_error_display() {
        let err = DetectionError::FilterDesign("highcut 130 Hz >= Nyquist 128 Hz".into());
        assert_eq!(
            err.to_string(),
            "Filter design failed: highcut 130 Hz >= Nyquist 128 Hz"
        );
        assert_eq!(err.kind(), "filter_design");
    }
}
