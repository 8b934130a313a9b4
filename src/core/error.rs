use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Fewer valid samples than a fit needs
    #[error("Insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Every sample shares the same x, so the slope is undefined
    #[error("Degenerate input: x values have zero variance, slope is undefined")]
    DegenerateInput,

    /// A flat line cannot be solved for x
    #[error("Undefined inverse: slope is zero, x cannot be recovered from y")]
    UndefinedInverse,

    #[error("History store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl CalibrationError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest(reason.into())
    }

    /// Whether the failure comes from the regression math rather than the
    /// caller or the store.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::DegenerateInput | Self::UndefinedInverse
        )
    }
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
