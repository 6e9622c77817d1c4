use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("shape mismatch: expected {expected_trials}x{expected_years}, got {trials}x{years}")]
    ShapeMismatch {
        expected_trials: usize,
        expected_years: usize,
        trials: usize,
        years: usize,
    },

    #[error("empty data provided for {context}")]
    EmptyData { context: String },

    #[error("invalid price {price} in year {year}")]
    InvalidPrice { year: i32, price: f64 },
}

impl ProjectionError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn empty(context: impl Into<String>) -> Self {
        Self::EmptyData {
            context: context.into(),
        }
    }
}
