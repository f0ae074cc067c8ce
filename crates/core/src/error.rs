use crate::domain::records::Destination;
use thiserror::Error;

/// The quote capability failed or returned nothing usable.
#[derive(Debug, Clone, Error)]
#[error("sensing failed for {ticker}: {detail}")]
pub struct SensingError {
    pub ticker: String,
    pub detail: String,
}

/// The analysis capability failed or returned nothing usable.
#[derive(Debug, Clone, Error)]
#[error("synthesis failed for {ticker}: {detail}")]
pub struct SynthesisError {
    pub ticker: String,
    pub detail: String,
}

#[derive(Debug, Clone, Error)]
#[error("persistence to {destination} failed for {ticker}: {detail}")]
pub struct PersistenceError {
    pub destination: Destination,
    pub ticker: String,
    pub detail: String,
}

#[derive(Debug, Clone, Error)]
#[error("embedding failed for legend {legend_id} ({ticker}): {detail}")]
pub struct EmbeddingError {
    pub legend_id: uuid::Uuid,
    pub ticker: String,
    pub detail: String,
}

#[derive(Debug, Clone, Error)]
#[error("revaluation failed for position {position_id} ({ticker}): {detail}")]
pub struct RevaluationError {
    pub position_id: uuid::Uuid,
    pub ticker: String,
    pub detail: String,
}

#[derive(Debug, Clone, Error)]
#[error("verification failed for prediction {prediction_id} ({ticker}): {detail}")]
pub struct VerificationError {
    pub prediction_id: uuid::Uuid,
    pub ticker: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{variable} is required")]
pub struct ConfigurationError {
    pub variable: &'static str,
}

/// Flattens an error chain into one line (`outer: inner: root`).
pub(crate) fn detail(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
