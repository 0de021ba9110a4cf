//! Error taxonomy for the ingestion pipeline.

use thiserror::Error;

/// Returned by component constructors when supplied configuration is invalid.
///
/// Carries every violation found, not just the first, so a single invocation
/// can report every bad flag at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration: {}", .0.join("; "))]
pub struct ConfigError(pub Vec<String>);

impl ConfigError {
    pub fn single(msg: impl Into<String>) -> Self {
        Self(vec![msg.into()])
    }

    pub fn merge(mut errs: Vec<ConfigError>) -> Option<ConfigError> {
        if errs.is_empty() {
            return None;
        }
        let mut all = Vec::new();
        for e in errs.drain(..) {
            all.extend(e.0);
        }
        Some(ConfigError(all))
    }
}

/// Reader failures surfaced to the driver's caller.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("input read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures writing to an external sink (CAR, root/pin, statistics).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink '{sink}' failed: {source}")]
    Io {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Propagated from a chunker's emit callback to short-circuit the chain.
#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("chunker rejected emitted boundary: {0}")]
    Rejected(String),
}

/// Top-level error returned from the pipeline driver.
#[derive(Error, Debug)]
pub enum DaggerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Chunker(#[from] ChunkerError),
    #[error("sanity violation: {0}")]
    Sanity(String),
}
