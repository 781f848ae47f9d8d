use std::path::PathBuf;
use thiserror::Error;

use crate::fasta::GenomeError;
use crate::io::FormatError;
use crate::pool::{PoolError, WorkerFault};
use crate::store::StoreError;

/// Errors that stop a validation run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Alignment index error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Genome(#[from] GenomeError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} scaffold task(s) failed: {}", .0.len(), summarize_faults(.0))]
    WorkerFaults(Vec<WorkerFault>),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn argument<S: Into<String>>(message: S) -> Self {
        PipelineError::Argument(message.into())
    }

    /// Faults captured from worker tasks, if that is what this error holds
    pub fn faults(&self) -> &[WorkerFault] {
        match self {
            PipelineError::WorkerFaults(faults) => faults,
            _ => &[],
        }
    }
}

fn summarize_faults(faults: &[WorkerFault]) -> String {
    const SHOWN: usize = 3;
    let mut summary = faults
        .iter()
        .take(SHOWN)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if faults.len() > SHOWN {
        summary.push_str(&format!("; and {} more", faults.len() - SHOWN));
    }
    summary
}
