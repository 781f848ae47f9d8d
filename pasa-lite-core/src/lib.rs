//! pasa-lite Core Library
//!
//! Alignment parsers, genome access, the alignment index, splice-aware
//! validation, the per-scaffold worker pool and overlap clustering.

pub mod types;
pub mod io;
pub mod fasta;
pub mod partition;
pub mod store;
pub mod validate;
pub mod output;
pub mod pool;
pub mod cluster;
pub mod error;
pub mod pipeline;

// Re-export commonly used types and functions
pub use types::{AlignmentRecord, GenomicPos, Orientation, Segment};
pub use io::{read_alignments, AlignmentFormat, FormatError};
pub use fasta::{open_genome, FastaIndex, GenomeError, InMemoryGenome, SequenceStore};
pub use partition::ScaffoldGroups;
pub use store::{AlignmentIndex, IndexHandle, StoreError};
pub use validate::{TranscriptValidator, ValidationOptions, Verdict};
pub use output::{OutputPaths, OutputRouter, SinkCounts};
pub use pool::{ValidationWorkerPool, WorkerFault};
pub use cluster::{cluster_by_scaffold, Cluster};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{run, run_with_store, RunOptions, RunSummary};

/// Version information for the pasa-lite core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
