//! Validation run orchestration
//!
//! Build the alignment index, open both sinks, validate one scaffold per
//! pool task, then close the sinks and remove the index. Worker faults are
//! collected and reported once every task has finished.

use anyhow::Context;
use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};
use crate::fasta::{open_genome, SequenceStore};
use crate::io::AlignmentFormat;
use crate::output::{OutputPaths, OutputRouter, SinkCounts};
use crate::pool::{ValidationWorkerPool, DEFAULT_MAX_CONCURRENCY};
use crate::store::AlignmentIndex;
use crate::validate::{TranscriptValidator, ValidationOptions};

pub const DEFAULT_OUT_PREFIX: &str = "pasa_lite";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub genome: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub cpu: usize,
    pub out_prefix: String,
    pub validation: ValidationOptions,
}

impl RunOptions {
    pub fn new<P: Into<PathBuf>>(genome: P, inputs: Vec<PathBuf>) -> Self {
        Self {
            genome: genome.into(),
            inputs,
            cpu: DEFAULT_MAX_CONCURRENCY,
            out_prefix: DEFAULT_OUT_PREFIX.to_string(),
            validation: ValidationOptions::default(),
        }
    }

    /// Reject option sets that cannot start a run
    pub fn check(&self) -> PipelineResult<()> {
        if self.genome.as_os_str().is_empty() {
            return Err(PipelineError::argument("a genome FASTA is required"));
        }
        if self.inputs.is_empty() {
            return Err(PipelineError::argument("at least one alignment file is required"));
        }
        if self.cpu == 0 {
            return Err(PipelineError::argument("CPU must be at least 1"));
        }
        if self.out_prefix.is_empty() {
            return Err(PipelineError::argument("output prefix must not be empty"));
        }
        for input in &self.inputs {
            if AlignmentFormat::from_path(input).is_none() {
                return Err(PipelineError::argument(format!(
                    "unrecognized alignment file extension: {} (expected .gtf or .gff3)",
                    input.display()
                )));
            }
            if !input.exists() {
                return Err(PipelineError::argument(format!(
                    "alignment file not found: {}",
                    input.display()
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.validation.min_per_id) {
            return Err(PipelineError::argument(format!(
                "min_per_id must be within 0-100, got {}",
                self.validation.min_per_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scaffolds: usize,
    pub alignments: usize,
    pub counts: SinkCounts,
    pub outputs: OutputPaths,
}

/// Validate every input alignment against the genome at `options.genome`
pub fn run(options: &RunOptions) -> PipelineResult<RunSummary> {
    options.check()?;
    if !options.genome.exists() {
        return Err(PipelineError::argument(format!(
            "genome file not found: {}",
            options.genome.display()
        )));
    }

    log::info!("Opening genome {}", options.genome.display());
    let genome = open_genome(&options.genome)?;
    run_with_store(options, genome.as_ref())
}

/// Same as [`run`] with an already opened sequence store
pub fn run_with_store(options: &RunOptions, genome: &dyn SequenceStore) -> PipelineResult<RunSummary> {
    options.check()?;

    log::info!("Indexing {} alignment file(s)", options.inputs.len());
    let index = AlignmentIndex::build(&options.inputs)?;
    log::info!(
        "Indexed {} alignments on {} scaffolds",
        index.len(),
        index.groups().len()
    );

    let outcome = validate_partitions(&index, genome, options);

    if let Err(e) = index.close() {
        log::warn!("Failed to remove alignment index: {}", e);
    }
    outcome
}

fn validate_partitions(
    index: &AlignmentIndex,
    genome: &dyn SequenceStore,
    options: &RunOptions,
) -> PipelineResult<RunSummary> {
    let outputs = OutputPaths::from_prefix(&options.out_prefix);
    let router = OutputRouter::create(&outputs).map_err(|source| PipelineError::Output {
        path: outputs.valid.clone(),
        source,
    })?;
    let pool = ValidationWorkerPool::new(options.cpu)?;
    let validator = TranscriptValidator::new(options.validation.clone());

    log::info!(
        "Validating {} scaffolds with {} worker(s)",
        index.groups().len(),
        pool.max_concurrency()
    );

    let ((), faults) = pool.run(|submitter| {
        for (scaffold, accessions) in index.groups().iter() {
            let router = &router;
            let validator = &validator;
            submitter.submit(scaffold, move || {
                validate_scaffold(scaffold, accessions, index, genome, validator, router)
            });
        }
    });

    let (_, _, counts) = router.close().map_err(|source| PipelineError::Output {
        path: outputs.valid.clone(),
        source,
    })?;
    log::info!(
        "{} valid and {} invalid alignments written",
        counts.valid,
        counts.invalid
    );

    if !faults.is_empty() {
        return Err(PipelineError::WorkerFaults(faults));
    }

    Ok(RunSummary {
        scaffolds: index.groups().len(),
        alignments: index.len(),
        counts,
        outputs,
    })
}

/// One pool task: fetch the scaffold once, then validate and route each of
/// its alignments in file-scan order
fn validate_scaffold<W: std::io::Write + Send>(
    scaffold: &str,
    accessions: &[String],
    index: &AlignmentIndex,
    genome: &dyn SequenceStore,
    validator: &TranscriptValidator,
    router: &OutputRouter<W>,
) -> anyhow::Result<()> {
    let mut handle = index
        .open()
        .with_context(|| format!("opening index reader for {}", scaffold))?;
    let sequence = genome
        .sequence(scaffold)
        .with_context(|| format!("fetching sequence for {}", scaffold))?;

    log::debug!(
        "{}: validating {} alignments against {} bp",
        scaffold,
        accessions.len(),
        sequence.len()
    );

    let mut invalid = 0usize;
    for accession in accessions {
        let mut record = handle
            .get(accession)
            .with_context(|| format!("reading alignment {}", accession))?;
        if !validator.validate(&mut record, &sequence).is_valid() {
            invalid += 1;
        }
        router
            .write(&record)
            .with_context(|| format!("writing alignment {}", accession))?;
    }

    log::debug!(
        "{}: {} valid, {} invalid",
        scaffold,
        accessions.len() - invalid,
        invalid
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn options_with(inputs: Vec<PathBuf>) -> RunOptions {
        RunOptions::new("genome.fa", inputs)
    }

    #[test]
    fn test_defaults() {
        let options = options_with(vec![]);
        assert_eq!(options.cpu, 2);
        assert_eq!(options.out_prefix, "pasa_lite");
        assert_eq!(options.validation.min_per_id, 95.0);
    }

    #[test]
    fn test_check_rejects_missing_inputs() {
        assert!(matches!(
            options_with(vec![]).check(),
            Err(PipelineError::Argument(_))
        ));
    }

    #[test]
    fn test_check_rejects_zero_cpu() {
        let file = tempfile::Builder::new().suffix(".gtf").tempfile().unwrap();
        let mut options = options_with(vec![file.path().to_path_buf()]);
        assert!(options.check().is_ok());
        options.cpu = 0;
        let err = options.check().unwrap_err();
        assert!(err.to_string().contains("CPU"));
    }

    #[test]
    fn test_check_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".bam").tempfile().unwrap();
        let err = options_with(vec![file.path().to_path_buf()]).check().unwrap_err();
        assert!(err.to_string().contains("unrecognized alignment file extension"));
    }

    #[test]
    fn test_check_rejects_out_of_range_identity() {
        let file = tempfile::Builder::new().suffix(".gff3").tempfile().unwrap();
        let mut options = options_with(vec![file.path().to_path_buf()]);
        options.validation.min_per_id = 101.0;
        assert!(options.check().is_err());
    }

    #[test]
    fn test_missing_genome_is_argument_error() {
        let file = tempfile::Builder::new().suffix(".gtf").tempfile().unwrap();
        let options = RunOptions::new(
            Path::new("/nonexistent/genome.fa"),
            vec![file.path().to_path_buf()],
        );
        assert!(matches!(run(&options), Err(PipelineError::Argument(_))));
    }
}
