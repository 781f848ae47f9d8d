use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

mod config;
mod error;

use config::Config;
use error::{print_error_and_exit, CliError, CliResult};
use pasa_lite_core::{RunOptions, RunSummary};

#[derive(Parser)]
#[command(name = "pasa_lite")]
#[command(about = "Validate spliced transcript alignments against a reference genome")]
#[command(version)]
#[command(long_about = "
pasa_lite checks genome-aligned transcripts (GTF/GFF3) for canonical splice sites,
strand consistency, unspliced alignments and percent identity, and writes each
alignment to either <prefix>.valid_alignments.gtf or <prefix>.invalid_alignments.gtf.

Examples:
  pasa_lite --genome genome.fa blat.gff3 gmap.gff3
  pasa_lite --genome genome.fa.gz --CPU 8 --require_consensus_splicesites aligned.gtf
  pasa_lite --print_config > pasa_lite.toml
")]
pub struct Cli {
    /// Reference genome (FASTA, optionally gzip-compressed)
    #[arg(long, required_unless_present = "print_config")]
    pub genome: Option<PathBuf>,

    /// Alignment files (.gtf or .gff3, optionally .gz)
    #[arg(required_unless_present = "print_config")]
    pub inputs: Vec<PathBuf>,

    /// Number of scaffolds validated concurrently
    #[arg(long = "CPU")]
    pub cpu: Option<usize>,

    /// Take the aligner's strand as the transcribed strand and skip splice-site checks
    #[arg(long = "transcribed_is_aligned_orient")]
    pub transcribed_is_aligned_orient: bool,

    /// Reject single-segment alignments
    #[arg(long = "discard_unspliced_transcripts")]
    pub discard_unspliced_transcripts: bool,

    /// Prefix of the output files
    #[arg(long = "out_prefix")]
    pub out_prefix: Option<String>,

    /// Minimum average percent identity
    #[arg(long = "min_per_id")]
    pub min_per_id: Option<f64>,

    /// Reject multi-exon alignments unless every intron has consensus splice sites
    #[arg(long = "require_consensus_splicesites")]
    pub require_consensus_splicesites: bool,

    /// Configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long = "print_config")]
    pub print_config: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    pub quiet: bool,
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    if quiet {
        std::env::set_var("RUST_LOG", "error");
    } else {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();

    Ok(())
}

/// Config values overridden by whatever was given on the command line.
/// Flags can only switch a policy on.
fn build_run_options(cli: &Cli, config: &Config) -> RunOptions {
    let mut validation = config.validation.to_options();
    validation.transcribed_is_aligned_orient |= cli.transcribed_is_aligned_orient;
    validation.discard_unspliced |= cli.discard_unspliced_transcripts;
    validation.require_consensus_splice_sites |= cli.require_consensus_splicesites;
    if let Some(min_per_id) = cli.min_per_id {
        validation.min_per_id = min_per_id;
    }

    RunOptions {
        genome: cli.genome.clone().unwrap_or_default(),
        inputs: cli.inputs.clone(),
        cpu: cli.cpu.unwrap_or(config.general.cpu),
        out_prefix: cli
            .out_prefix
            .clone()
            .unwrap_or_else(|| config.general.out_prefix.clone()),
        validation,
    }
}

fn execute(options: &RunOptions) -> CliResult<RunSummary> {
    let available = num_cpus::get();
    if options.cpu > available {
        log::warn!(
            "Requested {} workers but only {} CPUs are available",
            options.cpu,
            available
        );
    }
    if options.validation.transcribed_is_aligned_orient && options.validation.require_consensus_splice_sites {
        log::warn!("Splice sites are not checked when the transcribed strand is taken from the aligner");
    }

    let summary = pasa_lite_core::run(options)?;
    Ok(summary)
}

fn print_example_config() -> CliResult<()> {
    let example = Config::example_toml().map_err(|e| CliError::config(format!("{:#}", e)))?;
    std::io::stdout().write_all(example.as_bytes())?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose, cli.quiet)?;

    if cli.print_config {
        if let Err(e) = print_example_config() {
            print_error_and_exit(&e);
        }
        return Ok(());
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => print_error_and_exit(&CliError::config(format!("{:#}", e))),
    };

    let options = build_run_options(&cli, &config);
    log::debug!("Run options: {:?}", options);

    match execute(&options) {
        Ok(summary) => {
            log::info!(
                "Validated {} alignments on {} scaffolds: {} valid, {} invalid",
                summary.alignments,
                summary.scaffolds,
                summary.counts.valid,
                summary.counts.invalid
            );
            log::info!("Valid alignments: {}", summary.outputs.valid.display());
            log::info!("Invalid alignments: {}", summary.outputs.invalid.display());
            Ok(())
        }
        Err(e) => print_error_and_exit(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_defaults_come_from_config() {
        let cli = parse(&["pasa_lite", "--genome", "g.fa", "a.gtf", "b.gff3"]);
        let options = build_run_options(&cli, &Config::default());
        assert_eq!(options.genome, PathBuf::from("g.fa"));
        assert_eq!(options.inputs.len(), 2);
        assert_eq!(options.cpu, 2);
        assert_eq!(options.out_prefix, "pasa_lite");
        assert_eq!(options.validation.min_per_id, 95.0);
        assert!(!options.validation.require_consensus_splice_sites);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = parse(&[
            "pasa_lite",
            "--genome",
            "g.fa",
            "--CPU",
            "7",
            "--out_prefix",
            "run1",
            "--min_per_id",
            "90",
            "--discard_unspliced_transcripts",
            "--require_consensus_splicesites",
            "a.gtf",
        ]);
        let mut config = Config::default();
        config.general.cpu = 3;
        config.validation.transcribed_is_aligned_orient = true;

        let options = build_run_options(&cli, &config);
        assert_eq!(options.cpu, 7);
        assert_eq!(options.out_prefix, "run1");
        assert_eq!(options.validation.min_per_id, 90.0);
        assert!(options.validation.discard_unspliced);
        assert!(options.validation.require_consensus_splice_sites);
        // config-enabled policy survives an absent flag
        assert!(options.validation.transcribed_is_aligned_orient);
    }

    #[test]
    fn test_genome_and_inputs_required() {
        assert!(Cli::try_parse_from(["pasa_lite", "a.gtf"]).is_err());
        assert!(Cli::try_parse_from(["pasa_lite", "--genome", "g.fa"]).is_err());
        assert!(Cli::try_parse_from(["pasa_lite", "--print_config"]).is_ok());
    }

    #[test]
    fn test_zero_cpu_is_rejected_by_run() {
        let cli = parse(&["pasa_lite", "--genome", "g.fa", "--CPU", "0", "a.gtf"]);
        let options = build_run_options(&cli, &Config::default());
        assert!(matches!(execute(&options), Err(CliError::InvalidArgument { .. })));
    }
}
