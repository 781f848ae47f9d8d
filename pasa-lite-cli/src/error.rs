//! Error handling for the pasa-lite CLI

use pasa_lite_core::{GenomeError, PipelineError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pasa-lite CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Genome error: {message}")]
    Genome { message: String },

    #[error("Alignment index error: {message}")]
    Index { message: String },

    #[error("Resource error: {message}")]
    Resource { message: String },

    #[error("{count} scaffold task(s) failed:\n{details}")]
    WorkerFaults { count: usize, details: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn genome<S: Into<String>>(message: S) -> Self {
        Self::Genome { message: message.into() }
    }

    pub fn index<S: Into<String>>(message: S) -> Self {
        Self::Index { message: message.into() }
    }

    pub fn resource<S: Into<String>>(message: S) -> Self {
        Self::Resource { message: message.into() }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Argument(message) => Self::invalid_argument(message),
            PipelineError::Format(e) => Self::parse(e.to_string()),
            PipelineError::Store(StoreError::Format(e)) => Self::parse(e.to_string()),
            PipelineError::Store(e) => Self::index(e.to_string()),
            PipelineError::Genome(GenomeError::Io { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Self::file_not_found(path)
            }
            PipelineError::Genome(e) => Self::genome(e.to_string()),
            PipelineError::Pool(e) => Self::resource(e.to_string()),
            PipelineError::Output { path, source } => Self::io(format!("{}: {}", path.display(), source)),
            PipelineError::WorkerFaults(faults) => Self::WorkerFaults {
                count: faults.len(),
                details: faults
                    .iter()
                    .map(|f| format!("  {}", f))
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file",
                path.display()
            ));
        }

        CliError::InvalidArgument { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Alignment files must end in .gtf, .gff3 or .gff (optionally .gz)\n\
                 • --CPU must be at least 1 and --min_per_id within 0-100\n\
                 • Run 'pasa_lite --help' for the full option list"
            );
        }

        CliError::Parse { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check the reported line for missing columns or swapped coordinates\n\
                 • All segments of one alignment must share scaffold and strand"
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your pasa_lite.toml configuration file\n\
                 • Use 'pasa_lite --print_config' to generate a sample configuration"
            );
        }

        CliError::WorkerFaults { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check that every scaffold named in the alignments exists in the genome\n\
                 • Output for the remaining scaffolds was written"
            );
        }

        CliError::Resource { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Reduce the number of workers with --CPU"
            );
        }

        _ => {}
    }

    message
}

/// Print error with helpful suggestions and exit
pub fn print_error_and_exit(error: &CliError) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}
