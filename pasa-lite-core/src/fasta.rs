//! Genome sequence access
//!
//! [`FastaIndex`] scans an uncompressed FASTA once and then serves each
//! scaffold from a fresh memory map, so concurrent callers never share a
//! cursor. Compressed genomes are loaded whole into an [`InMemoryGenome`].

use memmap2::Mmap;
use needletail::parse_fastx_file;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::GenomicPos;

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("IO error reading genome {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Genome file is empty: {0}")]
    Empty(PathBuf),
    #[error("Malformed FASTA {path}: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("Scaffold not found in genome: {0}")]
    ScaffoldNotFound(String),
}

pub type GenomeResult<T> = Result<T, GenomeError>;

/// Random access to scaffold sequences. Implementations must tolerate
/// concurrent independent calls.
pub trait SequenceStore: Send + Sync {
    fn sequence(&self, scaffold: &str) -> GenomeResult<Vec<u8>>;

    fn contains(&self, scaffold: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub name: String,
    pub sequence_start: u64, // byte offset of the first base line
    pub sequence_end: u64,   // byte offset one past the record
    pub sequence_length: GenomicPos,
}

#[derive(Debug, Clone)]
pub struct FastaIndex {
    pub path: PathBuf,
    pub records: Vec<FastaRecord>,
    record_map: HashMap<String, usize>,
}

impl FastaIndex {
    pub fn new<P: AsRef<Path>>(path: P) -> GenomeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = map_file(&path)?;

        let mut records: Vec<FastaRecord> = Vec::new();
        let mut record_map = HashMap::new();
        let mut offset = 0usize;

        while offset < mmap.len() {
            let line_end = mmap[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| offset + p)
                .unwrap_or(mmap.len());
            let line = &mmap[offset..line_end];

            if line.first() == Some(&b'>') {
                if let Some(last) = records.last_mut() {
                    last.sequence_end = offset as u64;
                }
                let header = String::from_utf8_lossy(&line[1..]);
                let name = extract_sequence_name(&header);
                if name.is_empty() {
                    return Err(GenomeError::Malformed {
                        path,
                        message: format!("empty header at byte {}", offset),
                    });
                }
                record_map.insert(name.clone(), records.len());
                records.push(FastaRecord {
                    name,
                    sequence_start: (line_end + 1).min(mmap.len()) as u64,
                    sequence_end: mmap.len() as u64,
                    sequence_length: 0,
                });
            } else if let Some(last) = records.last_mut() {
                last.sequence_length += line.iter().filter(|b| !b.is_ascii_whitespace()).count() as u64;
            } else if line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Err(GenomeError::Malformed {
                    path,
                    message: "sequence data before first header".to_string(),
                });
            }

            offset = line_end + 1;
        }

        if records.is_empty() {
            return Err(GenomeError::Malformed {
                path,
                message: "no sequences found".to_string(),
            });
        }

        log::debug!("Indexed {} scaffolds from {}", records.len(), path.display());
        Ok(Self { path, records, record_map })
    }

    pub fn get_record(&self, name: &str) -> Option<&FastaRecord> {
        self.record_map.get(name).and_then(|&idx| self.records.get(idx))
    }

    pub fn scaffold_names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }
}

impl SequenceStore for FastaIndex {
    fn sequence(&self, scaffold: &str) -> GenomeResult<Vec<u8>> {
        let record = self
            .get_record(scaffold)
            .ok_or_else(|| GenomeError::ScaffoldNotFound(scaffold.to_string()))?;

        // Each call maps the file on its own
        let mmap = map_file(&self.path)?;
        let start = (record.sequence_start as usize).min(mmap.len());
        let end = (record.sequence_end as usize).min(mmap.len());

        let mut sequence = Vec::with_capacity(record.sequence_length as usize);
        sequence.extend(
            mmap[start..end]
                .iter()
                .filter(|b| !b.is_ascii_whitespace())
                .map(|b| b.to_ascii_uppercase()),
        );
        Ok(sequence)
    }

    fn contains(&self, scaffold: &str) -> bool {
        self.record_map.contains_key(scaffold)
    }
}

/// Whole genome held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryGenome {
    sequences: HashMap<String, Vec<u8>>,
}

impl InMemoryGenome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, sequence: &[u8]) {
        self.sequences
            .insert(name.into(), sequence.iter().map(|b| b.to_ascii_uppercase()).collect());
    }

    /// Load a FASTA/FASTQ file, gzipped or not
    pub fn from_file<P: AsRef<Path>>(path: P) -> GenomeResult<Self> {
        let path = path.as_ref();
        let malformed = |e: needletail::errors::ParseError| GenomeError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut reader = parse_fastx_file(path).map_err(malformed)?;
        let mut genome = Self::new();
        while let Some(record) = reader.next() {
            let record = record.map_err(malformed)?;
            let id = String::from_utf8_lossy(record.id()).to_string();
            genome.insert(extract_sequence_name(&id), &record.seq());
        }

        if genome.sequences.is_empty() {
            return Err(GenomeError::Empty(path.to_path_buf()));
        }
        log::debug!("Loaded {} scaffolds from {}", genome.sequences.len(), path.display());
        Ok(genome)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

impl SequenceStore for InMemoryGenome {
    fn sequence(&self, scaffold: &str) -> GenomeResult<Vec<u8>> {
        self.sequences
            .get(scaffold)
            .cloned()
            .ok_or_else(|| GenomeError::ScaffoldNotFound(scaffold.to_string()))
    }

    fn contains(&self, scaffold: &str) -> bool {
        self.sequences.contains_key(scaffold)
    }
}

/// Open a genome: memory-mapped index for plain FASTA, in-memory for `.gz`
pub fn open_genome<P: AsRef<Path>>(path: P) -> GenomeResult<Box<dyn SequenceStore>> {
    let path = path.as_ref();
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(InMemoryGenome::from_file(path)?))
    } else {
        Ok(Box::new(FastaIndex::new(path)?))
    }
}

fn map_file(path: &Path) -> GenomeResult<Mmap> {
    let io_err = |source| GenomeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let metadata = file.metadata().map_err(io_err)?;
    if metadata.len() == 0 {
        return Err(GenomeError::Empty(path.to_path_buf()));
    }
    // The genome is opened read-only and not modified while mapped
    unsafe { Mmap::map(&file) }.map_err(io_err)
}

fn extract_sequence_name(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}
