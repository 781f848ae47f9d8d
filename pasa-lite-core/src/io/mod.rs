//! Alignment file readers
//!
//! GTF and GFF3 alignment records are grouped by accession into
//! [`AlignmentRecord`]s. Format is chosen from the file extension.

pub mod gff3;
pub mod gtf;

pub use gff3::Gff3Parser;
pub use gtf::GtfParser;

use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::types::{AlignmentRecord, GenomicPos, Orientation, Segment};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: expected 9 tab-separated fields, got {found}")]
    FieldCount { path: String, line: usize, found: usize },
    #[error("{path}:{line}: invalid coordinate '{value}'")]
    InvalidCoordinate { path: String, line: usize, value: String },
    #[error("{path}:{line}: invalid strand '{value}'")]
    InvalidStrand { path: String, line: usize, value: String },
    #[error("{path}:{line}: no alignment identifier in attributes")]
    MissingAccession { path: String, line: usize },
    #[error("{path}: alignment {accession}: {message}")]
    InconsistentRecord { path: String, accession: String, message: String },
    #[error("Unsupported alignment file (expected .gtf or .gff3): {0}")]
    UnsupportedFormat(String),
}

pub type FormatResult<T> = Result<T, FormatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    Gtf,
    Gff3,
}

impl AlignmentFormat {
    /// Detect the format from a file name, looking through a trailing `.gz`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".gtf") {
            Some(AlignmentFormat::Gtf)
        } else if name.ends_with(".gff3") || name.ends_with(".gff") {
            Some(AlignmentFormat::Gff3)
        } else {
            None
        }
    }
}

/// Parse every alignment in `path`, dispatching on extension
pub fn read_alignments<P: AsRef<Path>>(path: P) -> FormatResult<Vec<AlignmentRecord>> {
    let path = path.as_ref();
    match AlignmentFormat::from_path(path) {
        Some(AlignmentFormat::Gtf) => GtfParser::parse_file(path),
        Some(AlignmentFormat::Gff3) => Gff3Parser::parse_file(path),
        None => Err(FormatError::UnsupportedFormat(path.display().to_string())),
    }
}

pub(crate) fn open_reader(path: &Path) -> FormatResult<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|source| FormatError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// The eight fixed columns of a GTF/GFF3 line plus the raw attribute column
#[derive(Debug, Clone)]
pub(crate) struct FeatureLine<'a> {
    pub seqname: &'a str,
    pub source: &'a str,
    pub feature_type: &'a str,
    pub start: GenomicPos,
    pub end: GenomicPos,
    pub score: Option<f64>,
    pub strand: Orientation,
    pub attributes: &'a str,
}

impl<'a> FeatureLine<'a> {
    pub fn parse(line: &'a str, path: &str, line_num: usize) -> FormatResult<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 9 {
            return Err(FormatError::FieldCount {
                path: path.to_string(),
                line: line_num,
                found: fields.len(),
            });
        }

        let coord = |value: &str| -> FormatResult<GenomicPos> {
            value
                .trim()
                .parse::<GenomicPos>()
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| FormatError::InvalidCoordinate {
                    path: path.to_string(),
                    line: line_num,
                    value: value.to_string(),
                })
        };
        let start = coord(fields[3])?;
        let end = coord(fields[4])?;
        if start > end {
            return Err(FormatError::InvalidCoordinate {
                path: path.to_string(),
                line: line_num,
                value: format!("{}>{}", start, end),
            });
        }

        let strand = match Orientation::parse(fields[6].trim()) {
            Some(strand) if strand.is_known() => strand,
            _ => {
                return Err(FormatError::InvalidStrand {
                    path: path.to_string(),
                    line: line_num,
                    value: fields[6].to_string(),
                })
            }
        };

        // Non-numeric scores are treated as absent
        let score = fields[5].trim().parse::<f64>().ok();

        Ok(Self {
            seqname: fields[0],
            source: fields[1],
            feature_type: fields[2],
            start,
            end,
            score,
            strand,
            attributes: fields[8],
        })
    }
}

struct PendingAlignment {
    scaffold: String,
    source: String,
    strand: Orientation,
    segments: Vec<Segment>,
}

/// Groups feature lines by accession, keeping first-seen order
pub(crate) struct RecordAssembler {
    path: String,
    order: Vec<String>,
    pending: HashMap<String, PendingAlignment>,
}

impl RecordAssembler {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.display().to_string(),
            order: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn add(&mut self, accession: &str, line: &FeatureLine<'_>, per_id: Option<f64>) -> FormatResult<()> {
        let mut segment = Segment::new(line.start, line.end, line.strand);
        if let Some(per_id) = per_id {
            segment = segment.with_per_id(per_id);
        }

        match self.pending.get_mut(accession) {
            Some(pending) => {
                if pending.scaffold != line.seqname {
                    return Err(inconsistent(
                        &self.path,
                        accession,
                        format!("segments on both {} and {}", pending.scaffold, line.seqname),
                    ));
                }
                if pending.strand != line.strand {
                    return Err(inconsistent(&self.path, accession, "segments on both strands".to_string()));
                }
                pending.segments.push(segment);
            }
            None => {
                self.order.push(accession.to_string());
                self.pending.insert(
                    accession.to_string(),
                    PendingAlignment {
                        scaffold: line.seqname.to_string(),
                        source: line.source.to_string(),
                        strand: line.strand,
                        segments: vec![segment],
                    },
                );
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> FormatResult<Vec<AlignmentRecord>> {
        let mut records = Vec::with_capacity(self.order.len());
        for accession in std::mem::take(&mut self.order) {
            let Some(pending) = self.pending.remove(&accession) else {
                continue;
            };

            let record = AlignmentRecord::new(
                accession.clone(),
                pending.scaffold,
                pending.source,
                pending.strand,
                pending.segments,
            );
            if let Some(w) = record.segments().windows(2).find(|w| w[0].overlaps(&w[1])) {
                return Err(inconsistent(
                    &self.path,
                    &accession,
                    format!(
                        "overlapping segments {}-{} and {}-{}",
                        w[0].left(),
                        w[0].right(),
                        w[1].left(),
                        w[1].right()
                    ),
                ));
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn inconsistent(path: &str, accession: &str, message: String) -> FormatError {
    FormatError::InconsistentRecord {
        path: path.to_string(),
        accession: accession.to_string(),
        message,
    }
}

/// Iterate non-comment, non-blank lines with 1-based line numbers
pub(crate) fn for_each_feature_line<F>(path: &Path, mut f: F) -> FormatResult<()>
where
    F: FnMut(&str, usize) -> FormatResult<()>,
{
    let reader = open_reader(path)?;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FormatError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() || trimmed.starts_with('#') {
            continue;
        }
        f(trimmed, idx + 1)?;
    }
    Ok(())
}
