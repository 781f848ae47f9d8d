//! Alignment index
//!
//! Records are appended to a single data file inside a temporary directory:
//! - Header { magic="PLIX", version }
//! - Frames { u32 payload length, bincode-encoded AlignmentRecord }
//!
//! An in-memory map locates the live frame of each accession. Readers open
//! their own [`IndexHandle`] so no file cursor is shared between threads.
//! The directory is deleted when the index is closed or dropped.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::io::{read_alignments, FormatError};
use crate::partition::ScaffoldGroups;
use crate::types::AlignmentRecord;

/// Magic bytes for the index data file
const INDEX_MAGIC: &[u8; 4] = b"PLIX";

/// Current index format version
const INDEX_VERSION: u32 = 1;

const DATA_FILE: &str = "alignments.idx";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: expected PLIX")]
    InvalidMagic,

    #[error("Unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("Record encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Accession not found in index: {0}")]
    NotFound(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error(transparent)]
    Format(#[from] FormatError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
struct RecordLocation {
    offset: u64,
    length: u32,
    scaffold: String,
}

fn write_header<W: Write>(writer: &mut W) -> StoreResult<u64> {
    writer.write_all(INDEX_MAGIC)?;
    writer.write_u32::<LittleEndian>(INDEX_VERSION)?;
    Ok((INDEX_MAGIC.len() + 4) as u64)
}

fn read_header<R: Read>(reader: &mut R) -> StoreResult<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != INDEX_MAGIC {
        return Err(StoreError::InvalidMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != INDEX_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Single-threaded writer used while scanning input files
pub struct IndexBuilder {
    dir: TempDir,
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
    locations: HashMap<String, RecordLocation>,
    groups: ScaffoldGroups,
    replaced: usize,
}

impl IndexBuilder {
    /// Create a builder backed by a fresh directory under the system temp dir
    pub fn new() -> StoreResult<Self> {
        Self::new_in(std::env::temp_dir())
    }

    pub fn new_in<P: AsRef<Path>>(parent: P) -> StoreResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pasa_lite_index.")
            .tempdir_in(parent)?;
        let path = dir.path().join(DATA_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        let position = write_header(&mut writer)?;

        log::debug!("Alignment index at {}", path.display());
        Ok(Self {
            dir,
            path,
            writer,
            position,
            locations: HashMap::new(),
            groups: ScaffoldGroups::new(),
            replaced: 0,
        })
    }

    /// Store `record` under its accession. A record already stored under the
    /// same accession is replaced and leaves its scaffold group.
    pub fn insert(&mut self, record: &AlignmentRecord) -> StoreResult<()> {
        let payload = bincode::serialize(record)?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Corruption(format!("record {} too large", record.accession)))?;

        self.writer.write_u32::<LittleEndian>(length)?;
        self.writer.write_all(&payload)?;
        let location = RecordLocation {
            offset: self.position,
            length,
            scaffold: record.scaffold.clone(),
        };
        self.position += 4 + payload.len() as u64;

        if let Some(previous) = self.locations.insert(record.accession.clone(), location) {
            log::warn!(
                "Accession {} seen again; replacing earlier alignment on {}",
                record.accession,
                previous.scaffold
            );
            self.groups.remove(&previous.scaffold, &record.accession);
            self.replaced += 1;
        }
        self.groups.add(&record.scaffold, &record.accession);
        Ok(())
    }

    /// Parse one GTF/GFF3 file and insert all of its alignments
    pub fn index_file<P: AsRef<Path>>(&mut self, path: P) -> StoreResult<usize> {
        let path = path.as_ref();
        let records = read_alignments(path)?;
        for record in &records {
            self.insert(record)?;
        }
        log::info!("Indexed {} alignments from {}", records.len(), path.display());
        Ok(records.len())
    }

    pub fn finish(mut self) -> StoreResult<AlignmentIndex> {
        self.writer.flush()?;
        if self.replaced > 0 {
            log::warn!("{} duplicate accessions replaced by later records", self.replaced);
        }
        Ok(AlignmentIndex {
            dir: self.dir,
            path: self.path,
            locations: self.locations,
            groups: self.groups,
        })
    }
}

/// Read-mostly keyed store of alignment records
pub struct AlignmentIndex {
    dir: TempDir,
    path: PathBuf,
    locations: HashMap<String, RecordLocation>,
    groups: ScaffoldGroups,
}

impl AlignmentIndex {
    /// Index every file, in order, into a temporary store
    pub fn build<P: AsRef<Path>>(files: &[P]) -> StoreResult<Self> {
        let mut builder = IndexBuilder::new()?;
        for file in files {
            builder.index_file(file)?;
        }
        builder.finish()
    }

    /// Open an independent reader
    pub fn open(&self) -> StoreResult<IndexHandle<'_>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        read_header(&mut reader)?;
        Ok(IndexHandle { index: self, reader })
    }

    pub fn groups(&self) -> &ScaffoldGroups {
        &self.groups
    }

    pub fn contains(&self, accession: &str) -> bool {
        self.locations.contains_key(accession)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the backing directory
    pub fn close(self) -> StoreResult<()> {
        let dir = self.dir.path().to_path_buf();
        self.dir.close()?;
        log::debug!("Removed alignment index {}", dir.display());
        Ok(())
    }
}

/// Per-reader handle with its own file cursor
pub struct IndexHandle<'a> {
    index: &'a AlignmentIndex,
    reader: BufReader<File>,
}

impl IndexHandle<'_> {
    pub fn get(&mut self, accession: &str) -> StoreResult<AlignmentRecord> {
        let location = self
            .index
            .locations
            .get(accession)
            .ok_or_else(|| StoreError::NotFound(accession.to_string()))?;

        self.reader.seek(SeekFrom::Start(location.offset))?;
        let length = self.reader.read_u32::<LittleEndian>()?;
        if length != location.length {
            return Err(StoreError::Corruption(format!(
                "frame for {} has length {}, expected {}",
                accession, length, location.length
            )));
        }

        let mut payload = vec![0u8; length as usize];
        self.reader.read_exact(&mut payload)?;
        let record: AlignmentRecord = bincode::deserialize(&payload)?;
        if record.accession != accession {
            return Err(StoreError::Corruption(format!(
                "expected {} at offset {}, found {}",
                accession, location.offset, record.accession
            )));
        }
        Ok(record)
    }
}
