//! Valid/invalid alignment sinks
//!
//! Each sink has its own lock. A record block is rendered before the lock is
//! taken and flushed before it is released, so blocks from different workers
//! never interleave and a write to one sink never waits on the other.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::AlignmentRecord;

struct Sink<W: Write> {
    writer: W,
    records: usize,
}

/// Two independently locked outputs
pub struct OutputRouter<W: Write + Send> {
    valid: Mutex<Sink<W>>,
    invalid: Mutex<Sink<W>>,
}

/// Records written to each sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounts {
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub valid: PathBuf,
    pub invalid: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            valid: PathBuf::from(format!("{}.valid_alignments.gtf", prefix)),
            invalid: PathBuf::from(format!("{}.invalid_alignments.gtf", prefix)),
        }
    }
}

impl OutputRouter<BufWriter<File>> {
    /// Create (truncate) both output files
    pub fn create(paths: &OutputPaths) -> std::io::Result<Self> {
        let open = |path: &Path| -> std::io::Result<BufWriter<File>> {
            let file = File::create(path).map_err(|e| {
                std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
            })?;
            Ok(BufWriter::new(file))
        };
        let valid = open(&paths.valid)?;
        let invalid = open(&paths.invalid)?;
        log::info!(
            "Writing valid alignments to {} and invalid alignments to {}",
            paths.valid.display(),
            paths.invalid.display()
        );
        Ok(Self::new(valid, invalid))
    }
}

impl<W: Write + Send> OutputRouter<W> {
    pub fn new(valid: W, invalid: W) -> Self {
        Self {
            valid: Mutex::new(Sink { writer: valid, records: 0 }),
            invalid: Mutex::new(Sink { writer: invalid, records: 0 }),
        }
    }

    pub fn write_valid(&self, record: &AlignmentRecord) -> std::io::Result<()> {
        let block = render_block(record, None);
        Self::write_block(&self.valid, &block)
    }

    pub fn write_invalid(&self, record: &AlignmentRecord) -> std::io::Result<()> {
        let message = record.error().unwrap_or("unspecified");
        let block = render_block(record, Some(message));
        Self::write_block(&self.invalid, &block)
    }

    /// Route by the record's error state
    pub fn write(&self, record: &AlignmentRecord) -> std::io::Result<()> {
        if record.is_valid() {
            self.write_valid(record)
        } else {
            self.write_invalid(record)
        }
    }

    fn write_block(sink: &Mutex<Sink<W>>, block: &str) -> std::io::Result<()> {
        let mut sink = sink.lock();
        sink.writer.write_all(block.as_bytes())?;
        sink.writer.flush()?;
        sink.records += 1;
        Ok(())
    }

    pub fn counts(&self) -> SinkCounts {
        SinkCounts {
            valid: self.valid.lock().records,
            invalid: self.invalid.lock().records,
        }
    }

    /// Flush both sinks and hand back the writers
    pub fn close(self) -> std::io::Result<(W, W, SinkCounts)> {
        let mut valid = self.valid.into_inner();
        let mut invalid = self.invalid.into_inner();
        valid.writer.flush()?;
        invalid.writer.flush()?;
        let counts = SinkCounts {
            valid: valid.records,
            invalid: invalid.records,
        };
        Ok((valid.writer, invalid.writer, counts))
    }
}

/// Header comment, feature lines, blank separator
pub fn render_block(record: &AlignmentRecord, error: Option<&str>) -> String {
    let mut block = match error {
        Some(message) => format!("# {} {} ERROR: {}\n", record.accession, record.to_token(), message),
        None => format!("# {} {}\n", record.accession, record.to_token()),
    };
    block.push_str(&record.to_gtf());
    block.push('\n');
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Orientation, Segment};
    use std::sync::Arc;

    fn record(accession: &str) -> AlignmentRecord {
        AlignmentRecord::new(
            accession.to_string(),
            "chr1".to_string(),
            "src".to_string(),
            Orientation::Plus,
            vec![
                Segment::new(1, 10, Orientation::Plus),
                Segment::new(21, 30, Orientation::Plus),
            ],
        )
    }

    #[test]
    fn test_render_blocks() {
        let mut rec = record("t1");
        assert_eq!(
            render_block(&rec, None).lines().next().unwrap(),
            "# t1 chr1:1-10,21-30(+)"
        );

        rec.set_error("bad");
        let block = render_block(&rec, rec.error());
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "# t1 chr1:1-10,21-30(+) ERROR: bad");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "");
        assert!(block.ends_with(";\n\n"));
    }

    #[test]
    fn test_routing_by_error() {
        let router = OutputRouter::new(Vec::new(), Vec::new());
        let good = record("good");
        let mut bad = record("bad");
        bad.set_error("nope");

        router.write(&good).unwrap();
        router.write(&bad).unwrap();
        assert_eq!(router.counts(), SinkCounts { valid: 1, invalid: 1 });

        let (valid, invalid, _) = router.close().unwrap();
        let valid = String::from_utf8(valid).unwrap();
        let invalid = String::from_utf8(invalid).unwrap();
        assert!(valid.starts_with("# good "));
        assert!(invalid.starts_with("# bad ") && invalid.contains("ERROR: nope"));
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let router = Arc::new(OutputRouter::new(Vec::new(), Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let mut rec = record(&format!("t{}_{}", t, i));
                        if i % 2 == 0 {
                            rec.set_error("even");
                        }
                        router.write(&rec).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let router = Arc::try_unwrap(router).ok().unwrap();
        let (valid, invalid, counts) = router.close().unwrap();
        assert_eq!(counts, SinkCounts { valid: 200, invalid: 200 });

        for output in [valid, invalid] {
            let text = String::from_utf8(output).unwrap();
            let blocks: Vec<&str> = text.split("\n\n").filter(|b| !b.is_empty()).collect();
            assert_eq!(blocks.len(), 200);
            for block in blocks {
                let lines: Vec<&str> = block.lines().collect();
                assert_eq!(lines.len(), 3);
                let accession = lines[0].split_whitespace().nth(1).unwrap();
                assert!(lines[1..].iter().all(|l| l.contains(&format!("\"{}\"", accession))));
            }
        }
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::from_prefix("run1");
        assert_eq!(paths.valid, PathBuf::from("run1.valid_alignments.gtf"));
        assert_eq!(paths.invalid, PathBuf::from("run1.invalid_alignments.gtf"));
    }
}
