//! GFF3 alignment reader
//!
//! Alignment segments are `cDNA_match`, `EST_match`, `match_part` or `exon`
//! lines. The alignment is identified by `ID`, falling back to the `Target`
//! sequence name and then to `Parent`. The score column carries the segment
//! percent identity.

use std::collections::HashMap;
use std::path::Path;

use super::{for_each_feature_line, FeatureLine, FormatError, FormatResult, RecordAssembler};
use crate::types::AlignmentRecord;

const SEGMENT_FEATURES: &[&str] = &["cDNA_match", "EST_match", "match_part", "exon"];

pub struct Gff3Parser;

impl Gff3Parser {
    pub fn parse_file<P: AsRef<Path>>(path: P) -> FormatResult<Vec<AlignmentRecord>> {
        let path = path.as_ref();
        let mut assembler = RecordAssembler::new(path);

        for_each_feature_line(path, |line, line_num| {
            let feature = FeatureLine::parse(line, assembler.path(), line_num)?;
            if !SEGMENT_FEATURES.contains(&feature.feature_type) {
                return Ok(());
            }

            let attributes = Self::parse_attributes(feature.attributes);
            let accession = Self::alignment_id(&attributes).ok_or_else(|| FormatError::MissingAccession {
                path: assembler.path().to_string(),
                line: line_num,
            })?;

            let per_id = feature.score.or_else(|| {
                attributes
                    .get("identity")
                    .or_else(|| attributes.get("per_id"))
                    .and_then(|v| v.parse::<f64>().ok())
            });

            assembler.add(&accession, &feature, per_id)
        })?;

        let records = assembler.finish()?;
        log::debug!("Read {} alignments from GFF3 {}", records.len(), path.display());
        Ok(records)
    }

    fn alignment_id(attributes: &HashMap<String, String>) -> Option<String> {
        let from_target = || {
            attributes
                .get("Target")
                .and_then(|t| t.split_whitespace().next())
                .map(str::to_string)
        };
        attributes
            .get("ID")
            .cloned()
            .or_else(from_target)
            .or_else(|| attributes.get("Parent").cloned())
            .filter(|id| !id.is_empty())
    }

    /// Parse `key=value;key2=value2` pairs, decoding `%XX` escapes
    pub fn parse_attributes(attr_string: &str) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        for pair in attr_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            if let Some((key, value)) = pair.split_once('=') {
                attributes.insert(key.trim().to_string(), percent_decode(value.trim()));
            }
        }
        attributes
    }
}

/// Decode GFF3 `%XX` escapes, keeping the raw value if it does not decode to UTF-8
fn percent_decode(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
