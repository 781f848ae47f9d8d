//! GTF alignment reader
//!
//! Each `exon` or `cDNA_match` line contributes one segment to the alignment
//! named by its `transcript_id`. Percent identity comes from a `per_id`
//! attribute when present, otherwise from a numeric score column.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use super::{for_each_feature_line, FeatureLine, FormatError, FormatResult, RecordAssembler};
use crate::types::AlignmentRecord;

const SEGMENT_FEATURES: &[&str] = &["exon", "cDNA_match"];

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\s*([A-Za-z0-9_.\-]+)\s+(?:"([^"]*)"|([^;\s]+))\s*;?"#).expect("valid GTF attribute regex")
    })
}

pub struct GtfParser;

impl GtfParser {
    pub fn parse_file<P: AsRef<Path>>(path: P) -> FormatResult<Vec<AlignmentRecord>> {
        let path = path.as_ref();
        let mut assembler = RecordAssembler::new(path);

        for_each_feature_line(path, |line, line_num| {
            let feature = FeatureLine::parse(line, assembler.path(), line_num)?;
            if !SEGMENT_FEATURES.contains(&feature.feature_type) {
                return Ok(());
            }

            let attributes = Self::parse_attributes(feature.attributes);
            let accession = attributes
                .get("transcript_id")
                .filter(|v| !v.is_empty())
                .ok_or_else(|| FormatError::MissingAccession {
                    path: assembler.path().to_string(),
                    line: line_num,
                })?;

            let per_id = attributes
                .get("per_id")
                .and_then(|v| v.parse::<f64>().ok())
                .or(feature.score);

            assembler.add(accession, &feature, per_id)
        })?;

        let records = assembler.finish()?;
        log::debug!("Read {} alignments from GTF {}", records.len(), path.display());
        Ok(records)
    }

    /// Parse `key "value"; key2 value2;` pairs
    pub fn parse_attributes(attr_string: &str) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        for caps in attribute_regex().captures_iter(attr_string) {
            let key = caps[1].to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            attributes.entry(key).or_insert(value);
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Orientation;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_parse_attributes() {
        let attrs = GtfParser::parse_attributes(r#"gene_id "g1"; transcript_id "t1"; per_id 97.5;"#);
        assert_eq!(attrs.get("gene_id").map(String::as_str), Some("g1"));
        assert_eq!(attrs.get("transcript_id").map(String::as_str), Some("t1"));
        assert_eq!(attrs.get("per_id").map(String::as_str), Some("97.5"));
    }

    #[test]
    fn test_parse_grouped_alignments() {
        let mut file = Builder::new().suffix(".gtf").tempfile().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "chr1\tgmap\texon\t500\t600\t99.0\t-\t.\tgene_id \"t1\"; transcript_id \"t1\";").unwrap();
        writeln!(file, "chr1\tgmap\texon\t100\t200\t97.0\t-\t.\tgene_id \"t1\"; transcript_id \"t1\";").unwrap();
        writeln!(file, "chr2\tgmap\tgene\t1\t900\t.\t+\t.\tgene_id \"g\";").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "chr2\tgmap\tcDNA_match\t10\t90\t.\t+\t.\ttranscript_id \"t2\"; per_id \"91.5\";").unwrap();

        let records = GtfParser::parse_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);

        let t1 = &records[0];
        assert_eq!(t1.accession, "t1");
        assert_eq!(t1.scaffold, "chr1");
        assert_eq!(t1.source, "gmap");
        assert_eq!(t1.aligned_orientation(), Orientation::Minus);
        assert_eq!(t1.segments().len(), 2);
        assert_eq!(t1.segments()[0].left(), 100);
        assert_eq!(t1.avg_per_id(), Some(98.0));

        let t2 = &records[1];
        assert_eq!(t2.accession, "t2");
        assert_eq!(t2.avg_per_id(), Some(91.5));
    }

    #[test]
    fn test_missing_transcript_id() {
        let mut file = Builder::new().suffix(".gtf").tempfile().unwrap();
        writeln!(file, "chr1\tgmap\texon\t1\t10\t.\t+\t.\tgene_id \"g1\";").unwrap();
        let err = GtfParser::parse_file(file.path()).unwrap_err();
        assert!(matches!(err, FormatError::MissingAccession { line: 1, .. }));
    }

    #[test]
    fn test_mixed_strands_rejected() {
        let mut file = Builder::new().suffix(".gtf").tempfile().unwrap();
        writeln!(file, "chr1\tgmap\texon\t1\t10\t.\t+\t.\ttranscript_id \"t1\";").unwrap();
        writeln!(file, "chr1\tgmap\texon\t20\t30\t.\t-\t.\ttranscript_id \"t1\";").unwrap();
        let err = GtfParser::parse_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("both strands"));
    }
}
