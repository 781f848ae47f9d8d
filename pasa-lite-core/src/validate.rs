//! Transcript validation rules
//!
//! Rules run in a fixed order over one record and its scaffold sequence.
//! Every rule may set the record's error message and a later rule replaces
//! whatever an earlier one wrote: only the last failure is reported.

use serde::{Deserialize, Serialize};

use crate::types::{AlignmentRecord, GenomicPos, Orientation};

/// Accepted donor/acceptor pairs, read on the transcribed strand
pub const CANONICAL_SPLICE_SITES: [(&[u8; 2], &[u8; 2]); 3] =
    [(b"GT", b"AG"), (b"GC", b"AG"), (b"AT", b"AC")];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Trust the aligner's strand and skip splice-site checks
    pub transcribed_is_aligned_orient: bool,
    /// Reject alignments with a single segment
    pub discard_unspliced: bool,
    /// Reject multi-exon alignments unless every intron is canonical
    pub require_consensus_splice_sites: bool,
    /// Minimum average percent identity
    pub min_per_id: f64,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            transcribed_is_aligned_orient: false,
            discard_unspliced: false,
            require_consensus_splice_sites: false,
            min_per_id: 95.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Splice-site reading of one intron
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntronSites {
    /// Dinucleotide after the upstream exon, genomic plus strand
    pub donor: [u8; 2],
    /// Dinucleotide before the downstream exon, genomic plus strand
    pub acceptor: [u8; 2],
}

impl IntronSites {
    /// Read the flanking dinucleotides of the intron between two exons.
    /// Positions outside the scaffold read as `N`.
    pub fn read(sequence: &[u8], upstream_right: GenomicPos, downstream_left: GenomicPos) -> Self {
        // 1-based: donor = right+1..=right+2, acceptor = left-2..=left-1
        let base = |pos: GenomicPos| -> u8 {
            if pos == 0 {
                return b'N';
            }
            sequence
                .get((pos - 1) as usize)
                .map(|b| b.to_ascii_uppercase())
                .unwrap_or(b'N')
        };
        let donor = [base(upstream_right + 1), base(upstream_right + 2)];
        let acceptor = [
            base(downstream_left.saturating_sub(2)),
            base(downstream_left.saturating_sub(1)),
        ];
        Self { donor, acceptor }
    }

    pub fn is_canonical_plus(&self) -> bool {
        is_canonical(&self.donor, &self.acceptor)
    }

    /// On the minus strand the donor is the reverse complement of the
    /// genomic acceptor and vice versa
    pub fn is_canonical_minus(&self) -> bool {
        let donor = reverse_complement_pair(&self.acceptor);
        let acceptor = reverse_complement_pair(&self.donor);
        is_canonical(&donor, &acceptor)
    }

    pub fn is_canonical_on(&self, orientation: Orientation) -> bool {
        match orientation {
            Orientation::Plus => self.is_canonical_plus(),
            Orientation::Minus => self.is_canonical_minus(),
            Orientation::Unknown => false,
        }
    }

    fn label(&self) -> String {
        format!(
            "{}-{}",
            String::from_utf8_lossy(&self.donor),
            String::from_utf8_lossy(&self.acceptor)
        )
    }
}

fn is_canonical(donor: &[u8; 2], acceptor: &[u8; 2]) -> bool {
    CANONICAL_SPLICE_SITES
        .iter()
        .any(|(d, a)| *d == donor && *a == acceptor)
}

fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' => b'A',
        b'G' => b'C',
        b'C' => b'G',
        _ => b'N',
    }
}

fn reverse_complement_pair(pair: &[u8; 2]) -> [u8; 2] {
    [complement(pair[1]), complement(pair[0])]
}

/// Strand inferred from splice sites of a multi-exon alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceEvidence {
    pub introns: Vec<IntronSites>,
    pub plus_canonical: usize,
    pub minus_canonical: usize,
}

impl SpliceEvidence {
    pub fn collect(record: &AlignmentRecord, sequence: &[u8]) -> Self {
        let introns: Vec<IntronSites> = record
            .introns()
            .into_iter()
            .map(|(right, left)| IntronSites::read(sequence, right, left))
            .collect();
        let plus_canonical = introns.iter().filter(|s| s.is_canonical_plus()).count();
        let minus_canonical = introns.iter().filter(|s| s.is_canonical_minus()).count();
        Self {
            introns,
            plus_canonical,
            minus_canonical,
        }
    }

    /// Strand with more canonical introns; ties are `Unknown`
    pub fn orientation(&self) -> Orientation {
        use std::cmp::Ordering;
        match self.plus_canonical.cmp(&self.minus_canonical) {
            Ordering::Greater => Orientation::Plus,
            Ordering::Less => Orientation::Minus,
            Ordering::Equal => Orientation::Unknown,
        }
    }

    /// Every intron canonical on the inferred strand
    pub fn is_fully_canonical(&self) -> bool {
        match self.orientation() {
            Orientation::Plus => self.plus_canonical == self.introns.len(),
            Orientation::Minus => self.minus_canonical == self.introns.len(),
            Orientation::Unknown => false,
        }
    }

    fn describe_failures(&self) -> String {
        let orientation = self.orientation();
        self.introns
            .iter()
            .filter(|s| !s.is_canonical_on(orientation))
            .map(IntronSites::label)
            .collect::<Vec<_>>()
            .join(",")
    }
}

type Rule = fn(&mut AlignmentRecord, &[u8], &ValidationOptions) -> Option<String>;

/// Order matters: each entry may overwrite the message of the ones before it
const RULES: [(&str, Rule); 3] = [
    ("orientation", orientation_rule),
    ("unspliced", unspliced_rule),
    ("percent_identity", percent_identity_rule),
];

fn orientation_rule(record: &mut AlignmentRecord, sequence: &[u8], options: &ValidationOptions) -> Option<String> {
    if options.transcribed_is_aligned_orient {
        record.set_spliced_orientation(record.aligned_orientation());
        return None;
    }
    if !record.is_multi_exon() {
        return None;
    }

    let evidence = SpliceEvidence::collect(record, sequence);
    let spliced = evidence.orientation();
    record.set_spliced_orientation(spliced);

    if spliced.is_known() && spliced != record.aligned_orientation() {
        log::trace!(
            "{}: aligned {} but spliced {}, re-orienting",
            record.accession,
            record.aligned_orientation(),
            spliced
        );
        record.remap_to_spliced_orientation();
    }

    if options.require_consensus_splice_sites && !evidence.is_fully_canonical() {
        let detail = match spliced {
            Orientation::Unknown => format!(
                "no consistent strand (plus {}/{}, minus {}/{})",
                evidence.plus_canonical,
                evidence.introns.len(),
                evidence.minus_canonical,
                evidence.introns.len()
            ),
            _ => format!("non-canonical on {} strand: {}", spliced, evidence.describe_failures()),
        };
        return Some(format!("non-consensus splice sites; {}", detail));
    }
    None
}

fn unspliced_rule(record: &mut AlignmentRecord, _sequence: &[u8], options: &ValidationOptions) -> Option<String> {
    if options.discard_unspliced && record.segments().len() == 1 {
        return Some("unspliced alignment discarded".to_string());
    }
    None
}

fn percent_identity_rule(record: &mut AlignmentRecord, _sequence: &[u8], options: &ValidationOptions) -> Option<String> {
    match record.avg_per_id() {
        Some(per_id) if per_id < options.min_per_id => Some(format!(
            "average percent identity {:.2} below minimum {:.2}",
            per_id, options.min_per_id
        )),
        _ => None,
    }
}

/// Applies the rule chain to records of one scaffold
#[derive(Debug, Clone, Default)]
pub struct TranscriptValidator {
    options: ValidationOptions,
}

impl TranscriptValidator {
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Run every rule against `record`, leaving the final verdict on the
    /// record's error field as well as returning it
    pub fn validate(&self, record: &mut AlignmentRecord, sequence: &[u8]) -> Verdict {
        for (name, rule) in RULES.iter() {
            if let Some(message) = rule(record, sequence, &self.options) {
                if let Some(previous) = record.error() {
                    log::trace!("{}: {} replaces '{}'", record.accession, name, previous);
                }
                record.set_error(message);
            }
        }

        match record.error() {
            Some(message) => Verdict::Invalid(message.to_string()),
            None => Verdict::Valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;

    // exon1 1..10, intron 11..20, exon2 21..30
    fn genome_with_intron(donor: &[u8; 2], acceptor: &[u8; 2]) -> Vec<u8> {
        let mut seq = b"AAAAAAAAAA".to_vec();
        seq.extend_from_slice(donor);
        seq.extend_from_slice(b"CCCCCC");
        seq.extend_from_slice(acceptor);
        seq.extend_from_slice(b"AAAAAAAAAA");
        seq
    }

    fn spliced_record(orientation: Orientation, per_id: f64) -> AlignmentRecord {
        AlignmentRecord::new(
            "tx".to_string(),
            "chr1".to_string(),
            "test".to_string(),
            orientation,
            vec![
                Segment::new(1, 10, orientation).with_per_id(per_id),
                Segment::new(21, 30, orientation).with_per_id(per_id),
            ],
        )
    }

    fn single_exon(per_id: f64) -> AlignmentRecord {
        AlignmentRecord::new(
            "single".to_string(),
            "chr1".to_string(),
            "test".to_string(),
            Orientation::Plus,
            vec![Segment::new(1, 30, Orientation::Plus).with_per_id(per_id)],
        )
    }

    fn strict() -> ValidationOptions {
        ValidationOptions {
            require_consensus_splice_sites: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_intron_sites_read() {
        let genome = genome_with_intron(b"gt", b"ag");
        let sites = IntronSites::read(&genome, 10, 21);
        assert_eq!(&sites.donor, b"GT");
        assert_eq!(&sites.acceptor, b"AG");
        assert!(sites.is_canonical_plus());
        assert!(!sites.is_canonical_minus());
    }

    #[test]
    fn test_minus_strand_sites() {
        // CT-AC on the plus strand is GT-AG on the minus strand
        let genome = genome_with_intron(b"CT", b"AC");
        let sites = IntronSites::read(&genome, 10, 21);
        assert!(sites.is_canonical_minus());
        assert!(!sites.is_canonical_plus());

        // GT-AT reads as AT-AC on the minus strand
        let genome = genome_with_intron(b"GT", b"AT");
        assert!(IntronSites::read(&genome, 10, 21).is_canonical_minus());
    }

    #[test]
    fn test_sites_past_scaffold_end_read_as_n() {
        let sites = IntronSites::read(b"ACGT", 3, 100);
        assert_eq!(&sites.donor, b"TN");
        assert_eq!(&sites.acceptor, b"NN");
        assert!(!sites.is_canonical_plus());
    }

    #[test]
    fn test_canonical_plus_is_valid() {
        let genome = genome_with_intron(b"GC", b"AG");
        let mut record = spliced_record(Orientation::Plus, 99.0);
        let verdict = TranscriptValidator::new(strict()).validate(&mut record, &genome);
        assert!(verdict.is_valid());
        assert_eq!(record.spliced_orientation(), Orientation::Plus);
    }

    #[test]
    fn test_minus_junctions_remap_plus_alignment() {
        let genome = genome_with_intron(b"CT", b"AC");
        let mut record = spliced_record(Orientation::Plus, 99.0);
        let verdict = TranscriptValidator::new(strict()).validate(&mut record, &genome);

        assert!(verdict.is_valid());
        assert_eq!(record.aligned_orientation(), Orientation::Plus);
        assert_eq!(record.spliced_orientation(), Orientation::Minus);
        let ordered = record.transcribed_segments();
        assert_eq!((ordered[0].end5, ordered[0].end3), (30, 21));
        assert_eq!((ordered[1].end5, ordered[1].end3), (10, 1));
        assert_eq!(record.to_token(), "chr1:30-21,10-1(-)");
    }

    #[test]
    fn test_non_canonical_strict_is_invalid_at_full_identity() {
        let genome = genome_with_intron(b"AA", b"TT");
        let mut record = spliced_record(Orientation::Plus, 100.0);
        let verdict = TranscriptValidator::new(strict()).validate(&mut record, &genome);

        match verdict {
            Verdict::Invalid(message) => assert!(message.contains("non-consensus splice sites")),
            Verdict::Valid => panic!("expected non-consensus failure"),
        }
        assert_eq!(record.spliced_orientation(), Orientation::Unknown);
    }

    #[test]
    fn test_non_canonical_lenient_is_valid() {
        let genome = genome_with_intron(b"AA", b"TT");
        let mut record = spliced_record(Orientation::Plus, 100.0);
        let verdict = TranscriptValidator::default().validate(&mut record, &genome);
        assert!(verdict.is_valid());
        assert_eq!(record.transcribed_orientation(), Orientation::Plus);
    }

    #[test]
    fn test_mixed_introns_strict() {
        // exons 1..10, 21..30, 41..50: first intron GT-AG, second AA-TT
        let mut genome = genome_with_intron(b"GT", b"AG");
        genome.extend_from_slice(b"AACCCCCCTT");
        genome.extend_from_slice(b"AAAAAAAAAA");
        let mut record = AlignmentRecord::new(
            "tx3".to_string(),
            "chr1".to_string(),
            "test".to_string(),
            Orientation::Plus,
            vec![
                Segment::new(1, 10, Orientation::Plus),
                Segment::new(21, 30, Orientation::Plus),
                Segment::new(41, 50, Orientation::Plus),
            ],
        );

        let verdict = TranscriptValidator::new(strict()).validate(&mut record, &genome);
        assert_eq!(record.spliced_orientation(), Orientation::Plus);
        match verdict {
            Verdict::Invalid(message) => assert!(message.contains("AA-TT")),
            Verdict::Valid => panic!("expected failure"),
        }
    }

    #[test]
    fn test_transcribed_is_aligned_skips_consensus() {
        let genome = genome_with_intron(b"AA", b"TT");
        let mut record = spliced_record(Orientation::Minus, 99.0);
        let options = ValidationOptions {
            transcribed_is_aligned_orient: true,
            ..strict()
        };
        let verdict = TranscriptValidator::new(options).validate(&mut record, &genome);
        assert!(verdict.is_valid());
        assert_eq!(record.spliced_orientation(), Orientation::Minus);
    }

    #[test]
    fn test_unspliced_discarded_regardless_of_identity() {
        let options = ValidationOptions {
            discard_unspliced: true,
            ..Default::default()
        };
        let mut record = single_exon(100.0);
        let verdict = TranscriptValidator::new(options).validate(&mut record, b"");
        assert_eq!(verdict, Verdict::Invalid("unspliced alignment discarded".to_string()));
    }

    #[test]
    fn test_single_exon_kept_by_default() {
        let mut record = single_exon(97.0);
        assert!(TranscriptValidator::default().validate(&mut record, b"").is_valid());
        assert_eq!(record.spliced_orientation(), Orientation::Unknown);
    }

    #[test]
    fn test_low_identity_overwrites_earlier_error() {
        let options = ValidationOptions {
            discard_unspliced: true,
            ..Default::default()
        };
        let mut record = single_exon(80.0);
        let verdict = TranscriptValidator::new(options).validate(&mut record, b"");
        match verdict {
            Verdict::Invalid(message) => {
                assert!(message.starts_with("average percent identity 80.00 below minimum 95.00"))
            }
            Verdict::Valid => panic!("expected identity failure"),
        }
    }

    #[test]
    fn test_unknown_identity_passes() {
        let mut record = AlignmentRecord::new(
            "noid".to_string(),
            "chr1".to_string(),
            "test".to_string(),
            Orientation::Plus,
            vec![Segment::new(1, 30, Orientation::Plus)],
        );
        assert_eq!(record.avg_per_id(), None);
        assert!(TranscriptValidator::default().validate(&mut record, b"").is_valid());
    }
}
