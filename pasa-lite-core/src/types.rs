use serde::{Deserialize, Serialize};
use std::fmt;

pub type GenomicPos = u64;

/// Strand call for an alignment or a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Plus,
    Minus,
    Unknown,
}

impl Orientation {
    pub fn is_known(self) -> bool {
        !matches!(self, Orientation::Unknown)
    }

    /// Parse a GTF/GFF3 strand column. `.` and `?` map to `Unknown`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Orientation::Plus),
            "-" => Some(Orientation::Minus),
            "." | "?" => Some(Orientation::Unknown),
            _ => None,
        }
    }
}

impl From<char> for Orientation {
    fn from(c: char) -> Self {
        match c {
            '+' => Orientation::Plus,
            '-' => Orientation::Minus,
            _ => Orientation::Unknown,
        }
    }
}

impl From<Orientation> for char {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Plus => '+',
            Orientation::Minus => '-',
            Orientation::Unknown => '?',
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(*self))
    }
}

/// One aligned exon, 1-based inclusive genome coordinates.
///
/// `end5`/`end3` are the transcribed ends: for a plus-strand transcript
/// `end5 <= end3`, for a minus-strand transcript `end5 >= end3`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub end5: GenomicPos,
    pub end3: GenomicPos,
    pub per_id: Option<f64>,
}

impl Segment {
    pub fn new(left: GenomicPos, right: GenomicPos, orientation: Orientation) -> Self {
        let (end5, end3) = match orientation {
            Orientation::Minus => (right, left),
            _ => (left, right),
        };
        Self { end5, end3, per_id: None }
    }

    pub fn with_per_id(mut self, per_id: f64) -> Self {
        self.per_id = Some(per_id);
        self
    }

    pub fn left(&self) -> GenomicPos {
        self.end5.min(self.end3)
    }

    pub fn right(&self) -> GenomicPos {
        self.end5.max(self.end3)
    }

    pub fn length(&self) -> GenomicPos {
        self.right() - self.left() + 1
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        self.left() <= other.right() && other.left() <= self.right()
    }

    fn flip(&mut self) {
        std::mem::swap(&mut self.end5, &mut self.end3);
    }
}

/// A transcript-to-genome alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub accession: String,
    pub scaffold: String,
    pub source: String,
    aligned_orientation: Orientation,
    spliced_orientation: Orientation,
    segments: Vec<Segment>, // ascending genomic order
    avg_per_id: Option<f64>,
    error: Option<String>,
}

impl AlignmentRecord {
    /// Create a record. Segments are put into ascending genomic order and
    /// oriented to `aligned_orientation`.
    pub fn new(
        accession: String,
        scaffold: String,
        source: String,
        aligned_orientation: Orientation,
        mut segments: Vec<Segment>,
    ) -> Self {
        segments.sort_by_key(|s| (s.left(), s.right()));
        for segment in segments.iter_mut() {
            let oriented = Segment::new(segment.left(), segment.right(), aligned_orientation);
            segment.end5 = oriented.end5;
            segment.end3 = oriented.end3;
        }

        let avg_per_id = average_per_id(&segments);

        Self {
            accession,
            scaffold,
            source,
            aligned_orientation,
            spliced_orientation: Orientation::Unknown,
            segments,
            avg_per_id,
            error: None,
        }
    }

    /// Override the identity derived from segment scores
    pub fn with_avg_per_id(mut self, per_id: f64) -> Self {
        self.avg_per_id = Some(per_id);
        self
    }

    pub fn aligned_orientation(&self) -> Orientation {
        self.aligned_orientation
    }

    pub fn spliced_orientation(&self) -> Orientation {
        self.spliced_orientation
    }

    pub fn set_spliced_orientation(&mut self, orientation: Orientation) {
        self.spliced_orientation = orientation;
    }

    /// Orientation the record is reported in: spliced if known, else aligned
    pub fn transcribed_orientation(&self) -> Orientation {
        if self.spliced_orientation.is_known() {
            self.spliced_orientation
        } else {
            self.aligned_orientation
        }
    }

    /// Segments in ascending genomic order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments in transcription order (descending genomic order for minus)
    pub fn transcribed_segments(&self) -> Vec<Segment> {
        let mut ordered = self.segments.clone();
        if self.transcribed_orientation() == Orientation::Minus {
            ordered.reverse();
        }
        ordered
    }

    pub fn is_multi_exon(&self) -> bool {
        self.segments.len() > 1
    }

    /// Genomic intron boundaries as `(last exonic base, first exonic base)` pairs
    pub fn introns(&self) -> Vec<(GenomicPos, GenomicPos)> {
        self.segments
            .windows(2)
            .map(|w| (w[0].right(), w[1].left()))
            .collect()
    }

    pub fn span(&self) -> Option<(GenomicPos, GenomicPos)> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some((first.left(), last.right()))
    }

    pub fn avg_per_id(&self) -> Option<f64> {
        self.avg_per_id
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error<S: Into<String>>(&mut self, message: S) {
        self.error = Some(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Re-orient every segment to the spliced orientation. Genomic extents are
    /// unchanged; transcribed ends are swapped so that transcript order
    /// follows the spliced strand.
    pub fn remap_to_spliced_orientation(&mut self) {
        let target = self.spliced_orientation;
        if !target.is_known() {
            return;
        }
        for segment in self.segments.iter_mut() {
            let is_forward = segment.end5 <= segment.end3;
            let wants_forward = target == Orientation::Plus;
            if is_forward != wants_forward && segment.end5 != segment.end3 {
                segment.flip();
            }
        }
    }

    /// Compact one-line representation, e.g. `chr1:100-200,300-400(+)`
    pub fn to_token(&self) -> String {
        let coords: Vec<String> = self
            .transcribed_segments()
            .iter()
            .map(|s| format!("{}-{}", s.end5, s.end3))
            .collect();
        format!(
            "{}:{}({})",
            self.scaffold,
            coords.join(","),
            self.transcribed_orientation()
        )
    }

    /// GTF lines for this record, one per segment in transcription order
    pub fn to_gtf(&self) -> String {
        let strand = self.transcribed_orientation();
        let strand = if strand.is_known() { strand.to_string() } else { ".".to_string() };
        let source = if self.source.is_empty() { "." } else { self.source.as_str() };
        let mut out = String::new();
        for segment in self.transcribed_segments() {
            let score = match segment.per_id.or(self.avg_per_id) {
                Some(per_id) => format!("{:.2}", per_id),
                None => ".".to_string(),
            };
            out.push_str(&format!(
                "{}\t{}\tcDNA_match\t{}\t{}\t{}\t{}\t.\tgene_id \"{}\"; transcript_id \"{}\";\n",
                self.scaffold,
                source,
                segment.left(),
                segment.right(),
                score,
                strand,
                self.accession,
                self.accession
            ));
        }
        out
    }
}

fn average_per_id(segments: &[Segment]) -> Option<f64> {
    let known: Vec<f64> = segments.iter().filter_map(|s| s.per_id).collect();
    if known.is_empty() {
        None
    } else {
        Some(known.iter().sum::<f64>() / known.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_exon(orientation: Orientation) -> AlignmentRecord {
        AlignmentRecord::new(
            "acc1".to_string(),
            "chr1".to_string(),
            "gmap".to_string(),
            orientation,
            vec![
                Segment::new(300, 400, orientation).with_per_id(98.0),
                Segment::new(100, 200, orientation).with_per_id(96.0),
            ],
        )
    }

    #[test]
    fn test_segments_sorted_and_averaged() {
        let record = two_exon(Orientation::Plus);
        assert_eq!(record.segments()[0].left(), 100);
        assert_eq!(record.segments()[1].left(), 300);
        assert_eq!(record.avg_per_id(), Some(97.0));
        assert_eq!(record.introns(), vec![(200, 300)]);
        assert_eq!(record.span(), Some((100, 400)));
    }

    #[test]
    fn test_minus_token_in_transcribed_order() {
        let record = two_exon(Orientation::Minus);
        assert_eq!(record.to_token(), "chr1:400-300,200-100(-)");
    }

    #[test]
    fn test_remap_flips_transcribed_ends() {
        let mut record = two_exon(Orientation::Plus);
        record.set_spliced_orientation(Orientation::Minus);
        record.remap_to_spliced_orientation();

        let ordered = record.transcribed_segments();
        assert_eq!((ordered[0].end5, ordered[0].end3), (400, 300));
        assert_eq!((ordered[1].end5, ordered[1].end3), (200, 100));
        // genomic view untouched
        assert_eq!(record.segments()[0].left(), 100);
    }

    #[test]
    fn test_gtf_rendering() {
        let record = two_exon(Orientation::Plus);
        let gtf = record.to_gtf();
        let lines: Vec<&str> = gtf.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("chr1\tgmap\tcDNA_match\t100\t200\t96.00\t+"));
        assert!(lines[0].ends_with("transcript_id \"acc1\";"));
    }

    #[test]
    fn test_orientation_conversions() {
        assert_eq!(Orientation::from('-'), Orientation::Minus);
        assert_eq!(char::from(Orientation::Unknown), '?');
        assert_eq!(Orientation::parse("."), Some(Orientation::Unknown));
        assert_eq!(Orientation::parse("x"), None);
    }
}
