// src/report/blocks.rs
//
// Segmented block extractor: pulls structured records out of text where each
// record sits between two occurrences of a fixed multi-line marker.
//
// Scanner: a two-state machine (Idle / Collecting) with one forward cursor.
// A marker match toggles the state and skips the whole marker span; any
// other line is collected while Collecting. A block still open at end of
// input is dropped, never emitted; the caller is told how many lines were
// dropped so it can warn and carry on.
//
// Field extraction is first-match-wins per field, and a field that never
// matches is absent. There is no numeric default here, unlike the report
// aggregator.

use std::io::Write;

use regex::Regex;
use serde::Serialize;

use crate::error::ExtractError;

/// Fixed multi-line delimiter. Lines compare exactly (terminators stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMarker {
    lines: Vec<String>,
}

impl BlockMarker {
    pub fn new<I, S>(lines: I) -> Result<Self, ExtractError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            return Err(ExtractError::EmptyMarker);
        }
        Ok(Self { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the marker starts at `lines[cursor]`.
    fn matches_at(&self, lines: &[&str], cursor: usize) -> bool {
        lines.len() - cursor >= self.lines.len()
            && self
                .lines
                .iter()
                .zip(&lines[cursor..])
                .all(|(expected, actual)| expected == actual)
    }
}

/// Named extraction pattern. The first capture group is the field value and
/// is matched against the trimmed line.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    name: String,
    regex: Regex,
}

impl FieldPattern {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ExtractError> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| ExtractError::InvalidPattern {
            field: name.clone(),
            source: e,
        })?;
        if regex.captures_len() < 2 {
            return Err(ExtractError::MissingCapture { field: name });
        }
        Ok(Self { name, regex })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn capture<'l>(&self, line: &'l str) -> Option<&'l str> {
        self.regex
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// One completed block: field name -> value, absent when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedBlockRecord {
    fields: Vec<(String, Option<String>)>,
}

impl ExtractedBlockRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Numeric view of a field; absent or non-numeric fields are `None`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }
}

/// Outcome of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockExtraction {
    pub records: Vec<ExtractedBlockRecord>,
    /// Lines of a block that was still open at end of input and was dropped.
    pub dangling_lines: Option<usize>,
}

#[derive(Debug)]
enum ScanState<'t> {
    Idle,
    Collecting(Vec<&'t str>),
}

/// Marker + ordered field patterns.
#[derive(Debug, Clone)]
pub struct SegmentedBlockExtractor {
    marker: BlockMarker,
    patterns: Vec<FieldPattern>,
}

impl SegmentedBlockExtractor {
    pub fn new(marker: BlockMarker, patterns: Vec<FieldPattern>) -> Self {
        Self { marker, patterns }
    }

    /// Extractor for Aladdin accelerator result blocks.
    pub fn aladdin() -> Result<Self, ExtractError> {
        let marker = BlockMarker::new(ALADDIN_MARKER.iter().copied())?;
        let patterns = ALADDIN_FIELDS
            .iter()
            .map(|(name, pattern)| FieldPattern::new(*name, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(marker, patterns))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name()).collect()
    }

    pub fn extract(&self, text: &str) -> BlockExtraction {
        let lines: Vec<&str> = text.lines().collect();
        self.extract_lines(&lines)
    }

    pub fn extract_lines(&self, lines: &[&str]) -> BlockExtraction {
        let mut state = ScanState::Idle;
        let mut records = Vec::new();
        let mut cursor = 0;

        while cursor < lines.len() {
            if self.marker.matches_at(lines, cursor) {
                state = match state {
                    ScanState::Idle => open_block(),
                    ScanState::Collecting(block) => {
                        records.push(self.close_block(&block));
                        ScanState::Idle
                    }
                };
                cursor += self.marker.len();
            } else {
                collect_line(&mut state, lines[cursor]);
                cursor += 1;
            }
        }

        let dangling_lines = match state {
            ScanState::Idle => None,
            ScanState::Collecting(block) => Some(block.len()),
        };

        BlockExtraction {
            records,
            dangling_lines,
        }
    }

    /// Build the record for one completed block.
    fn close_block(&self, block: &[&str]) -> ExtractedBlockRecord {
        let fields = self
            .patterns
            .iter()
            .map(|pattern| {
                let value = block
                    .iter()
                    .find_map(|line| pattern.capture(line.trim()))
                    .map(str::to_string);
                (pattern.name.clone(), value)
            })
            .collect();
        ExtractedBlockRecord { fields }
    }
}

fn open_block<'t>() -> ScanState<'t> {
    ScanState::Collecting(Vec::new())
}

fn collect_line<'t>(state: &mut ScanState<'t>, line: &'t str) {
    if let ScanState::Collecting(block) = state {
        block.push(line);
    }
}

/// Write records as CSV: header = field names, absent values as empty cells.
pub fn write_block_records<W: Write>(
    writer: W,
    field_names: &[&str],
    records: &[ExtractedBlockRecord],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(field_names)?;
    for record in records {
        let row: Vec<&str> = field_names
            .iter()
            .map(|name| record.get(name).unwrap_or(""))
            .collect();
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Three-line banner that opens and closes each Aladdin results block.
pub const ALADDIN_MARKER: [&str; 3] = [
    "===============================",
    "        Aladdin Results        ",
    "===============================",
];

/// Aladdin result fields and their patterns.
pub const ALADDIN_FIELDS: &[(&str, &str)] = &[
    ("Running", r"^Running\s*:\s*(.*)$"),
    ("Top level function", r"^Top level function:\s*(.*)$"),
    ("Cycle", r"^Cycle\s*:\s*([\d.]+)\s+cycles"),
    ("Upsampled Cycle", r"^Upsampled Cycle\s*:\s*([\d.]+)\s+cycles"),
    ("Avg Power (mW)", r"^Avg Power:\s*([\d.]+)\s+mW"),
    ("Idle FU Cycles", r"^Idle FU Cycles:\s*([\d.]+)\s+cycles"),
    ("Avg FU Power (mW)", r"^Avg FU Power:\s*([\d.]+)\s+mW"),
    ("Avg FU Dynamic Power (mW)", r"^Avg FU Dynamic Power:\s*([\d.]+)\s+mW"),
    ("Avg FU Leakage Power (mW)", r"^Avg FU leakage Power:\s*([\d.]+)\s+mW"),
    ("Avg MEM Power (mW)", r"^Avg MEM Power:\s*([\d.]+)\s+mW"),
    ("Avg MEM Dynamic Power (mW)", r"^Avg MEM Dynamic Power:\s*([\d.]+)\s+mW"),
    ("Avg MEM Leakage Power (mW)", r"^Avg MEM Leakage Power:\s*([\d.]+)\s+mW"),
    ("Total Area (uM^2)", r"^Total Area:\s*([\d.eE+]+)\s+uM\^2"),
    ("FU Area (uM^2)", r"^FU Area:\s*([\d.eE+]+)\s+uM\^2"),
    ("MEM Area (uM^2)", r"^MEM Area:\s*([\d.eE+]+)\s+uM\^2"),
    ("Num Multipliers", r"^Num of Multipliers \(32-bit\):\s*(\d+)"),
    ("Num Adders", r"^Num of Adders \(32-bit\):\s*(\d+)"),
    ("Num Bit-wise Operators", r"^Num of Bit-wise Operators \(32-bit\):\s*(\d+)"),
    ("Num Shifters", r"^Num of Shifters \(32-bit\):\s*(\d+)"),
    ("Num Registers", r"^Num of Registers \(32-bit\):\s*(\d+)"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_extractor() -> SegmentedBlockExtractor {
        SegmentedBlockExtractor::new(
            BlockMarker::new(["==", "RESULTS"]).unwrap(),
            vec![
                FieldPattern::new("cycles", r"^Cycle\s*:\s*(\d+)").unwrap(),
                FieldPattern::new("power", r"^Power:\s*([\d.]+)").unwrap(),
            ],
        )
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(matches!(
            BlockMarker::new(Vec::<String>::new()),
            Err(ExtractError::EmptyMarker)
        ));
    }

    #[test]
    fn test_pattern_without_capture_rejected() {
        assert!(matches!(
            FieldPattern::new("x", r"^Cycle"),
            Err(ExtractError::MissingCapture { .. })
        ));
        assert!(matches!(
            FieldPattern::new("x", r"(unclosed"),
            Err(ExtractError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_lines_outside_blocks_ignored() {
        let text = "Cycle : 1\n==\nRESULTS\nCycle : 2\n==\nRESULTS\nCycle : 3\n";
        let out = simple_extractor().extract(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("cycles"), Some("2"));
        assert_eq!(out.dangling_lines, None);
    }

    #[test]
    fn test_unterminated_block_dropped() {
        let text = "==\nRESULTS\nCycle : 2\n==\nRESULTS\n==\nRESULTS\nCycle : 3\nPower: 2.0\n";
        let out = simple_extractor().extract(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dangling_lines, Some(2));
    }

    #[test]
    fn test_marker_span_is_skipped() {
        // Closing marker immediately followed by an opening one.
        let text = "==\nRESULTS\nCycle : 5\n==\nRESULTS\n==\nRESULTS\nPower: 1.5\n==\nRESULTS\n";
        let out = simple_extractor().extract(text);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].get("cycles"), Some("5"));
        assert_eq!(out.records[0].get("power"), None);
        assert_eq!(out.records[1].get_f64("power"), Some(1.5));
        assert_eq!(out.dangling_lines, None);
    }

    #[test]
    fn test_partial_marker_is_ordinary_line() {
        let text = "==\nRESULTS\n==\nCycle : 9\n==\nRESULTS\n";
        let out = simple_extractor().extract(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("cycles"), Some("9"));
    }

    #[test]
    fn test_lines_are_trimmed_before_matching() {
        let text = "==\nRESULTS\n   Cycle : 12   \n==\nRESULTS\n";
        let out = simple_extractor().extract(text);
        assert_eq!(out.records[0].get("cycles"), Some("12"));
    }

    #[test]
    fn test_aladdin_patterns_compile() {
        let extractor = SegmentedBlockExtractor::aladdin().expect("patterns should compile");
        assert_eq!(extractor.field_names().len(), ALADDIN_FIELDS.len());
    }

    #[test]
    fn test_write_block_records_empty_cells() {
        let text = "==\nRESULTS\nCycle : 3\n==\nRESULTS\n";
        let extractor = simple_extractor();
        let out = extractor.extract(text);
        let mut buf = Vec::new();
        write_block_records(&mut buf, &extractor.field_names(), &out.records).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "cycles,power\n3,\n");
    }
}
