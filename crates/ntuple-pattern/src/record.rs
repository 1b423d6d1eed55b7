//! Position records read from game-history files.
//!
//! A game-history file is headerless CSV of integers, one row per recorded
//! position. The upstream generator fixes the column order; this module
//! only needs to know where the ply, the final score and the first pattern
//! code live, and how many symmetry variants each pattern is read under.
//!
//! ```text
//! ply, score, p0/v0, p1/v0, ..., pN-1/v0, p0/v1, ..., pN-1/vV-1
//! ```
//!
//! Codes are grouped in variant-major blocks of `N` codes each. Extra
//! trailing columns are ignored.
//!
//! Codes are kept as signed integers exactly as read. Range checking is the
//! encoder's job, so that a bad code is reported together with its pattern
//! and variant instead of as a generic parse failure.

use std::{io, str::FromStr};

/// Column positions of one game-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Column holding the ply (move number) of the position.
    pub ply_column: usize,
    /// Column holding the final score, used as the regression label.
    pub score_column: usize,
    /// Column of the first pattern code.
    pub codes_column: usize,
    /// Number of symmetry variants per pattern.
    pub variant_count: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            ply_column: 0,
            score_column: 1,
            codes_column: 2,
            variant_count: 4,
        }
    }
}

impl RecordLayout {
    /// Minimum number of columns a row needs for `pattern_count` patterns.
    #[must_use]
    pub fn required_columns(&self, pattern_count: usize) -> usize {
        let codes_end = self.codes_column + pattern_count * self.variant_count;
        codes_end
            .max(self.ply_column + 1)
            .max(self.score_column + 1)
    }
}

/// One recorded position: identifier, ply, label and pattern codes.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    id: u64,
    ply: u32,
    score: f64,
    variant_count: usize,
    codes: Vec<i64>,
}

impl PositionRecord {
    /// Creates a record from variant-major codes.
    ///
    /// `codes[variant * pattern_count + pattern]` is the code of `pattern`
    /// under `variant`.
    ///
    /// # Panics
    ///
    /// Panics if `variant_count` is zero.
    #[must_use]
    pub fn new(id: u64, ply: u32, score: f64, variant_count: usize, codes: Vec<i64>) -> Self {
        assert!(variant_count > 0, "records need at least one variant");
        Self {
            id,
            ply,
            score,
            variant_count,
            codes,
        }
    }

    /// Identifier assigned by the reader; see [`RecordReader::with_first_id`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn ply(&self) -> u32 {
        self.ply
    }

    /// Final score of the game from the recorded side's point of view.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variant_count
    }

    /// All codes, variant-major.
    #[must_use]
    pub fn codes(&self) -> &[i64] {
        &self.codes
    }

    /// Codes of every pattern under one symmetry variant, in catalog order.
    ///
    /// Trailing codes that do not fill a whole block are not yielded.
    pub fn variants(&self) -> impl Iterator<Item = &[i64]> + '_ {
        let pattern_count = self.codes.len() / self.variant_count;
        self.codes.chunks_exact(pattern_count.max(1))
    }
}

/// Inclusive ply bounds used to drop opening-book and solved-endgame
/// positions before training.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlyRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl PlyRange {
    #[must_use]
    pub fn contains(&self, record: &PositionRecord) -> bool {
        let ply = record.ply();
        self.min.is_none_or(|min| ply >= min) && self.max.is_none_or(|max| ply <= max)
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ReadRecordError {
    #[display("failed to read game history: {_0}")]
    Csv(csv::Error),
    #[display("line {line}: expected at least {expected} columns, found {actual}")]
    MissingColumns {
        line: u64,
        expected: usize,
        actual: usize,
    },
    #[display("line {line}, column {column}: '{value}' is not a valid number")]
    InvalidField {
        line: u64,
        column: usize,
        value: String,
    },
    #[display("line {line}, column {column}: score '{value}' is not finite")]
    NonFiniteScore {
        line: u64,
        column: usize,
        value: String,
    },
}

/// Streaming reader of position records.
///
/// Record identifiers default to the 1-based line number. When several
/// sources feed one run, [`with_first_id`](Self::with_first_id) keeps them
/// distinct.
#[derive(Debug)]
pub struct RecordReader<R> {
    reader: csv::Reader<R>,
    layout: RecordLayout,
    pattern_count: usize,
    first_id: u64,
    row: csv::StringRecord,
}

impl<R> RecordReader<R>
where
    R: io::Read,
{
    #[must_use]
    pub fn new(source: R, layout: RecordLayout, pattern_count: usize) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        Self {
            reader,
            layout,
            pattern_count,
            first_id: 1,
            row: csv::StringRecord::new(),
        }
    }

    /// Numbers records so that line 1 gets `first_id`, line 2 `first_id + 1`,
    /// and so on.
    #[must_use]
    pub fn with_first_id(mut self, first_id: u64) -> Self {
        self.first_id = first_id;
        self
    }

    fn parse_row(&self) -> Result<PositionRecord, ReadRecordError> {
        let row = &self.row;
        let line = row.position().map_or(0, csv::Position::line);
        let expected = self.layout.required_columns(self.pattern_count);
        if row.len() < expected {
            return Err(ReadRecordError::MissingColumns {
                line,
                expected,
                actual: row.len(),
            });
        }

        let ply = parse_field(row, line, self.layout.ply_column)?;
        let score: f64 = parse_field(row, line, self.layout.score_column)?;
        if !score.is_finite() {
            return Err(ReadRecordError::NonFiniteScore {
                line,
                column: self.layout.score_column,
                value: row[self.layout.score_column].to_owned(),
            });
        }
        let codes_end = self.layout.codes_column + self.pattern_count * self.layout.variant_count;
        let codes = (self.layout.codes_column..codes_end)
            .map(|column| parse_field(row, line, column))
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(PositionRecord::new(
            self.first_id + line.saturating_sub(1),
            ply,
            score,
            self.layout.variant_count,
            codes,
        ))
    }
}

impl<R> Iterator for RecordReader<R>
where
    R: io::Read,
{
    type Item = Result<PositionRecord, ReadRecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.row) {
            Ok(false) => None,
            Ok(true) => Some(self.parse_row()),
            Err(e) => Some(Err(ReadRecordError::Csv(e))),
        }
    }
}

/// Reads every record from `source`, stopping at the first error.
pub fn read_records<R>(
    source: R,
    layout: RecordLayout,
    pattern_count: usize,
) -> Result<Vec<PositionRecord>, ReadRecordError>
where
    R: io::Read,
{
    RecordReader::new(source, layout, pattern_count).collect()
}

fn parse_field<T>(row: &csv::StringRecord, line: u64, column: usize) -> Result<T, ReadRecordError>
where
    T: FromStr,
{
    let value = &row[column];
    value.parse().map_err(|_| ReadRecordError::InvalidField {
        line,
        column,
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PATTERN_LAYOUT: RecordLayout = RecordLayout {
        ply_column: 0,
        score_column: 1,
        codes_column: 2,
        variant_count: 2,
    };

    #[test]
    fn test_reads_variant_major_codes() {
        let data = "12,-40,1,4,2,8\n13,40,0,0,1,1\n";
        let records = read_records(data.as_bytes(), TWO_PATTERN_LAYOUT, 2).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id(), 1);
        assert_eq!(first.ply(), 12);
        assert!((first.score() - -40.0).abs() < f64::EPSILON);
        let variants: Vec<_> = first.variants().collect();
        assert_eq!(variants, [&[1_i64, 4][..], &[2_i64, 8][..]]);

        assert_eq!(records[1].id(), 2);
    }

    #[test]
    fn test_custom_layout_and_extra_columns() {
        let layout = RecordLayout {
            ply_column: 1,
            score_column: 2,
            codes_column: 3,
            variant_count: 1,
        };
        let data = "7, 30, 5, 2, 6, 99\n";
        let records = read_records(data.as_bytes(), layout, 2).unwrap();
        assert_eq!(records[0].ply(), 30);
        assert!((records[0].score() - 5.0).abs() < f64::EPSILON);
        assert_eq!(records[0].codes(), [2_i64, 6]);
    }

    #[test]
    fn test_keeps_negative_codes_for_the_encoder() {
        let data = "1,0,-1,3,0,0\n";
        let records = read_records(data.as_bytes(), TWO_PATTERN_LAYOUT, 2).unwrap();
        assert_eq!(records[0].codes()[0], -1);
    }

    #[test]
    fn test_reports_short_rows() {
        let data = "1,0,1,2,0,0\n2,0,1\n";
        let err = read_records(data.as_bytes(), TWO_PATTERN_LAYOUT, 2).unwrap_err();
        assert!(matches!(
            err,
            ReadRecordError::MissingColumns {
                line: 2,
                expected: 6,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_reports_non_numeric_fields() {
        let data = "1,0,1,x,0,0\n";
        let err = read_records(data.as_bytes(), TWO_PATTERN_LAYOUT, 2).unwrap_err();
        assert!(matches!(
            err,
            ReadRecordError::InvalidField { line: 1, column: 3, ref value } if value == "x"
        ));
    }

    #[test]
    fn test_rejects_non_finite_scores() {
        for score in ["NaN", "inf", "-inf"] {
            let data = format!("1,5,0,0,0,0\n2,{score},0,0,0,0\n");
            let err = read_records(data.as_bytes(), TWO_PATTERN_LAYOUT, 2).unwrap_err();
            assert!(
                matches!(
                    err,
                    ReadRecordError::NonFiniteScore { line: 2, column: 1, ref value } if value == score
                ),
                "{err}"
            );
        }
    }

    #[test]
    fn test_first_id_keeps_sources_distinct() {
        let first = "1,3,0,0,0,0\n2,4,0,0,0,0\n";
        let second = "3,5,0,0,0,0\n4,6,0,0,0,0\n";
        let ids = |data: &str, first_id| {
            RecordReader::new(data.as_bytes(), TWO_PATTERN_LAYOUT, 2)
                .with_first_id(first_id)
                .map(|record| record.unwrap().id())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(first, 1), [1, 2]);
        assert_eq!(ids(second, 3), [3, 4]);
    }

    #[test]
    #[should_panic(expected = "at least one variant")]
    fn test_record_needs_a_variant() {
        let _ = PositionRecord::new(1, 0, 0.0, 0, vec![]);
    }

    #[test]
    fn test_ply_range_is_inclusive_and_optional() {
        let record = |ply| PositionRecord::new(0, ply, 0.0, 1, vec![0]);
        let range = PlyRange {
            min: Some(10),
            max: Some(50),
        };
        assert!(!range.contains(&record(9)));
        assert!(range.contains(&record(10)));
        assert!(range.contains(&record(50)));
        assert!(!range.contains(&record(51)));

        let open = PlyRange::default();
        assert!(open.contains(&record(0)));
        assert!(open.contains(&record(u32::MAX)));
    }

    #[test]
    fn test_required_columns() {
        let layout = RecordLayout::default();
        assert_eq!(layout.required_columns(11), 2 + 44);
        let reversed = RecordLayout {
            ply_column: 9,
            score_column: 8,
            codes_column: 0,
            variant_count: 1,
        };
        assert_eq!(reversed.required_columns(2), 10);
    }
}
