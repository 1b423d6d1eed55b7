//! Sparse feature encoding of position records.
//!
//! Every (pattern, variant) code of a record turns into one column of the
//! global feature space: `pattern.offset + code`. The offset is applied to
//! each variant block separately, so a record read under any number of
//! symmetry variants maps onto the same per-pattern segments.
//!
//! Columns are presence indicators. Two variants of the same pattern that
//! land on the same code produce one nonzero, not two.
//!
//! # Row grouping
//!
//! ```text
//! OneRowPerPosition             OneRowPerPositionPerPattern
//! row k:  all hits of record k  row k*N + p: hits of pattern p in record k
//! ```

use serde::{Deserialize, Serialize};

use crate::{catalog::PatternCatalog, record::PositionRecord};

/// How encoded hits are grouped into design-matrix rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowGrouping {
    /// One row per record holding every pattern's hits.
    OneRowPerPosition,
    /// One row per (record, pattern type) holding that pattern's variants.
    #[default]
    OneRowPerPositionPerPattern,
}

impl RowGrouping {
    /// Rows produced for each record under a catalog of `pattern_count` types.
    #[must_use]
    pub fn rows_per_record(self, pattern_count: usize) -> usize {
        match self {
            RowGrouping::OneRowPerPosition => 1,
            RowGrouping::OneRowPerPositionPerPattern => pattern_count,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum MalformedRecordError {
    #[display("record {record_id}: expected {expected} pattern codes, found {actual}")]
    CodeCountMismatch {
        record_id: u64,
        expected: usize,
        actual: usize,
    },
    #[display(
        "record {record_id}: code {code} of pattern {pattern_id} (variant {variant}) is outside [0, {space_size})"
    )]
    CodeOutOfRange {
        record_id: u64,
        pattern_id: usize,
        variant: usize,
        code: i64,
        space_size: u32,
    },
}

impl MalformedRecordError {
    /// Identifier of the offending record.
    #[must_use]
    pub fn record_id(&self) -> u64 {
        match self {
            Self::CodeCountMismatch { record_id, .. } | Self::CodeOutOfRange { record_id, .. } => {
                *record_id
            }
        }
    }
}

/// Design-matrix rows and label generated from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord {
    label: f64,
    rows: Vec<Vec<u32>>,
}

impl EncodedRecord {
    #[must_use]
    pub fn label(&self) -> f64 {
        self.label
    }

    /// Sorted, duplicate-free column lists, one per generated row.
    #[must_use]
    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<u32>> {
        self.rows
    }

    /// `(row, column)` pairs for the record at `position_index`.
    pub fn coordinates(&self, position_index: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        let first_row = position_index * self.rows.len();
        self.rows.iter().enumerate().flat_map(move |(i, columns)| {
            columns.iter().map(move |&column| (first_row + i, column))
        })
    }
}

/// Maps position records to sparse rows against a fixed catalog.
#[derive(Debug, Clone, Copy)]
pub struct FeatureEncoder<'a> {
    catalog: &'a PatternCatalog,
    grouping: RowGrouping,
}

impl<'a> FeatureEncoder<'a> {
    #[must_use]
    pub fn new(catalog: &'a PatternCatalog, grouping: RowGrouping) -> Self {
        Self { catalog, grouping }
    }

    #[must_use]
    pub fn catalog(&self) -> &'a PatternCatalog {
        self.catalog
    }

    #[must_use]
    pub fn grouping(&self) -> RowGrouping {
        self.grouping
    }

    #[must_use]
    pub fn rows_per_record(&self) -> usize {
        self.grouping.rows_per_record(self.catalog.len())
    }

    /// Encodes one record.
    ///
    /// Fails on the first code (in pattern, then variant order) that lies
    /// outside its pattern's space, or when the record does not carry
    /// exactly one code per pattern and variant.
    pub fn encode(&self, record: &PositionRecord) -> Result<EncodedRecord, MalformedRecordError> {
        let expected = self.catalog.len() * record.variant_count();
        if record.codes().len() != expected {
            return Err(MalformedRecordError::CodeCountMismatch {
                record_id: record.id(),
                expected,
                actual: record.codes().len(),
            });
        }

        let mut rows = vec![Vec::with_capacity(record.variant_count()); self.rows_per_record()];
        for pattern in self.catalog.patterns() {
            let row = match self.grouping {
                RowGrouping::OneRowPerPosition => &mut rows[0],
                RowGrouping::OneRowPerPositionPerPattern => &mut rows[pattern.id()],
            };
            for (variant, codes) in record.variants().enumerate() {
                let code = codes[pattern.id()];
                let column =
                    pattern
                        .column_of(code)
                        .ok_or(MalformedRecordError::CodeOutOfRange {
                            record_id: record.id(),
                            pattern_id: pattern.id(),
                            variant,
                            code,
                            space_size: pattern.space_size(),
                        })?;
                row.push(column);
            }
        }
        for row in &mut rows {
            row.sort_unstable();
            row.dedup();
        }

        Ok(EncodedRecord {
            label: record.score(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn small_catalog() -> PatternCatalog {
        PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap()
    }

    #[test]
    fn test_one_row_per_position_example() {
        let catalog = small_catalog();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
        let record = PositionRecord::new(1, 20, 12.0, 1, vec![1, 4]);

        let encoded = encoder.encode(&record).unwrap();
        assert_eq!(encoded.rows(), [vec![1, 7]]);
        assert!((encoded.label() - 12.0).abs() < f64::EPSILON);

        let pairs: Vec<_> = encoded.coordinates(0).collect();
        assert_eq!(pairs, [(0, 1), (0, 7)]);
    }

    #[test]
    fn test_per_pattern_rows_hold_only_their_variants() {
        let catalog = small_catalog();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPositionPerPattern);
        // variant 0: (2, 8), variant 1: (0, 3)
        let record = PositionRecord::new(5, 20, -4.0, 2, vec![2, 8, 0, 3]);

        let encoded = encoder.encode(&record).unwrap();
        assert_eq!(encoded.rows(), [vec![0, 2], vec![6, 11]]);

        let pairs: Vec<_> = encoded.coordinates(3).collect();
        assert_eq!(pairs, [(6, 0), (6, 2), (7, 6), (7, 11)]);
    }

    #[test]
    fn test_symmetry_collisions_collapse() {
        let catalog = small_catalog();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
        let record = PositionRecord::new(1, 20, 0.0, 4, vec![1, 4, 1, 4, 1, 5, 1, 4]);

        let encoded = encoder.encode(&record).unwrap();
        assert_eq!(encoded.rows(), [vec![1, 7, 8]]);
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let catalog = PatternCatalog::reference();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
        let codes = (0..44).map(|i| (i * 7) % 81).collect();
        let record = PositionRecord::new(1, 30, 8.0, 4, codes);

        let first: BTreeSet<_> = encoder.encode(&record).unwrap().coordinates(0).collect();
        let second: BTreeSet<_> = encoder.encode(&record).unwrap().coordinates(0).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_columns_stay_in_pattern_segment() {
        let catalog = PatternCatalog::reference();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPositionPerPattern);
        let codes = (0..4)
            .flat_map(|variant| {
                catalog
                    .patterns()
                    .iter()
                    .map(move |p| i64::from(p.space_size()) - 1 - variant)
            })
            .collect();
        let record = PositionRecord::new(1, 30, 0.0, 4, codes);

        let encoded = encoder.encode(&record).unwrap();
        for (pattern, row) in catalog.patterns().iter().zip(encoded.rows()) {
            assert_eq!(row.len(), 4);
            for column in row {
                assert!(pattern.columns().contains(column));
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_codes() {
        let catalog = small_catalog();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);

        let too_large = PositionRecord::new(42, 20, 0.0, 2, vec![0, 0, 1, 9]);
        let err = encoder.encode(&too_large).unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::CodeOutOfRange {
                record_id: 42,
                pattern_id: 1,
                variant: 1,
                code: 9,
                space_size: 9,
            }
        ));

        let negative = PositionRecord::new(43, 20, 0.0, 1, vec![-1, 0]);
        let err = encoder.encode(&negative).unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::CodeOutOfRange {
                record_id: 43,
                code: -1,
                ..
            }
        ));
        assert_eq!(err.record_id(), 43);
    }

    #[test]
    fn test_rejects_wrong_code_count() {
        let catalog = small_catalog();
        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
        let record = PositionRecord::new(7, 20, 0.0, 2, vec![0, 0, 0]);
        let err = encoder.encode(&record).unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::CodeCountMismatch {
                record_id: 7,
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_rows_per_record() {
        assert_eq!(RowGrouping::OneRowPerPosition.rows_per_record(11), 1);
        assert_eq!(RowGrouping::OneRowPerPositionPerPattern.rows_per_record(11), 11);
    }
}
