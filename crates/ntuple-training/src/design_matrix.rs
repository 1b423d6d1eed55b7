//! Sparse design-matrix assembly.
//!
//! [`DesignMatrix::assemble`] encodes every retained record with a
//! [`FeatureEncoder`] and stacks the resulting rows into one binary matrix
//! in compressed sparse row form, alongside the label of each row. The
//! column count is always the catalog's full feature dimension, so models
//! trained on different record subsets export identically shaped tables.
//!
//! # Parallel encoding
//!
//! Large record sets are split into contiguous chunks and encoded on scoped
//! threads. Workers only read the records and the catalog; each produces a
//! partial matrix, and the parts are appended in record order. The result
//! is identical to sequential encoding, and the malformed record reported
//! is always the first one in input order.
//!
//! # Hold-out split
//!
//! [`DesignMatrix::split`] partitions whole records, never individual rows,
//! so the per-pattern rows of one position always land on the same side.

use std::{num::NonZeroUsize, thread};

use ntuple_pattern::{
    catalog::PatternCatalog,
    encoder::{FeatureEncoder, MalformedRecordError, RowGrouping},
    record::PositionRecord,
};
use rand::{SeedableRng as _, seq::SliceRandom};
use rand_pcg::Pcg64;

/// Records per worker below which spawning another thread is not worth it.
const MIN_RECORDS_PER_WORKER: usize = 4096;

/// Binary sparse matrix in compressed sparse row form.
///
/// Every stored entry has the value 1; only column indices are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseMatrix {
    n_cols: u32,
    row_starts: Vec<usize>,
    columns: Vec<u32>,
}

impl SparseMatrix {
    /// Creates a matrix with zero rows and `n_cols` columns.
    #[must_use]
    pub fn empty(n_cols: u32) -> Self {
        Self {
            n_cols,
            row_starts: vec![0],
            columns: vec![],
        }
    }

    /// Appends a row given by its strictly increasing column indices.
    pub fn push_row(&mut self, columns: &[u32]) {
        assert!(
            columns.is_sorted_by(|a, b| a < b),
            "row columns must be strictly increasing"
        );
        assert!(
            columns.last().is_none_or(|&column| column < self.n_cols),
            "row column out of range"
        );
        self.columns.extend_from_slice(columns);
        self.row_starts.push(self.columns.len());
    }

    /// Appends all rows of `other` below the rows of `self`.
    pub fn append(&mut self, other: &SparseMatrix) {
        assert_eq!(self.n_cols, other.n_cols, "column counts must match");
        let base = self.columns.len();
        self.columns.extend_from_slice(&other.columns);
        self.row_starts
            .extend(other.row_starts[1..].iter().map(|start| base + start));
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.row_starts.len() - 1
    }

    #[must_use]
    pub fn n_cols(&self) -> u32 {
        self.n_cols
    }

    /// Number of stored (nonzero) entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.columns.len()
    }

    /// Column indices of the nonzeros in row `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> &[u32] {
        &self.columns[self.row_starts[index]..self.row_starts[index + 1]]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u32]> + '_ {
        self.row_starts
            .windows(2)
            .map(|bounds| &self.columns[bounds[0]..bounds[1]])
    }

    /// Dense copy of a single row, for inspection.
    #[must_use]
    pub fn row_to_dense(&self, index: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_cols as usize];
        for &column in self.row(index) {
            dense[column as usize] = 1.0;
        }
        dense
    }

    /// New matrix made of the given rows, in the given order.
    #[must_use]
    pub fn select_rows<I>(&self, rows: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut selected = Self::empty(self.n_cols);
        for index in rows {
            selected.push_row(self.row(index));
        }
        selected
    }
}

/// How to carve a hold-out evaluation partition out of a design matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldoutSplit {
    /// The last `eval_fraction` of the records, in input order.
    Positional { eval_fraction: f64 },
    /// A seeded random `eval_fraction` of the records.
    Shuffled { eval_fraction: f64, seed: u64 },
}

impl HoldoutSplit {
    #[must_use]
    pub fn eval_fraction(&self) -> f64 {
        match *self {
            HoldoutSplit::Positional { eval_fraction }
            | HoldoutSplit::Shuffled { eval_fraction, .. } => eval_fraction,
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn eval_record_count(&self, record_count: usize) -> usize {
        let fraction = self.eval_fraction();
        assert!(
            (0.0..=1.0).contains(&fraction),
            "eval fraction must be in [0, 1]"
        );
        ((record_count as f64 * fraction).round() as usize).min(record_count)
    }
}

/// Sparse features and aligned labels for one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    features: SparseMatrix,
    labels: Vec<f64>,
    rows_per_record: usize,
}

impl DesignMatrix {
    /// Encodes `records` into a design matrix.
    ///
    /// The records are used as given; any ply filtering must happen before
    /// this call. Zero records produce a matrix with zero rows.
    pub fn assemble(
        catalog: &PatternCatalog,
        grouping: RowGrouping,
        records: &[PositionRecord],
    ) -> Result<Self, MalformedRecordError> {
        let encoder = FeatureEncoder::new(catalog, grouping);
        let workers = thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(records.len().div_ceil(MIN_RECORDS_PER_WORKER))
            .max(1);

        let mut design = if workers == 1 {
            encode_chunk(encoder, records)?
        } else {
            let chunk_size = records.len().div_ceil(workers);
            let parts: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = records
                    .chunks(chunk_size)
                    .map(|chunk| s.spawn(move || encode_chunk(encoder, chunk)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("encoding worker should not panic"))
                    .collect()
            });
            let mut design = Self::empty(catalog, grouping);
            for part in parts {
                design.append(&part?);
            }
            design
        };
        design.labels.shrink_to_fit();

        log::debug!(
            "assembled {} records into {} rows x {} columns ({} nonzeros)",
            records.len(),
            design.n_rows(),
            design.features.n_cols(),
            design.features.nnz(),
        );
        Ok(design)
    }

    fn empty(catalog: &PatternCatalog, grouping: RowGrouping) -> Self {
        Self {
            features: SparseMatrix::empty(catalog.total_feature_dim()),
            labels: vec![],
            rows_per_record: grouping.rows_per_record(catalog.len()),
        }
    }

    fn append(&mut self, other: &DesignMatrix) {
        self.features.append(&other.features);
        self.labels.extend_from_slice(&other.labels);
    }

    #[must_use]
    pub fn features(&self) -> &SparseMatrix {
        &self.features
    }

    #[must_use]
    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.features.n_rows()
    }

    #[must_use]
    pub fn rows_per_record(&self) -> usize {
        self.rows_per_record
    }

    /// Number of records the matrix was built from.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.n_rows() / self.rows_per_record
    }

    /// Splits into `(train, eval)` partitions of whole records.
    ///
    /// # Panics
    ///
    /// Panics if the eval fraction is outside `[0, 1]`.
    #[must_use]
    pub fn split(&self, split: &HoldoutSplit) -> (Self, Self) {
        let record_count = self.record_count();
        let eval_count = split.eval_record_count(record_count);
        let mut order: Vec<usize> = (0..record_count).collect();
        if let HoldoutSplit::Shuffled { seed, .. } = *split {
            order.shuffle(&mut Pcg64::seed_from_u64(seed));
        }
        let (train, eval) = order.split_at(record_count - eval_count);
        (self.select_records(train), self.select_records(eval))
    }

    fn select_records(&self, records: &[usize]) -> Self {
        let rows_per_record = self.rows_per_record;
        let rows = || {
            records.iter().flat_map(move |&record| {
                record * rows_per_record..(record + 1) * rows_per_record
            })
        };
        Self {
            features: self.features.select_rows(rows()),
            labels: rows().map(|row| self.labels[row]).collect(),
            rows_per_record,
        }
    }
}

fn encode_chunk(
    encoder: FeatureEncoder<'_>,
    records: &[PositionRecord],
) -> Result<DesignMatrix, MalformedRecordError> {
    let mut design = DesignMatrix::empty(encoder.catalog(), encoder.grouping());
    let rows_per_record = encoder.rows_per_record();
    design.labels.reserve(records.len() * rows_per_record);
    design
        .features
        .row_starts
        .reserve(records.len() * rows_per_record);
    for record in records {
        let encoded = encoder.encode(record)?;
        for row in encoded.rows() {
            design.features.push_row(row);
            design.labels.push(encoded.label());
        }
    }
    Ok(design)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_catalog() -> PatternCatalog {
        PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap()
    }

    fn records(count: u64) -> Vec<PositionRecord> {
        (0..count)
            .map(|i| {
                let code = i64::try_from(i).unwrap();
                #[expect(clippy::cast_precision_loss)]
                let score = i as f64;
                PositionRecord::new(i + 1, 20, score, 1, vec![code % 3, code % 9])
            })
            .collect()
    }

    #[test]
    fn test_single_record_example() {
        let catalog = small_catalog();
        let record = PositionRecord::new(1, 20, 6.0, 1, vec![1, 4]);
        let design =
            DesignMatrix::assemble(&catalog, RowGrouping::OneRowPerPosition, &[record]).unwrap();

        assert_eq!(design.n_rows(), 1);
        assert_eq!(design.features().n_cols(), 12);
        assert_eq!(
            design.features().row_to_dense(0),
            [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(design.labels(), [6.0]);
    }

    #[test]
    fn test_per_pattern_grouping_replicates_labels() {
        let catalog = small_catalog();
        let design = DesignMatrix::assemble(
            &catalog,
            RowGrouping::OneRowPerPositionPerPattern,
            &records(3),
        )
        .unwrap();

        assert_eq!(design.n_rows(), 6);
        assert_eq!(design.record_count(), 3);
        assert_eq!(design.labels(), [0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(design.features().row(2), [1]);
        assert_eq!(design.features().row(3), [4]);
    }

    #[test]
    fn test_zero_records_give_empty_matrix() {
        let catalog = PatternCatalog::reference();
        for grouping in [
            RowGrouping::OneRowPerPosition,
            RowGrouping::OneRowPerPositionPerPattern,
        ] {
            let design = DesignMatrix::assemble(&catalog, grouping, &[]).unwrap();
            assert_eq!(design.n_rows(), 0);
            assert_eq!(design.features().n_cols(), 167_265);
            assert!(design.labels().is_empty());
        }
    }

    #[test]
    fn test_parallel_assembly_matches_sequential() {
        let catalog = small_catalog();
        let records = records(3 * MIN_RECORDS_PER_WORKER as u64 + 17);
        let design =
            DesignMatrix::assemble(&catalog, RowGrouping::OneRowPerPosition, &records).unwrap();

        let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
        let sequential = encode_chunk(encoder, &records).unwrap();
        assert_eq!(design, sequential);
        assert_eq!(design.n_rows(), records.len());
    }

    #[test]
    fn test_reports_first_malformed_record() {
        let catalog = small_catalog();
        let mut records = records(2 * MIN_RECORDS_PER_WORKER as u64);
        let last = records.len() - 1;
        records[last] = PositionRecord::new(9999, 20, 0.0, 1, vec![0, 9]);
        records[10] = PositionRecord::new(11, 20, 0.0, 1, vec![3, 0]);

        let err = DesignMatrix::assemble(&catalog, RowGrouping::OneRowPerPosition, &records)
            .unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::CodeOutOfRange { record_id: 11, .. }
        ));
    }

    #[test]
    fn test_positional_split_keeps_order() {
        let catalog = small_catalog();
        let design = DesignMatrix::assemble(
            &catalog,
            RowGrouping::OneRowPerPositionPerPattern,
            &records(10),
        )
        .unwrap();

        let (train, eval) = design.split(&HoldoutSplit::Positional { eval_fraction: 0.2 });
        assert_eq!(train.record_count(), 8);
        assert_eq!(eval.record_count(), 2);
        assert_eq!(eval.labels(), [8.0, 8.0, 9.0, 9.0]);
        assert_eq!(train.labels()[..4], [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_shuffled_split_is_seeded_and_keeps_records_whole() {
        let catalog = small_catalog();
        let design = DesignMatrix::assemble(
            &catalog,
            RowGrouping::OneRowPerPositionPerPattern,
            &records(50),
        )
        .unwrap();
        let split = HoldoutSplit::Shuffled {
            eval_fraction: 0.3,
            seed: 7,
        };

        let (train_a, eval_a) = design.split(&split);
        let (train_b, eval_b) = design.split(&split);
        assert_eq!(train_a, train_b);
        assert_eq!(eval_a, eval_b);
        assert_eq!(eval_a.record_count(), 15);
        assert_eq!(train_a.record_count() + eval_a.record_count(), 50);

        for pair in eval_a.labels().chunks_exact(2) {
            assert!((pair[0] - pair[1]).abs() < f64::EPSILON);
        }
        let mut seen: Vec<f64> = train_a
            .labels()
            .iter()
            .chain(eval_a.labels())
            .step_by(2)
            .copied()
            .collect();
        seen.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (0..50).map(f64::from).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_split_with_no_holdout() {
        let catalog = small_catalog();
        let design =
            DesignMatrix::assemble(&catalog, RowGrouping::OneRowPerPosition, &records(4))
                .unwrap();
        let (train, eval) = design.split(&HoldoutSplit::Positional { eval_fraction: 0.0 });
        assert_eq!(train, design);
        assert_eq!(eval.n_rows(), 0);
        assert_eq!(eval.features().n_cols(), 12);
    }

    #[test]
    fn test_sparse_matrix_append_and_select() {
        let mut a = SparseMatrix::empty(5);
        a.push_row(&[0, 3]);
        a.push_row(&[]);
        let mut b = SparseMatrix::empty(5);
        b.push_row(&[1, 2, 4]);
        a.append(&b);

        assert_eq!(a.n_rows(), 3);
        assert_eq!(a.nnz(), 5);
        let rows: Vec<_> = a.rows().collect();
        assert_eq!(rows, [&[0, 3][..], &[][..], &[1, 2, 4][..]]);

        let selected = a.select_rows([2, 0]);
        assert_eq!(selected.row(0), [1, 2, 4]);
        assert_eq!(selected.row(1), [0, 3]);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_sparse_matrix_rejects_unsorted_rows() {
        let mut matrix = SparseMatrix::empty(5);
        matrix.push_row(&[3, 1]);
    }
}
