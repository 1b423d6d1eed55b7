//! Coefficient export.
//!
//! A fitted coefficient vector is laid out like the catalog's feature
//! space: entry `offset(p) + i` is the weight of local index `i` of pattern
//! `p`. [`CoefficientTable`] spells that layout out row by row, one row per
//! global index and in global-index order, so the table and the flat weight
//! dump can be read as parallel arrays.
//!
//! ```text
//! pattern_id,pattern_name,local_index,ternary,weight
//! 0,diag4,0,0,0.0123
//! 0,diag4,1,1,-0.0871
//! ...
//! ```

use std::io;

use ntuple_pattern::{
    catalog::{CELL_STATES, PatternCatalog},
    radix,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ExportError {
    #[display("catalog has {expected} features but {actual} coefficients were given")]
    CoefficientCountMismatch { expected: usize, actual: usize },
    #[display(
        "table row {row} is ({pattern_id}, {local_index}), expected ({expected_pattern_id}, {expected_local_index})"
    )]
    RowMismatch {
        row: usize,
        pattern_id: usize,
        local_index: u32,
        expected_pattern_id: usize,
        expected_local_index: u32,
    },
    #[display("coefficient table I/O failed: {_0}")]
    Csv(csv::Error),
    #[display("weight dump I/O failed: {_0}")]
    Io(io::Error),
}

/// One exported coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub pattern_id: usize,
    pub pattern_name: String,
    pub local_index: u32,
    /// `local_index` in base 3, most significant cell first.
    pub ternary: String,
    pub weight: f64,
}

/// Fitted weights keyed by `(pattern_id, local_index)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    offsets: Vec<usize>,
    rows: Vec<CoefficientRow>,
}

impl CoefficientTable {
    /// Lays `coefficients` out against `catalog`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ntuple_pattern::catalog::PatternCatalog;
    /// use ntuple_training::export::CoefficientTable;
    ///
    /// let catalog = PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap();
    /// let table = CoefficientTable::from_coefficients(&catalog, &[0.5; 12]).unwrap();
    /// assert_eq!(table.len(), 12);
    /// assert_eq!(table.get(1, 4).unwrap().ternary, "11");
    /// ```
    pub fn from_coefficients(
        catalog: &PatternCatalog,
        coefficients: &[f64],
    ) -> Result<Self, ExportError> {
        let expected = catalog.total_feature_dim() as usize;
        if coefficients.len() != expected {
            return Err(ExportError::CoefficientCountMismatch {
                expected,
                actual: coefficients.len(),
            });
        }

        let mut rows = Vec::with_capacity(expected);
        for pattern in catalog.patterns() {
            let columns = pattern.columns();
            let weights = &coefficients[columns.start as usize..columns.end as usize];
            rows.extend((0..pattern.space_size()).zip(weights).map(
                |(local_index, &weight)| CoefficientRow {
                    pattern_id: pattern.id(),
                    pattern_name: pattern.name().to_owned(),
                    local_index,
                    ternary: radix::to_radix_string(u64::from(local_index), CELL_STATES),
                    weight,
                },
            ));
        }
        Ok(Self {
            offsets: offsets(catalog),
            rows,
        })
    }

    /// Reads a table written by [`write_csv`](Self::write_csv).
    ///
    /// Every row must sit at the position its `(pattern_id, local_index)`
    /// takes in `catalog`.
    pub fn read_csv<R>(catalog: &PatternCatalog, reader: R) -> Result<Self, ExportError>
    where
        R: io::Read,
    {
        let rows = csv::Reader::from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<CoefficientRow>, _>>()
            .map_err(ExportError::Csv)?;

        let expected = catalog.total_feature_dim() as usize;
        if rows.len() != expected {
            return Err(ExportError::CoefficientCountMismatch {
                expected,
                actual: rows.len(),
            });
        }
        for (index, (row, global)) in rows.iter().zip(0..).enumerate() {
            let (expected_pattern_id, expected_local_index) = catalog
                .locate(global)
                .expect("row count matches the feature dimension");
            if (row.pattern_id, row.local_index) != (expected_pattern_id, expected_local_index) {
                return Err(ExportError::RowMismatch {
                    row: index,
                    pattern_id: row.pattern_id,
                    local_index: row.local_index,
                    expected_pattern_id,
                    expected_local_index,
                });
            }
        }
        Ok(Self {
            offsets: offsets(catalog),
            rows,
        })
    }

    #[must_use]
    pub fn rows(&self) -> &[CoefficientRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn get(&self, pattern_id: usize, local_index: u32) -> Option<&CoefficientRow> {
        let row = self
            .rows
            .get(self.offsets.get(pattern_id)? + local_index as usize)?;
        (row.pattern_id == pattern_id).then_some(row)
    }

    /// The weight column, in row order.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.weight).collect()
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W>(&self, writer: W) -> Result<(), ExportError>
    where
        W: io::Write,
    {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(row).map_err(ExportError::Csv)?;
        }
        writer.flush().map_err(ExportError::Io)
    }

    /// Writes one weight per line with `precision` fractional digits.
    pub fn write_flat_weights<W>(&self, mut writer: W, precision: usize) -> Result<(), ExportError>
    where
        W: io::Write,
    {
        for row in &self.rows {
            writeln!(writer, "{:.*}", precision, row.weight).map_err(ExportError::Io)?;
        }
        writer.flush().map_err(ExportError::Io)
    }
}

fn offsets(catalog: &PatternCatalog) -> Vec<usize> {
    catalog
        .patterns()
        .iter()
        .map(|pattern| pattern.offset() as usize)
        .collect()
}
