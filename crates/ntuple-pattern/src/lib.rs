//! N-tuple pattern features for board-game position evaluation.
//!
//! A pattern is a fixed shape of board cells (a diagonal, an edge, a corner
//! block). The joint state of its cells, each empty/own/opponent, is one
//! base-3 number: the pattern's local code. The upstream game-history
//! generator records that code for every pattern under every symmetry
//! variant of the board; this crate turns those codes into sparse feature
//! rows ready for linear regression.
//!
//! # Modules
//!
//! - [`catalog`] - pattern types and the global feature layout
//! - [`record`] - position records and the game-history CSV reader
//! - [`encoder`] - record to sparse row encoding, with row grouping
//! - [`radix`] - digit-string rendering of local codes
//!
//! # Pipeline
//!
//! ```text
//! game-history CSV
//!     ↓ RecordReader
//! PositionRecord
//!     ↓ FeatureEncoder (PatternCatalog, RowGrouping)
//! EncodedRecord: sorted column lists + label
//! ```
//!
//! # Example
//!
//! ```
//! use ntuple_pattern::{
//!     catalog::PatternCatalog,
//!     encoder::{FeatureEncoder, RowGrouping},
//!     record::PositionRecord,
//! };
//!
//! let catalog = PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap();
//! let encoder = FeatureEncoder::new(&catalog, RowGrouping::OneRowPerPosition);
//!
//! // ply 20, final score +12, one symmetry variant, codes 1 and 4
//! let record = PositionRecord::new(1, 20, 12.0, 1, vec![1, 4]);
//! let encoded = encoder.encode(&record).unwrap();
//! assert_eq!(encoded.rows(), [vec![1, 7]]);
//! ```

pub mod catalog;
pub mod encoder;
pub mod radix;
pub mod record;
