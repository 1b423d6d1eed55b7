//! Pattern catalog: the static layout of the global feature space.
//!
//! A catalog is an ordered list of pattern types. Each pattern type covers
//! `cell_count` board cells, so its joint state is a base-3 number in
//! `[0, 3^cell_count)`. Pattern types are laid out back to back in one
//! global feature space:
//!
//! ```text
//! global index:  0 ........ 81 ......... 324 ........ 1053 ...
//!                | diag4    | diag5      | diag6      | ...
//!                offset[0]  offset[1]    offset[2]
//! ```
//!
//! `offset[i + 1] == offset[i] + space_size[i]` always holds, and the
//! column dimension of every design matrix built against the catalog is
//! [`PatternCatalog::total_feature_dim`], whether or not a column is ever
//! populated.
//!
//! # Example
//!
//! ```
//! use ntuple_pattern::catalog::PatternCatalog;
//!
//! let catalog = PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap();
//! assert_eq!(catalog.total_feature_dim(), 12);
//! assert_eq!(catalog.global_index(1, 4), Some(7));
//! assert_eq!(catalog.locate(7), Some((1, 4)));
//! ```

use std::{collections::HashSet, iter, ops::Range};

use serde::{Deserialize, Serialize};

/// Number of states a board cell can take: empty, own disc, opponent disc.
pub const CELL_STATES: u32 = 3;

/// Names and cell counts of the reference Othello catalog.
const REFERENCE_PATTERNS: [(&str, u32); 11] = [
    ("diag4", 4),
    ("diag5", 5),
    ("diag6", 6),
    ("diag7", 7),
    ("diag8", 8),
    ("hor_vert2", 8),
    ("hor_vert3", 8),
    ("hor_vert4", 8),
    ("edge_2x", 10),
    ("corner_2x5", 10),
    ("corner_3x3", 9),
];

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("pattern catalog is empty")]
    EmptyCatalog,
    #[display("pattern catalog has {names} names but {cell_counts} cell counts")]
    LengthMismatch { names: usize, cell_counts: usize },
    #[display("pattern '{name}' must cover at least one cell")]
    EmptyPattern { name: String },
    #[display("pattern name '{name}' is used more than once")]
    DuplicateName { name: String },
    #[display("feature space overflows 32-bit column indices at pattern '{name}'")]
    FeatureSpaceOverflow { name: String },
}

/// User-facing description of one pattern type, as found in catalog files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub cell_count: u32,
}

/// One pattern type with its precomputed place in the global feature space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternType {
    id: usize,
    name: String,
    cell_count: u32,
    space_size: u32,
    offset: u32,
}

impl PatternType {
    /// Position of this pattern type in catalog order.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    /// Number of distinct local codes, `3^cell_count`.
    #[must_use]
    pub fn space_size(&self) -> u32 {
        self.space_size
    }

    /// First global feature index owned by this pattern type.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Global feature indices owned by this pattern type.
    #[must_use]
    pub fn columns(&self) -> Range<u32> {
        self.offset..self.offset + self.space_size
    }

    /// Maps a local code to its global column, or `None` when the code is
    /// outside `[0, space_size)`.
    #[must_use]
    pub fn column_of(&self, local_index: i64) -> Option<u32> {
        let local_index = u32::try_from(local_index).ok()?;
        (local_index < self.space_size).then_some(self.offset + local_index)
    }
}

/// Immutable, ordered collection of pattern types.
///
/// Serializes as a list of [`PatternSpec`]s; deserialization re-validates
/// the list and recomputes offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PatternSpec>", into = "Vec<PatternSpec>")]
pub struct PatternCatalog {
    patterns: Vec<PatternType>,
    total_feature_dim: u32,
}

impl PatternCatalog {
    /// Builds a catalog from parallel lists of names and cell counts.
    pub fn new<S>(names: &[S], cell_counts: &[u32]) -> Result<Self, ConfigError>
    where
        S: AsRef<str>,
    {
        if names.len() != cell_counts.len() {
            return Err(ConfigError::LengthMismatch {
                names: names.len(),
                cell_counts: cell_counts.len(),
            });
        }
        Self::from_specs(iter::zip(names, cell_counts).map(|(name, &cell_count)| PatternSpec {
            name: name.as_ref().to_owned(),
            cell_count,
        }))
    }

    /// Builds a catalog from pattern specs in catalog order.
    pub fn from_specs<I>(specs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = PatternSpec>,
    {
        let mut patterns = vec![];
        let mut seen_names = HashSet::new();
        let mut offset = 0_u32;
        for (id, PatternSpec { name, cell_count }) in specs.into_iter().enumerate() {
            if cell_count == 0 {
                return Err(ConfigError::EmptyPattern { name });
            }
            if !seen_names.insert(name.clone()) {
                return Err(ConfigError::DuplicateName { name });
            }
            let Some(space_size) = CELL_STATES.checked_pow(cell_count) else {
                return Err(ConfigError::FeatureSpaceOverflow { name });
            };
            let Some(next_offset) = offset.checked_add(space_size) else {
                return Err(ConfigError::FeatureSpaceOverflow { name });
            };
            patterns.push(PatternType {
                id,
                name,
                cell_count,
                space_size,
                offset,
            });
            offset = next_offset;
        }
        if patterns.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(Self {
            patterns,
            total_feature_dim: offset,
        })
    }

    /// The 11-pattern Othello catalog used by the reference game histories.
    #[must_use]
    pub fn reference() -> Self {
        let (names, cell_counts): (Vec<_>, Vec<_>) = REFERENCE_PATTERNS.into_iter().unzip();
        Self::new(&names, &cell_counts).expect("reference catalog should be valid")
    }

    #[must_use]
    pub fn patterns(&self) -> &[PatternType] {
        &self.patterns
    }

    #[must_use]
    pub fn get(&self, pattern_id: usize) -> Option<&PatternType> {
        self.patterns.get(pattern_id)
    }

    /// Number of pattern types (N).
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Sum of all pattern space sizes; the design matrix column count.
    #[must_use]
    pub fn total_feature_dim(&self) -> u32 {
        self.total_feature_dim
    }

    /// Global feature index of `(pattern_id, local_index)`.
    #[must_use]
    pub fn global_index(&self, pattern_id: usize, local_index: u32) -> Option<u32> {
        self.get(pattern_id)?.column_of(i64::from(local_index))
    }

    /// Inverse of [`Self::global_index`].
    #[must_use]
    pub fn locate(&self, global_index: u32) -> Option<(usize, u32)> {
        if global_index >= self.total_feature_dim {
            return None;
        }
        let id = self
            .patterns
            .partition_point(|pattern| pattern.offset <= global_index)
            - 1;
        Some((id, global_index - self.patterns[id].offset))
    }

    #[must_use]
    pub fn specs(&self) -> Vec<PatternSpec> {
        self.patterns
            .iter()
            .map(|pattern| PatternSpec {
                name: pattern.name.clone(),
                cell_count: pattern.cell_count,
            })
            .collect()
    }
}

impl TryFrom<Vec<PatternSpec>> for PatternCatalog {
    type Error = ConfigError;

    fn try_from(specs: Vec<PatternSpec>) -> Result<Self, Self::Error> {
        Self::from_specs(specs)
    }
}

impl From<PatternCatalog> for Vec<PatternSpec> {
    fn from(catalog: PatternCatalog) -> Self {
        catalog.specs()
    }
}
