//! Core data model: column descriptors, schemas, packed identities and cell records.
//!
//! A [`Schema`] is an ordered list of [`Tag`]s plus a provenance log. Every [`Cell`] that flows
//! under a schema carries a feature vector aligned 1:1 with the schema's
//! [`TagCategory::FeatureColumn`] tags. Meta and graph tags describe the table but carry no
//! per-record values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural flag bit set by the ROI stage when labeling is enabled.
///
/// Lives in the upper half of the flag space so it stays disjoint from gate-derived phenotype
/// bits (declared from bit 0 upward) when both masks are combined for selection.
pub const ROI_FLAG: u64 = 1 << 32;

/// Category of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagCategory {
    /// Numeric per-cell measurement (a marker). Aligned with the feature vector.
    FeatureColumn,
    /// Table-level metadata column.
    MetaColumn,
    /// Descriptor of auxiliary adjacency/graph data.
    GraphColumn,
}

/// A single named column descriptor in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Column name.
    pub name: String,
    /// Column category.
    pub category: TagCategory,
}

impl Tag {
    /// Create a new tag.
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    /// Shorthand for a [`TagCategory::FeatureColumn`] tag.
    pub fn feature(name: impl Into<String>) -> Self {
        Self::new(name, TagCategory::FeatureColumn)
    }

    /// Shorthand for a [`TagCategory::MetaColumn`] tag.
    pub fn meta(name: impl Into<String>) -> Self {
        Self::new(name, TagCategory::MetaColumn)
    }

    /// Shorthand for a [`TagCategory::GraphColumn`] tag.
    pub fn graph(name: impl Into<String>) -> Self {
        Self::new(name, TagCategory::GraphColumn)
    }

    /// True when this tag is aligned with a feature-vector slot.
    pub fn is_feature(&self) -> bool {
        self.category == TagCategory::FeatureColumn
    }
}

/// Ordered column descriptors plus the provenance log of stages that changed them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of tags.
    pub tags: Vec<Tag>,
    /// One entry per stage that materially changed the schema, oldest first.
    pub provenance: Vec<String>,
}

impl Schema {
    /// Create a schema from tags with an empty provenance log.
    pub fn new(tags: Vec<Tag>) -> Self {
        Self {
            tags,
            provenance: Vec::new(),
        }
    }

    /// Create a schema with only feature columns, in the given order.
    pub fn with_features<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Tag::feature).collect())
    }

    /// Number of [`TagCategory::FeatureColumn`] tags.
    pub fn feature_count(&self) -> usize {
        self.tags.iter().filter(|t| t.is_feature()).count()
    }

    /// Feature column names in feature-vector order.
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|t| t.is_feature())
            .map(|t| t.name.as_str())
    }

    /// Returns the feature-vector position of a feature column, if present.
    pub fn feature_index_of(&self, name: &str) -> Option<usize> {
        self.feature_names().position(|n| n == name)
    }

    /// Returns the tag index of any column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tags.iter().position(|t| t.name == name)
    }

    /// Append a provenance entry.
    pub fn push_provenance(&mut self, entry: impl Into<String>) {
        self.provenance.push(entry.into());
    }

    /// True when both schemas declare the same feature columns in the same order.
    pub fn same_features(&self, other: &Schema) -> bool {
        self.feature_names().eq(other.feature_names())
    }
}

/// Packed 64-bit cell identity: high half = group (sample) id, low half = item (cell) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CellId(u64);

impl CellId {
    /// Pack a group id and an item id.
    pub const fn pack(group: u32, item: u32) -> Self {
        Self(((group as u64) << 32) | item as u64)
    }

    /// Split into `(group, item)`.
    pub const fn unpack(self) -> (u32, u32) {
        (self.group(), self.item())
    }

    /// Wrap a raw packed value (as stored on the wire).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw packed value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Group (sample) half.
    pub const fn group(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Item (cell) half.
    pub const fn item(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Same item id under a different group id.
    pub const fn with_group(self, group: u32) -> Self {
        Self::pack(group, self.item())
    }

    /// Same group id with a different item id.
    pub const fn with_item(self, item: u32) -> Self {
        Self::pack(self.group(), item)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group(), self.item())
    }
}

/// One measurement row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Packed identity.
    pub id: CellId,
    /// Structural flags (set by topology/geometry stages).
    pub cflag: u64,
    /// Phenotype flags (set by gating stages).
    pub pflag: u64,
    pub x: f32,
    pub y: f32,
    /// Values aligned with the schema's feature columns.
    pub features: Vec<f32>,
}

impl Cell {
    /// Create a cell with cleared flags.
    pub fn new(id: CellId, x: f32, y: f32, features: Vec<f32>) -> Self {
        Self {
            id,
            cflag: 0,
            pflag: 0,
            x,
            y,
            features,
        }
    }

    /// Both flag fields merged into the single bit-space used by selection.
    pub fn combined_flags(&self) -> u64 {
        self.cflag | self.pflag
    }

    /// Keep only the feature values whose position is marked `true` in `keep`.
    ///
    /// Positions beyond `keep` are dropped.
    pub(crate) fn retain_features(&mut self, keep: &[bool]) {
        let mut idx = 0usize;
        self.features.retain(|_| {
            let k = keep.get(idx).copied().unwrap_or(false);
            idx += 1;
            k
        });
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (group, item) = self.id.unpack();
        write!(
            f,
            "{group}\t{item}\t{}\t{}\t{}\t{}",
            self.cflag, self.pflag, self.x, self.y
        )?;
        for v in &self.features {
            write!(f, "\t{v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, CellId, Schema, Tag};
    use proptest::prelude::*;

    fn mixed_schema() -> Schema {
        Schema::new(vec![
            Tag::meta("sample"),
            Tag::feature("CD3"),
            Tag::graph("spatial_graph"),
            Tag::feature("CD8"),
        ])
    }

    #[test]
    fn feature_positions_skip_non_feature_tags() {
        let schema = mixed_schema();
        assert_eq!(schema.feature_count(), 2);
        assert_eq!(schema.feature_index_of("CD3"), Some(0));
        assert_eq!(schema.feature_index_of("CD8"), Some(1));
        assert_eq!(schema.feature_index_of("sample"), None);
        assert_eq!(schema.index_of("CD8"), Some(3));
    }

    #[test]
    fn same_features_ignores_meta_and_provenance() {
        let a = mixed_schema();
        let mut b = Schema::with_features(["CD3", "CD8"]);
        b.push_provenance("ingest");
        assert!(a.same_features(&b));
        assert!(!a.same_features(&Schema::with_features(["CD8", "CD3"])));
    }

    #[test]
    fn identity_halves_are_independent() {
        let id = CellId::pack(7, 42);
        assert_eq!(id.unpack(), (7, 42));
        assert_eq!(id.with_group(9).unpack(), (9, 42));
        assert_eq!(id.with_item(1).unpack(), (7, 1));
        assert_eq!(CellId::pack(u32::MAX, 0).raw(), 0xFFFF_FFFF_0000_0000);
        assert_eq!(id.to_string(), "7:42");
    }

    #[test]
    fn retain_features_drops_unmarked_positions() {
        let mut cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0, 2.0, 3.0]);
        cell.retain_features(&[true, false, true]);
        assert_eq!(cell.features, vec![1.0, 3.0]);
    }

    #[test]
    fn display_is_tab_separated() {
        let mut cell = Cell::new(CellId::pack(1, 2), 1.5, 2.0, vec![3.0]);
        cell.pflag = 4;
        assert_eq!(cell.to_string(), "1\t2\t0\t4\t1.5\t2\t3");
    }

    proptest! {
        #[test]
        fn pack_unpack_round_trips(group in any::<u32>(), item in any::<u32>()) {
            let id = CellId::pack(group, item);
            prop_assert_eq!(id.unpack(), (group, item));
            prop_assert_eq!(CellId::from_raw(id.raw()), id);
        }
    }
}
