//! Concatenation of independently produced streams.
//!
//! Each input stream announces itself with its schema. The first schema becomes the master and
//! is forwarded; every later one must declare the same feature columns in the same order and is
//! absorbed. Cells of stream `k > 1` have their group id shifted by that stream's offset so no
//! packed identity repeats across the merge:
//!
//! - [`CatOffset::Auto`]: the offset is one past the largest item id seen so far, raised if
//!   needed to one past the largest group id already emitted, which keeps shifted groups above
//!   every earlier one.
//! - [`CatOffset::Seeded`]: the caller's value is used verbatim for the second stream; later
//!   streams fall back to the automatic rule.
//!
//! With [`CatStage::with_sample`], every incoming cell is first stamped with one sample (group)
//! id, so inputs carrying arbitrary group ids merge as `sample`, `sample + offset_2`, and so on.
//!
//! Stream order and intra-stream order are preserved.

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::types::{Cell, CellId, Schema};

use super::{CellFlow, CellStage, SchemaFlow, StageReport};

/// How the group-id offset of each later stream is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatOffset {
    #[default]
    Auto,
    Seeded(u32),
}

/// Merges streams pushed one after another through the same pipeline.
#[derive(Debug, Clone, Default)]
pub struct CatStage {
    mode: CatOffset,
    sample: Option<u32>,
    master: Option<Schema>,
    offsets: Vec<u32>,
    max_item_id: Option<u32>,
    max_group_id: Option<u32>,
}

impl CatStage {
    pub fn new(mode: CatOffset) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Stamp `sample` as the group id of every incoming cell before its stream offset applies.
    pub fn with_sample(mut self, sample: u32) -> Self {
        self.sample = Some(sample);
        self
    }

    pub fn sample(&self) -> Option<u32> {
        self.sample
    }

    /// Largest item id seen across every stream so far.
    ///
    /// Feed `max + 1` into the next merge as a seed to chain merges.
    pub fn max_item_id(&self) -> Option<u32> {
        self.max_item_id
    }

    /// Group-id offset applied to each stream, in stream order. The first is always zero.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// The master schema, once the first stream has arrived.
    pub fn master_schema(&self) -> Option<&Schema> {
        self.master.as_ref()
    }

    /// Map an identity captured from stream `stream` (zero-based) into the merged id space.
    pub fn remap(&self, stream: usize, id: CellId) -> CellResult<CellId> {
        let offset = *self.offsets.get(stream).ok_or_else(|| {
            CellError::config(format!(
                "stream {stream} was never concatenated ({} streams seen)",
                self.offsets.len()
            ))
        })?;
        shift(id, offset)
    }

    /// Follow-up pass over auxiliary references (e.g. neighbor lists) captured from one stream.
    pub fn remap_references(&self, stream: usize, ids: &mut [CellId]) -> CellResult<()> {
        for id in ids.iter_mut() {
            *id = self.remap(stream, *id)?;
        }
        Ok(())
    }

    fn current_offset(&self) -> u32 {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn next_offset(&self) -> CellResult<u32> {
        if let (CatOffset::Seeded(seed), 1) = (self.mode, self.offsets.len()) {
            return Ok(seed);
        }
        let past_item = self.max_item_id.map_or(0, |m| u64::from(m) + 1);
        let past_group = self.max_group_id.map_or(0, |g| u64::from(g) + 1);
        u32::try_from(past_item.max(past_group)).map_err(|_| {
            CellError::config("group id space exhausted; no disjoint offset is left for the next stream")
        })
    }
}

fn shift(id: CellId, offset: u32) -> CellResult<CellId> {
    if offset == 0 {
        return Ok(id);
    }
    let group = id.group();
    let shifted = group
        .checked_add(offset)
        .ok_or(CellError::IdentityOverflow { group, offset })?;
    Ok(id.with_group(shifted))
}

impl CellStage for CatStage {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        let Some(master) = &self.master else {
            self.master = Some(schema.clone());
            self.offsets.push(0);
            return Ok(SchemaFlow::Forward);
        };

        if !master.same_features(schema) {
            return Err(CellError::mismatch(format!(
                "stream {} declares feature columns {:?}, expected {:?}",
                self.offsets.len() + 1,
                schema.feature_names().collect::<Vec<_>>(),
                master.feature_names().collect::<Vec<_>>()
            )));
        }

        let offset = self.next_offset()?;
        self.offsets.push(offset);
        Ok(SchemaFlow::Absorb)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        if let Some(sample) = self.sample {
            cell.id = cell.id.with_group(sample);
        }
        let item = cell.id.item();
        self.max_item_id = Some(self.max_item_id.map_or(item, |m| m.max(item)));

        cell.id = shift(cell.id, self.current_offset())?;
        let group = cell.id.group();
        self.max_group_id = Some(self.max_group_id.map_or(group, |m| m.max(group)));
        Ok(CellFlow::Keep)
    }

    fn report(&self) -> Option<StageReport> {
        Some(StageReport::Concatenated {
            streams: self.offsets.len(),
            max_item_id: self.max_item_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{CatOffset, CatStage};
    use crate::error::CellError;
    use crate::execution::TracingObserver;
    use crate::processing::{CellStage, SchemaFlow};
    use crate::types::{Cell, CellId, Schema};

    fn feed(stage: &mut CatStage, ids: &[(u32, u32)]) -> Vec<CellId> {
        let mut schema = Schema::with_features(["CD3"]);
        stage.process_schema(&mut schema, &TracingObserver).unwrap();
        ids.iter()
            .map(|&(g, i)| {
                let mut cell = Cell::new(CellId::pack(g, i), 0.0, 0.0, vec![1.0]);
                stage.process_cell(&mut cell, &TracingObserver).unwrap();
                cell.id
            })
            .collect()
    }

    #[test]
    fn first_schema_forwards_later_ones_absorb() {
        let mut stage = CatStage::default();
        let mut s = Schema::with_features(["CD3"]);
        assert_eq!(stage.process_schema(&mut s, &TracingObserver).unwrap(), SchemaFlow::Forward);
        assert_eq!(stage.process_schema(&mut s, &TracingObserver).unwrap(), SchemaFlow::Absorb);
    }

    #[test]
    fn overlapping_streams_become_disjoint() {
        let mut stage = CatStage::default();
        let a = feed(&mut stage, &[(0, 0), (0, 1), (0, 2)]);
        let b = feed(&mut stage, &[(0, 0), (0, 1), (0, 2)]);

        assert_eq!(a, vec![CellId::pack(0, 0), CellId::pack(0, 1), CellId::pack(0, 2)]);
        assert_eq!(b, vec![CellId::pack(3, 0), CellId::pack(3, 1), CellId::pack(3, 2)]);
        assert_eq!(stage.offsets(), &[0, 3]);
        assert_eq!(stage.max_item_id(), Some(2));
    }

    #[test]
    fn auto_offset_clears_large_group_ids() {
        let mut stage = CatStage::default();
        let a = feed(&mut stage, &[(500, 0), (500, 10)]);
        let b = feed(&mut stage, &[(489, 0), (0, 0)]);
        let all: HashSet<CellId> = a.iter().chain(&b).copied().collect();
        assert_eq!(all.len(), 4);
        assert_eq!(stage.offsets()[1], 501);
    }

    #[test]
    fn seed_applies_to_second_stream_only() {
        let mut stage = CatStage::new(CatOffset::Seeded(100));
        feed(&mut stage, &[(0, 5)]);
        let b = feed(&mut stage, &[(0, 7)]);
        let c = feed(&mut stage, &[(0, 1)]);
        assert_eq!(b, vec![CellId::pack(100, 7)]);
        assert_eq!(c, vec![CellId::pack(101, 1)]);
    }

    #[test]
    fn sample_replaces_incoming_group_ids() {
        let mut stage = CatStage::default().with_sample(7);
        let a = feed(&mut stage, &[(3, 0), (9, 1)]);
        let b = feed(&mut stage, &[(5, 0), (0, 1)]);
        assert_eq!(a, vec![CellId::pack(7, 0), CellId::pack(7, 1)]);
        // offset clears both the largest item id and the sample's group
        assert_eq!(stage.offsets(), &[0, 8]);
        assert_eq!(b, vec![CellId::pack(15, 0), CellId::pack(15, 1)]);
    }

    #[test]
    fn sample_combines_with_a_seed() {
        let mut stage = CatStage::new(CatOffset::Seeded(100)).with_sample(2);
        feed(&mut stage, &[(40, 3)]);
        let b = feed(&mut stage, &[(41, 3)]);
        assert_eq!(b, vec![CellId::pack(102, 3)]);
    }

    #[test]
    fn incompatible_schema_is_fatal() {
        let mut stage = CatStage::default();
        feed(&mut stage, &[(0, 0)]);
        let mut other = Schema::with_features(["CD8"]);
        let err = stage.process_schema(&mut other, &TracingObserver).unwrap_err();
        assert!(matches!(err, CellError::SchemaMismatch { .. }));
    }

    #[test]
    fn references_remap_with_their_stream_offset() {
        let mut stage = CatStage::default();
        feed(&mut stage, &[(0, 0), (0, 9)]);
        feed(&mut stage, &[(0, 0)]);
        let mut neighbors = vec![CellId::pack(0, 4), CellId::pack(1, 2)];
        stage.remap_references(1, &mut neighbors).unwrap();
        assert_eq!(neighbors, vec![CellId::pack(10, 4), CellId::pack(11, 2)]);
        assert!(stage.remap(5, CellId::pack(0, 0)).is_err());
    }

    #[test]
    fn group_overflow_is_fatal() {
        let mut stage = CatStage::new(CatOffset::Seeded(10));
        feed(&mut stage, &[(0, 0)]);
        let mut schema = Schema::with_features(["CD3"]);
        stage.process_schema(&mut schema, &TracingObserver).unwrap();
        let mut cell = Cell::new(CellId::pack(u32::MAX - 1, 0), 0.0, 0.0, vec![]);
        let err = stage.process_cell(&mut cell, &TracingObserver).unwrap_err();
        assert!(matches!(err, CellError::IdentityOverflow { .. }));
    }
}
