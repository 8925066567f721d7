//! Boolean selection over flag bits.

use serde::Deserialize;

use crate::error::CellResult;
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema};

use super::{CellFlow, CellStage, SchemaFlow};

/// AND/OR query over a flag bit-space.
///
/// Matches when every AND bit is set and, if the OR mask is nonzero, at least one OR bit is
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct FlagQuery {
    pub and_mask: u64,
    pub or_mask: u64,
}

impl FlagQuery {
    pub fn new(and_mask: u64, or_mask: u64) -> Self {
        Self { and_mask, or_mask }
    }

    pub fn matches(&self, flags: u64) -> bool {
        flags & self.and_mask == self.and_mask && (self.or_mask == 0 || flags & self.or_mask != 0)
    }
}

/// Retains cells whose combined structural and phenotype flags satisfy a [`FlagQuery`],
/// optionally inverted.
#[derive(Debug, Clone)]
pub struct SelectStage {
    query: FlagQuery,
    invert: bool,
}

impl SelectStage {
    pub fn new(and_mask: u64, or_mask: u64, invert: bool) -> Self {
        Self {
            query: FlagQuery::new(and_mask, or_mask),
            invert,
        }
    }

    /// The retention decision for a flag value.
    pub fn retains(&self, flags: u64) -> bool {
        self.query.matches(flags) != self.invert
    }
}

impl CellStage for SelectStage {
    fn name(&self) -> &'static str {
        "select"
    }

    fn process_schema(
        &mut self,
        _schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        Ok(if self.retains(cell.combined_flags()) {
            CellFlow::Keep
        } else {
            CellFlow::Drop
        })
    }
}
