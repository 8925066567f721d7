//! Running cell count.

use crate::error::CellResult;
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema};

use super::{CellFlow, CellStage, SchemaFlow, StageReport};

/// Counts every cell that reaches it. Never drops or modifies cells.
#[derive(Debug, Clone, Default)]
pub struct CountStage {
    total: u64,
}

impl CountStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells seen so far.
    pub fn count(&self) -> u64 {
        self.total
    }
}

impl CellStage for CountStage {
    fn name(&self) -> &'static str {
        "count"
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
        _cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        self.total += 1;
        Ok(CellFlow::Keep)
    }

    fn report(&self) -> Option<StageReport> {
        Some(StageReport::CellCount { total: self.total })
    }
}
