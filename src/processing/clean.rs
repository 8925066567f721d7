//! Category-based column removal.

use serde::Deserialize;

use crate::error::CellResult;
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema, TagCategory};

use super::{CellFlow, CellStage, SchemaFlow};

/// Which tag categories to drop wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    pub graph: bool,
    pub meta: bool,
    pub features: bool,
}

impl CleanOptions {
    fn drops(&self, category: TagCategory) -> bool {
        match category {
            TagCategory::GraphColumn => self.graph,
            TagCategory::MetaColumn => self.meta,
            TagCategory::FeatureColumn => self.features,
        }
    }
}

/// Removes graph, meta and/or feature columns from the schema, and the matching data from
/// every cell.
#[derive(Debug, Clone)]
pub struct CleanStage {
    options: CleanOptions,
}

impl CleanStage {
    pub fn new(options: CleanOptions) -> Self {
        Self { options }
    }
}

impl CellStage for CleanStage {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        let before = schema.tags.len();
        let options = self.options;
        schema.tags.retain(|t| !options.drops(t.category));
        let removed = before - schema.tags.len();
        if removed > 0 {
            schema.push_provenance(format!("clean: removed {removed} columns"));
        }
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        if self.options.features {
            cell.features.clear();
        }
        Ok(CellFlow::Keep)
    }
}
