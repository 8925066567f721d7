//! Registration of the auxiliary spatial graph column.

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema, Tag, TagCategory};

use super::{CellFlow, CellStage, SchemaFlow};

/// Default name of the graph descriptor column.
pub const DEFAULT_GRAPH_TAG: &str = "spatial_graph";

/// Declares the graph column that downstream topology consumers read.
///
/// Adjacency itself is produced outside the cell stream. This stage only makes the schema
/// advertise it, so rerunning it over its own output changes nothing. Cells pass unchanged.
#[derive(Debug, Clone)]
pub struct BuildStage {
    graph_tag: String,
}

impl Default for BuildStage {
    fn default() -> Self {
        Self::new(DEFAULT_GRAPH_TAG)
    }
}

impl BuildStage {
    pub fn new(graph_tag: impl Into<String>) -> Self {
        Self {
            graph_tag: graph_tag.into(),
        }
    }
}

impl CellStage for BuildStage {
    fn name(&self) -> &'static str {
        "build"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        match schema.index_of(&self.graph_tag) {
            Some(i) if schema.tags[i].category == TagCategory::GraphColumn => {}
            Some(_) => {
                return Err(CellError::config(format!(
                    "column '{}' exists but is not a graph column",
                    self.graph_tag
                )));
            }
            None => {
                schema.tags.push(Tag::graph(self.graph_tag.clone()));
                schema.push_provenance(format!("build: added graph column '{}'", self.graph_tag));
            }
        }
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        _cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        Ok(CellFlow::Keep)
    }
}
