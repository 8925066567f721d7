//! Region-of-interest filtering and labeling.

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::geometry::Polygon;
use crate::types::{Cell, Schema, ROI_FLAG};

use super::{CellFlow, CellStage, SchemaFlow, StageReport};

/// Tests each cell's position against a set of polygons.
///
/// With labeling enabled, contained cells get [`ROI_FLAG`] in their structural flags and every
/// cell is kept. Without labeling, only contained cells are kept.
#[derive(Debug, Clone)]
pub struct RoiStage {
    polygons: Vec<Polygon>,
    label: bool,
    inside: u64,
    tested: u64,
}

impl RoiStage {
    pub fn new(polygons: Vec<Polygon>, label: bool) -> CellResult<Self> {
        if polygons.is_empty() {
            return Err(CellError::config("roi stage needs at least one polygon"));
        }
        Ok(Self {
            polygons,
            label,
            inside: 0,
            tested: 0,
        })
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        self.polygons.iter().any(|p| p.contains(x, y))
    }
}

impl CellStage for RoiStage {
    fn name(&self) -> &'static str {
        "roi"
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
        self.tested += 1;
        let hit = self.contains(cell.x, cell.y);
        if hit {
            self.inside += 1;
        }

        if self.label {
            if hit {
                cell.cflag |= ROI_FLAG;
            }
            Ok(CellFlow::Keep)
        } else if hit {
            Ok(CellFlow::Keep)
        } else {
            Ok(CellFlow::Drop)
        }
    }

    fn report(&self) -> Option<StageReport> {
        Some(StageReport::RoiMatches {
            inside: self.inside,
            tested: self.tested,
        })
    }
}
