//! In-place base-10 logarithm of selected feature columns.

use crate::error::{CellError, CellResult};
use crate::execution::{PipelineEvent, PipelineObserver};
use crate::types::{Cell, Schema};

use super::{CellFlow, CellStage, SchemaFlow, StageReport};

/// Which feature columns to transform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogColumns {
    /// Every feature column.
    #[default]
    All,
    /// Feature columns by name, resolved against the schema.
    Named(Vec<String>),
    /// Feature-vector positions.
    Positions(Vec<usize>),
}

/// Replaces values with their base-10 logarithm.
///
/// Non-positive values are passed through unchanged. The first one seen raises a single
/// warning for the whole stream; later ones are only counted.
#[derive(Debug, Clone)]
pub struct LogStage {
    columns: LogColumns,
    positions: Vec<usize>,
    warned: bool,
    non_positive: u64,
}

impl LogStage {
    pub fn new(columns: LogColumns) -> Self {
        Self {
            columns,
            positions: Vec::new(),
            warned: false,
            non_positive: 0,
        }
    }
}

impl CellStage for LogStage {
    fn name(&self) -> &'static str {
        "log"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        let count = schema.feature_count();
        let mut positions = match &self.columns {
            LogColumns::All => (0..count).collect(),
            LogColumns::Named(names) => names
                .iter()
                .map(|n| {
                    schema
                        .feature_index_of(n)
                        .ok_or_else(|| CellError::MissingColumn { name: n.clone() })
                })
                .collect::<CellResult<Vec<_>>>()?,
            LogColumns::Positions(p) => {
                if let Some(bad) = p.iter().find(|&&i| i >= count) {
                    return Err(CellError::config(format!(
                        "log column position {bad} is out of range for {count} feature columns"
                    )));
                }
                p.clone()
            }
        };
        positions.sort_unstable();
        positions.dedup();
        self.positions = positions;
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        for &p in &self.positions {
            let Some(v) = cell.features.get_mut(p) else {
                continue;
            };
            if *v > 0.0 {
                *v = v.log10();
            } else if *v <= 0.0 {
                self.non_positive += 1;
                if !self.warned {
                    self.warned = true;
                    observer.on_event(&PipelineEvent::Warning {
                        stage: "log",
                        message: format!(
                            "non-positive value {} for cell {} left untransformed; further occurrences are not reported",
                            *v, cell.id
                        ),
                    });
                }
            }
        }
        Ok(CellFlow::Keep)
    }

    fn report(&self) -> Option<StageReport> {
        Some(StageReport::NonPositiveLog {
            occurrences: self.non_positive,
        })
    }
}
