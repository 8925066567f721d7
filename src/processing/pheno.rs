//! Threshold gating into phenotype flags.

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::gates::GateMap;
use crate::types::{Cell, Schema};

use super::{CellFlow, CellStage, SchemaFlow};

#[derive(Debug, Clone, Copy)]
struct ResolvedGate {
    position: usize,
    low: f32,
    high: f32,
    bit: u64,
}

/// Sets phenotype bit `i` on every cell whose value for gate `i`'s marker lies within the
/// gate's interval. Never drops cells.
#[derive(Debug, Clone)]
pub struct PhenoStage {
    gates: GateMap,
    resolved: Vec<ResolvedGate>,
}

impl PhenoStage {
    pub fn new(gates: GateMap) -> Self {
        Self {
            gates,
            resolved: Vec::new(),
        }
    }
}

impl CellStage for PhenoStage {
    fn name(&self) -> &'static str {
        "pheno"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        self.resolved = self
            .gates
            .iter()
            .enumerate()
            .map(|(i, gate)| {
                let position = schema.feature_index_of(&gate.marker).ok_or_else(|| {
                    CellError::MissingColumn {
                        name: gate.marker.clone(),
                    }
                })?;
                Ok(ResolvedGate {
                    position,
                    low: gate.low,
                    high: gate.high,
                    bit: 1u64 << i,
                })
            })
            .collect::<CellResult<_>>()?;
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        for gate in &self.resolved {
            if let Some(&v) = cell.features.get(gate.position) {
                if v >= gate.low && v <= gate.high {
                    cell.pflag |= gate.bit;
                }
            }
        }
        Ok(CellFlow::Keep)
    }
}
