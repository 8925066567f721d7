//! Streaming stages over the binary cell stream.
//!
//! Every stage follows the same contract ([`CellStage`]):
//!
//! 1. it receives the current [`Schema`] exactly once per input stream, may rewrite it, and
//!    returns an error for a fatal configuration mismatch (e.g. a requested marker is absent);
//! 2. it receives each [`Cell`] exactly once, in arrival order, and either keeps it, drops it,
//!    or holds it for end-of-stream processing;
//! 3. after the stream ends it may release held cells ([`CellStage::drain`]) and expose a
//!    [`StageReport`].
//!
//! The catalog is closed: [`Stage`] enumerates every stage the crate provides. Rendering lives
//! in [`view`] as a sink, since it is always the final consumer of a pipeline.
//!
//! ## Example: gate, then select
//!
//! ```rust
//! use cell_sift::execution::{MemorySink, Pipeline};
//! use cell_sift::gates::GateMap;
//! use cell_sift::processing::{PhenoStage, SelectStage, Stage};
//! use cell_sift::types::{Cell, CellId, Schema};
//!
//! let mut gates = GateMap::new();
//! gates.insert("CD3", 5.0, 100.0).unwrap();
//!
//! let stages: Vec<Stage> = vec![
//!     PhenoStage::new(gates).into(),
//!     SelectStage::new(0b1, 0, false).into(),
//! ];
//! let mut pipeline = Pipeline::new(stages, MemorySink::default());
//! pipeline.push_schema(Schema::with_features(["CD3"])).unwrap();
//! pipeline.push_cell(Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![10.0])).unwrap();
//! pipeline.push_cell(Cell::new(CellId::pack(0, 2), 0.0, 0.0, vec![1.0])).unwrap();
//! pipeline.finish().unwrap();
//!
//! let kept = &pipeline.sink().cells;
//! assert_eq!(kept.len(), 1);
//! assert_eq!(kept[0].id.item(), 1);
//! ```

pub mod build;
pub mod cat;
pub mod clean;
pub mod count;
pub mod cut;
pub mod log;
pub mod pheno;
pub mod radial;
pub mod roi;
pub mod select;
pub mod view;

use std::fmt;

use crate::error::CellResult;
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema};

pub use build::BuildStage;
pub use cat::{CatOffset, CatStage};
pub use clean::{CleanOptions, CleanStage};
pub use count::CountStage;
pub use cut::CutStage;
pub use log::{LogColumns, LogStage};
pub use pheno::PhenoStage;
pub use radial::{Band, RadialOptions, RadialStage};
pub use roi::RoiStage;
pub use select::{FlagQuery, SelectStage};
pub use view::{RenderStyle, ViewOptions, ViewSink};

/// Outcome of handing a schema to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFlow {
    /// Pass the (possibly rewritten) schema to the next stage.
    Forward,
    /// The stage consumed the schema; nothing downstream sees it.
    ///
    /// Used by concatenation for the schemas of every stream after the first.
    Absorb,
}

/// Outcome of handing a cell to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFlow {
    /// Forward the (possibly rewritten) cell.
    Keep,
    /// Filter the cell out.
    Drop,
    /// The stage took ownership of the cell and will release it from [`CellStage::drain`].
    Held,
}

/// End-of-stream summary exposed by a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageReport {
    /// Running total from [`CountStage`].
    CellCount { total: u64 },
    /// Merge summary from [`CatStage`].
    Concatenated {
        streams: usize,
        max_item_id: Option<u32>,
    },
    /// Non-positive inputs passed through by [`LogStage`].
    NonPositiveLog { occurrences: u64 },
    /// Cells found inside any polygon by [`RoiStage`].
    RoiMatches { inside: u64, tested: u64 },
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageReport::CellCount { total } => write!(f, "{total}"),
            StageReport::Concatenated {
                streams,
                max_item_id,
            } => match max_item_id {
                Some(id) => write!(f, "merged {streams} streams, max cell id {id}"),
                None => write!(f, "merged {streams} streams, no cells"),
            },
            StageReport::NonPositiveLog { occurrences } => {
                write!(f, "{occurrences} non-positive values left untransformed")
            }
            StageReport::RoiMatches { inside, tested } => {
                write!(f, "{inside} of {tested} cells inside a region")
            }
        }
    }
}

/// Shared contract for every binary-stream stage.
pub trait CellStage {
    /// Short stage name used in logs and provenance.
    fn name(&self) -> &'static str;

    /// Validate and possibly rewrite the schema of the incoming stream.
    fn process_schema(
        &mut self,
        schema: &mut Schema,
        observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow>;

    /// Process one cell in arrival order.
    fn process_cell(&mut self, cell: &mut Cell, observer: &dyn PipelineObserver)
    -> CellResult<CellFlow>;

    /// Release cells held back until end of stream, in arrival order.
    fn drain(&mut self, _observer: &dyn PipelineObserver) -> CellResult<Vec<Cell>> {
        Ok(Vec::new())
    }

    /// End-of-stream report, if the stage keeps one.
    fn report(&self) -> Option<StageReport> {
        None
    }
}

/// The closed catalog of binary-stream stages.
#[derive(Debug)]
pub enum Stage {
    Cut(CutStage),
    Clean(CleanStage),
    Pheno(PhenoStage),
    Select(SelectStage),
    Count(CountStage),
    Log(LogStage),
    Roi(RoiStage),
    Build(BuildStage),
    Cat(CatStage),
    Radial(RadialStage),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Stage::Cut($s) => $body,
            Stage::Clean($s) => $body,
            Stage::Pheno($s) => $body,
            Stage::Select($s) => $body,
            Stage::Count($s) => $body,
            Stage::Log($s) => $body,
            Stage::Roi($s) => $body,
            Stage::Build($s) => $body,
            Stage::Cat($s) => $body,
            Stage::Radial($s) => $body,
        }
    };
}

macro_rules! stage_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Stage {
                fn from(stage: $ty) -> Self {
                    Stage::$variant(stage)
                }
            }
        )*
    };
}

stage_from!(
    Cut(CutStage),
    Clean(CleanStage),
    Pheno(PhenoStage),
    Select(SelectStage),
    Count(CountStage),
    Log(LogStage),
    Roi(RoiStage),
    Build(BuildStage),
    Cat(CatStage),
    Radial(RadialStage),
);

impl CellStage for Stage {
    fn name(&self) -> &'static str {
        dispatch!(self, s => s.name())
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        dispatch!(self, s => s.process_schema(schema, observer))
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        dispatch!(self, s => s.process_cell(cell, observer))
    }

    fn drain(&mut self, observer: &dyn PipelineObserver) -> CellResult<Vec<Cell>> {
        dispatch!(self, s => s.drain(observer))
    }

    fn report(&self) -> Option<StageReport> {
        dispatch!(self, s => s.report())
    }
}

impl Stage {
    /// The concatenation stage, if this is one.
    pub fn as_cat(&self) -> Option<&CatStage> {
        match self {
            Stage::Cat(s) => Some(s),
            _ => None,
        }
    }

    /// The counting stage, if this is one.
    pub fn as_count(&self) -> Option<&CountStage> {
        match self {
            Stage::Count(s) => Some(s),
            _ => None,
        }
    }
}
