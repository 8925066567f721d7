//! JSON pipeline declarations.
//!
//! ```json
//! {
//!   "stages": [
//!     { "stage": "cut", "include": ["CD3", "CD8"] },
//!     { "stage": "pheno", "gates": [{ "marker": "CD3", "low": 5.0, "high": 100.0 }] },
//!     { "stage": "select", "and_mask": 1 },
//!     { "stage": "radial", "bands": [{ "inner": 0, "outer": 30, "label": "near" }] }
//!   ],
//!   "view": { "round": 3, "print_header": true }
//! }
//! ```
//!
//! Gate maps and polygon sets may be given inline or as a path to a file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CellResult;
use crate::gates::GateMap;
use crate::geometry::{load_polygons, Polygon};
use crate::processing::{
    Band, BuildStage, CatOffset, CatStage, CleanOptions, CleanStage, CountStage, CutStage,
    LogColumns, LogStage, PhenoStage, RadialOptions, RadialStage, RoiStage, SelectStage, Stage,
    ViewOptions,
};

/// Gate map given inline or by file path (`.json` or `marker,low,high` CSV).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GateSource {
    Inline(GateMap),
    Path(PathBuf),
}

impl GateSource {
    pub fn resolve(&self) -> CellResult<GateMap> {
        match self {
            GateSource::Inline(map) => Ok(map.clone()),
            GateSource::Path(path) => GateMap::load(path),
        }
    }
}

/// Polygon set given inline or by path to a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PolygonSource {
    Inline(Vec<Polygon>),
    Path(PathBuf),
}

impl PolygonSource {
    pub fn resolve(&self) -> CellResult<Vec<Polygon>> {
        match self {
            PolygonSource::Inline(polygons) => Ok(polygons.clone()),
            PolygonSource::Path(path) => load_polygons(path),
        }
    }
}

/// One stage declaration, tagged by `"stage"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageConfig {
    Cut {
        include: Vec<String>,
    },
    Clean(CleanOptions),
    Pheno {
        gates: GateSource,
    },
    Select {
        #[serde(default)]
        and_mask: u64,
        #[serde(default)]
        or_mask: u64,
        #[serde(default)]
        invert: bool,
    },
    Count,
    Log {
        /// Feature names; every feature column when absent.
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    Roi {
        polygons: PolygonSource,
        #[serde(default)]
        label: bool,
    },
    Build {
        #[serde(default)]
        graph_tag: Option<String>,
    },
    Cat {
        /// Group offset for the second stream; automatic when absent.
        #[serde(default)]
        offset: Option<u32>,
        /// Group id stamped onto every incoming cell before offsets apply.
        #[serde(default)]
        sample: Option<u32>,
    },
    Radial {
        bands: Vec<Band>,
        #[serde(default)]
        threads: Option<usize>,
    },
}

impl StageConfig {
    /// Construct the stage, loading any referenced files.
    pub fn build(&self) -> CellResult<Stage> {
        let stage: Stage = match self {
            StageConfig::Cut { include } => CutStage::new(include.iter().cloned()).into(),
            StageConfig::Clean(options) => CleanStage::new(*options).into(),
            StageConfig::Pheno { gates } => PhenoStage::new(gates.resolve()?).into(),
            StageConfig::Select {
                and_mask,
                or_mask,
                invert,
            } => SelectStage::new(*and_mask, *or_mask, *invert).into(),
            StageConfig::Count => CountStage::new().into(),
            StageConfig::Log { columns } => {
                let columns = match columns {
                    Some(names) => LogColumns::Named(names.clone()),
                    None => LogColumns::All,
                };
                LogStage::new(columns).into()
            }
            StageConfig::Roi { polygons, label } => RoiStage::new(polygons.resolve()?, *label)?.into(),
            StageConfig::Build { graph_tag } => match graph_tag {
                Some(tag) => BuildStage::new(tag.clone()).into(),
                None => BuildStage::default().into(),
            },
            StageConfig::Cat { offset, sample } => {
                let mode = offset.map_or(CatOffset::Auto, CatOffset::Seeded);
                let stage = CatStage::new(mode);
                match sample {
                    Some(sample) => stage.with_sample(*sample).into(),
                    None => stage.into(),
                }
            }
            StageConfig::Radial { bands, threads } => {
                let options = RadialOptions {
                    num_threads: *threads,
                    ..RadialOptions::default()
                };
                RadialStage::new(bands.clone(), options)?.into()
            }
        };
        Ok(stage)
    }
}

/// Ordered stage list plus optional rendering settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// When present, the pipeline ends in a text view instead of a binary stream.
    #[serde(default)]
    pub view: Option<ViewOptions>,
}

impl PipelineConfig {
    pub fn from_json_str(input: &str) -> CellResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> CellResult<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Build every declared stage, in order.
    pub fn build_stages(&self) -> CellResult<Vec<Stage>> {
        self.stages.iter().map(StageConfig::build).collect()
    }
}
