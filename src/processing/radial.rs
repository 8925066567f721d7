//! Radial neighborhood banding.
//!
//! Each [`Band`] is an annulus around a subject cell plus a flag query over counterparts. For
//! every subject, band `k` counts the other cells whose distance `d` satisfies
//! `inner_k < d < outer_k` and whose combined flags match band `k`'s AND/OR masks. Bands are
//! independent and may overlap. Counts are appended to each cell as new feature columns named
//! after the band labels.
//!
//! Counting needs every cell's position, so this stage holds each input stream and releases
//! it, in arrival order, when the stream ends. Candidate pairs come from an R-tree over the
//! cell positions, queried out to the largest outer radius; subjects can be evaluated in
//! parallel on a `rayon` pool, with the same result as the serial scan.

use std::collections::HashSet;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rstar::{RTree, AABB};
use serde::Deserialize;

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema, Tag};

use super::select::FlagQuery;
use super::{CellFlow, CellStage, SchemaFlow};

/// One annulus definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Band {
    pub inner: f32,
    pub outer: f32,
    #[serde(default)]
    pub and_mask: u64,
    #[serde(default)]
    pub or_mask: u64,
    /// Name of the feature column receiving this band's counts.
    pub label: String,
}

impl Band {
    pub fn new(inner: f32, outer: f32, and_mask: u64, or_mask: u64, label: impl Into<String>) -> Self {
        Self {
            inner,
            outer,
            and_mask,
            or_mask,
            label: label.into(),
        }
    }

    /// Open-interval distance test.
    pub fn admits_distance(&self, d: f64) -> bool {
        d > f64::from(self.inner) && d < f64::from(self.outer)
    }

    fn query(&self) -> FlagQuery {
        FlagQuery::new(self.and_mask, self.or_mask)
    }
}

/// Parallelism settings for band counting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadialOptions {
    /// Worker threads. `None` uses the platform's available parallelism; `Some(1)` runs serially.
    pub num_threads: Option<usize>,
    /// Minimum subjects per parallel work item.
    pub chunk_size: usize,
}

impl Default for RadialOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            chunk_size: 1_024,
        }
    }
}

fn validate_bands(bands: &[Band]) -> CellResult<()> {
    if bands.is_empty() {
        return Err(CellError::config("radial stage needs at least one band"));
    }
    let mut labels = HashSet::new();
    for b in bands {
        if b.label.is_empty() {
            return Err(CellError::config("radial band label is empty"));
        }
        if !labels.insert(b.label.as_str()) {
            return Err(CellError::config(format!("duplicate radial band label '{}'", b.label)));
        }
        if !b.inner.is_finite() || !b.outer.is_finite() || b.inner < 0.0 || b.outer <= b.inner {
            return Err(CellError::config(format!(
                "radial band '{}' needs 0 <= inner < outer, got [{}, {}]",
                b.label, b.inner, b.outer
            )));
        }
    }
    Ok(())
}

/// Per-subject, per-band counts using the R-tree index.
///
/// `result[i][k]` is the number of counterparts of `cells[i]` in band `k`.
pub fn band_counts(cells: &[Cell], bands: &[Band], options: &RadialOptions) -> CellResult<Vec<Vec<u32>>> {
    validate_bands(bands)?;
    if options.chunk_size == 0 {
        return Err(CellError::config("radial chunk_size must be > 0"));
    }
    if options.num_threads == Some(0) {
        return Err(CellError::config("radial num_threads must be > 0 when set"));
    }

    let index = SiteIndex::new(cells, bands);
    if options.num_threads == Some(1) {
        return Ok((0..cells.len()).map(|i| index.counts_for(i)).collect());
    }

    let mut builder = ThreadPoolBuilder::new();
    if let Some(n) = options.num_threads {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| CellError::config(format!("failed to build radial thread pool: {e}")))?;

    Ok(pool.install(|| {
        (0..cells.len())
            .into_par_iter()
            .with_min_len(options.chunk_size)
            .map(|i| index.counts_for(i))
            .collect()
    }))
}

/// Reference implementation comparing every pair. Quadratic; intended for verification.
pub fn band_counts_exhaustive(cells: &[Cell], bands: &[Band]) -> CellResult<Vec<Vec<u32>>> {
    validate_bands(bands)?;
    let queries: Vec<FlagQuery> = bands.iter().map(Band::query).collect();
    Ok((0..cells.len())
        .map(|i| {
            let mut counts = vec![0u32; bands.len()];
            for (j, other) in cells.iter().enumerate() {
                if i != j {
                    tally(&cells[i], other, bands, &queries, &mut counts);
                }
            }
            counts
        })
        .collect())
}

fn distance(a: &Cell, b: &Cell) -> f64 {
    let dx = f64::from(a.x) - f64::from(b.x);
    let dy = f64::from(a.y) - f64::from(b.y);
    dx.hypot(dy)
}

fn tally(subject: &Cell, other: &Cell, bands: &[Band], queries: &[FlagQuery], counts: &mut [u32]) {
    let d = distance(subject, other);
    let flags = other.combined_flags();
    for (k, band) in bands.iter().enumerate() {
        if band.admits_distance(d) && queries[k].matches(flags) {
            counts[k] += 1;
        }
    }
}

/// A cell position in the R-tree, pointing back into the cell slice.
#[derive(Debug, Clone, Copy)]
struct Site {
    pos: [f64; 2],
    index: usize,
}

impl rstar::RTreeObject for Site {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl rstar::PointDistance for Site {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.pos[0] - point[0];
        let dy = self.pos[1] - point[1];
        dx * dx + dy * dy
    }
}

fn position(c: &Cell) -> Option<[f64; 2]> {
    let pos = [f64::from(c.x), f64::from(c.y)];
    (pos[0].is_finite() && pos[1].is_finite()).then_some(pos)
}

struct SiteIndex<'a> {
    cells: &'a [Cell],
    bands: &'a [Band],
    queries: Vec<FlagQuery>,
    /// Squared query radius, slightly past the largest outer radius.
    reach_2: f64,
    tree: RTree<Site>,
}

impl<'a> SiteIndex<'a> {
    fn new(cells: &'a [Cell], bands: &'a [Band]) -> Self {
        let outer = bands
            .iter()
            .map(|b| f64::from(b.outer))
            .fold(0.0f64, f64::max);
        // exact distances are re-checked per pair; the margin only widens the candidate set
        let reach = outer * (1.0 + 1e-9);
        // non-finite positions are never within a finite distance of anything
        let sites = cells
            .iter()
            .enumerate()
            .filter_map(|(index, c)| position(c).map(|pos| Site { pos, index }))
            .collect();
        Self {
            cells,
            bands,
            queries: bands.iter().map(Band::query).collect(),
            reach_2: reach * reach,
            tree: RTree::bulk_load(sites),
        }
    }

    fn counts_for(&self, i: usize) -> Vec<u32> {
        let subject = &self.cells[i];
        let mut counts = vec![0u32; self.bands.len()];
        let Some(pos) = position(subject) else {
            return counts;
        };
        for site in self.tree.locate_within_distance(pos, self.reach_2) {
            if site.index != i {
                tally(subject, &self.cells[site.index], self.bands, &self.queries, &mut counts);
            }
        }
        counts
    }
}

/// Appends one count column per band to every cell.
#[derive(Debug, Clone)]
pub struct RadialStage {
    bands: Vec<Band>,
    options: RadialOptions,
    base_features: usize,
    held: Vec<Cell>,
}

impl RadialStage {
    /// Validates that the band list is non-empty, labels are unique, and radii are ordered.
    pub fn new(bands: Vec<Band>, options: RadialOptions) -> CellResult<Self> {
        validate_bands(&bands)?;
        Ok(Self {
            bands,
            options,
            base_features: 0,
            held: Vec::new(),
        })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }
}

impl CellStage for RadialStage {
    fn name(&self) -> &'static str {
        "radial"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        if let Some(b) = self.bands.iter().find(|b| schema.index_of(&b.label).is_some()) {
            return Err(CellError::config(format!(
                "radial band label '{}' collides with an existing column",
                b.label
            )));
        }
        self.base_features = schema.feature_count();
        for b in &self.bands {
            schema.tags.push(Tag::feature(b.label.clone()));
        }
        schema.push_provenance(format!("radial: added {} band count columns", self.bands.len()));
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        self.held.push(std::mem::take(cell));
        Ok(CellFlow::Held)
    }

    fn drain(&mut self, _observer: &dyn PipelineObserver) -> CellResult<Vec<Cell>> {
        let mut cells = std::mem::take(&mut self.held);
        let counts = band_counts(&cells, &self.bands, &self.options)?;
        for (cell, row) in cells.iter_mut().zip(counts) {
            // band columns follow the full base vector; short vectors are padded with 0.0
            cell.features.resize(self.base_features, 0.0);
            cell.features.extend(row.into_iter().map(|n| n as f32));
        }
        Ok(cells)
    }
}
