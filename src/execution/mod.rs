//! Pipeline driver: pushes one or more binary streams through a chain of stages into a sink.
//!
//! This module sits "above" [`crate::processing`] and provides:
//!
//! - [`Pipeline`], which hands each schema and cell to every stage in order, forwards survivors
//!   to a [`CellSink`], and drains held cells at end of stream
//! - sinks for the binary format, in-memory collection, and text rendering
//! - observer hooks and counters for monitoring
//! - serde-backed pipeline declarations ([`PipelineConfig`])

mod config;
mod observer;
mod sink;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CellError, CellResult};
use crate::processing::{CellFlow, CellStage, SchemaFlow, Stage, StageReport};
use crate::types::{Cell, Schema};
use crate::wire::WireReader;

pub use config::{GateSource, PipelineConfig, PolygonSource, StageConfig};
pub use observer::{CompositeObserver, PipelineEvent, PipelineObserver, PipelineStats, TracingObserver};
pub use sink::{CellSink, MemorySink, WireSink};

/// Outcome of a finished pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineReport {
    pub stats: PipelineStats,
    /// End-of-stream reports, in stage order.
    pub stages: Vec<(&'static str, StageReport)>,
}

impl PipelineReport {
    /// First report from a stage with the given name.
    pub fn report_for(&self, stage: &str) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, report)| report)
    }
}

/// A chain of stages feeding one sink.
///
/// Streams are pushed one after another with [`Pipeline::push_schema`] followed by their
/// cells. Only one schema may ever reach the sink, so pipelines over several streams need a
/// concatenation stage to absorb every schema after the first.
pub struct Pipeline<S: CellSink> {
    stages: Vec<Stage>,
    sink: S,
    observer: Arc<dyn PipelineObserver>,
    stats: PipelineStats,
    input_features: Option<usize>,
    schema_written: bool,
    halted: bool,
    finished: Option<PipelineReport>,
}

impl<S: CellSink> Pipeline<S> {
    pub fn new(stages: Vec<Stage>, sink: S) -> Self {
        Self {
            stages,
            sink,
            observer: Arc::new(TracingObserver),
            stats: PipelineStats::default(),
            input_features: None,
            schema_written: false,
            halted: false,
            finished: None,
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// True once the sink declined further cells.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Start a new input stream.
    ///
    /// Cells still held from the previous stream are released first, so they pass the later
    /// stages under that stream's state.
    pub fn push_schema(&mut self, mut schema: Schema) -> CellResult<()> {
        if self.finished.is_some() {
            return Err(CellError::mismatch("schema pushed after the pipeline finished"));
        }
        if self.stats.streams > 0 {
            self.release_held()?;
        }
        self.stats.streams += 1;
        self.input_features = Some(schema.feature_count());

        for stage in &mut self.stages {
            if stage.process_schema(&mut schema, self.observer.as_ref())? == SchemaFlow::Absorb {
                tracing::debug!(stage = stage.name(), stream = self.stats.streams, "schema absorbed");
                return Ok(());
            }
        }

        if self.schema_written {
            return Err(CellError::mismatch(
                "a second schema reached the sink; merge multiple streams with a cat stage",
            ));
        }
        self.sink.write_schema(&schema)?;
        self.schema_written = true;
        self.observer.on_event(&PipelineEvent::SchemaAccepted {
            feature_columns: schema.feature_count(),
        });

        if !self.sink.wants_cells() {
            tracing::debug!("sink needs no cells; halting after schema");
            self.halted = true;
        }
        Ok(())
    }

    /// Feed one cell of the current stream.
    pub fn push_cell(&mut self, cell: Cell) -> CellResult<()> {
        let columns = self
            .input_features
            .ok_or_else(|| CellError::mismatch("cell pushed before any schema"))?;
        if self.halted {
            return Ok(());
        }
        if cell.features.len() > columns {
            return Err(CellError::ShapeMismatch {
                values: cell.features.len(),
                columns,
            });
        }
        self.stats.cells_read += 1;
        self.forward(0, cell)
    }

    fn forward(&mut self, from: usize, mut cell: Cell) -> CellResult<()> {
        for stage in &mut self.stages[from..] {
            match stage.process_cell(&mut cell, self.observer.as_ref())? {
                CellFlow::Keep => {}
                CellFlow::Drop => {
                    self.stats.cells_dropped += 1;
                    return Ok(());
                }
                CellFlow::Held => return Ok(()),
            }
        }
        self.sink.write_cell(&cell)?;
        self.stats.cells_written += 1;
        Ok(())
    }

    /// Drain every stage in order, forwarding released cells through the stages after it.
    fn release_held(&mut self) -> CellResult<()> {
        for i in 0..self.stages.len() {
            let held = self.stages[i].drain(self.observer.as_ref())?;
            if !held.is_empty() {
                tracing::debug!(stage = self.stages[i].name(), cells = held.len(), "releasing held cells");
            }
            for cell in held {
                if self.halted {
                    break;
                }
                self.forward(i + 1, cell)?;
            }
        }
        Ok(())
    }

    /// End of input: drain held cells stage by stage, collect reports, and close the sink.
    ///
    /// Calling it again returns the same report.
    pub fn finish(&mut self) -> CellResult<PipelineReport> {
        if let Some(report) = &self.finished {
            return Ok(report.clone());
        }

        self.release_held()?;

        let stages: Vec<(&'static str, StageReport)> = self
            .stages
            .iter()
            .filter_map(|s| s.report().map(|r| (s.name(), r)))
            .collect();
        for (stage, report) in &stages {
            self.observer.on_event(&PipelineEvent::StageReport {
                stage: *stage,
                report: report.clone(),
            });
        }

        self.sink.close()?;
        self.observer.on_event(&PipelineEvent::Finished { stats: self.stats });

        let report = PipelineReport {
            stats: self.stats,
            stages,
        };
        self.finished = Some(report.clone());
        Ok(report)
    }

    /// Push one whole binary stream. Does not finish the pipeline.
    pub fn run<R: BufRead>(&mut self, reader: &mut WireReader<R>) -> CellResult<()> {
        self.push_schema(reader.read_schema()?)?;
        while !self.halted {
            match reader.next_cell()? {
                Some(cell) => self.push_cell(cell)?,
                None => break,
            }
        }
        Ok(())
    }

    /// Push several binary streams in order, then finish.
    pub fn run_streams<R, I>(&mut self, readers: I) -> CellResult<PipelineReport>
    where
        R: BufRead,
        I: IntoIterator<Item = WireReader<R>>,
    {
        for mut reader in readers {
            self.run(&mut reader)?;
        }
        self.finish()
    }

    /// Open and push binary files in order, then finish.
    pub fn run_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> CellResult<PipelineReport> {
        for path in paths {
            tracing::debug!(path = %path.as_ref().display(), "reading stream");
            let mut reader = WireReader::open(path)?;
            self.run(&mut reader)?;
        }
        self.finish()
    }
}

/// A pipeline can itself be the sink of another producer (e.g. text ingestion).
impl<S: CellSink> CellSink for Pipeline<S> {
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        self.push_schema(schema.clone())
    }

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        self.push_cell(cell.clone())
    }

    fn close(&mut self) -> CellResult<()> {
        self.finish().map(|_| ())
    }

    fn wants_cells(&self) -> bool {
        !self.halted
    }
}

/// Expand input patterns into file paths.
///
/// Patterns are expanded in the order given; matches of one pattern are sorted. A pattern that
/// matches nothing is an error.
pub fn expand_inputs<P: AsRef<str>>(patterns: &[P]) -> CellResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched = glob::glob(pattern)?
            .map(|entry| entry.map_err(|e| CellError::Io(e.into_error())))
            .collect::<CellResult<Vec<PathBuf>>>()?;
        if matched.is_empty() {
            return Err(CellError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no input matches '{pattern}'"),
            )));
        }
        matched.sort();
        out.extend(matched);
    }
    Ok(out)
}
