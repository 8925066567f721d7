use std::fmt;
use std::sync::Arc;

use crate::processing::StageReport;

/// Events emitted by the pipeline driver and its stages.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A schema passed every stage and was written to the sink.
    SchemaAccepted { feature_columns: usize },
    /// A recoverable record-level condition (the stream continues).
    Warning { stage: &'static str, message: String },
    /// A stage's end-of-stream report.
    StageReport { stage: &'static str, report: StageReport },
    /// The pipeline drained and closed its sink.
    Finished { stats: PipelineStats },
}

/// Observer hook for pipeline events.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards events to the `tracing` facade. This is the default observer.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::SchemaAccepted { feature_columns } => {
                tracing::debug!(feature_columns, "schema accepted");
            }
            PipelineEvent::Warning { stage, message } => {
                tracing::warn!(stage, "{message}");
            }
            PipelineEvent::StageReport { stage, report } => {
                tracing::info!(stage, "{report}");
            }
            PipelineEvent::Finished { stats } => {
                tracing::debug!("pipeline finished: {stats}");
            }
        }
    }
}

/// Fans every event out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Counters maintained by the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    /// Input streams whose schema was pushed.
    pub streams: u64,
    /// Cells accepted from the input.
    pub cells_read: u64,
    /// Cells written to the sink.
    pub cells_written: u64,
    /// Cells removed by filtering stages.
    pub cells_dropped: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "streams={}, cells_read={}, cells_written={}, cells_dropped={}",
            self.streams, self.cells_read, self.cells_written, self.cells_dropped
        )
    }
}
