//! Text-to-binary ingestion.
//!
//! Delimited text lines become [`Cell`]s under a schema derived from the header line. Callers
//! declare zero-based positions for the identity, x and y columns, plus an inclusive marker
//! column range. The [`Ingestor`] writes the schema once, then one cell per line, to any
//! [`CellSink`] (a binary file, or a [`crate::execution::Pipeline`] directly).
//!
//! Failure policy per line:
//!
//! - fewer than 3 fields is fatal ([`CellError::LineTooShort`])
//! - an identity, x, y or marker-start position beyond the line is fatal
//!   ([`CellError::IndexOutOfBounds`])
//! - fewer marker values than the schema declares is a warning for that line; the cell is
//!   written with a shorter vector
//! - marker values past the declared count are scanned but not stored
//! - a malformed numeric field becomes `0.0`; only the first occurrence is reported
//!
//! Most callers should use [`csv::ingest_csv_from_path`] or [`csv::ingest_csv_from_reader`].

pub mod csv;

use std::fmt;
use std::sync::Arc;

use crate::error::{CellError, CellResult};
use crate::execution::{CellSink, PipelineEvent, PipelineObserver, TracingObserver};
use crate::types::{Cell, CellId, Schema, Tag};

pub use self::csv::{ingest_csv_from_path, ingest_csv_from_reader};

/// Stage contract for the raw-text view of the stream: one schema, then tokenized lines.
pub trait LineStage {
    fn process_schema(&mut self, schema: Schema) -> CellResult<()>;

    /// One line's fields, already split by the tokenizer.
    fn process_fields(&mut self, fields: &[&str]) -> CellResult<()>;
}

/// Column layout of the text input.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Column holding the per-sample cell id. When `None`, ids are assigned from a running line
    /// counter.
    pub id_column: Option<usize>,
    pub x_column: usize,
    pub y_column: usize,
    /// First marker column (inclusive).
    pub marker_start: usize,
    /// Last marker column (inclusive). `None` runs to the last column.
    pub marker_end: Option<usize>,
    /// Group (sample) id packed into every identity.
    pub group_id: u32,
    pub delimiter: u8,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            id_column: Some(0),
            x_column: 1,
            y_column: 2,
            marker_start: 3,
            marker_end: None,
            group_id: 0,
            delimiter: b',',
        }
    }
}

impl IngestOptions {
    fn validate(&self) -> CellResult<()> {
        if let Some(end) = self.marker_end {
            if end < self.marker_start {
                return Err(CellError::config(format!(
                    "marker range [{}, {end}] is empty",
                    self.marker_start
                )));
            }
        }
        if self.x_column == self.y_column {
            return Err(CellError::config("x and y columns must differ"));
        }
        Ok(())
    }

    fn is_positional(&self, i: usize) -> bool {
        i == self.x_column || i == self.y_column || self.id_column == Some(i)
    }
}

/// Build the ingestion schema from a header line: one feature column per marker position,
/// skipping the identity and coordinate columns.
pub fn schema_from_header(header: &[&str], options: &IngestOptions) -> CellResult<Schema> {
    options.validate()?;
    if header.len() <= options.marker_start {
        return Err(CellError::IndexOutOfBounds {
            line: 1,
            column: "marker start",
            index: options.marker_start,
            fields: header.len(),
        });
    }
    let last = header.len() - 1;
    let end = options.marker_end.map_or(last, |e| e.min(last));

    let tags: Vec<Tag> = (options.marker_start..=end)
        .filter(|&i| !options.is_positional(i))
        .map(|i| Tag::feature(header[i].trim()))
        .collect();
    let mut schema = Schema::new(tags);
    schema.push_provenance(format!(
        "ingest: {} feature columns from text columns {}..={end}",
        schema.feature_count(),
        options.marker_start
    ));
    Ok(schema)
}

/// Counters kept by an [`Ingestor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    /// Data lines seen (header excluded).
    pub lines: u64,
    pub cells: u64,
    /// Lines with fewer marker values than the schema declares.
    pub short_rows: u64,
    /// Numeric fields replaced by `0.0`.
    pub malformed_fields: u64,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={}, cells={}, short_rows={}, malformed_fields={}",
            self.lines, self.cells, self.short_rows, self.malformed_fields
        )
    }
}

/// Parses tokenized lines into cells and writes them to a sink.
pub struct Ingestor<S: CellSink> {
    sink: S,
    options: IngestOptions,
    observer: Arc<dyn PipelineObserver>,
    feature_count: Option<usize>,
    next_item: u32,
    malformed_warned: bool,
    stats: IngestStats,
}

impl<S: CellSink> Ingestor<S> {
    pub fn new(sink: S, options: IngestOptions) -> CellResult<Self> {
        options.validate()?;
        Ok(Self {
            sink,
            options,
            observer: Arc::new(TracingObserver),
            feature_count: None,
            next_item: 0,
            malformed_warned: false,
            stats: IngestStats::default(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// `false` once the sink has declined cells (e.g. a header-only view).
    pub fn wants_lines(&self) -> bool {
        self.sink.wants_cells()
    }

    /// Close the sink and return it with the final counters.
    pub fn finish(mut self) -> CellResult<(S, IngestStats)> {
        self.sink.close()?;
        tracing::info!("ingestion finished: {}", self.stats);
        Ok((self.sink, self.stats))
    }

    fn warn(&self, message: String) {
        self.observer.on_event(&PipelineEvent::Warning {
            stage: "ingest",
            message,
        });
    }

    fn numeric(&mut self, line: u64, column: usize, raw: &str) -> f32 {
        match raw.trim().parse::<f32>() {
            Ok(v) => v,
            Err(_) => {
                self.stats.malformed_fields += 1;
                if !self.malformed_warned {
                    self.malformed_warned = true;
                    self.warn(format!(
                        "line {line}: malformed numeric field {raw:?} in column {column} read as 0; further occurrences are not reported"
                    ));
                }
                0.0
            }
        }
    }

    fn check_position(line: u64, column: &'static str, index: usize, fields: usize) -> CellResult<()> {
        if index >= fields {
            return Err(CellError::IndexOutOfBounds {
                line: line as usize,
                column,
                index,
                fields,
            });
        }
        Ok(())
    }
}

impl<S: CellSink> LineStage for Ingestor<S> {
    fn process_schema(&mut self, schema: Schema) -> CellResult<()> {
        if self.feature_count.is_some() {
            return Err(CellError::mismatch("ingestion schema already written"));
        }
        self.sink.write_schema(&schema)?;
        self.feature_count = Some(schema.feature_count());
        Ok(())
    }

    fn process_fields(&mut self, fields: &[&str]) -> CellResult<()> {
        let declared = self
            .feature_count
            .ok_or_else(|| CellError::mismatch("text line before ingestion schema"))?;
        self.stats.lines += 1;
        // header is line 1
        let line = self.stats.lines + 1;
        let n = fields.len();
        if n < 3 {
            return Err(CellError::LineTooShort {
                line: line as usize,
                fields: n,
            });
        }
        Self::check_position(line, "x", self.options.x_column, n)?;
        Self::check_position(line, "y", self.options.y_column, n)?;
        Self::check_position(line, "marker start", self.options.marker_start, n)?;
        if let Some(id) = self.options.id_column {
            Self::check_position(line, "id", id, n)?;
        }

        let item = match self.options.id_column {
            Some(i) => match fields[i].trim().parse::<u32>() {
                Ok(id) => id,
                Err(_) => {
                    self.stats.malformed_fields += 1;
                    if !self.malformed_warned {
                        self.malformed_warned = true;
                        self.warn(format!(
                            "line {line}: malformed cell id {:?}; using running id {}",
                            fields[i], self.next_item
                        ));
                    }
                    self.next_item
                }
            },
            None => self.next_item,
        };
        let x = self.numeric(line, self.options.x_column, fields[self.options.x_column]);
        let y = self.numeric(line, self.options.y_column, fields[self.options.y_column]);

        let end = self.options.marker_end.map_or(n - 1, |e| e.min(n - 1));
        let mut features = Vec::with_capacity(declared);
        for i in self.options.marker_start..=end {
            if self.options.is_positional(i) || features.len() >= declared {
                continue;
            }
            let v = self.numeric(line, i, fields[i]);
            features.push(v);
        }
        if features.len() < declared {
            self.stats.short_rows += 1;
            self.warn(format!(
                "line {line}: only {} of {declared} marker values present",
                features.len()
            ));
        }

        let cell = Cell::new(CellId::pack(self.options.group_id, item), x, y, features);
        self.sink.write_cell(&cell)?;
        self.stats.cells += 1;
        self.next_item = self.next_item.wrapping_add(1);
        Ok(())
    }
}
