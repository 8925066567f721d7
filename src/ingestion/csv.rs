//! CSV front end for the [`Ingestor`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{CellError, CellResult};
use crate::execution::{CellSink, WireSink};

use super::{schema_from_header, IngestOptions, IngestStats, Ingestor, LineStage};

/// Ingest delimited text into any sink.
///
/// Rules:
///
/// - The first line is the header; marker names are taken from it.
/// - Lines may have differing field counts (see the module docs for the per-line policy).
/// - Fields are trimmed.
pub fn ingest_csv_from_reader<R: Read, S: CellSink>(
    reader: R,
    options: IngestOptions,
    sink: S,
) -> CellResult<(S, IngestStats)> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(options.delimiter)
        .from_reader(reader);
    let mut records = rdr.records();

    let header = records
        .next()
        .ok_or_else(|| CellError::mismatch("input has no header line"))??;
    let header: Vec<&str> = header.iter().collect();
    let schema = schema_from_header(&header, &options)?;
    tracing::debug!(feature_columns = schema.feature_count(), "ingestion schema built");

    let mut ingestor = Ingestor::new(sink, options)?;
    ingestor.process_schema(schema)?;
    for result in records {
        if !ingestor.wants_lines() {
            break;
        }
        let record = result?;
        let fields: Vec<&str> = record.iter().collect();
        ingestor.process_fields(&fields)?;
    }
    ingestor.finish()
}

/// Ingest a text file into a binary stream file.
pub fn ingest_csv_from_path(
    input: impl AsRef<Path>,
    options: IngestOptions,
    output: impl AsRef<Path>,
) -> CellResult<IngestStats> {
    let file = File::open(input)?;
    let (_, stats) = ingest_csv_from_reader(file, options, WireSink::create(output)?)?;
    Ok(stats)
}
