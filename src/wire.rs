//! Binary stream format.
//!
//! A stream is one schema block followed by zero or more cell records, each encoded with
//! `bincode`'s fixed-width little-endian layout: integers and floats at their natural width,
//! every sequence and string prefixed by a `u64` length, enum variants by a `u32` index.
//!
//! ```text
//! schema := u64 n_tags, n_tags × (u64 len, len × u8 name, u32 category),
//!           u64 n_prov, n_prov × (u64 len, len × u8 entry)
//! cell   := u64 id, u64 cflag, u64 pflag, f32 x, f32 y, u64 n, n × f32
//! ```
//!
//! Field order inside a cell is fixed: identity, structural flags, phenotype flags, x, y,
//! feature vector.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use bincode::Options;

use crate::error::{CellError, CellResult};
use crate::types::{Cell, Schema};

/// Upper bound on one encoded schema or record; corrupt length prefixes fail against it.
const MAX_RECORD_BYTES: u64 = 1 << 28;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
        .with_limit(MAX_RECORD_BYTES)
}

fn encode_error(err: bincode::Error) -> CellError {
    match *err {
        bincode::ErrorKind::Io(e) => CellError::Io(e),
        other => CellError::wire(format!("cannot encode record: {other}")),
    }
}

fn decode_error(err: bincode::Error) -> CellError {
    match *err {
        bincode::ErrorKind::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
            CellError::wire("stream truncated inside a record")
        }
        bincode::ErrorKind::Io(e) => CellError::Io(e),
        other => CellError::wire(format!("malformed record: {other}")),
    }
}

/// Encodes a schema and then cells onto a byte sink.
#[derive(Debug)]
pub struct WireWriter<W: Write> {
    inner: W,
    schema_written: bool,
}

impl WireWriter<BufWriter<File>> {
    /// Create (or truncate) a file and write a buffered stream into it.
    pub fn create(path: impl AsRef<Path>) -> CellResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            schema_written: false,
        }
    }

    /// Write the schema block. Must be called exactly once, before any cell.
    pub fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        if self.schema_written {
            return Err(CellError::mismatch("schema already written to this stream"));
        }
        codec()
            .serialize_into(&mut self.inner, schema)
            .map_err(encode_error)?;
        self.schema_written = true;
        Ok(())
    }

    /// Write one cell record.
    pub fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        if !self.schema_written {
            return Err(CellError::mismatch("cell written before schema"));
        }
        codec()
            .serialize_into(&mut self.inner, cell)
            .map_err(encode_error)
    }

    pub fn flush(&mut self) -> CellResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(mut self) -> CellResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Decodes a schema and then cells from a buffered byte source.
#[derive(Debug)]
pub struct WireReader<R: BufRead> {
    inner: R,
    feature_count: Option<usize>,
}

impl WireReader<BufReader<File>> {
    /// Open a file for buffered decoding.
    pub fn open(path: impl AsRef<Path>) -> CellResult<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            feature_count: None,
        }
    }

    /// Read the schema block. Must be called exactly once, before any cell.
    pub fn read_schema(&mut self) -> CellResult<Schema> {
        if self.feature_count.is_some() {
            return Err(CellError::mismatch("schema already read from this stream"));
        }
        let schema: Schema = codec()
            .deserialize_from(&mut self.inner)
            .map_err(decode_error)?;
        self.feature_count = Some(schema.feature_count());
        Ok(schema)
    }

    /// Read the next cell, or `None` at a clean end of stream.
    ///
    /// A stream that ends inside a record is an error.
    pub fn next_cell(&mut self) -> CellResult<Option<Cell>> {
        let columns = self
            .feature_count
            .ok_or_else(|| CellError::mismatch("cell read before schema"))?;
        if self.at_end()? {
            return Ok(None);
        }

        let cell: Cell = codec()
            .deserialize_from(&mut self.inner)
            .map_err(decode_error)?;
        if cell.features.len() > columns {
            return Err(CellError::ShapeMismatch {
                values: cell.features.len(),
                columns,
            });
        }
        Ok(Some(cell))
    }

    /// Iterate the remaining cells.
    pub fn cells(&mut self) -> impl Iterator<Item = CellResult<Cell>> + '_ {
        std::iter::from_fn(move || self.next_cell().transpose())
    }

    /// True when no byte is left at a record boundary.
    fn at_end(&mut self) -> CellResult<bool> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.is_empty()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(CellError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WireReader, WireWriter};
    use crate::error::CellError;
    use crate::types::{Cell, CellId, Schema, Tag};

    fn schema() -> Schema {
        let mut s = Schema::new(vec![
            Tag::feature("CD3"),
            Tag::meta("slide"),
            Tag::feature("CD8"),
        ]);
        s.push_provenance("ingest");
        s
    }

    fn encode(schema: &Schema, cells: &[Cell]) -> Vec<u8> {
        let mut w = WireWriter::new(Vec::new());
        w.write_schema(schema).unwrap();
        for c in cells {
            w.write_cell(c).unwrap();
        }
        w.into_inner().unwrap()
    }

    #[test]
    fn stream_preserves_schema_and_cell_fields() {
        let mut cell = Cell::new(CellId::pack(3, 9), 1.25, -4.5, vec![0.5, 12.0]);
        cell.cflag = 1 << 40;
        cell.pflag = 5;
        let bytes = encode(&schema(), std::slice::from_ref(&cell));

        let mut r = WireReader::new(bytes.as_slice());
        assert_eq!(r.read_schema().unwrap(), schema());
        assert_eq!(r.next_cell().unwrap(), Some(cell));
        assert_eq!(r.next_cell().unwrap(), None);
    }

    #[test]
    fn cell_field_order_is_fixed() {
        let mut cell = Cell::new(CellId::pack(0, 1), 2.0, 3.0, vec![]);
        cell.cflag = 0xAA;
        cell.pflag = 0xBB;
        let bytes = encode(&Schema::default(), &[cell]);
        // empty schema: two zero counts
        let body = &bytes[16..];
        assert_eq!(&body[0..8], &1u64.to_le_bytes());
        assert_eq!(&body[8..16], &0xAAu64.to_le_bytes());
        assert_eq!(&body[16..24], &0xBBu64.to_le_bytes());
        assert_eq!(&body[24..28], &2.0f32.to_le_bytes());
        assert_eq!(&body[28..32], &3.0f32.to_le_bytes());
        assert_eq!(&body[32..40], &0u64.to_le_bytes());
        assert_eq!(body.len(), 40);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let cell = Cell::new(CellId::pack(0, 1), 2.0, 3.0, vec![1.0]);
        let mut bytes = encode(&schema(), &[cell]);
        bytes.truncate(bytes.len() - 2);

        let mut r = WireReader::new(bytes.as_slice());
        r.read_schema().unwrap();
        let err = r.next_cell().unwrap_err();
        assert!(matches!(err, CellError::Wire { .. }));
    }

    #[test]
    fn oversized_feature_vector_is_rejected() {
        let cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0, 2.0, 3.0]);
        let bytes = encode(&schema(), &[cell]);

        let mut r = WireReader::new(bytes.as_slice());
        r.read_schema().unwrap();
        let err = r.next_cell().unwrap_err();
        assert!(matches!(
            err,
            CellError::ShapeMismatch {
                values: 3,
                columns: 2
            }
        ));
    }

    #[test]
    fn unknown_tag_category_is_a_wire_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&3u64.to_le_bytes());
        bytes.extend_from_slice(b"CD3");
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());

        let err = WireReader::new(bytes.as_slice()).read_schema().unwrap_err();
        assert!(matches!(err, CellError::Wire { .. }));
    }

    #[test]
    fn corrupt_length_prefix_is_a_wire_error() {
        let cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0]);
        let mut bytes = encode(&schema(), &[cell]);
        // the feature count sits just before the last f32
        let at = bytes.len() - 12;
        bytes[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());

        let mut r = WireReader::new(bytes.as_slice());
        r.read_schema().unwrap();
        assert!(matches!(r.next_cell().unwrap_err(), CellError::Wire { .. }));
    }

    #[test]
    fn schema_layout_is_length_prefixed() {
        let schema = Schema::new(vec![Tag::meta("s")]);
        let bytes = encode(&schema, &[]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(b's');
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn cells_before_schema_are_rejected() {
        let mut w = WireWriter::new(Vec::new());
        assert!(w.write_cell(&Cell::default()).is_err());

        let mut r = WireReader::new(&[][..]);
        assert!(r.next_cell().is_err());
    }

    #[test]
    fn cells_iterator_stops_at_end() {
        let cells: Vec<Cell> = (0..3)
            .map(|i| Cell::new(CellId::pack(0, i), i as f32, 0.0, vec![1.0]))
            .collect();
        let bytes = encode(&schema(), &cells);
        let mut r = WireReader::new(bytes.as_slice());
        r.read_schema().unwrap();
        let decoded: Vec<Cell> = r.cells().collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, cells);
    }
}
