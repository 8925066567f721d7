use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::CellResult;
use crate::types::{Cell, Schema};
use crate::wire::WireWriter;

/// Final consumer of a pipeline.
pub trait CellSink {
    /// Called once, before any cell.
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()>;

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()>;

    /// Flush and release resources at end of stream.
    fn close(&mut self) -> CellResult<()> {
        Ok(())
    }

    /// `false` lets the driver stop pulling cells once the schema has been written.
    fn wants_cells(&self) -> bool {
        true
    }
}

impl<S: CellSink + ?Sized> CellSink for &mut S {
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        (**self).write_schema(schema)
    }

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        (**self).write_cell(cell)
    }

    fn close(&mut self) -> CellResult<()> {
        (**self).close()
    }

    fn wants_cells(&self) -> bool {
        (**self).wants_cells()
    }
}

/// Encodes the stream in the binary wire format.
#[derive(Debug)]
pub struct WireSink<W: Write> {
    writer: WireWriter<W>,
}

impl WireSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> CellResult<Self> {
        Ok(Self {
            writer: WireWriter::create(path)?,
        })
    }
}

impl<W: Write> WireSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: WireWriter::new(out),
        }
    }

    pub fn into_inner(self) -> CellResult<W> {
        self.writer.into_inner()
    }
}

impl<W: Write> CellSink for WireSink<W> {
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        self.writer.write_schema(schema)
    }

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        self.writer.write_cell(cell)
    }

    fn close(&mut self) -> CellResult<()> {
        self.writer.flush()
    }
}

/// Collects the stream in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub schema: Option<Schema>,
    pub cells: Vec<Cell>,
}

impl CellSink for MemorySink {
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        self.cells.push(cell.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CellSink, MemorySink, WireSink};
    use crate::types::{Cell, CellId, Schema};
    use crate::wire::WireReader;

    #[test]
    fn wire_sink_output_decodes() {
        let mut sink = WireSink::new(Vec::new());
        sink.write_schema(&Schema::with_features(["CD3"])).unwrap();
        sink.write_cell(&Cell::new(CellId::pack(0, 4), 1.0, 2.0, vec![7.0])).unwrap();
        sink.close().unwrap();

        let bytes = sink.into_inner().unwrap();
        let mut reader = WireReader::new(bytes.as_slice());
        assert_eq!(reader.read_schema().unwrap().feature_count(), 1);
        let cell = reader.next_cell().unwrap().unwrap();
        assert_eq!(cell.id, CellId::pack(0, 4));
        assert!(reader.next_cell().unwrap().is_none());
    }

    #[test]
    fn borrowed_sink_forwards() {
        let mut memory = MemorySink::default();
        {
            let mut borrowed = &mut memory;
            borrowed.write_schema(&Schema::default()).unwrap();
            borrowed.write_cell(&Cell::default()).unwrap();
            assert!(borrowed.wants_cells());
        }
        assert!(memory.schema.is_some());
        assert_eq!(memory.cells.len(), 1);
    }
}
