//! `cell-sift` is a library of single-pass streaming stages over spatial single-cell tables.
//!
//! Each record ([`types::Cell`]) carries a packed 64-bit identity, two independent flag masks,
//! 2-D coordinates, and a feature vector aligned with the FeatureColumn tags of its
//! [`types::Schema`]. Streams are stored in a compact little-endian binary format ([`wire`]).
//!
//! ## Stages
//!
//! | stage    | effect                                                         |
//! |----------|----------------------------------------------------------------|
//! | `cut`    | keep only named feature columns                                |
//! | `clean`  | drop graph, meta and/or feature columns wholesale              |
//! | `pheno`  | set one phenotype bit per matching marker gate                 |
//! | `select` | keep cells matching an AND/OR flag query, optionally inverted  |
//! | `count`  | count cells                                                    |
//! | `log`    | base-10 log of feature values                                  |
//! | `roi`    | keep or label cells inside polygons                            |
//! | `build`  | register the spatial graph column                              |
//! | `cat`    | merge several streams with disjoint identities                 |
//! | `radial` | count flagged neighbors within distance bands                  |
//!
//! Text input is converted by [`ingestion`]; text output is rendered by
//! [`processing::ViewSink`].
//!
//! ## Modules
//!
//! - [`types`]: tags, schemas, identities and cells
//! - [`wire`]: binary stream encoder and decoder
//! - [`geometry`]: polygons and the containment rule
//! - [`gates`]: marker gates for phenotyping
//! - [`processing`]: the stage contract and every stage
//! - [`ingestion`]: text-to-binary conversion
//! - [`execution`]: the pipeline driver, sinks, observers and configuration
//! - [`error`]: the error type shared by every module
//!
//! ## Example: text in, gated and rendered text out
//!
//! ```rust
//! use cell_sift::execution::Pipeline;
//! use cell_sift::gates::GateMap;
//! use cell_sift::ingestion::{ingest_csv_from_reader, IngestOptions};
//! use cell_sift::processing::{PhenoStage, SelectStage, ViewOptions, ViewSink};
//!
//! # fn main() -> Result<(), cell_sift::CellError> {
//! let input = "id,x,y,CD3,CD8\n1,0,0,12,1\n2,5,5,1,9\n";
//!
//! let mut gates = GateMap::new();
//! gates.insert("CD3", 10.0, 100.0)?;
//! let view = ViewSink::new(Vec::new(), ViewOptions::default());
//! let pipeline = Pipeline::new(
//!     vec![PhenoStage::new(gates).into(), SelectStage::new(0b1, 0, false).into()],
//!     view,
//! );
//!
//! let (pipeline, _) = ingest_csv_from_reader(input.as_bytes(), IngestOptions::default(), pipeline)?;
//! let text = String::from_utf8(pipeline.into_sink().into_inner()).unwrap();
//! assert_eq!(text, "0,1,0,1,0,0,12,1\n");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod execution;
pub mod gates;
pub mod geometry;
pub mod ingestion;
pub mod processing;
pub mod types;
pub mod wire;

pub use error::{CellError, CellResult};
