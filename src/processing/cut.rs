//! Column projection.

use std::collections::BTreeSet;

use crate::error::{CellError, CellResult};
use crate::execution::PipelineObserver;
use crate::types::{Cell, Schema};

use super::{CellFlow, CellStage, SchemaFlow};

/// Keeps only the named feature columns, in their original relative order.
///
/// Meta and graph tags carry no per-cell values and are left untouched. Every name in the
/// inclusion set must exist in the schema.
#[derive(Debug, Clone)]
pub struct CutStage {
    include: BTreeSet<String>,
    keep: Vec<bool>,
    prunes: bool,
}

impl CutStage {
    pub fn new<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            keep: Vec::new(),
            prunes: false,
        }
    }
}

impl CellStage for CutStage {
    fn name(&self) -> &'static str {
        "cut"
    }

    fn process_schema(
        &mut self,
        schema: &mut Schema,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<SchemaFlow> {
        if let Some(missing) = self.include.iter().find(|n| schema.index_of(n).is_none()) {
            return Err(CellError::MissingColumn {
                name: missing.clone(),
            });
        }

        self.keep = schema
            .feature_names()
            .map(|n| self.include.contains(n))
            .collect();
        self.prunes = self.keep.iter().any(|k| !k);

        if self.prunes {
            let total = self.keep.len();
            let kept = self.keep.iter().filter(|k| **k).count();
            let include = &self.include;
            schema
                .tags
                .retain(|t| !t.is_feature() || include.contains(&t.name));
            schema.push_provenance(format!("cut: kept {kept} of {total} feature columns"));
        }
        Ok(SchemaFlow::Forward)
    }

    fn process_cell(
        &mut self,
        cell: &mut Cell,
        _observer: &dyn PipelineObserver,
    ) -> CellResult<CellFlow> {
        if self.prunes {
            cell.retain_features(&self.keep);
        }
        Ok(CellFlow::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::CutStage;
    use crate::error::CellError;
    use crate::execution::TracingObserver;
    use crate::processing::CellStage;
    use crate::types::{Cell, CellId, Schema, Tag};

    fn schema() -> Schema {
        Schema::new(vec![
            Tag::feature("CD3"),
            Tag::meta("slide"),
            Tag::feature("CD4"),
            Tag::feature("CD8"),
        ])
    }

    fn run(stage: &mut CutStage, mut schema: Schema, mut cell: Cell) -> (Schema, Cell) {
        let obs = TracingObserver;
        stage.process_schema(&mut schema, &obs).unwrap();
        stage.process_cell(&mut cell, &obs).unwrap();
        (schema, cell)
    }

    #[test]
    fn keeps_included_features_in_original_order() {
        let mut stage = CutStage::new(["CD8", "CD3"]);
        let cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0, 2.0, 3.0]);
        let (schema, cell) = run(&mut stage, schema(), cell);

        assert_eq!(schema.feature_names().collect::<Vec<_>>(), vec!["CD3", "CD8"]);
        assert!(schema.index_of("slide").is_some());
        assert_eq!(schema.provenance, vec!["cut: kept 2 of 3 feature columns"]);
        assert_eq!(cell.features, vec![1.0, 3.0]);
    }

    #[test]
    fn projecting_twice_equals_projecting_once() {
        let cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0, 2.0, 3.0]);
        let (once_schema, once_cell) = run(&mut CutStage::new(["CD4"]), schema(), cell);
        let (twice_schema, twice_cell) =
            run(&mut CutStage::new(["CD4"]), once_schema.clone(), once_cell.clone());

        assert_eq!(twice_schema, once_schema);
        assert_eq!(twice_cell, once_cell);
    }

    #[test]
    fn missing_column_is_fatal() {
        let mut stage = CutStage::new(["CD3", "PD1"]);
        let err = stage
            .process_schema(&mut schema(), &TracingObserver)
            .unwrap_err();
        assert!(matches!(err, CellError::MissingColumn { name } if name == "PD1"));
    }

    #[test]
    fn short_feature_vectors_are_pruned_positionally() {
        let mut stage = CutStage::new(["CD4"]);
        let cell = Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![1.0, 2.0]);
        let (_, cell) = run(&mut stage, schema(), cell);
        assert_eq!(cell.features, vec![2.0]);
    }
}
