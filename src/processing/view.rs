//! Text rendering of the binary stream.
//!
//! [`ViewSink`] is the terminal consumer of a pipeline. It optionally writes the schema's
//! provenance log (one `# `-prefixed line per entry) and a header line, then one
//! comma-separated line per cell in the chosen [`RenderStyle`]. With `header_only` it
//! reports through [`CellSink::wants_cells`] that no cells are needed, so the driver stops
//! pulling records right after the schema.

use std::io::Write;

use serde::Deserialize;

use crate::error::CellResult;
use crate::execution::CellSink;
use crate::types::{Cell, Schema};

const MAX_DIGITS: usize = 15;

/// Line layout for rendered cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStyle {
    /// `sid,cid,cflag,pflag,x,y,f1,...` with every value rounded.
    #[default]
    Compact,
    /// `sid:..,cid:..,...,name:value` with feature values truncated and trailing zeros trimmed.
    Named,
    /// `cid,x,y,f1,...` with values unrounded.
    Export,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    /// Write the provenance log and the column header line before the first cell.
    pub print_header: bool,
    /// Write the header line and stop the pipeline without rendering cells.
    pub header_only: bool,
    /// Fractional digits kept for floating-point values.
    pub round: usize,
    pub style: RenderStyle,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            print_header: false,
            header_only: false,
            round: 2,
            style: RenderStyle::Compact,
        }
    }
}

/// Round to `digits` fractional digits; integral results print without a decimal point.
pub fn format_rounded(value: f64, digits: usize) -> String {
    let digits = digits.min(MAX_DIGITS);
    let scale = 10f64.powi(digits as i32);
    let rounded = (value * scale).round() / scale;
    if !rounded.is_finite() {
        return rounded.to_string();
    }
    if rounded == 0.0 {
        return "0".to_string();
    }
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.digits$}")
    }
}

/// Truncate to `digits` fractional digits, then trim trailing zeros and a bare decimal point.
pub fn format_truncated(value: f64, digits: usize) -> String {
    let digits = digits.min(MAX_DIGITS);
    // one guard digit past the cut so the formatter's rounding never reaches a kept digit
    let prec = digits.max(6) + 1;
    let mut out = format!("{value:.prec$}");
    if let Some(dot) = out.find('.') {
        out.truncate((dot + digits + 1).min(out.len()));
        let trimmed = out.trim_end_matches('0').trim_end_matches('.').len();
        out.truncate(trimmed);
    }
    if out == "-0" {
        out = "0".to_string();
    }
    out
}

/// Renders cells as delimited text lines.
#[derive(Debug)]
pub struct ViewSink<W: Write> {
    out: W,
    options: ViewOptions,
    features: Vec<String>,
    provenance: Vec<String>,
}

impl<W: Write> ViewSink<W> {
    pub fn new(out: W, options: ViewOptions) -> Self {
        Self {
            out,
            options,
            features: Vec::new(),
            provenance: Vec::new(),
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Column header for the current schema.
    pub fn header_line(&self) -> String {
        let leading = match self.options.style {
            RenderStyle::Export => "cid,x,y",
            RenderStyle::Compact | RenderStyle::Named => "sid,cid,cflag,pflag,x,y",
        };
        let mut line = leading.to_string();
        for name in &self.features {
            line.push(',');
            line.push_str(name);
        }
        line
    }

    /// One cell as a line, without the trailing newline.
    pub fn render(&self, cell: &Cell) -> String {
        let round = self.options.round;
        let (group, item) = cell.id.unpack();
        let coord = |v: f32| format_rounded(f64::from(v), round);
        let mut line = match self.options.style {
            RenderStyle::Compact => format!(
                "{group},{item},{},{},{},{}",
                cell.cflag,
                cell.pflag,
                coord(cell.x),
                coord(cell.y)
            ),
            RenderStyle::Named => format!(
                "sid:{group},cid:{item},cflag:{},pflag:{},x:{},y:{}",
                cell.cflag,
                cell.pflag,
                coord(cell.x),
                coord(cell.y)
            ),
            RenderStyle::Export => format!("{item},{},{}", cell.x, cell.y),
        };

        for (i, &v) in cell.features.iter().enumerate() {
            line.push(',');
            match self.options.style {
                RenderStyle::Compact => line.push_str(&format_rounded(f64::from(v), round)),
                RenderStyle::Named => {
                    let name = self.features.get(i).map_or("", String::as_str);
                    line.push_str(name);
                    line.push(':');
                    line.push_str(&format_truncated(f64::from(v), round));
                }
                RenderStyle::Export => line.push_str(&v.to_string()),
            }
        }
        line
    }
}

impl<W: Write> CellSink for ViewSink<W> {
    fn write_schema(&mut self, schema: &Schema) -> CellResult<()> {
        self.features = schema.feature_names().map(str::to_owned).collect();
        self.provenance = schema.provenance.clone();
        if self.options.print_header || self.options.header_only {
            for entry in &self.provenance {
                writeln!(self.out, "# {entry}")?;
            }
            let header = self.header_line();
            writeln!(self.out, "{header}")?;
        }
        Ok(())
    }

    fn write_cell(&mut self, cell: &Cell) -> CellResult<()> {
        if self.options.header_only {
            return Ok(());
        }
        let line = self.render(cell);
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    fn close(&mut self) -> CellResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn wants_cells(&self) -> bool {
        !self.options.header_only
    }
}

#[cfg(test)]
mod tests {
    use super::{format_rounded, format_truncated, RenderStyle, ViewOptions, ViewSink};
    use crate::execution::CellSink;
    use crate::types::{Cell, CellId, Schema, Tag};

    fn sample() -> Cell {
        let mut cell = Cell::new(CellId::pack(1, 2), 1.5, 2.0, vec![3.14159, 10.0]);
        cell.pflag = 3;
        cell
    }

    fn sink(style: RenderStyle) -> ViewSink<Vec<u8>> {
        let mut sink = ViewSink::new(
            Vec::new(),
            ViewOptions {
                style,
                ..Default::default()
            },
        );
        let schema = Schema::new(vec![Tag::feature("CD3"), Tag::meta("slide"), Tag::feature("CD8")]);
        sink.write_schema(&schema).unwrap();
        sink
    }

    #[test]
    fn rounded_values_drop_decimal_point_when_integral() {
        assert_eq!(format_rounded(3.14159, 2), "3.14");
        assert_eq!(format_rounded(2.0, 2), "2");
        assert_eq!(format_rounded(2.999, 2), "3");
        assert_eq!(format_rounded(1.5, 2), "1.50");
        assert_eq!(format_rounded(-0.001, 2), "0");
        assert_eq!(format_rounded(12.6, 0), "13");
    }

    #[test]
    fn truncated_values_trim_trailing_zeros() {
        assert_eq!(format_truncated(1.239, 2), "1.23");
        assert_eq!(format_truncated(1.2, 2), "1.2");
        assert_eq!(format_truncated(100.0, 2), "100");
        assert_eq!(format_truncated(-0.001, 2), "0");
        assert_eq!(format_truncated(5.75, 0), "5");
    }

    #[test]
    fn truncation_keeps_digits_past_six() {
        let v = f64::from(0.123_456_78f32);
        let t: f64 = format_truncated(v, 8).parse().unwrap();
        assert!((t - v).abs() < 1e-8, "{v} -> {t}");
        assert_eq!(format_truncated(0.5, 8), "0.5");
        assert_eq!(format_truncated(1.0 / 3.0, 10), "0.3333333333");
    }

    #[test]
    fn rendered_values_reparse_within_precision() {
        for v in [0.125f64, 7.777, -3.5, 1234.5678] {
            let r: f64 = format_rounded(v, 2).parse().unwrap();
            assert!((r - v).abs() <= 0.005 + 1e-9, "{v} -> {r}");
            let t: f64 = format_truncated(v, 2).parse().unwrap();
            assert!((t - v).abs() < 0.01, "{v} -> {t}");
        }
    }

    #[test]
    fn compact_style() {
        let s = sink(RenderStyle::Compact);
        assert_eq!(s.render(&sample()), "1,2,0,3,1.50,2,3.14,10");
    }

    #[test]
    fn named_style_labels_feature_values() {
        let s = sink(RenderStyle::Named);
        assert_eq!(
            s.render(&sample()),
            "sid:1,cid:2,cflag:0,pflag:3,x:1.50,y:2,CD3:3.14,CD8:10"
        );
    }

    #[test]
    fn export_style_is_unrounded() {
        let s = sink(RenderStyle::Export);
        assert_eq!(s.render(&sample()), "2,1.5,2,3.14159,10");
        assert_eq!(s.header_line(), "cid,x,y,CD3,CD8");
    }

    #[test]
    fn header_only_writes_header_and_refuses_cells() {
        let mut sink = ViewSink::new(
            Vec::new(),
            ViewOptions {
                header_only: true,
                ..Default::default()
            },
        );
        sink.write_schema(&Schema::with_features(["CD3"])).unwrap();
        assert!(!sink.wants_cells());
        sink.write_cell(&sample()).unwrap();
        sink.close().unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "sid,cid,cflag,pflag,x,y,CD3\n");
    }

    #[test]
    fn printed_header_is_preceded_by_provenance() {
        let mut sink = ViewSink::new(
            Vec::new(),
            ViewOptions {
                print_header: true,
                ..Default::default()
            },
        );
        let mut schema = Schema::with_features(["CD3"]);
        schema.push_provenance("ingest: 1 feature columns");
        schema.push_provenance("cut: kept 1 of 2 feature columns");
        sink.write_schema(&schema).unwrap();
        sink.write_cell(&Cell::new(CellId::pack(0, 1), 0.0, 0.0, vec![2.0])).unwrap();
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "# ingest: 1 feature columns\n\
             # cut: kept 1 of 2 feature columns\n\
             sid,cid,cflag,pflag,x,y,CD3\n\
             0,1,0,0,0,0,2\n"
        );
    }

    #[test]
    fn provenance_stays_hidden_without_header() {
        let mut sink = ViewSink::new(Vec::new(), ViewOptions::default());
        let mut schema = Schema::with_features(["CD3"]);
        schema.push_provenance("ingest");
        sink.write_schema(&schema).unwrap();
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ViewOptions = serde_json::from_str(r#"{"style": "named"}"#).unwrap();
        assert_eq!(opts.style, RenderStyle::Named);
        assert_eq!(opts.round, 2);
        assert!(!opts.print_header);
    }
}
