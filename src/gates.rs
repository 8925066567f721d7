//! Marker gates for phenotype derivation.
//!
//! A [`GateMap`] is an ordered list of `marker → [low, high]` intervals. The position of a gate
//! in the map is its phenotype bit: the first declared gate sets bit 0, the next bit 1, and so on.
//!
//! Gates can be loaded from a headerless CSV file of `marker,low,high` lines or from a JSON
//! array of `{"marker": .., "low": .., "high": ..}` objects.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CellError, CellResult};

/// Maximum number of gates: one per phenotype flag bit.
pub const MAX_GATES: usize = 64;

/// One marker interval. Membership is inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Gate {
    pub marker: String,
    pub low: f32,
    pub high: f32,
}

impl Gate {
    pub fn contains(&self, value: f32) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Ordered mapping from marker name to gate interval.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Vec<Gate>")]
pub struct GateMap {
    gates: Vec<Gate>,
}

impl GateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a gate. Rejects duplicate markers, NaN bounds, inverted intervals, and more than
    /// [`MAX_GATES`] entries.
    pub fn insert(&mut self, marker: impl Into<String>, low: f32, high: f32) -> CellResult<()> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(CellError::config("gate marker name is empty"));
        }
        if self.gates.iter().any(|g| g.marker == marker) {
            return Err(CellError::config(format!("duplicate gate for marker '{marker}'")));
        }
        if low.is_nan() || high.is_nan() || low > high {
            return Err(CellError::config(format!(
                "gate for '{marker}' has invalid interval [{low}, {high}]"
            )));
        }
        if self.gates.len() == MAX_GATES {
            return Err(CellError::config(format!(
                "at most {MAX_GATES} gates are supported"
            )));
        }
        self.gates.push(Gate { marker, low, high });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Gates in declaration (bit) order.
    pub fn iter(&self) -> impl Iterator<Item = &Gate> {
        self.gates.iter()
    }

    /// Phenotype bit assigned to a marker, if gated.
    pub fn bit_of(&self, marker: &str) -> Option<u64> {
        self.gates
            .iter()
            .position(|g| g.marker == marker)
            .map(|i| 1u64 << i)
    }

    /// Parse headerless `marker,low,high` CSV.
    pub fn from_csv_reader<R: Read>(reader: R) -> CellResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut map = GateMap::new();
        for (line0, result) in rdr.records().enumerate() {
            let record = result?;
            if record.len() != 3 {
                return Err(CellError::config(format!(
                    "gate line {}: expected marker,low,high, found {} fields",
                    line0 + 1,
                    record.len()
                )));
            }
            let low = parse_bound(line0 + 1, &record[1])?;
            let high = parse_bound(line0 + 1, &record[2])?;
            map.insert(&record[0], low, high)?;
        }
        Ok(map)
    }

    /// Read a gate file. `.json` files are parsed as JSON; anything else as CSV.
    pub fn load(path: impl AsRef<Path>) -> CellResult<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&fs::read_to_string(path)?)
        } else {
            Self::from_csv_reader(fs::File::open(path)?)
        }
    }

    pub fn from_json_str(input: &str) -> CellResult<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

impl TryFrom<Vec<Gate>> for GateMap {
    type Error = CellError;

    fn try_from(gates: Vec<Gate>) -> CellResult<Self> {
        let mut map = GateMap::new();
        for g in gates {
            map.insert(g.marker, g.low, g.high)?;
        }
        Ok(map)
    }
}

fn parse_bound(line: usize, raw: &str) -> CellResult<f32> {
    raw.parse::<f32>().map_err(|e| {
        CellError::config(format!("gate line {line}: cannot parse bound '{raw}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::GateMap;

    #[test]
    fn bits_follow_declaration_order() {
        let mut map = GateMap::new();
        map.insert("CD3", 1.0, 10.0).unwrap();
        map.insert("CD8", 0.0, 5.0).unwrap();
        assert_eq!(map.bit_of("CD3"), Some(1));
        assert_eq!(map.bit_of("CD8"), Some(2));
        assert_eq!(map.bit_of("CD4"), None);
    }

    #[test]
    fn rejects_duplicates_and_inverted_intervals() {
        let mut map = GateMap::new();
        map.insert("CD3", 1.0, 10.0).unwrap();
        assert!(map.insert("CD3", 0.0, 1.0).is_err());
        assert!(map.insert("CD8", 5.0, 1.0).is_err());
        assert!(map.insert("CD4", f32::NAN, 1.0).is_err());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn rejects_more_gates_than_flag_bits() {
        let mut map = GateMap::new();
        for i in 0..64 {
            map.insert(format!("m{i}"), 0.0, 1.0).unwrap();
        }
        assert!(map.insert("m64", 0.0, 1.0).is_err());
    }

    #[test]
    fn parses_csv_with_comments_and_whitespace() {
        let input = "# marker,low,high\nCD3, 1.5, 20\nCD8,0,3\n";
        let map = GateMap::from_csv_reader(input.as_bytes()).unwrap();
        let gates: Vec<_> = map.iter().map(|g| (g.marker.as_str(), g.low, g.high)).collect();
        assert_eq!(gates, vec![("CD3", 1.5, 20.0), ("CD8", 0.0, 3.0)]);
    }

    #[test]
    fn csv_with_bad_bound_is_a_config_error() {
        let err = GateMap::from_csv_reader("CD3,low,3\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("cannot parse bound 'low'"));
    }

    #[test]
    fn parses_json_and_validates() {
        let map = GateMap::from_json_str(r#"[{"marker":"CD3","low":1,"high":2}]"#).unwrap();
        assert_eq!(map.len(), 1);
        assert!(GateMap::from_json_str(r#"[{"marker":"CD3","low":3,"high":2}]"#).is_err());
    }
}
