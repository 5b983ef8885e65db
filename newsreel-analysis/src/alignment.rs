//! Character timing alignment in row and columnar form
//!
//! Speech providers and the record store exchange alignment as a list of
//! `{char, start, end}` rows. Playback and highlighting work on three
//! parallel columns. Conversion never fails loudly: anything that does not
//! validate degrades to "no alignment" and a warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const COLUMN_CHARACTERS: &str = "characters";
const COLUMN_STARTS: &str = "character_start_times_seconds";
const COLUMN_ENDS: &str = "character_end_times_seconds";

/// One character with its spoken interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRow {
    #[serde(rename = "char", alias = "character")]
    pub character: String,
    #[serde(alias = "start_time")]
    pub start: f64,
    #[serde(alias = "end_time")]
    pub end: f64,
}

/// Row-oriented alignment as exchanged with providers and storage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawAlignment {
    pub characters: Vec<AlignmentRow>,
}

/// Columnar alignment used for playback and highlighting
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedAlignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl NormalizedAlignment {
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Interval of the character at `index`
    pub fn interval(&self, index: usize) -> Option<(f64, f64)> {
        Some((
            *self.character_start_times_seconds.get(index)?,
            *self.character_end_times_seconds.get(index)?,
        ))
    }

    /// The spoken text, characters concatenated
    pub fn text(&self) -> String {
        self.characters.concat()
    }
}

/// Check the structural and ordering invariants of columnar alignment
///
/// All three columns must have the same length, every start must be
/// non-negative and every end must not precede its own start. Starts are not
/// required to increase across characters.
pub fn validate(alignment: &NormalizedAlignment) -> bool {
    let len = alignment.characters.len();
    if alignment.character_start_times_seconds.len() != len
        || alignment.character_end_times_seconds.len() != len
    {
        return false;
    }

    alignment
        .character_start_times_seconds
        .iter()
        .zip(&alignment.character_end_times_seconds)
        .all(|(&start, &end)| start >= 0.0 && end >= start)
}

/// Normalize an alignment payload of either shape
///
/// `None` and JSON `null` mean "no alignment" and are not errors. Columnar
/// payloads that validate are returned unchanged; row payloads (an object
/// with a `characters` list of rows, or a bare list of rows) are projected
/// into columns and validated. Payloads carrying both shapes at once are
/// rejected as ambiguous.
pub fn normalize(input: Option<&Value>) -> Option<NormalizedAlignment> {
    let value = match input {
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };

    match classify(value) {
        Shape::Columnar => match serde_json::from_value::<NormalizedAlignment>(value.clone()) {
            Ok(columns) => normalize_columns(columns),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed columnar alignment");
                None
            }
        },
        Shape::Rows(rows) => match serde_json::from_value::<Vec<AlignmentRow>>(rows.clone()) {
            Ok(characters) => normalize_rows(&RawAlignment { characters }),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed row alignment");
                None
            }
        },
        Shape::Ambiguous => {
            tracing::warn!("Discarding alignment carrying both row and columnar fields");
            None
        }
        Shape::Unknown => {
            tracing::warn!("Discarding alignment of unrecognized shape");
            None
        }
    }
}

/// Validate columnar alignment, discarding it when invalid or empty
pub fn normalize_columns(columns: NormalizedAlignment) -> Option<NormalizedAlignment> {
    if columns.is_empty() && columns.character_start_times_seconds.is_empty() {
        return None;
    }
    if !validate(&columns) {
        tracing::warn!(
            characters = columns.characters.len(),
            starts = columns.character_start_times_seconds.len(),
            ends = columns.character_end_times_seconds.len(),
            "Discarding invalid columnar alignment"
        );
        return None;
    }
    Some(columns)
}

/// Project row alignment into columns and validate the result
pub fn normalize_rows(raw: &RawAlignment) -> Option<NormalizedAlignment> {
    if raw.characters.is_empty() {
        return None;
    }

    let columns = NormalizedAlignment {
        characters: raw.characters.iter().map(|r| r.character.clone()).collect(),
        character_start_times_seconds: raw.characters.iter().map(|r| r.start).collect(),
        character_end_times_seconds: raw.characters.iter().map(|r| r.end).collect(),
    };

    if !validate(&columns) {
        tracing::warn!(
            characters = columns.len(),
            "Discarding row alignment with invalid timings"
        );
        return None;
    }
    Some(columns)
}

/// Transpose columnar alignment back into rows for storage
///
/// Absent, empty or invalid alignment yields `None`, never an empty or
/// truncated row list.
pub fn denormalize(alignment: Option<&NormalizedAlignment>) -> Option<RawAlignment> {
    let alignment = alignment?;
    if alignment.is_empty() {
        return None;
    }
    if !validate(alignment) {
        tracing::warn!(
            characters = alignment.characters.len(),
            "Refusing to denormalize invalid alignment"
        );
        return None;
    }

    let characters = alignment
        .characters
        .iter()
        .zip(&alignment.character_start_times_seconds)
        .zip(&alignment.character_end_times_seconds)
        .map(|((character, &start), &end)| AlignmentRow {
            character: character.clone(),
            start,
            end,
        })
        .collect();

    Some(RawAlignment { characters })
}

enum Shape<'a> {
    Columnar,
    Rows(&'a Value),
    Ambiguous,
    Unknown,
}

fn classify(value: &Value) -> Shape<'_> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) => Shape::Rows(value),
        Value::Object(map) => {
            let has_time_columns = map.contains_key(COLUMN_STARTS) || map.contains_key(COLUMN_ENDS);
            let row_characters = match map.get(COLUMN_CHARACTERS) {
                Some(rows @ Value::Array(items))
                    if !items.is_empty() && items.iter().all(Value::is_object) =>
                {
                    Some(rows)
                }
                _ => None,
            };

            match (row_characters, has_time_columns) {
                (Some(_), true) => Shape::Ambiguous,
                (Some(rows), false) => Shape::Rows(rows),
                (None, true) => Shape::Columnar,
                (None, false) => match map.get(COLUMN_CHARACTERS) {
                    // An empty row list carries no timing either way
                    Some(Value::Array(items)) if items.is_empty() => Shape::Rows(&map[COLUMN_CHARACTERS]),
                    _ => Shape::Unknown,
                },
            }
        }
        _ => Shape::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hi_rows() -> RawAlignment {
        RawAlignment {
            characters: vec![
                AlignmentRow {
                    character: "H".into(),
                    start: 0.0,
                    end: 0.1,
                },
                AlignmentRow {
                    character: "i".into(),
                    start: 0.1,
                    end: 0.2,
                },
            ],
        }
    }

    #[test]
    fn test_normalize_rows_scenario() {
        let payload = json!({
            "characters": [
                {"char": "H", "start": 0.0, "end": 0.1},
                {"char": "i", "start": 0.1, "end": 0.2}
            ]
        });

        let normalized = normalize(Some(&payload)).unwrap();
        assert_eq!(normalized.characters, vec!["H", "i"]);
        assert_eq!(normalized.character_start_times_seconds, vec![0.0, 0.1]);
        assert_eq!(normalized.character_end_times_seconds, vec![0.1, 0.2]);

        let expected = json!({
            "characters": ["H", "i"],
            "character_start_times_seconds": [0.0, 0.1],
            "character_end_times_seconds": [0.1, 0.2]
        });
        assert_eq!(serde_json::to_value(&normalized).unwrap(), expected);
    }

    #[test]
    fn test_normalize_null_is_absent() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&Value::Null)), None);
    }

    #[test]
    fn test_valid_columnar_passes_through() {
        let payload = json!({
            "characters": ["a", " ", "b"],
            "character_start_times_seconds": [0.5, 0.2, 0.9],
            "character_end_times_seconds": [0.6, 0.3, 1.0]
        });
        let normalized = normalize(Some(&payload)).unwrap();
        // Non-monotonic starts are allowed
        assert_eq!(normalized.character_start_times_seconds, vec![0.5, 0.2, 0.9]);
        assert_eq!(normalized.text(), "a b");
    }

    #[test]
    fn test_mismatched_lengths_are_absent() {
        let payload = json!({
            "characters": ["a", "b"],
            "character_start_times_seconds": [0.0],
            "character_end_times_seconds": [0.1, 0.2]
        });
        assert_eq!(normalize(Some(&payload)), None);
    }

    #[test]
    fn test_end_before_start_is_absent() {
        let payload = json!({
            "characters": ["a", "b"],
            "character_start_times_seconds": [0.0, 0.5],
            "character_end_times_seconds": [0.1, 0.4]
        });
        assert_eq!(normalize(Some(&payload)), None);

        let rows = json!([{"char": "a", "start": -0.1, "end": 0.1}]);
        assert_eq!(normalize(Some(&rows)), None);
    }

    #[test]
    fn test_bare_row_list_and_aliases() {
        let payload = json!([
            {"character": "o", "start_time": 0.0, "end_time": 0.05},
            {"char": "k", "start": 0.05, "end": 0.1}
        ]);
        let normalized = normalize(Some(&payload)).unwrap();
        assert_eq!(normalized.characters, vec!["o", "k"]);
    }

    #[test]
    fn test_ambiguous_payload_is_absent() {
        let payload = json!({
            "characters": [{"char": "H", "start": 0.0, "end": 0.1}],
            "character_start_times_seconds": [0.0],
            "character_end_times_seconds": [0.1]
        });
        assert_eq!(normalize(Some(&payload)), None);
    }

    #[test]
    fn test_unrecognized_shapes_are_absent() {
        assert_eq!(normalize(Some(&json!("H"))), None);
        assert_eq!(normalize(Some(&json!({"words": []}))), None);
        assert_eq!(normalize(Some(&json!({"characters": [1, 2]}))), None);
        assert_eq!(normalize(Some(&json!({"characters": []}))), None);
    }

    #[test]
    fn test_round_trip_preserves_rows() {
        let raw = hi_rows();
        let normalized = normalize_rows(&raw);
        assert_eq!(denormalize(normalized.as_ref()), Some(raw));
    }

    #[test]
    fn test_round_trip_through_json() {
        let raw = hi_rows();
        let value = serde_json::to_value(&raw).unwrap();
        assert_eq!(value["characters"][0]["char"], "H");

        let back = denormalize(normalize(Some(&value)).as_ref()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_denormalize_absent_and_empty() {
        assert_eq!(denormalize(None), None);
        assert_eq!(denormalize(Some(&NormalizedAlignment::default())), None);
    }

    #[test]
    fn test_denormalize_rejects_invalid_columns() {
        let mut short_ends = normalize_rows(&hi_rows()).unwrap();
        short_ends.character_end_times_seconds.pop();
        assert_eq!(denormalize(Some(&short_ends)), None);

        let mut reversed = normalize_rows(&hi_rows()).unwrap();
        reversed.character_end_times_seconds[1] = 0.0;
        assert_eq!(denormalize(Some(&reversed)), None);
    }

    #[test]
    fn test_validate() {
        let mut columns = normalize_rows(&hi_rows()).unwrap();
        assert!(validate(&columns));

        columns.character_end_times_seconds[1] = f64::NAN;
        assert!(!validate(&columns));

        assert!(validate(&NormalizedAlignment::default()));
    }

    #[test]
    fn test_interval_lookup() {
        let columns = normalize_rows(&hi_rows()).unwrap();
        assert_eq!(columns.interval(1), Some((0.1, 0.2)));
        assert_eq!(columns.interval(2), None);
    }
}
