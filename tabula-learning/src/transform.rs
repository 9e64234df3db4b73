//! The alternate hypothesis representation: instead of an automaton, a
//! candidate is a sequence of transformation primitives drawn from a small
//! closed set, applied by an explicit interpreter. Candidates are
//! serializable and comparable by structural equality; nothing here ever
//! evaluates code.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tabula_core::math;

/// A field value in a transformation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
}

/// One input or output of a transformation, a flat field map.
pub type Record = math::OrderedMap<String, Value>;

/// The closed set of transformation primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    RenameField { from: String, to: String },
    CopyField { from: String, to: String },
    /// Removes the suffix from the field's text value; a value without the
    /// suffix passes through unchanged.
    StripSuffix { field: String, suffix: String },
    /// Replaces the target field with the table entry keyed by the source
    /// field's value.
    CategoryTable {
        field: String,
        target: String,
        entries: math::OrderedMap<String, String>,
    },
    ScaleNumber { field: String, factor: f64 },
    Identity,
}

/// A transformation hypothesis: primitives applied left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub ops: Vec<TransformOp>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("record has no field `{0}`")]
    MissingField(String),
    #[error("field `{0}` does not hold text")]
    NotText(String),
    #[error("field `{0}` does not hold a number")]
    NotNumeric(String),
    #[error("no table entry for value `{0}`")]
    Unmapped(String),
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            ops: vec![TransformOp::Identity],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, TransformOp::Identity))
    }

    /// Runs the interpreter over a record. Errors mean "this record is not
    /// explained by the hypothesis"; callers count them as mismatches and
    /// never propagate them.
    pub fn apply(&self, record: &Record) -> Result<Record, ApplyError> {
        let mut current = record.clone();
        for op in &self.ops {
            current = apply_op(op, current)?;
        }
        Ok(current)
    }
}

fn text_of(record: &Record, field: &str) -> Result<String, ApplyError> {
    match record.get(field) {
        None => Err(ApplyError::MissingField(field.to_string())),
        Some(Value::Text(text)) => Ok(text.clone()),
        Some(Value::Number(_)) => Err(ApplyError::NotText(field.to_string())),
    }
}

fn apply_op(op: &TransformOp, mut record: Record) -> Result<Record, ApplyError> {
    match op {
        TransformOp::RenameField { from, to } => {
            let value = record
                .remove(from)
                .ok_or_else(|| ApplyError::MissingField(from.clone()))?;
            record.insert(to.clone(), value);
        }
        TransformOp::CopyField { from, to } => {
            let value = record
                .get(from)
                .cloned()
                .ok_or_else(|| ApplyError::MissingField(from.clone()))?;
            record.insert(to.clone(), value);
        }
        TransformOp::StripSuffix { field, suffix } => {
            let text = text_of(&record, field)?;
            let stripped = text.strip_suffix(suffix.as_str()).unwrap_or(&text);
            record.insert(field.clone(), Value::Text(stripped.to_string()));
        }
        TransformOp::CategoryTable {
            field,
            target,
            entries,
        } => {
            let key = text_of(&record, field)?;
            let mapped = entries
                .get(&key)
                .ok_or_else(|| ApplyError::Unmapped(key.clone()))?;
            record.insert(target.clone(), Value::Text(mapped.clone()));
        }
        TransformOp::ScaleNumber { field, factor } => match record.get(field) {
            Some(Value::Number(n)) => {
                let scaled = n * factor;
                record.insert(field.clone(), Value::Number(scaled));
            }
            Some(Value::Text(_)) => return Err(ApplyError::NotNumeric(field.clone())),
            None => return Err(ApplyError::MissingField(field.clone())),
        },
        TransformOp::Identity => {}
    }
    Ok(record)
}

/// Field-wise record comparison; numbers compare within a small delta so
/// scaled floats still count as exact-match replays.
fn records_match(left: &Record, right: &Record) -> bool {
    left.len() == right.len()
        && left.iter().all(|(field, value)| match (value, right.get(field)) {
            (Value::Text(l), Some(Value::Text(r))) => l == r,
            (Value::Number(l), Some(Value::Number(r))) => math::almost_equal(*l, *r, 1e-9),
            _ => false,
        })
}

/// Best-effort inference of a transformation from labeled input/output
/// record pairs. Detected patterns, per output field in sorted order:
/// consistent copy or rename of a text field, consistent suffix removal,
/// a consistent value-lookup table, and constant numeric scaling. Falls back
/// to the identity passthrough when nothing distinguishes the pairs.
pub fn infer(pairs: &[(Record, Record)]) -> Transform {
    let Some((_, first_out)) = pairs.first() else {
        return Transform::identity();
    };
    let mut ops = Vec::new();
    for (field, value) in first_out {
        // fields carried over unchanged need no op
        if pairs.iter().all(|(i, o)| o.get(field) == i.get(field)) {
            continue;
        }
        match value {
            Value::Text(_) => {
                if let Some(detected) = infer_text_field(field, pairs) {
                    ops.extend(detected);
                }
            }
            Value::Number(_) => {
                if let Some(detected) = infer_scale(field, pairs) {
                    ops.push(detected);
                }
            }
        }
    }
    if ops.is_empty() {
        Transform::identity()
    } else {
        Transform { ops }
    }
}

fn texts_of<'r>(pairs: &'r [(Record, Record)], source: &str, target: &str) -> Option<Vec<(&'r str, &'r str)>> {
    pairs
        .iter()
        .map(|(input, output)| match (input.get(source), output.get(target)) {
            (Some(Value::Text(i)), Some(Value::Text(o))) => Some((i.as_str(), o.as_str())),
            _ => None,
        })
        .collect()
}

fn infer_text_field(target: &str, pairs: &[(Record, Record)]) -> Option<Vec<TransformOp>> {
    let (first_in, _) = pairs.first()?;
    let source_kept = |source: &str| {
        pairs
            .iter()
            .any(|(_, output)| output.contains_key(source))
    };

    for source in first_in.keys() {
        let Some(texts) = texts_of(pairs, source, target) else {
            continue;
        };
        // straight carry-over of the value under a new name
        if texts.iter().all(|(i, o)| i == o) && source != target {
            return Some(vec![if source_kept(source) {
                TransformOp::CopyField {
                    from: source.clone(),
                    to: target.to_string(),
                }
            } else {
                TransformOp::RenameField {
                    from: source.clone(),
                    to: target.to_string(),
                }
            }]);
        }
        // consistent suffix removal, e.g. `name` → `title` minus " Pizza"
        if texts.iter().all(|(i, o)| i.starts_with(o) && i.len() > o.len()) {
            let suffix = texts[0].0[texts[0].1.len()..].to_string();
            if texts.iter().all(|(i, o)| i[o.len()..] == suffix) {
                let mut detected = Vec::new();
                if source == target {
                    detected.push(TransformOp::StripSuffix {
                        field: target.to_string(),
                        suffix,
                    });
                } else if source_kept(source) {
                    detected.push(TransformOp::CopyField {
                        from: source.clone(),
                        to: target.to_string(),
                    });
                    detected.push(TransformOp::StripSuffix {
                        field: target.to_string(),
                        suffix,
                    });
                } else {
                    detected.push(TransformOp::RenameField {
                        from: source.clone(),
                        to: target.to_string(),
                    });
                    detected.push(TransformOp::StripSuffix {
                        field: target.to_string(),
                        suffix,
                    });
                }
                return Some(detected);
            }
        }
    }

    // last resort: a consistent value-lookup table from some source field
    for source in first_in.keys() {
        let texts = match texts_of(pairs, source, target) {
            Some(texts) => texts,
            None => continue,
        };
        let mut entries: math::OrderedMap<String, String> = math::OrderedMap::new();
        let mut consistent = true;
        for (input, output) in &texts {
            match entries.get(*input) {
                Some(known) if known.as_str() != *output => {
                    consistent = false;
                    break;
                }
                Some(_) => {}
                None => {
                    entries.insert(input.to_string(), output.to_string());
                }
            }
        }
        if consistent {
            return Some(vec![TransformOp::CategoryTable {
                field: source.clone(),
                target: target.to_string(),
                entries,
            }]);
        }
    }
    None
}

fn infer_scale(target: &str, pairs: &[(Record, Record)]) -> Option<TransformOp> {
    let ratios = pairs
        .iter()
        .map(|(input, output)| match (input.get(target), output.get(target)) {
            (Some(Value::Number(i)), Some(Value::Number(o))) if *i != 0.0 => Some(o / i),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    let factor = *ratios.first()?;
    ratios
        .iter()
        .all(|r| math::almost_equal(*r, factor, 1e-9))
        .then_some(TransformOp::ScaleNumber {
            field: target.to_string(),
            factor,
        })
}

/// Fraction of example pairs the transform replays exactly; a failing or
/// incomparable replay counts as unexplained, never as an error.
pub fn confidence(transform: &Transform, pairs: &[(Record, Record)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let matches = pairs
        .iter()
        .filter(|(input, expected)| match transform.apply(input) {
            Ok(actual) => records_match(&actual, expected),
            Err(err) => {
                debug!("replay does not explain the example: {err}");
                false
            }
        })
        .count();
    matches as f64 / pairs.len() as f64
}

/// Lifecycle of a transformation candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Pending,
    Active,
    Completed,
    Rejected,
}

/// A synthesized transformation hypothesis with its replay confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub transform: Transform,
    /// In `[0, 1]`: the exact-match replay fraction over the examples the
    /// candidate was inferred from.
    pub confidence: f64,
    pub status: CandidateStatus,
}

impl Candidate {
    /// Infers a transform from the pairs and scores it by replay. A perfect
    /// replay is immediately active, a partial one stays pending, a useless
    /// one is rejected.
    pub fn infer(pairs: &[(Record, Record)]) -> Self {
        let transform = infer(pairs);
        let confidence = confidence(&transform, pairs);
        let status = if confidence >= 1.0 {
            CandidateStatus::Active
        } else if confidence > 0.0 {
            CandidateStatus::Pending
        } else {
            CandidateStatus::Rejected
        };
        Self {
            transform,
            confidence,
            status,
        }
    }

    /// Marks the candidate as the final result of a completed session.
    pub fn complete(&mut self) {
        self.status = CandidateStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn infers_suffix_strip_into_renamed_field() {
        let pairs = vec![
            (
                record(&[("name", text("Margherita Pizza"))]),
                record(&[("title", text("Margherita"))]),
            ),
            (
                record(&[("name", text("Pepperoni Pizza"))]),
                record(&[("title", text("Pepperoni"))]),
            ),
        ];
        let candidate = Candidate::infer(&pairs);
        assert_eq!(
            candidate.transform.ops,
            vec![
                TransformOp::RenameField {
                    from: "name".to_string(),
                    to: "title".to_string()
                },
                TransformOp::StripSuffix {
                    field: "title".to_string(),
                    suffix: " Pizza".to_string()
                },
            ]
        );
        assert!(tabula_core::math::almost_equal(candidate.confidence, 1.0, 1e-9));
        assert_eq!(candidate.status, CandidateStatus::Active);
    }

    #[test]
    fn infers_constant_price_scaling() {
        let pairs = vec![
            (
                record(&[("price", Value::Number(10.0))]),
                record(&[("price", Value::Number(11.0))]),
            ),
            (
                record(&[("price", Value::Number(20.0))]),
                record(&[("price", Value::Number(22.0))]),
            ),
        ];
        let candidate = Candidate::infer(&pairs);
        assert_eq!(candidate.transform.ops.len(), 1);
        match &candidate.transform.ops[0] {
            TransformOp::ScaleNumber { field, factor } => {
                assert_eq!(field, "price");
                assert!(tabula_core::math::almost_equal(*factor, 1.1, 1e-9));
            }
            other => panic!("expected scaling, got {other:?}"),
        }
        assert_eq!(candidate.status, CandidateStatus::Active);
    }

    #[test]
    fn infers_category_lookup_table() {
        let pairs = vec![
            (
                record(&[("name", text("Margherita Pizza"))]),
                record(&[("kind", text("pizza")), ("name", text("Margherita Pizza"))]),
            ),
            (
                record(&[("name", text("Caesar Salad"))]),
                record(&[("kind", text("salad")), ("name", text("Caesar Salad"))]),
            ),
        ];
        let candidate = Candidate::infer(&pairs);
        match &candidate.transform.ops[0] {
            TransformOp::CategoryTable { field, target, entries } => {
                assert_eq!(field, "name");
                assert_eq!(target, "kind");
                assert_eq!(entries.get("Caesar Salad").map(String::as_str), Some("salad"));
            }
            other => panic!("expected a lookup table, got {other:?}"),
        }
        assert_eq!(candidate.status, CandidateStatus::Active);
    }

    #[test]
    fn falls_back_to_identity() {
        let pairs = vec![(
            record(&[("name", text("Espresso"))]),
            record(&[("name", text("Espresso"))]),
        )];
        let candidate = Candidate::infer(&pairs);
        assert!(candidate.transform.is_identity());
        assert!(tabula_core::math::almost_equal(candidate.confidence, 1.0, 1e-9));
    }

    #[test]
    fn failing_replay_counts_as_unexplained() {
        let transform = Transform {
            ops: vec![TransformOp::RenameField {
                from: "missing".to_string(),
                to: "anything".to_string(),
            }],
        };
        let pairs = vec![(
            record(&[("name", text("Espresso"))]),
            record(&[("anything", text("Espresso"))]),
        )];
        assert_eq!(confidence(&transform, &pairs), 0.0);
    }

    #[test]
    fn candidates_roundtrip_and_compare_structurally() {
        let pairs = vec![(
            record(&[("name", text("Margherita Pizza"))]),
            record(&[("title", text("Margherita"))]),
        )];
        let candidate = Candidate::infer(&pairs);
        let json = serde_json::to_string(&candidate).unwrap();
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(candidate, back);
    }
}
