//! Filter, sort and update evaluation for in-memory documents.
//!
//! Filters use the document-store query shape: `{ field: value }` for equality,
//! `{ field: { $op: value } }` for comparisons, and `$and` / `$or` / `$nor` at the top
//! level. Updates support `$set`, `$unset` and `$inc`.

use std::{collections::HashMap, cmp::Ordering};
use bson::{Bson, Document, datetime::DateTime};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(bson::oid::ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Null, _) => Some(Ordering::Less),
            (_, Comparable::Null) => Some(Ordering::Greater),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a possibly dotted field path.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = current.as_document()?.get(part)?;
    }

    Some(current)
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => items
            .iter()
            .any(|item| Comparable::from(item) == Comparable::from(expected)),
        Some(value) => Comparable::from(value) == Comparable::from(expected),
    }
}

fn compare(value: Option<&Bson>, expected: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match value {
        Some(value) if !matches!(value, Bson::Null) || matches!(expected, Bson::Null) => {
            Comparable::from(value)
                .partial_cmp(&Comparable::from(expected))
                .is_some_and(accept)
        }
        _ => false,
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|key| key.starts_with('$')) => Some(ops),
        _ => None,
    }
}

/// Evaluates a filter document against a single stored document.
pub(crate) struct FilterEvaluator<'a> {
    document: &'a Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn matches(&self, filter: &Document) -> Result<bool, String> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(condition)?,
                "$or" => self.any(condition)?,
                "$nor" => !self.any(condition)?,
                op if op.starts_with('$') => return Err(format!("unknown top level operator {op}")),
                field => self.matches_field(lookup(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn clauses(condition: &Bson) -> Result<Vec<&Document>, String> {
        condition
            .as_array()
            .ok_or_else(|| "logical operators expect an array".to_string())?
            .iter()
            .map(|clause| {
                clause
                    .as_document()
                    .ok_or_else(|| "logical operator clauses must be documents".to_string())
            })
            .collect()
    }

    fn all(&self, condition: &Bson) -> Result<bool, String> {
        for clause in Self::clauses(condition)? {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, condition: &Bson) -> Result<bool, String> {
        for clause in Self::clauses(condition)? {
            if self.matches(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn matches_field(&self, value: Option<&Bson>, condition: &Bson) -> Result<bool, String> {
        let Some(ops) = is_operator_document(condition) else {
            return Ok(equals(value, condition));
        };

        for (op, operand) in ops {
            let matched = match op.as_str() {
                "$eq" => equals(value, operand),
                "$ne" => !equals(value, operand),
                "$gt" => compare(value, operand, |o| o == Ordering::Greater),
                "$gte" => compare(value, operand, |o| o != Ordering::Less),
                "$lt" => compare(value, operand, |o| o == Ordering::Less),
                "$lte" => compare(value, operand, |o| o != Ordering::Greater),
                "$in" => operand
                    .as_array()
                    .ok_or_else(|| "$in needs an array".to_string())?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$nin" => !operand
                    .as_array()
                    .ok_or_else(|| "$nin needs an array".to_string())?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$exists" => value.is_some() == truthy(operand),
                "$not" => !self.matches_field(value, operand)?,
                other => return Err(format!("unknown operator {other}")),
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Orders documents by a `{ field: 1 | -1 }` sort specification. The sort is stable.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    let keys = sort
        .iter()
        .map(|(field, direction)| {
            let descending = match direction {
                Bson::Int32(n) => *n < 0,
                Bson::Int64(n) => *n < 0,
                Bson::Double(n) => *n < 0.0,
                Bson::String(s) => s.eq_ignore_ascii_case("desc") || s.eq_ignore_ascii_case("descending"),
                _ => false,
            };
            (field.as_str(), descending)
        })
        .collect::<Vec<_>>();

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);
            let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
            let ordering = if *descending { ordering.reverse() } else { ordering };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

/// Applies an operator update document in place.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> Result<(), String> {
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| format!("{op} expects a document"))?;

        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    document.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for (field, _) in fields {
                    document.remove(field);
                }
            }
            "$inc" => {
                for (field, delta) in fields {
                    let next = match (document.get(field), delta) {
                        (None, delta) => delta.clone(),
                        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
                            Some(sum) => Bson::Int32(sum),
                            // Widen like the server does rather than wrapping.
                            None => Bson::Int64(*a as i64 + *b as i64),
                        },
                        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(add_long(field, *a, *b)?),
                        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(add_long(field, *a as i64, *b)?),
                        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(add_long(field, *a, *b as i64)?),
                        (Some(current), delta) => match (number(current), number(delta)) {
                            (Some(a), Some(b)) => Bson::Double(a + b),
                            _ => return Err(format!("cannot apply $inc to non-numeric field {field}")),
                        },
                    };
                    document.insert(field.clone(), next);
                }
            }
            other if other.starts_with('$') => return Err(format!("unsupported update operator {other}")),
            _ => return Err("update document requires atomic operators".to_string()),
        }
    }

    Ok(())
}

fn add_long(field: &str, a: i64, b: i64) -> Result<i64, String> {
    a.checked_add(b)
        .ok_or_else(|| format!("$inc on {field} would overflow a 64-bit integer"))
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// The equality fields of a filter, used to seed an upserted document.
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| !key.starts_with('$') && is_operator_document(value).is_none())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: Document, filter: Document) -> bool {
        FilterEvaluator::new(&document).matches(&filter).unwrap()
    }

    #[test]
    fn equality_and_numeric_normalization() {
        assert!(matches(doc! { "a": 1 }, doc! { "a": 1.0 }));
        assert!(!matches(doc! { "a": 1 }, doc! { "a": 2 }));
        assert!(matches(doc! { "a": [1, 2] }, doc! { "a": 2 }));
        assert!(matches(doc! { "b": 1 }, doc! { "a": null }));
    }

    #[test]
    fn comparison_operators() {
        let document = doc! { "n": 5, "s": "m" };
        assert!(matches(document.clone(), doc! { "n": { "$gt": 4, "$lte": 5 } }));
        assert!(!matches(document.clone(), doc! { "n": { "$lt": 5 } }));
        assert!(matches(document.clone(), doc! { "s": { "$in": ["a", "m"] } }));
        assert!(matches(document.clone(), doc! { "s": { "$nin": ["a"] } }));
        assert!(matches(document.clone(), doc! { "x": { "$exists": false } }));
        assert!(matches(document, doc! { "n": { "$not": { "$gt": 9 } } }));
    }

    #[test]
    fn logical_operators_and_paths() {
        let document = doc! { "a": { "b": 1 }, "c": 2 };
        assert!(matches(document.clone(), doc! { "a.b": 1 }));
        assert!(matches(document.clone(), doc! { "$or": [{ "c": 3 }, { "a.b": 1 }] }));
        assert!(!matches(document.clone(), doc! { "$and": [{ "c": 2 }, { "a.b": 2 }] }));
        assert!(matches(document, doc! { "$nor": [{ "c": 3 }] }));
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let document = doc! { "a": 1 };
        assert!(FilterEvaluator::new(&document).matches(&doc! { "a": { "$regex": "x" } }).is_err());
    }

    #[test]
    fn sorts_with_nulls_first() {
        let mut documents = vec![doc! { "n": 2 }, doc! {}, doc! { "n": 1 }];
        sort_documents(&mut documents, &doc! { "n": 1 });
        assert_eq!(documents, vec![doc! {}, doc! { "n": 1 }, doc! { "n": 2 }]);

        sort_documents(&mut documents, &doc! { "n": -1 });
        assert_eq!(documents, vec![doc! { "n": 2 }, doc! { "n": 1 }, doc! {}]);
    }

    #[test]
    fn applies_update_operators() {
        let mut document = doc! { "a": 1, "b": 2 };
        apply_update(&mut document, &doc! { "$set": { "c": 3 }, "$unset": { "b": "" }, "$inc": { "a": 4 } }).unwrap();
        assert_eq!(document, doc! { "a": 5, "c": 3 });

        assert!(apply_update(&mut document, &doc! { "a": 1 }).is_err());
    }

    #[test]
    fn inc_widens_int32_and_rejects_int64_overflow() {
        let mut document = doc! { "n": i32::MAX, "m": 1_i32 };
        apply_update(&mut document, &doc! { "$inc": { "n": 1, "m": 1 } }).unwrap();
        assert_eq!(document.get("n"), Some(&Bson::Int64(i32::MAX as i64 + 1)));
        assert_eq!(document.get("m"), Some(&Bson::Int32(2)));

        let mut document = doc! { "n": i64::MAX };
        let err = apply_update(&mut document, &doc! { "$inc": { "n": 1 } }).unwrap_err();
        assert!(err.contains("overflow"));
        assert_eq!(document.get("n"), Some(&Bson::Int64(i64::MAX)));

        let mut document = doc! { "n": i64::MAX };
        assert!(apply_update(&mut document, &doc! { "$inc": { "n": 1_i32 } }).is_err());
    }

    #[test]
    fn upsert_seed_keeps_equality_fields() {
        assert_eq!(
            upsert_seed(&doc! { "name": "x", "n": { "$gt": 1 }, "$or": [] }),
            doc! { "name": "x" }
        );
    }
}
