// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The ORDER BY comparator used when merging results from several partitions.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::SortOrder;

/// Undefined sorts before null, then booleans, numbers, strings, arrays and objects.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Compares two ORDER BY values; `None` is an undefined value.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a @ (Value::Array(_) | Value::Object(_))), Some(b))
            if type_rank(Some(a)) == type_rank(Some(b)) =>
        {
            a.to_string().cmp(&b.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// The ORDER BY values of a rewritten-query result: `{"orderByItems": [{"item": ...}, ...]}`.
pub(crate) fn order_by_items(result: &Value) -> Vec<Option<&Value>> {
    result
        .get("orderByItems")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|i| i.get("item")).collect())
        .unwrap_or_default()
}

/// Compares two rewritten-query results by their ORDER BY values.
pub(crate) fn compare_results(a: &Value, b: &Value, orders: &[SortOrder]) -> Ordering {
    let (a, b) = (order_by_items(a), order_by_items(b));
    for (i, (a, b)) in a.iter().zip(b.iter()).enumerate() {
        let ordering = compare_values(*a, *b);
        let ordering = match orders.get(i) {
            Some(SortOrder::Descending) => ordering.reverse(),
            _ => ordering,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
