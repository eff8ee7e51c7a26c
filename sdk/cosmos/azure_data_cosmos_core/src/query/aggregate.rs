// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::ordering::compare_values;
use crate::models::AggregateKind;

/// Combines the partial aggregates each partition returns into the final value.
#[derive(Clone, Debug)]
pub(crate) struct Aggregator {
    kind: AggregateKind,
    sum: f64,
    integral: bool,
    count: u64,
    extreme: Option<Value>,
}

fn number(value: f64, integral: bool) -> Option<Value> {
    if integral && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Value::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number)
    }
}

impl Aggregator {
    pub fn new(kind: AggregateKind) -> Self {
        Self {
            kind,
            sum: 0.0,
            integral: true,
            count: 0,
            extreme: None,
        }
    }

    /// Folds in one partition's partial result; `None` means the partition had no value.
    pub fn add(&mut self, partial: Option<&Value>) {
        let Some(partial) = partial else {
            return;
        };
        match self.kind {
            AggregateKind::Count | AggregateKind::Sum => {
                if let Some(n) = partial.as_f64() {
                    self.integral &= partial.is_i64() || partial.is_u64();
                    self.sum += n;
                    self.count += 1;
                }
            }
            AggregateKind::Average => {
                let sum = partial.get("sum").and_then(Value::as_f64);
                let count = partial.get("count").and_then(Value::as_u64);
                if let (Some(sum), Some(count)) = (sum, count) {
                    self.sum += sum;
                    self.count += count;
                }
            }
            AggregateKind::Min | AggregateKind::Max => {
                let key = if self.kind == AggregateKind::Min { "min" } else { "max" };
                let value = match partial {
                    Value::Object(map) if map.contains_key("count") => {
                        if map.get("count").and_then(Value::as_u64) == Some(0) {
                            return;
                        }
                        match map.get(key) {
                            Some(value) => value,
                            None => return,
                        }
                    }
                    value => value,
                };
                let wanted = if self.kind == AggregateKind::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match &self.extreme {
                    None => true,
                    Some(current) => compare_values(Some(value), Some(current)) == wanted,
                };
                if replace {
                    self.extreme = Some(value.clone());
                }
            }
        }
    }

    /// The aggregate over every partial seen, or `None` if it is undefined.
    pub fn result(&self) -> Option<Value> {
        match self.kind {
            AggregateKind::Count => number(self.sum, true),
            AggregateKind::Sum if self.count == 0 => None,
            AggregateKind::Sum => number(self.sum, self.integral),
            AggregateKind::Average if self.count == 0 => None,
            AggregateKind::Average => number(self.sum / self.count as f64, false),
            AggregateKind::Min | AggregateKind::Max => self.extreme.clone(),
        }
    }
}

/// Splits a rewritten aggregate result (`[{"item": ...}, ...]`) into one partial per aggregate.
pub(crate) fn partials(result: &Value) -> Vec<Option<&Value>> {
    match result {
        Value::Array(parts) => parts.iter().map(|p| p.get("item")).collect(),
        Value::Object(map) if map.contains_key("item") => vec![map.get("item")],
        other => vec![Some(other)],
    }
}
