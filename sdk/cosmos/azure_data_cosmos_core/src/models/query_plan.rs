// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

use crate::models::PartitionKeyRange;

/// Placeholder the gateway leaves in rewritten ORDER BY queries for the resume filter.
const FORMATTABLE_ORDER_BY_FILTER: &str = "{documentdb-formattableorderbyquery-filter}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum AggregateKind {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

/// What the client must do to merge per-partition results, as decided by the gateway.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    #[serde(default)]
    pub distinct_type: DistinctType,
    pub top: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub order_by: Vec<SortOrder>,
    #[serde(default)]
    pub order_by_expressions: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<AggregateKind>,
    #[serde(default)]
    pub has_select_value: bool,
    #[serde(default)]
    pub rewritten_query: String,
}

impl QueryInfo {
    /// The query text to send to each partition, if the gateway rewrote it.
    pub fn partition_query(&self) -> Option<String> {
        if self.rewritten_query.is_empty() {
            return None;
        }
        Some(
            self.rewritten_query
                .replace(FORMATTABLE_ORDER_BY_FILTER, "true"),
        )
    }
}

/// A range of effective partition keys a query can touch.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRange {
    pub min: String,
    pub max: String,
    #[serde(default = "default_true")]
    pub is_min_inclusive: bool,
    #[serde(default)]
    pub is_max_inclusive: bool,
}

fn default_true() -> bool {
    true
}

impl QueryRange {
    /// Returns `true` if `range` contains at least one key of this query range.
    pub fn overlaps(&self, range: &PartitionKeyRange) -> bool {
        let min_ok = if self.is_max_inclusive {
            range.min_inclusive.as_str() <= self.max.as_str()
        } else {
            range.min_inclusive.as_str() < self.max.as_str()
        };
        let max_ok = self.min.as_str() < range.max_exclusive.as_str();
        min_ok && max_ok
    }
}

/// The response to a query plan request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionedQueryExecutionInfo {
    #[serde(default)]
    pub query_info: QueryInfo,
    #[serde(default)]
    pub query_ranges: Vec<QueryRange>,
}
