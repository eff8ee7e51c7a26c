// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Queries and their paged, possibly cross-partition, execution.

mod aggregate;
mod execution;
mod iterator;
mod ordering;

use async_trait::async_trait;
use azure_core::http::headers::Headers;
use serde::Serialize;
use serde_json::Value;

use crate::{
    models::{PartitionKeyRange, PartitionedQueryExecutionInfo, QueryRange},
    resource_context::ResourceLink,
    FeedOptions,
};

pub use iterator::QueryIterator;

/// Represents a Cosmos DB Query, with optional parameters.
///
/// # Examples
///
/// ```rust
/// # use azure_data_cosmos_core::Query;
/// let query = Query::from("SELECT * FROM c WHERE c.id = @customer_id")
///     .with_parameter("@customer_id", 42)
///     .unwrap();
/// assert_eq!(query.parameters().len(), 1);
/// ```
///
/// Parameters are serialized with [`serde_json`], so any [`Serialize`] value can be bound.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Query {
    #[serde(rename = "query")]
    text: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<QueryParameter>,
}

impl Query {
    /// Consumes this [`Query`] and returns a new one with the given parameter bound.
    ///
    /// Fails if `value` cannot be serialized to JSON.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> azure_core::Result<Self> {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: serde_json::to_value(value)?,
        });
        Ok(self)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    /// The same parameters bound to different query text.
    pub(crate) fn with_text(&self, text: String) -> Self {
        Self {
            text,
            parameters: self.parameters.clone(),
        }
    }
}

impl<T: Into<String>> From<T> for Query {
    fn from(value: T) -> Self {
        Self {
            text: value.into(),
            parameters: Vec::new(),
        }
    }
}

/// A named parameter bound to a [`Query`].
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QueryParameter {
    name: String,
    value: Value,
}

impl QueryParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// One page request against a feed, optionally pinned to a partition key range.
#[derive(Debug)]
pub(crate) struct PageRequest<'a> {
    pub feed: &'a ResourceLink,
    pub query: Option<&'a Query>,
    pub options: &'a FeedOptions,
    pub partition_key_range_id: Option<&'a str>,
    pub continuation: Option<&'a str>,
}

/// An untyped page as returned by the service.
#[derive(Debug, Default)]
pub(crate) struct RawPage {
    pub items: Vec<Value>,
    pub continuation: Option<String>,
    pub request_charge: f64,
    pub headers: Headers,
}

/// The requests query execution needs from the client.
#[async_trait]
pub(crate) trait QueryFetcher: Send + Sync {
    /// Asks the gateway how to execute `query` across partitions.
    async fn fetch_query_plan(
        &self,
        feed: &ResourceLink,
        query: &Query,
        options: &FeedOptions,
    ) -> azure_core::Result<PartitionedQueryExecutionInfo>;

    /// The partition key ranges of the feed's container that overlap `query_ranges`.
    async fn fetch_partition_key_ranges(
        &self,
        feed: &ResourceLink,
        query_ranges: &[QueryRange],
    ) -> azure_core::Result<Vec<PartitionKeyRange>>;

    async fn fetch_page(&self, request: &PageRequest<'_>) -> azure_core::Result<RawPage>;
}
