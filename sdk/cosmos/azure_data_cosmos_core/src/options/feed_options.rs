// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use azure_core::http::headers::Headers;

use crate::{pipeline::AbortSignal, AccessCondition, ConsistencyLevel, PartitionKey};

/// Options for queries and read feeds.
#[derive(Clone, Debug, Default)]
pub struct FeedOptions {
    /// Resume from a continuation token returned by an earlier page.
    pub continuation: Option<String>,
    /// Maximum number of items per page (`x-ms-max-item-count`).
    pub max_item_count: Option<i32>,
    /// Number of partition key ranges fetched concurrently by each cross-partition page.
    ///
    /// `None` fetches one range at a time; `Some(0)` fetches every remaining range.
    pub max_degree_of_parallelism: Option<usize>,
    /// Allow a query without a partition key to fan out across partitions.
    pub enable_cross_partition_query: bool,
    pub enable_scan_in_query: bool,
    pub populate_query_metrics: bool,
    /// Pin the query to a single logical partition.
    pub partition_key: Option<PartitionKey>,
    pub session_token: Option<String>,
    pub consistency_level: Option<ConsistencyLevel>,
    pub access_condition: Option<AccessCondition>,
    pub initial_headers: Headers,
    pub abort_signal: Option<AbortSignal>,
}

impl FeedOptions {
    /// Creates a new [`FeedOptionsBuilder`] that can be used to construct a [`FeedOptions`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// let options = azure_data_cosmos_core::FeedOptions::builder()
    ///     .with_max_item_count(10)
    ///     .with_cross_partition_query(true)
    ///     .build();
    /// assert_eq!(options.max_item_count, Some(10));
    /// ```
    pub fn builder() -> FeedOptionsBuilder {
        FeedOptionsBuilder::default()
    }

    /// The number of ranges a cross-partition page fetches concurrently, given `available` ranges.
    pub(crate) fn effective_parallelism(&self, available: usize) -> usize {
        match self.max_degree_of_parallelism {
            None => 1.min(available),
            Some(0) => available,
            Some(n) => n.min(available),
        }
    }
}

/// Builder used to construct a [`FeedOptions`].
///
/// Obtain a [`FeedOptionsBuilder`] by calling [`FeedOptions::builder()`]
#[derive(Default)]
pub struct FeedOptionsBuilder(FeedOptions);

impl FeedOptionsBuilder {
    pub fn with_continuation(&mut self, continuation: impl Into<String>) -> &mut Self {
        self.0.continuation = Some(continuation.into());
        self
    }

    pub fn with_max_item_count(&mut self, max_item_count: i32) -> &mut Self {
        self.0.max_item_count = Some(max_item_count);
        self
    }

    pub fn with_max_degree_of_parallelism(&mut self, degree: usize) -> &mut Self {
        self.0.max_degree_of_parallelism = Some(degree);
        self
    }

    pub fn with_cross_partition_query(&mut self, enable: bool) -> &mut Self {
        self.0.enable_cross_partition_query = enable;
        self
    }

    pub fn with_partition_key(&mut self, partition_key: PartitionKey) -> &mut Self {
        self.0.partition_key = Some(partition_key);
        self
    }

    pub fn with_session_token(&mut self, session_token: impl Into<String>) -> &mut Self {
        self.0.session_token = Some(session_token.into());
        self
    }

    pub fn with_abort_signal(&mut self, signal: AbortSignal) -> &mut Self {
        self.0.abort_signal = Some(signal);
        self
    }

    /// Builds a [`FeedOptions`] from the builder.
    ///
    /// This does not consume the builder, and can be called multiple times.
    pub fn build(&self) -> FeedOptions {
        self.0.clone()
    }
}
