// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use azure_core::http::headers::Headers;

use crate::{pipeline::AbortSignal, ConsistencyLevel, PartitionKey};

/// An optimistic-concurrency precondition sent as `If-Match` or `If-None-Match`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessCondition {
    /// Succeed only if the resource's current ETag matches.
    IfMatch(String),
    /// Succeed only if the resource's current ETag does not match.
    IfNoneMatch(String),
}

/// Whether a written item is added to the container's index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexingDirective {
    Default,
    Include,
    Exclude,
}

impl IndexingDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingDirective::Default => "Default",
            IndexingDirective::Include => "Include",
            IndexingDirective::Exclude => "Exclude",
        }
    }
}

/// Options for a single point operation.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// The partition key of the target item. Extracted from the body when omitted on writes.
    pub partition_key: Option<PartitionKey>,
    /// An explicit session token. Suppresses the token the client would otherwise attach.
    pub session_token: Option<String>,
    pub access_condition: Option<AccessCondition>,
    /// Overrides the client's consistency level for this request.
    pub consistency_level: Option<ConsistencyLevel>,
    pub pre_trigger_include: Vec<String>,
    pub post_trigger_include: Vec<String>,
    pub indexing_directive: Option<IndexingDirective>,
    pub offer_throughput: Option<u32>,
    pub offer_type: Option<String>,
    pub populate_quota_info: bool,
    pub enable_script_logging: bool,
    pub resource_token_expiry_seconds: Option<u32>,
    pub disable_ru_per_minute_usage: bool,
    /// Don't read the container's partition key definition to extract a missing partition key.
    pub skip_get_partition_key_definition: bool,
    /// Headers added before any header the client computes.
    pub initial_headers: Headers,
    pub abort_signal: Option<AbortSignal>,
}

impl RequestOptions {
    /// Creates a new [`RequestOptionsBuilder`] that can be used to construct a [`RequestOptions`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use azure_data_cosmos_core::{PartitionKey, RequestOptions};
    /// let options = RequestOptions::builder()
    ///     .with_partition_key(PartitionKey::from("tenant1"))
    ///     .build();
    /// assert!(options.partition_key.is_some());
    /// ```
    pub fn builder() -> RequestOptionsBuilder {
        RequestOptionsBuilder::default()
    }
}

/// Builder used to construct a [`RequestOptions`].
///
/// Obtain a [`RequestOptionsBuilder`] by calling [`RequestOptions::builder()`]
#[derive(Default)]
pub struct RequestOptionsBuilder(RequestOptions);

impl RequestOptionsBuilder {
    pub fn with_partition_key(&mut self, partition_key: PartitionKey) -> &mut Self {
        self.0.partition_key = Some(partition_key);
        self
    }

    pub fn with_session_token(&mut self, session_token: impl Into<String>) -> &mut Self {
        self.0.session_token = Some(session_token.into());
        self
    }

    pub fn with_access_condition(&mut self, condition: AccessCondition) -> &mut Self {
        self.0.access_condition = Some(condition);
        self
    }

    pub fn with_consistency_level(&mut self, level: ConsistencyLevel) -> &mut Self {
        self.0.consistency_level = Some(level);
        self
    }

    pub fn with_pre_trigger(&mut self, trigger: impl Into<String>) -> &mut Self {
        self.0.pre_trigger_include.push(trigger.into());
        self
    }

    pub fn with_post_trigger(&mut self, trigger: impl Into<String>) -> &mut Self {
        self.0.post_trigger_include.push(trigger.into());
        self
    }

    pub fn with_abort_signal(&mut self, signal: AbortSignal) -> &mut Self {
        self.0.abort_signal = Some(signal);
        self
    }

    /// Builds a [`RequestOptions`] from the builder.
    ///
    /// This does not consume the builder, and can be called multiple times.
    pub fn build(&self) -> RequestOptions {
        self.0.clone()
    }
}
