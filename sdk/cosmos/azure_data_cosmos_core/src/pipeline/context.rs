// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use azure_core::http::{headers::Headers, Method};
use bytes::Bytes;
use url::Url;

use crate::{
    pipeline::AbortSignal,
    resource_context::{OperationType, ResourceLink, ResourceType},
    ConsistencyLevel, PartitionKeyRangeId,
};

/// One logical operation as it travels through the plugin chain.
///
/// Plugins may inspect and modify any field. `endpoint` is filled in by the retry loop before each
/// attempt; request plugins see the endpoint the attempt is about to use.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub resource_link: ResourceLink,
    pub operation_type: OperationType,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Bytes>,
    /// Pins the request to a single partition key range.
    pub partition_key_range_id: Option<PartitionKeyRangeId>,
    pub consistency_level: Option<ConsistencyLevel>,
    /// Number of attempts already made for this operation.
    pub retry_count: u32,
    pub endpoint: Option<Url>,
    /// Forces every attempt to this endpoint instead of resolving one.
    pub endpoint_override: Option<Url>,
    pub abort_signal: Option<AbortSignal>,
}

impl RequestContext {
    pub fn new(resource_link: ResourceLink, operation_type: OperationType) -> Self {
        Self {
            resource_link,
            operation_type,
            method: operation_type.method(),
            headers: Headers::new(),
            body: None,
            partition_key_range_id: None,
            consistency_level: None,
            retry_count: 0,
            endpoint: None,
            endpoint_override: None,
            abort_signal: None,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_link.resource_type()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_abort_signal(mut self, signal: Option<AbortSignal>) -> Self {
        self.abort_signal = signal;
        self
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort_signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}
