// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The request pipeline: user plugins, retries, signing and transport.
//!
//! Layering, outermost first: operation plugins, the retry loop, request plugins, the transport.

mod authorization;
mod cancellation;
mod context;
mod plugin;
mod retry;
mod sender;

pub use authorization::{AuthorizationRequest, TokenProvider};
pub use cancellation::{AbortController, AbortSignal};
pub use context::RequestContext;
pub use plugin::{Next, Plugin, PluginConfig, PluginOn};

use std::sync::Arc;

use async_trait::async_trait;
use azure_core::http::HttpClient;
use url::Url;

use crate::{
    constants,
    models::{ContainerProperties, PartitionKeyRange, PartitionKeyRanges},
    resource_context::{OperationType, ResourceLink, ResourceType},
    CosmosClientOptions, CosmosResponse, GlobalEndpointManager, PartitionKeyRangeCache, RetryOptions,
    RoutingMapProvider,
};
use retry::RetryLoop;
use sender::RequestSender;

/// Sends logical operations, retrying them across regions as needed.
#[derive(Clone, Debug)]
pub(crate) struct CosmosPipeline {
    sender: Arc<RequestSender>,
    operation_plugins: Arc<[Arc<dyn Plugin>]>,
    endpoint_manager: GlobalEndpointManager,
    pk_range_cache: Arc<PartitionKeyRangeCache>,
    retry_options: RetryOptions,
}

impl CosmosPipeline {
    pub fn new(
        options: &CosmosClientOptions,
        default_endpoint: Url,
        transport: Arc<dyn HttpClient>,
    ) -> Self {
        let policy = &options.connection_policy;
        let (operation_plugins, request_plugins) = plugin::split_plugins(&options.plugins);
        let sender = Arc::new(RequestSender::new(
            transport,
            options.auth.clone(),
            request_plugins,
            options.default_headers.clone(),
            policy.request_timeout,
            default_endpoint.clone(),
        ));
        let endpoint_manager = GlobalEndpointManager::new(default_endpoint, policy, sender.clone());
        Self {
            sender,
            operation_plugins: operation_plugins.into(),
            endpoint_manager,
            pk_range_cache: Arc::new(PartitionKeyRangeCache::new()),
            retry_options: policy.retry_options.clone(),
        }
    }

    pub fn endpoint_manager(&self) -> &GlobalEndpointManager {
        &self.endpoint_manager
    }

    pub fn pk_range_cache(&self) -> &PartitionKeyRangeCache {
        &self.pk_range_cache
    }

    /// Runs a logical operation through the whole pipeline.
    pub async fn send(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        let retry_loop = RetryLoop {
            sender: &self.sender,
            endpoint_manager: &self.endpoint_manager,
            pk_range_cache: &self.pk_range_cache,
            options: &self.retry_options,
        };
        Next::new(&self.operation_plugins, &retry_loop).run(ctx).await
    }
}

#[async_trait]
impl RoutingMapProvider for CosmosPipeline {
    async fn read_container(&self, container: &ResourceLink) -> azure_core::Result<ContainerProperties> {
        let mut ctx = RequestContext::new(container.clone(), OperationType::Read);
        self.send(&mut ctx).await?.into_json_body()
    }

    async fn read_partition_key_ranges(
        &self,
        container: &ResourceLink,
    ) -> azure_core::Result<Vec<PartitionKeyRange>> {
        let link = container.feed(ResourceType::PartitionKeyRanges);
        let mut ranges = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut ctx = RequestContext::new(link.clone(), OperationType::Read);
            if let Some(continuation) = continuation.take() {
                ctx.headers.insert(constants::CONTINUATION, continuation);
            }
            let response = self.send(&mut ctx).await?;
            continuation = response.continuation().map(ToOwned::to_owned);
            ranges.extend(response.into_json_body::<PartitionKeyRanges>()?.ranges);
            if continuation.is_none() {
                return Ok(ranges);
            }
        }
    }
}
