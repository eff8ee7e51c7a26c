// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The retry loop that runs between the operation plugins and the request plugins.

use std::time::Duration;

use async_trait::async_trait;
use azure_core::{http::StatusCode, Error};
use url::Url;

use super::{cancellation::abortable, plugin::Terminal, sender::RequestSender, RequestContext};
use crate::{
    constants,
    error::{is_partition_split, network_failure, NetworkFailure},
    CosmosErrorExt, CosmosResponse, GlobalEndpointManager, PartitionKeyRangeCache, RetryOptions,
};

/// What to do after a failed attempt.
#[derive(Debug, PartialEq)]
enum RetryAction {
    Fail,
    /// Wait, then retry against a freshly resolved endpoint.
    Retry(Duration),
    /// Retry once against the given endpoint.
    RetryOn(Url),
}

#[derive(Debug, Default)]
struct RetryState {
    retries: u32,
    waited: Duration,
    network_failures: u32,
    session_retried: bool,
}

pub(crate) struct RetryLoop<'a> {
    pub sender: &'a RequestSender,
    pub endpoint_manager: &'a GlobalEndpointManager,
    pub pk_range_cache: &'a PartitionKeyRangeCache,
    pub options: &'a RetryOptions,
}

impl RetryLoop<'_> {
    fn within_budget(&self, state: &RetryState, delay: Duration) -> bool {
        state.retries < self.options.max_retry_attempt_count
            && state.waited + delay <= self.options.max_wait_time
    }

    async fn decide(
        &self,
        error: &Error,
        ctx: &RequestContext,
        endpoint: &Url,
        state: &mut RetryState,
    ) -> RetryAction {
        let Some(service_error) = error.service_error() else {
            return match network_failure(error) {
                Some(NetworkFailure::Connect) => self.network_retry(ctx, endpoint, state),
                Some(NetworkFailure::Io) if ctx.operation_type.is_read_only() => {
                    self.network_retry(ctx, endpoint, state)
                }
                _ => RetryAction::Fail,
            };
        };
        match (service_error.status(), service_error.sub_status()) {
            (StatusCode::TooManyRequests, _) => {
                let delay = self
                    .options
                    .fixed_retry_interval
                    .or_else(|| error.retry_after())
                    .unwrap_or(constants::DEFAULT_THROTTLE_RETRY_AFTER);
                if !self.within_budget(state, delay) {
                    return RetryAction::Fail;
                }
                tracing::warn!(
                    ?delay,
                    retry = state.retries + 1,
                    "request throttled; retrying"
                );
                RetryAction::Retry(delay)
            }
            (StatusCode::NotFound, Some(constants::SUB_STATUS_READ_SESSION_NOT_AVAILABLE)) => {
                if state.session_retried {
                    return RetryAction::Fail;
                }
                state.session_retried = true;
                match self.endpoint_manager.alternate_read_endpoint(endpoint).await {
                    Some(alternate) => {
                        tracing::debug!(
                            %alternate,
                            "read session not available; retrying elsewhere"
                        );
                        RetryAction::RetryOn(alternate)
                    }
                    None => RetryAction::Fail,
                }
            }
            (StatusCode::Gone, _) => {
                if let Some(container) = ctx.resource_link.container_link() {
                    self.pk_range_cache.invalidate(&container);
                }
                // A pinned range that split never comes back; the caller re-resolves its children.
                if ctx.partition_key_range_id.is_some() && is_partition_split(error) {
                    return RetryAction::Fail;
                }
                if !self.within_budget(state, Duration::ZERO) {
                    return RetryAction::Fail;
                }
                self.refresh_topology().await;
                RetryAction::Retry(Duration::ZERO)
            }
            (
                StatusCode::Forbidden,
                Some(
                    constants::SUB_STATUS_WRITE_FORBIDDEN
                    | constants::SUB_STATUS_DATABASE_ACCOUNT_NOT_FOUND,
                ),
            ) if self.endpoint_manager.enable_endpoint_discovery() => {
                if !self.within_budget(state, Duration::ZERO) {
                    return RetryAction::Fail;
                }
                self.mark_unavailable(ctx, endpoint);
                self.refresh_topology().await;
                RetryAction::Retry(Duration::ZERO)
            }
            _ => RetryAction::Fail,
        }
    }

    fn network_retry(
        &self,
        ctx: &RequestContext,
        endpoint: &Url,
        state: &mut RetryState,
    ) -> RetryAction {
        let delay = self
            .options
            .network_retry_interval
            .saturating_mul(2u32.saturating_pow(state.network_failures));
        if !self.within_budget(state, delay) {
            return RetryAction::Fail;
        }
        state.network_failures += 1;
        self.mark_unavailable(ctx, endpoint);
        tracing::warn!(%endpoint, ?delay, "network failure; retrying");
        RetryAction::Retry(delay)
    }

    fn mark_unavailable(&self, ctx: &RequestContext, endpoint: &Url) {
        if ctx.operation_type.is_read_only() {
            self.endpoint_manager.mark_endpoint_unavailable_for_read(endpoint);
        } else {
            self.endpoint_manager.mark_endpoint_unavailable_for_write(endpoint);
        }
    }

    async fn refresh_topology(&self) {
        if !self.endpoint_manager.enable_endpoint_discovery() {
            return;
        }
        if let Err(e) = self.endpoint_manager.refresh_endpoint_list().await {
            tracing::warn!(error = %e, "failed to refresh account topology");
        }
    }
}

#[async_trait]
impl Terminal for RetryLoop<'_> {
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(resource = %ctx.resource_link, operation = ?ctx.operation_type)
    )]
    async fn call(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        let mut state = RetryState::default();
        let mut next_endpoint = None;
        loop {
            if ctx.is_aborted() {
                return Err(crate::error::cancelled());
            }
            let endpoint = match next_endpoint.take().or_else(|| ctx.endpoint_override.clone()) {
                Some(endpoint) => endpoint,
                None => {
                    self.endpoint_manager
                        .resolve_service_endpoint(ctx.resource_type(), ctx.operation_type)
                        .await
                }
            };
            ctx.endpoint = Some(endpoint.clone());
            ctx.retry_count = state.retries;

            let error = match self.sender.send(ctx).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            match self.decide(&error, ctx, &endpoint, &mut state).await {
                RetryAction::Fail => return Err(error),
                RetryAction::Retry(delay) => {
                    if !delay.is_zero() {
                        abortable(ctx.abort_signal.as_ref(), async {
                            tokio::time::sleep(delay).await;
                            Ok(())
                        })
                        .await?;
                    }
                    state.waited += delay;
                }
                RetryAction::RetryOn(endpoint) => next_endpoint = Some(endpoint),
            }
            state.retries += 1;
        }
    }
}
