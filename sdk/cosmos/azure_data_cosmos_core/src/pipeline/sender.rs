// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use azure_core::{
    http::{headers::Headers, HttpClient, Request, StatusCode},
    time::OffsetDateTime,
};
use url::Url;

use super::{
    authorization::{self, AuthorizationRequest},
    cancellation::abortable,
    plugin::{Next, Terminal},
    Plugin, RequestContext,
};
use crate::{
    constants,
    error::{RequestInterrupted, ServiceError},
    global_endpoint_manager::DatabaseAccountReader,
    models::DatabaseAccount,
    resource_context::{OperationType, ResourceLink},
    utils::merge_headers,
    AuthOptions, CosmosResponse,
};

/// Sends single attempts: request plugins, headers, signing and the transport call.
///
/// Knows nothing about regions or retries, so the endpoint manager can use it to read account
/// metadata.
#[derive(Debug)]
pub(crate) struct RequestSender {
    transport: Arc<dyn HttpClient>,
    auth: Option<AuthOptions>,
    request_plugins: Vec<Arc<dyn Plugin>>,
    default_headers: Headers,
    request_timeout: Duration,
    default_endpoint: Url,
}

impl RequestSender {
    pub fn new(
        transport: Arc<dyn HttpClient>,
        auth: Option<AuthOptions>,
        request_plugins: Vec<Arc<dyn Plugin>>,
        default_headers: Headers,
        request_timeout: Duration,
        default_endpoint: Url,
    ) -> Self {
        Self {
            transport,
            auth,
            request_plugins,
            default_headers,
            request_timeout,
            default_endpoint,
        }
    }

    /// Runs one attempt through the request plugins and the transport.
    pub async fn send(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        Next::new(&self.request_plugins, self).run(ctx).await
    }

    async fn build_request(&self, ctx: &RequestContext) -> azure_core::Result<Request> {
        let endpoint = ctx.endpoint.as_ref().unwrap_or(&self.default_endpoint);
        let mut request = Request::new(ctx.resource_link.url(endpoint), ctx.method);

        let mut headers = Headers::new();
        headers.insert(constants::ACCEPT, constants::JSON_CONTENT_TYPE);
        merge_headers(&mut headers, &self.default_headers);
        merge_headers(&mut headers, &ctx.headers);

        let date = authorization::format_date(OffsetDateTime::now_utc());
        headers.insert(constants::MS_DATE, date.clone());
        headers.insert(constants::VERSION, constants::API_VERSION);
        headers.insert(constants::ACTIVITY_ID, uuid::Uuid::new_v4().to_string());
        if let Some(level) = ctx.consistency_level {
            if headers
                .get_optional_str(&constants::CONSISTENCY_LEVEL)
                .is_none()
            {
                headers.insert(constants::CONSISTENCY_LEVEL, level.as_str());
            }
        }
        if let Some(id) = &ctx.partition_key_range_id {
            headers.insert(constants::PARTITION_KEY_RANGE_ID, id.value().to_owned());
        }
        if let Some(body) = &ctx.body {
            if headers.get_optional_str(&constants::CONTENT_TYPE).is_none() {
                headers.insert(constants::CONTENT_TYPE, constants::JSON_CONTENT_TYPE);
            }
            request.set_body(body.clone());
        }
        for (name, value) in headers.iter() {
            request.insert_header(name.clone(), value.clone());
        }

        let resource_link = ctx.resource_link.resource_link();
        let authorization = authorization::authorize(
            self.auth.as_ref(),
            &AuthorizationRequest {
                method: ctx.method,
                resource_type: ctx.resource_type(),
                resource_link: &resource_link,
                date: &date,
            },
        )
        .await?;
        if let Some(authorization) = authorization {
            request.insert_header(constants::AUTHORIZATION, authorization);
        }
        Ok(request)
    }
}

#[async_trait]
impl Terminal for RequestSender {
    async fn call(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        let request = self.build_request(ctx).await?;
        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            attempt = ctx.retry_count,
            "sending request"
        );

        let timeout = self.request_timeout;
        let exchange = async {
            let response = self.transport.execute_request(&request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await?;
            Ok(CosmosResponse::new(status, headers, body))
        };
        let attempt = async {
            match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(RequestInterrupted::Timeout(timeout).into_error()),
            }
        };
        let response = abortable(ctx.abort_signal.as_ref(), attempt).await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NotModified {
            return Ok(response);
        }
        let (status, headers, body) = response.deconstruct();
        let error = ServiceError::new(status, headers, &body);
        tracing::debug!(%error, "request failed");
        Err(error.into_error())
    }
}

#[async_trait]
impl DatabaseAccountReader for RequestSender {
    async fn read_database_account(&self, endpoint: &Url) -> azure_core::Result<DatabaseAccount> {
        let mut ctx = RequestContext::new(ResourceLink::account(), OperationType::Read);
        ctx.endpoint = Some(endpoint.clone());
        self.send(&mut ctx).await?.into_json_body()
    }
}
