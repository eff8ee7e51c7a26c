// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use async_trait::async_trait;
use azure_core::{
    error::ErrorKind,
    http::{headers::Headers, new_http_client},
    Error,
};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::{
    constants,
    models::{DatabaseAccount, PartitionKeyRange, PartitionedQueryExecutionInfo, QueryRange},
    partition_key::extract_partition_key,
    pipeline::{CosmosPipeline, RequestContext},
    query::{PageRequest, QueryFetcher, RawPage},
    resource_context::{OperationType, ResourceLink, ResourceType},
    session::SessionStore,
    utils::merge_headers,
    AccessCondition, ConsistencyLevel, CosmosClientOptions, CosmosErrorExt, CosmosResponse,
    FeedOptions, PartitionKey, PartitionKeyRangeId, Query, QueryIterator, RequestOptions,
};

/// Executes operations against a Cosmos DB account.
///
/// A `ClientContext` owns everything that is scoped to one client: the endpoint manager and its
/// background refresh, the session tokens and the partition key range cache. Cloning is cheap and
/// clones share that state.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn doc() -> azure_core::Result<()> {
/// use azure_data_cosmos_core::{ClientContext, ConnectionString, ResourceLink, ResourceType};
///
/// let options = "AccountEndpoint=https://myaccount.documents.azure.com:443/;AccountKey=a2V5"
///     .parse::<ConnectionString>()?
///     .into_client_options();
/// let client = ClientContext::new(options)?;
///
/// let item = ResourceLink::parse("dbs/db/colls/coll/docs/item1")?;
/// let body: serde_json::Value = client.read(&item, None).await?.into_json_body()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ClientContext {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    pipeline: CosmosPipeline,
    sessions: SessionStore,
    consistency_level: Option<ConsistencyLevel>,
}

fn parse_endpoint(endpoint: &str) -> azure_core::Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| {
        Error::new(
            ErrorKind::Other,
            format!("invalid account endpoint '{endpoint}': {e}"),
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::new(
            ErrorKind::Other,
            format!("account endpoint must be an http(s) URL, got '{endpoint}'"),
        ));
    }
    Ok(url)
}

/// The container a link lives under, as a link.
fn container_of(link: &ResourceLink) -> azure_core::Result<ResourceLink> {
    let path = link.container_link().ok_or_else(|| {
        Error::new(
            ErrorKind::Other,
            format!("'{link}' is not within a container"),
        )
    })?;
    ResourceLink::parse(&path)
}

fn apply_access_condition(headers: &mut Headers, condition: Option<&AccessCondition>) {
    match condition {
        Some(AccessCondition::IfMatch(etag)) => headers.insert(constants::IF_MATCH, etag.clone()),
        Some(AccessCondition::IfNoneMatch(etag)) => {
            headers.insert(constants::IF_NONE_MATCH, etag.clone())
        }
        None => {}
    }
}

fn apply_request_options(ctx: &mut RequestContext, options: &RequestOptions) -> azure_core::Result<()> {
    let headers = &mut ctx.headers;
    merge_headers(headers, &options.initial_headers);
    if let Some(token) = &options.session_token {
        headers.insert(constants::SESSION_TOKEN, token.clone());
    }
    apply_access_condition(headers, options.access_condition.as_ref());
    if let Some(partition_key) = &options.partition_key {
        headers.insert(constants::PARTITION_KEY, partition_key.to_header_value()?);
    }
    if !options.pre_trigger_include.is_empty() {
        headers.insert(
            constants::PRE_TRIGGER_INCLUDE,
            options.pre_trigger_include.join(","),
        );
    }
    if !options.post_trigger_include.is_empty() {
        headers.insert(
            constants::POST_TRIGGER_INCLUDE,
            options.post_trigger_include.join(","),
        );
    }
    if let Some(directive) = options.indexing_directive {
        headers.insert(constants::INDEXING_DIRECTIVE, directive.as_str());
    }
    if let Some(throughput) = options.offer_throughput {
        headers.insert(constants::OFFER_THROUGHPUT, throughput.to_string());
    }
    if let Some(offer_type) = &options.offer_type {
        headers.insert(constants::OFFER_TYPE, offer_type.clone());
    }
    if options.populate_quota_info {
        headers.insert(constants::POPULATE_QUOTA_INFO, "true");
    }
    if options.enable_script_logging {
        headers.insert(constants::ENABLE_SCRIPT_LOGGING, "true");
    }
    if let Some(expiry) = options.resource_token_expiry_seconds {
        headers.insert(constants::RESOURCE_TOKEN_EXPIRY, expiry.to_string());
    }
    if options.disable_ru_per_minute_usage {
        headers.insert(constants::DISABLE_RU_PER_MINUTE_USAGE, "true");
    }
    ctx.consistency_level = options.consistency_level;
    ctx.abort_signal = options.abort_signal.clone();
    Ok(())
}

fn apply_feed_options(ctx: &mut RequestContext, options: &FeedOptions) -> azure_core::Result<()> {
    let headers = &mut ctx.headers;
    merge_headers(headers, &options.initial_headers);
    if let Some(max_item_count) = options.max_item_count {
        headers.insert(constants::MAX_ITEM_COUNT, max_item_count.to_string());
    }
    if let Some(token) = &options.session_token {
        headers.insert(constants::SESSION_TOKEN, token.clone());
    }
    apply_access_condition(headers, options.access_condition.as_ref());
    if let Some(partition_key) = &options.partition_key {
        headers.insert(constants::PARTITION_KEY, partition_key.to_header_value()?);
    }
    if options.enable_scan_in_query {
        headers.insert(constants::ENABLE_SCAN_IN_QUERY, "true");
    }
    if options.populate_query_metrics {
        headers.insert(constants::POPULATE_QUERY_METRICS, "true");
    }
    ctx.consistency_level = options.consistency_level;
    ctx.abort_signal = options.abort_signal.clone();
    Ok(())
}

impl ClientContext {
    /// Creates a client from `options`.
    ///
    /// Fails if the endpoint is not an http(s) URL or no authorization was configured. No
    /// request is sent.
    pub fn new(options: CosmosClientOptions) -> azure_core::Result<Self> {
        let endpoint = parse_endpoint(&options.endpoint)?;
        if options.auth.is_none() {
            return Err(Error::new(
                ErrorKind::Credential,
                "an account key, resource tokens or a token provider is required",
            ));
        }
        let transport = options.transport.clone().unwrap_or_else(new_http_client);

        tracing::debug!(%endpoint, "creating client context");
        let pipeline = CosmosPipeline::new(&options, endpoint, transport);
        Ok(Self {
            inner: Arc::new(ClientInner {
                pipeline,
                sessions: SessionStore::new(),
                consistency_level: options.consistency_level,
            }),
        })
    }

    /// Reads a single resource.
    ///
    /// # Arguments
    ///
    /// * `link` - The resource to read, e.g. `dbs/db/colls/coll/docs/item1`.
    /// * `options` - Optional parameters for the request.
    pub async fn read(
        &self,
        link: &ResourceLink,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        let options = options.unwrap_or_default();
        let mut ctx = RequestContext::new(link.clone(), OperationType::Read);
        apply_request_options(&mut ctx, &options)?;
        self.inner.send(&mut ctx).await
    }

    /// Creates a resource in the feed `feed`.
    ///
    /// For items, a missing partition key is read from `body` using the container's partition
    /// key definition.
    pub async fn create<T: Serialize>(
        &self,
        feed: &ResourceLink,
        body: &T,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        self.write(feed, OperationType::Create, body, options).await
    }

    /// Creates a resource in `feed`, or replaces the resource with the same id.
    pub async fn upsert<T: Serialize>(
        &self,
        feed: &ResourceLink,
        body: &T,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        self.write(feed, OperationType::Upsert, body, options).await
    }

    /// Replaces the resource at `link` with `body`.
    pub async fn replace<T: Serialize>(
        &self,
        link: &ResourceLink,
        body: &T,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        self.write(link, OperationType::Replace, body, options).await
    }

    /// Deletes the resource at `link`, forgetting any session state scoped beneath it.
    pub async fn delete(
        &self,
        link: &ResourceLink,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        let options = options.unwrap_or_default();
        let mut ctx = RequestContext::new(link.clone(), OperationType::Delete);
        apply_request_options(&mut ctx, &options)?;
        let response = self.inner.send(&mut ctx).await?;
        self.inner.sessions.clear_session_token(link);
        Ok(response)
    }

    /// Executes a stored procedure with the given parameters.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # async fn doc(client: azure_data_cosmos_core::ClientContext) -> azure_core::Result<()> {
    /// # use azure_data_cosmos_core::{PartitionKey, RequestOptions, ResourceLink};
    /// let sproc = ResourceLink::parse("dbs/db/colls/coll/sprocs/bulkImport")?;
    /// let options = RequestOptions::builder()
    ///     .with_partition_key(PartitionKey::from("tenant1"))
    ///     .build();
    /// let result: serde_json::Value = client
    ///     .execute(&sproc, &["a", "b"], Some(options))
    ///     .await?
    ///     .into_json_body()?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute<P: Serialize + ?Sized>(
        &self,
        sproc: &ResourceLink,
        params: &P,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        let options = options.unwrap_or_default();
        let body = serde_json::to_vec(params)?;
        let mut ctx = RequestContext::new(sproc.clone(), OperationType::Execute).with_body(body);
        apply_request_options(&mut ctx, &options)?;
        self.inner.send(&mut ctx).await
    }

    /// Queries the resources in `feed`.
    ///
    /// Item queries without a partition key run across every partition of the container. Nothing
    /// is sent until the first page is requested.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # async fn doc(client: azure_data_cosmos_core::ClientContext) -> azure_core::Result<()> {
    /// # use azure_data_cosmos_core::{Query, ResourceLink};
    /// let items = ResourceLink::parse("dbs/db/colls/coll/docs")?;
    /// let query = Query::from("SELECT * FROM c WHERE c.size > @size").with_parameter("@size", 3)?;
    /// let mut results = client.query_feed::<serde_json::Value>(items, query, None);
    /// while results.has_more_results() {
    ///     let page = results.fetch_next().await?;
    ///     println!("{} items", page.items().len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn query_feed<T>(
        &self,
        feed: ResourceLink,
        query: impl Into<Query>,
        options: Option<FeedOptions>,
    ) -> QueryIterator<T> {
        QueryIterator::new(
            self.inner.clone(),
            feed,
            Some(query.into()),
            options.unwrap_or_default(),
        )
    }

    /// Reads every resource in `feed`, one page at a time.
    pub fn read_all<T>(
        &self,
        feed: ResourceLink,
        options: Option<FeedOptions>,
    ) -> QueryIterator<T> {
        QueryIterator::new(self.inner.clone(), feed, None, options.unwrap_or_default())
    }

    /// Reads the account's metadata from the default endpoint.
    pub async fn read_database_account(
        &self,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<DatabaseAccount> {
        let options = options.unwrap_or_default();
        let mut ctx = RequestContext::new(ResourceLink::account(), OperationType::Read);
        apply_request_options(&mut ctx, &options)?;
        ctx.endpoint_override = Some(
            self.inner
                .pipeline
                .endpoint_manager()
                .default_endpoint()
                .clone(),
        );
        self.inner.send(&mut ctx).await?.into_json_body()
    }

    /// Reads or queries the partition key ranges of a container.
    pub fn query_partition_key_ranges(
        &self,
        container: &ResourceLink,
        query: Option<Query>,
        options: Option<FeedOptions>,
    ) -> QueryIterator<PartitionKeyRange> {
        QueryIterator::new(
            self.inner.clone(),
            container.feed(ResourceType::PartitionKeyRanges),
            query,
            options.unwrap_or_default(),
        )
    }

    pub async fn get_write_endpoint(&self) -> Url {
        self.inner.pipeline.endpoint_manager().get_write_endpoint().await
    }

    pub async fn get_read_endpoint(&self) -> Url {
        self.inner.pipeline.endpoint_manager().get_read_endpoint().await
    }

    /// The session token requests under `link`'s container currently carry, if any.
    pub fn session_token(&self, link: &ResourceLink) -> Option<String> {
        let scope = link.container_link()?;
        self.inner.sessions.get_session_token(&scope, None)
    }

    /// Forgets the session tokens of `link` and everything beneath it.
    pub fn clear_session_token(&self, link: &ResourceLink) {
        self.inner.sessions.clear_session_token(link);
    }

    async fn write<T: Serialize>(
        &self,
        link: &ResourceLink,
        operation_type: OperationType,
        body: &T,
        options: Option<RequestOptions>,
    ) -> azure_core::Result<CosmosResponse> {
        let mut options = options.unwrap_or_default();
        let body = serde_json::to_value(body)?;
        if options.partition_key.is_none()
            && !options.skip_get_partition_key_definition
            && link.resource_type() == ResourceType::Items
        {
            options.partition_key = self.inner.partition_key_of(link, &body).await?;
        }

        let mut ctx = RequestContext::new(link.clone(), operation_type)
            .with_body(serde_json::to_vec(&body)?);
        apply_request_options(&mut ctx, &options)?;
        if operation_type == OperationType::Upsert {
            ctx.headers.insert(constants::IS_UPSERT, "true");
        }
        self.inner.send(&mut ctx).await
    }
}

impl ClientInner {
    /// Sends one logical operation, attaching and capturing session tokens around it.
    async fn send(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        if ctx.consistency_level.is_none() {
            ctx.consistency_level = self.consistency_level;
        }
        self.sessions.apply_session_token(ctx);
        match self.pipeline.send(ctx).await {
            Ok(response) => {
                self.sessions
                    .capture_session_token(&ctx.resource_link, response.headers());
                Ok(response)
            }
            Err(e) => {
                if let Some(failure) = e.service_error() {
                    self.sessions
                        .capture_session_token(&ctx.resource_link, failure.headers());
                }
                Err(e)
            }
        }
    }

    /// The partition key of an item body, from the container's definition.
    async fn partition_key_of(
        &self,
        link: &ResourceLink,
        body: &Value,
    ) -> azure_core::Result<Option<PartitionKey>> {
        let container = container_of(link)?;
        let definition = self
            .pipeline
            .pk_range_cache()
            .partition_key_definition(&container, &self.pipeline)
            .await?;
        Ok(definition
            .filter(|d| !d.system_key && !d.paths.is_empty())
            .map(|d| extract_partition_key(body, &d)))
    }
}

#[async_trait]
impl QueryFetcher for ClientInner {
    async fn fetch_query_plan(
        &self,
        feed: &ResourceLink,
        query: &Query,
        options: &FeedOptions,
    ) -> azure_core::Result<PartitionedQueryExecutionInfo> {
        let mut ctx = RequestContext::new(feed.clone(), OperationType::Query)
            .with_body(serde_json::to_vec(query)?)
            .with_abort_signal(options.abort_signal.clone());
        ctx.headers.insert(constants::IS_QUERY_PLAN, "True");
        ctx.headers.insert(
            constants::SUPPORTED_QUERY_FEATURES,
            constants::SUPPORTED_QUERY_FEATURES_VALUE,
        );
        ctx.headers.insert(constants::QUERY, "True");
        ctx.headers.insert(constants::QUERY_VERSION, "1.0");
        ctx.headers.insert(constants::CONTENT_TYPE, constants::QUERY_CONTENT_TYPE);
        self.pipeline.send(&mut ctx).await?.into_json_body()
    }

    async fn fetch_partition_key_ranges(
        &self,
        feed: &ResourceLink,
        query_ranges: &[QueryRange],
    ) -> azure_core::Result<Vec<PartitionKeyRange>> {
        let container = container_of(feed)?;
        self.pipeline
            .pk_range_cache()
            .overlapping_ranges(&container, query_ranges, &self.pipeline)
            .await
    }

    async fn fetch_page(&self, request: &PageRequest<'_>) -> azure_core::Result<RawPage> {
        let options = request.options;
        let mut ctx = match request.query {
            Some(query) => {
                let mut ctx = RequestContext::new(request.feed.clone(), OperationType::Query)
                    .with_body(serde_json::to_vec(query)?);
                ctx.headers.insert(constants::QUERY, "True");
                ctx.headers.insert(constants::CONTENT_TYPE, constants::QUERY_CONTENT_TYPE);
                ctx
            }
            None => RequestContext::new(request.feed.clone(), OperationType::Read),
        };
        apply_feed_options(&mut ctx, options)?;
        if request.query.is_some()
            && options.partition_key.is_none()
            && request.feed.resource_type() == ResourceType::Items
        {
            ctx.headers.insert(constants::ENABLE_CROSS_PARTITION_QUERY, "True");
            ctx.headers.insert(constants::PARALLELIZE_CROSS_PARTITION_QUERY, "True");
        }
        if let Some(continuation) = request.continuation {
            ctx.headers.insert(constants::CONTINUATION, continuation.to_owned());
        }
        ctx.partition_key_range_id = request
            .partition_key_range_id
            .map(|id| PartitionKeyRangeId::new(id.to_owned()));

        let response = self.send(&mut ctx).await?;
        let request_charge = response.request_charge();
        let continuation = response.continuation().map(ToOwned::to_owned);
        let (_, headers, body) = response.deconstruct();
        let mut body: Map<String, Value> = serde_json::from_slice(&body)?;
        let key = request.feed.resource_type().feed_body_key();
        let items = match body.remove(key) {
            Some(Value::Array(items)) => items,
            Some(_) | None => {
                return Err(Error::new(
                    ErrorKind::DataConversion,
                    format!("feed response is missing the '{key}' array"),
                ))
            }
        };
        Ok(RawPage {
            items,
            continuation,
            request_charge,
            headers,
        })
    }
}
