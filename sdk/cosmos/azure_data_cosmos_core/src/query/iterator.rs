// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{fmt, marker::PhantomData, sync::Arc};

use azure_core::http::headers::Headers;
use futures::stream;
use serde::de::DeserializeOwned;

use super::{execution::ExecutionContext, QueryFetcher};
use crate::{
    resource_context::{ResourceLink, ResourceType},
    FeedOptions, FeedPage, FeedPager, Query,
};

/// Pages through the results of a query or a read feed.
///
/// Nothing is sent until the first call to [`fetch_next`](Self::fetch_next). A page that fails
/// leaves the iterator where it was, so the same page can be requested again.
pub struct QueryIterator<T> {
    fetcher: Arc<dyn QueryFetcher>,
    feed: ResourceLink,
    query: Option<Query>,
    options: FeedOptions,
    context: Option<ExecutionContext>,
    phantom: PhantomData<fn() -> T>,
}

impl<T> QueryIterator<T> {
    pub(crate) fn new(
        fetcher: Arc<dyn QueryFetcher>,
        feed: ResourceLink,
        query: Option<Query>,
        options: FeedOptions,
    ) -> Self {
        Self {
            fetcher,
            feed,
            query,
            options,
            context: None,
            phantom: PhantomData,
        }
    }

    /// Returns `false` once every page has been returned.
    pub fn has_more_results(&self) -> bool {
        self.context.as_ref().map_or(true, |c| !c.is_exhausted())
    }

    /// Rewinds to the state the iterator was created in.
    pub fn reset(&mut self) {
        self.context = None;
    }

    /// Only item queries without a partition key fan out; everything else is one server-side stream.
    fn is_cross_partition(&self) -> bool {
        self.query.is_some()
            && self.feed.resource_type() == ResourceType::Items
            && self.options.partition_key.is_none()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(feed = %self.feed))]
    async fn start(&self) -> azure_core::Result<ExecutionContext> {
        let continuation = self.options.continuation.as_deref();
        let query = match &self.query {
            Some(query) if self.is_cross_partition() => query,
            query => return Ok(ExecutionContext::single(query.clone(), continuation)),
        };

        let plan = self
            .fetcher
            .fetch_query_plan(&self.feed, query, &self.options)
            .await?;
        // A continuation token carries its own ranges.
        let ranges = match continuation {
            Some(_) => Vec::new(),
            None => {
                self.fetcher
                    .fetch_partition_key_ranges(&self.feed, &plan.query_ranges)
                    .await?
            }
        };
        tracing::debug!(?plan, ranges = ranges.len(), "fetched query plan");
        ExecutionContext::cross_partition(plan, ranges, query, continuation)
    }
}

impl<T: DeserializeOwned> QueryIterator<T> {
    /// Fetches the next page of results.
    ///
    /// Returns an empty page without a continuation once the results are exhausted.
    pub async fn fetch_next(&mut self) -> azure_core::Result<FeedPage<T>> {
        let mut context = match self.context.take() {
            Some(context) => context,
            None => self.start().await?,
        };
        let snapshot = context.clone();
        match self.advance(&mut context).await {
            Ok(page) => {
                self.context = Some(context);
                Ok(page)
            }
            Err(e) => {
                self.context = Some(snapshot);
                Err(e)
            }
        }
    }

    async fn advance(&self, context: &mut ExecutionContext) -> azure_core::Result<FeedPage<T>> {
        let page = context
            .fetch_next(self.fetcher.as_ref(), &self.feed, &self.options)
            .await?;
        let items = page
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(FeedPage::new(
            items,
            context.continuation()?,
            page.request_charge,
            page.headers,
        ))
    }

    /// Restarts from the beginning and collects every result into one page.
    ///
    /// The charge is summed over all requests; the headers are those of the last response.
    pub async fn fetch_all(&mut self) -> azure_core::Result<FeedPage<T>> {
        self.reset();
        let mut items = Vec::new();
        let mut request_charge = 0.0;
        let mut headers = Headers::new();
        while self.has_more_results() {
            let page = self.fetch_next().await?;
            request_charge += page.request_charge();
            headers = page.headers().clone();
            items.extend(page.into_items());
        }
        Ok(FeedPage::new(items, None, request_charge, headers))
    }
}

impl<T: DeserializeOwned + Send + 'static> QueryIterator<T> {
    /// Converts the remaining pages into a [`FeedPager`]. The stream ends after the first error.
    pub fn into_stream(self) -> FeedPager<T> {
        FeedPager::new(stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            if !this.has_more_results() {
                return None;
            }
            match this.fetch_next().await {
                Ok(page) => Some((Ok(page), Some(this))),
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}

impl<T> fmt::Debug for QueryIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIterator")
            .field("feed", &self.feed)
            .field("query", &self.query)
            .field("started", &self.context.is_some())
            .finish_non_exhaustive()
    }
}
