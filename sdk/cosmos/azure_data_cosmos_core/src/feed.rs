// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use azure_core::http::headers::Headers;
use futures::{stream::BoxStream, Stream, StreamExt};

use crate::constants;

/// A page of results from a query or a read feed.
#[derive(Clone, Debug)]
pub struct FeedPage<T> {
    items: Vec<T>,
    continuation: Option<String>,
    request_charge: f64,
    headers: Headers,
}

impl<T> FeedPage<T> {
    pub(crate) fn new(
        items: Vec<T>,
        continuation: Option<String>,
        request_charge: f64,
        headers: Headers,
    ) -> Self {
        Self {
            items,
            continuation,
            request_charge,
            headers,
        }
    }

    /// Gets the items in this page of results.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the page, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// A token that resumes the feed after this page, if there are more results.
    ///
    /// Pass it back through [`FeedOptions::continuation`](crate::FeedOptions::continuation).
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// The request units consumed by every request that produced this page.
    pub fn request_charge(&self) -> f64 {
        self.request_charge
    }

    pub fn activity_id(&self) -> Option<&str> {
        self.headers.get_optional_str(&constants::ACTIVITY_ID)
    }

    /// The headers of the last response that contributed to this page.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// A lazy, finite stream of [`FeedPage`]s.
pub struct FeedPager<T> {
    stream: BoxStream<'static, azure_core::Result<FeedPage<T>>>,
}

impl<T> FeedPager<T> {
    pub(crate) fn new(
        stream: impl Stream<Item = azure_core::Result<FeedPage<T>>> + Send + 'static,
    ) -> Self {
        Self {
            stream: stream.boxed(),
        }
    }
}

impl<T> Stream for FeedPager<T> {
    type Item = azure_core::Result<FeedPage<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl<T> std::fmt::Debug for FeedPager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPager").finish_non_exhaustive()
    }
}
