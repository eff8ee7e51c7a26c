// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Execution strategies for queries and read feeds, and their continuation tokens.

use std::collections::{BTreeSet, VecDeque};

use azure_core::{error::ErrorKind, http::headers::Headers, Error};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    aggregate::{self, Aggregator},
    ordering, PageRequest, QueryFetcher, RawPage,
};
use crate::{
    error::is_partition_split,
    models::{
        AggregateKind, DistinctType, PartitionKeyRange, PartitionedQueryExecutionInfo, QueryRange,
        SortOrder,
    },
    resource_context::ResourceLink,
    FeedOptions, Query,
};

/// Items emitted per page by merging strategies when the caller set no page size.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Position within one partition key range, as serialized in a continuation token.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RangeState {
    id: String,
    min: String,
    max: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    continuation: Option<String>,
    #[serde(default)]
    skip: usize,
    #[serde(default)]
    done: bool,
}

/// The continuation token of a cross-partition query.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CompositeContinuation {
    ranges: Vec<RangeState>,
    /// The range the next unordered page starts from.
    #[serde(default)]
    cursor: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(default, skip_serializing_if = "DistinctState::is_empty")]
    distinct: DistinctState,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Results already emitted by a DISTINCT query, keyed by their JSON text.
///
/// Ordered queries see duplicates next to each other, so only the last result is kept.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DistinctState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    seen: BTreeSet<String>,
}

impl DistinctState {
    fn is_empty(&self) -> bool {
        self.last.is_none() && self.seen.is_empty()
    }

    /// Records `item`, returning `false` if it was already emitted.
    fn admit(&mut self, distinct_type: DistinctType, item: &Value) -> bool {
        let key = item.to_string();
        match distinct_type {
            DistinctType::None => true,
            DistinctType::Ordered if self.last.as_ref() == Some(&key) => false,
            DistinctType::Ordered => {
                self.last = Some(key);
                true
            }
            DistinctType::Unordered => self.seen.insert(key),
        }
    }
}

/// One partition key range and the page of it currently buffered.
#[derive(Clone, Debug)]
struct RangeCursor {
    range: PartitionKeyRange,
    /// The continuation that fetches the current page; `None` for the first page.
    token: Option<String>,
    /// Items of the current page already emitted.
    skip: usize,
    buffer: VecDeque<Value>,
    /// The continuation returned with the current page.
    next: Option<String>,
    loaded: bool,
    exhausted: bool,
}

impl RangeCursor {
    fn new(range: PartitionKeyRange) -> Self {
        Self {
            range,
            token: None,
            skip: 0,
            buffer: VecDeque::new(),
            next: None,
            loaded: false,
            exhausted: false,
        }
    }

    /// A cursor over `child` that resumes where its split parent stopped.
    fn inherit(&self, child: PartitionKeyRange) -> Self {
        Self {
            range: child,
            token: self.token.clone(),
            skip: self.skip,
            ..Self::new(PartitionKeyRange::default())
        }
    }

    fn restore(state: RangeState) -> Self {
        Self {
            range: PartitionKeyRange {
                id: state.id,
                min_inclusive: state.min,
                max_exclusive: state.max,
                parents: Vec::new(),
            },
            token: state.continuation,
            skip: state.skip,
            buffer: VecDeque::new(),
            next: None,
            loaded: false,
            exhausted: state.done,
        }
    }

    fn state(&self) -> RangeState {
        RangeState {
            id: self.range.id.clone(),
            min: self.range.min_inclusive.clone(),
            max: self.range.max_exclusive.clone(),
            continuation: self.token.clone(),
            skip: self.skip,
            done: self.exhausted,
        }
    }

    fn needs_page(&self) -> bool {
        !self.exhausted && !self.loaded
    }

    fn has_items(&self) -> bool {
        self.loaded && !self.buffer.is_empty()
    }

    fn load(&mut self, page: RawPage) {
        let mut items: VecDeque<Value> = page.items.into();
        let skip = self.skip.min(items.len());
        items.drain(..skip);
        self.buffer = items;
        self.next = page.continuation;
        self.loaded = true;
        self.settle();
    }

    /// Moves past a fully consumed page.
    fn settle(&mut self) {
        if !self.loaded || !self.buffer.is_empty() {
            return;
        }
        self.loaded = false;
        match self.next.take() {
            Some(next) => {
                self.token = Some(next);
                self.skip = 0;
            }
            None => self.exhausted = true,
        }
    }

    fn pop(&mut self) -> Option<Value> {
        let item = self.buffer.pop_front()?;
        self.skip += 1;
        self.settle();
        Some(item)
    }

    fn take_all(&mut self) -> Vec<Value> {
        self.skip += self.buffer.len();
        let items = self.buffer.drain(..).collect();
        self.settle();
        items
    }
}

#[derive(Clone, Debug)]
enum Strategy {
    /// One server-side stream: a single partition, a non-item feed or a read feed.
    Single {
        continuation: Option<String>,
        exhausted: bool,
    },
    /// Pages from several ranges per call, round-robin across calls.
    Parallel,
    /// A k-way merge of the ranges by the ORDER BY values.
    OrderBy(Vec<SortOrder>),
    /// Every range drained into a single aggregated value.
    Aggregate {
        aggregates: Vec<AggregateKind>,
        done: bool,
    },
}

/// The merged output of one `fetch_next`.
#[derive(Debug, Default)]
pub(crate) struct MergedPage {
    pub items: Vec<Value>,
    pub request_charge: f64,
    pub headers: Headers,
}

impl MergedPage {
    fn record(&mut self, page: &RawPage) {
        self.request_charge += page.request_charge;
        self.headers = page.headers.clone();
    }
}

/// Everything a query iterator needs to resume: the strategy, per-range positions and the
/// client-side TOP / OFFSET / LIMIT state.
#[derive(Clone, Debug)]
pub(crate) struct ExecutionContext {
    strategy: Strategy,
    /// The query each request sends; the gateway's rewrite for cross-partition queries.
    query: Option<Query>,
    cursors: Vec<RangeCursor>,
    next_range: usize,
    offset: u64,
    limit: Option<u64>,
    distinct_type: DistinctType,
    distinct: DistinctState,
}

fn invalid_continuation(e: serde_json::Error) -> Error {
    Error::new(
        ErrorKind::DataConversion,
        format!("invalid continuation token: {e}"),
    )
}

impl ExecutionContext {
    /// Executes against a single server-side stream, resuming from `continuation`.
    pub fn single(query: Option<Query>, continuation: Option<&str>) -> Self {
        Self {
            strategy: Strategy::Single {
                continuation: continuation.map(ToOwned::to_owned),
                exhausted: false,
            },
            query,
            cursors: Vec::new(),
            next_range: 0,
            offset: 0,
            limit: None,
            distinct_type: DistinctType::None,
            distinct: DistinctState::default(),
        }
    }

    /// Executes a cross-partition query as planned by the gateway over `ranges`.
    pub fn cross_partition(
        plan: PartitionedQueryExecutionInfo,
        ranges: Vec<PartitionKeyRange>,
        query: &Query,
        continuation: Option<&str>,
    ) -> azure_core::Result<Self> {
        let info = plan.query_info;
        let strategy = if !info.order_by.is_empty() {
            Strategy::OrderBy(info.order_by.clone())
        } else if !info.aggregates.is_empty() {
            if !info.has_select_value {
                return Err(Error::new(
                    ErrorKind::Other,
                    "cross-partition aggregates are only supported with SELECT VALUE",
                ));
            }
            Strategy::Aggregate {
                aggregates: info.aggregates.clone(),
                done: false,
            }
        } else {
            Strategy::Parallel
        };

        let partition_query = match info.partition_query() {
            Some(text) => query.with_text(text),
            None => query.clone(),
        };
        let mut limit = match (info.top, info.limit) {
            (Some(top), Some(limit)) => Some(top.min(limit)),
            (top, limit) => top.or(limit),
        };
        let mut offset = info.offset.unwrap_or(0);
        let mut distinct = DistinctState::default();

        let (cursors, next_range) = match continuation {
            Some(token) => {
                let token: CompositeContinuation =
                    serde_json::from_str(token).map_err(invalid_continuation)?;
                offset = token.offset;
                limit = token.limit;
                distinct = token.distinct;
                let cursors: Vec<_> = token.ranges.into_iter().map(RangeCursor::restore).collect();
                let next_range = token.cursor.min(cursors.len().saturating_sub(1));
                (cursors, next_range)
            }
            None => (ranges.into_iter().map(RangeCursor::new).collect(), 0),
        };

        tracing::debug!(
            strategy = ?strategy,
            ranges = cursors.len(),
            ?offset,
            ?limit,
            "planned cross-partition query"
        );
        Ok(Self {
            strategy,
            query: Some(partition_query),
            cursors,
            next_range,
            offset,
            limit,
            distinct_type: info.distinct_type,
            distinct,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        if self.limit == Some(0) {
            return true;
        }
        match &self.strategy {
            Strategy::Single { exhausted, .. } => *exhausted,
            Strategy::Aggregate { done, .. } => *done,
            Strategy::Parallel | Strategy::OrderBy(_) => self.cursors.iter().all(|c| c.exhausted),
        }
    }

    /// The token that resumes execution from the current position, if there is more to read.
    pub fn continuation(&self) -> azure_core::Result<Option<String>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        match &self.strategy {
            Strategy::Single { continuation, .. } => Ok(continuation.clone()),
            Strategy::Aggregate { .. } => Ok(None),
            Strategy::Parallel | Strategy::OrderBy(_) => {
                let token = CompositeContinuation {
                    ranges: self.cursors.iter().map(RangeCursor::state).collect(),
                    cursor: self.next_range,
                    offset: self.offset,
                    limit: self.limit,
                    distinct: self.distinct.clone(),
                };
                Ok(Some(serde_json::to_string(&token)?))
            }
        }
    }

    pub async fn fetch_next(
        &mut self,
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
        options: &FeedOptions,
    ) -> azure_core::Result<MergedPage> {
        let mut page = MergedPage::default();
        if self.is_exhausted() {
            return Ok(page);
        }
        let items = match &mut self.strategy {
            Strategy::Single {
                continuation,
                exhausted,
            } => {
                let request = PageRequest {
                    feed,
                    query: self.query.as_ref(),
                    options,
                    partition_key_range_id: None,
                    continuation: continuation.as_deref(),
                };
                let raw = fetcher.fetch_page(&request).await?;
                page.record(&raw);
                *continuation = raw.continuation;
                *exhausted = continuation.is_none();
                return Ok(MergedPage {
                    items: raw.items,
                    ..page
                });
            }
            Strategy::Parallel => self.fetch_parallel(fetcher, feed, options, &mut page).await?,
            Strategy::OrderBy(orders) => {
                let orders = orders.clone();
                self.fetch_ordered(&orders, fetcher, feed, options, &mut page)
                    .await?
            }
            Strategy::Aggregate { aggregates, .. } => {
                let aggregates = aggregates.clone();
                let items = self
                    .fetch_aggregate(&aggregates, fetcher, feed, options, &mut page)
                    .await?;
                if let Strategy::Aggregate { done, .. } = &mut self.strategy {
                    *done = true;
                }
                items
            }
        };
        page.items = self.apply_limits(items);
        Ok(page)
    }

    /// Fetches the current page of each selected cursor concurrently, then buffers the results.
    ///
    /// A cursor whose range was split is replaced by unloaded cursors over the child ranges.
    /// Returns `true` if that happened; cursor indices past the split have moved.
    async fn load_pages(
        &mut self,
        selected: &[usize],
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
        options: &FeedOptions,
        page: &mut MergedPage,
    ) -> azure_core::Result<bool> {
        let parallelism = options.effective_parallelism(selected.len()).max(1);
        let query = self.query.as_ref();
        let requests: Vec<(usize, String, Option<String>)> = selected
            .iter()
            .map(|&i| (i, self.cursors[i].range.id.clone(), self.cursors[i].token.clone()))
            .collect();
        let results: Vec<(usize, azure_core::Result<RawPage>)> = stream::iter(requests)
            .map(|(i, range_id, token)| async move {
                let request = PageRequest {
                    feed,
                    query,
                    options,
                    partition_key_range_id: Some(&range_id),
                    continuation: token.as_deref(),
                };
                (i, fetcher.fetch_page(&request).await)
            })
            .buffered(parallelism)
            .collect()
            .await;

        let mut splits = Vec::new();
        for (i, result) in results {
            let raw = match result {
                Ok(raw) => raw,
                Err(e) if is_partition_split(&e) => {
                    splits.push((i, e));
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::debug!(
                range = %self.cursors[i].range.id,
                items = raw.items.len(),
                "fetched range page"
            );
            page.record(&raw);
            self.cursors[i].load(raw);
        }

        let split = !splits.is_empty();
        // Highest index first, so the remaining indices stay valid.
        for (i, error) in splits.into_iter().rev() {
            self.split_cursor(i, error, fetcher, feed).await?;
        }
        Ok(split)
    }

    /// Replaces the cursor at `index` with cursors over the ranges that now cover its key range.
    ///
    /// Fails with `error` if the range is still reported as a single partition.
    async fn split_cursor(
        &mut self,
        index: usize,
        error: Error,
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
    ) -> azure_core::Result<()> {
        let parent = &self.cursors[index];
        let key_range = QueryRange {
            min: parent.range.min_inclusive.clone(),
            max: parent.range.max_exclusive.clone(),
            is_min_inclusive: true,
            is_max_inclusive: false,
        };
        let children = fetcher
            .fetch_partition_key_ranges(feed, &[key_range])
            .await?;
        if children.is_empty() || children.iter().any(|c| c.id == parent.range.id) {
            return Err(error);
        }
        tracing::info!(
            range = %parent.range.id,
            children = ?children.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "partition key range split; resuming on its children"
        );

        let replacements: Vec<RangeCursor> =
            children.into_iter().map(|child| parent.inherit(child)).collect();
        let added = replacements.len() - 1;
        self.cursors.splice(index..=index, replacements);
        if self.next_range > index {
            self.next_range += added;
        }
        Ok(())
    }

    /// Fetches the next page of up to the allowed number of ranges, starting at the range after
    /// the last one served.
    async fn fetch_parallel(
        &mut self,
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
        options: &FeedOptions,
        page: &mut MergedPage,
    ) -> azure_core::Result<Vec<Value>> {
        let (selected, next_range) = loop {
            let count = self.cursors.len();
            let active = self.cursors.iter().filter(|c| !c.exhausted).count();
            let width = options.effective_parallelism(active).max(1);
            let mut selected: Vec<usize> = (0..count)
                .map(|k| (self.next_range + k) % count)
                .filter(|&i| !self.cursors[i].exhausted)
                .take(width)
                .collect();
            let next_range = selected
                .last()
                .map_or(self.next_range, |&last| (last + 1) % count);
            selected.sort_unstable();

            let to_load: Vec<usize> = selected
                .iter()
                .copied()
                .filter(|&i| self.cursors[i].needs_page())
                .collect();
            if !self.load_pages(&to_load, fetcher, feed, options, page).await? {
                break (selected, next_range);
            }
        };
        self.next_range = next_range;

        Ok(selected
            .into_iter()
            .flat_map(|i| self.cursors[i].take_all())
            .collect())
    }

    async fn fetch_ordered(
        &mut self,
        orders: &[SortOrder],
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
        options: &FeedOptions,
        page: &mut MergedPage,
    ) -> azure_core::Result<Vec<Value>> {
        let page_size = page_size(options);
        let mut items = Vec::new();
        while items.len() < page_size {
            loop {
                let pending: Vec<usize> = (0..self.cursors.len())
                    .filter(|&i| self.cursors[i].needs_page())
                    .collect();
                if pending.is_empty() {
                    break;
                }
                self.load_pages(&pending, fetcher, feed, options, page).await?;
            }

            let mut best: Option<usize> = None;
            for (i, cursor) in self.cursors.iter().enumerate() {
                let Some(head) = cursor.buffer.front().filter(|_| cursor.has_items()) else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some(b) => {
                        let current = &self.cursors[b].buffer[0];
                        ordering::compare_results(head, current, orders).is_lt()
                    }
                };
                if better {
                    best = Some(i);
                }
            }
            let Some(best) = best else {
                break;
            };
            let payload = match self.cursors[best].pop() {
                Some(Value::Object(mut result)) => result.remove("payload"),
                _ => None,
            };
            let payload = payload.ok_or_else(|| {
                Error::new(
                    ErrorKind::DataConversion,
                    "ORDER BY result is missing its 'payload'",
                )
            })?;
            items.push(payload);
        }
        Ok(items)
    }

    async fn fetch_aggregate(
        &mut self,
        aggregates: &[AggregateKind],
        fetcher: &dyn QueryFetcher,
        feed: &ResourceLink,
        options: &FeedOptions,
        page: &mut MergedPage,
    ) -> azure_core::Result<Vec<Value>> {
        let mut aggregators: Vec<Aggregator> =
            aggregates.iter().copied().map(Aggregator::new).collect();
        loop {
            let pending: Vec<usize> = (0..self.cursors.len())
                .filter(|&i| self.cursors[i].needs_page())
                .collect();
            if pending.is_empty() {
                break;
            }
            self.load_pages(&pending, fetcher, feed, options, page).await?;
            for cursor in &mut self.cursors {
                for result in cursor.take_all() {
                    let partials = aggregate::partials(&result);
                    for (aggregator, partial) in aggregators.iter_mut().zip(partials) {
                        aggregator.add(partial);
                    }
                }
            }
        }
        Ok(aggregators.first().and_then(Aggregator::result).into_iter().collect())
    }

    /// Applies DISTINCT, OFFSET and LIMIT (or TOP) across pages.
    fn apply_limits(&mut self, items: Vec<Value>) -> Vec<Value> {
        let mut output = Vec::with_capacity(items.len());
        for item in items {
            if !self.distinct.admit(self.distinct_type, &item) {
                continue;
            }
            if self.offset > 0 {
                self.offset -= 1;
                continue;
            }
            if let Some(limit) = &mut self.limit {
                if *limit == 0 {
                    break;
                }
                *limit -= 1;
            }
            output.push(item);
        }
        output
    }
}

fn page_size(options: &FeedOptions) -> usize {
    match options.max_item_count {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_PAGE_SIZE,
    }
}
