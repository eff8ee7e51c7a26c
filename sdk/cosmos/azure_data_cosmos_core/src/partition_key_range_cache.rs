// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Per-container routing information: the partition key definition and the partition key ranges.

use std::{collections::HashMap, collections::HashSet, sync::Arc, sync::RwLock};

use async_trait::async_trait;

use crate::{
    models::{ContainerProperties, PartitionKeyRange, QueryRange},
    resource_context::ResourceLink,
    utils, PartitionKeyDefinition,
};

/// Reads the routing information of a container from the service.
#[async_trait]
pub trait RoutingMapProvider: Send + Sync {
    async fn read_container(&self, container: &ResourceLink) -> azure_core::Result<ContainerProperties>;

    /// Reads every partition key range of the container, following continuations.
    async fn read_partition_key_ranges(
        &self,
        container: &ResourceLink,
    ) -> azure_core::Result<Vec<PartitionKeyRange>>;
}

#[derive(Debug, Default)]
struct CacheEntry {
    container: Option<Arc<ContainerProperties>>,
    ranges: Option<Arc<[PartitionKeyRange]>>,
}

/// Caches container routing information per container path (`dbs/{db}/colls/{coll}`).
///
/// Entries are replaced whole, never mutated in place.
#[derive(Debug, Default)]
pub struct PartitionKeyRangeCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

/// Drops ranges that other ranges were split from, then orders the rest by their minimum key.
fn normalize(ranges: Vec<PartitionKeyRange>) -> Vec<PartitionKeyRange> {
    let parents: HashSet<&str> = ranges
        .iter()
        .flat_map(|r| r.parents.iter().map(String::as_str))
        .collect();
    let mut current: Vec<PartitionKeyRange> = ranges
        .iter()
        .filter(|r| !parents.contains(r.id.as_str()))
        .cloned()
        .collect();
    current.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
    current
}

impl PartitionKeyRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Option<Arc<CacheEntry>> {
        utils::read(&self.entries).get(key).cloned()
    }

    fn store(&self, key: &str, update: impl FnOnce(&CacheEntry) -> CacheEntry) {
        let mut entries = utils::write(&self.entries);
        let current = entries.get(key).cloned().unwrap_or_default();
        entries.insert(key.to_owned(), Arc::new(update(&*current)));
    }

    /// The container's properties, read through `provider` on a miss.
    pub async fn container_properties(
        &self,
        container: &ResourceLink,
        provider: &dyn RoutingMapProvider,
    ) -> azure_core::Result<Arc<ContainerProperties>> {
        let key = container.path();
        if let Some(properties) = self.entry(&key).and_then(|e| e.container.clone()) {
            return Ok(properties);
        }
        let properties = Arc::new(provider.read_container(container).await?);
        self.store(&key, |current| CacheEntry {
            container: Some(properties.clone()),
            ranges: current.ranges.clone(),
        });
        Ok(properties)
    }

    /// The container's partition key definition, or `None` for containers without one.
    pub async fn partition_key_definition(
        &self,
        container: &ResourceLink,
        provider: &dyn RoutingMapProvider,
    ) -> azure_core::Result<Option<PartitionKeyDefinition>> {
        Ok(self
            .container_properties(container, provider)
            .await?
            .partition_key
            .clone())
    }

    /// The container's current partition key ranges, ordered by minimum key.
    pub async fn partition_key_ranges(
        &self,
        container: &ResourceLink,
        provider: &dyn RoutingMapProvider,
    ) -> azure_core::Result<Arc<[PartitionKeyRange]>> {
        let key = container.path();
        if let Some(ranges) = self.entry(&key).and_then(|e| e.ranges.clone()) {
            return Ok(ranges);
        }
        let fetched = provider.read_partition_key_ranges(container).await?;
        let ranges: Arc<[PartitionKeyRange]> = normalize(fetched).into();
        tracing::debug!(container = %key, count = ranges.len(), "cached partition key ranges");
        self.store(&key, |current| CacheEntry {
            container: current.container.clone(),
            ranges: Some(ranges.clone()),
        });
        Ok(ranges)
    }

    /// The ranges overlapping any of `query_ranges`; every range when `query_ranges` is empty.
    pub async fn overlapping_ranges(
        &self,
        container: &ResourceLink,
        query_ranges: &[QueryRange],
        provider: &dyn RoutingMapProvider,
    ) -> azure_core::Result<Vec<PartitionKeyRange>> {
        let ranges = self.partition_key_ranges(container, provider).await?;
        Ok(ranges
            .iter()
            .filter(|range| {
                query_ranges.is_empty() || query_ranges.iter().any(|q| q.overlaps(range))
            })
            .cloned()
            .collect())
    }

    /// Forgets the cached routing information for a container path.
    pub fn invalidate(&self, container_path: &str) {
        tracing::debug!(container = container_path, "invalidating partition key ranges");
        utils::write(&self.entries).remove(container_path);
    }

    pub fn clear(&self) {
        utils::write(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_context::ResourceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn range(id: &str, min: &str, max: &str, parents: &[&str]) -> PartitionKeyRange {
        PartitionKeyRange {
            id: id.into(),
            min_inclusive: min.into(),
            max_exclusive: max.into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[derive(Default)]
    struct Provider {
        range_reads: AtomicUsize,
    }

    #[async_trait]
    impl RoutingMapProvider for Provider {
        async fn read_container(&self, _: &ResourceLink) -> azure_core::Result<ContainerProperties> {
            Ok(ContainerProperties {
                id: "coll".into(),
                partition_key: Some(PartitionKeyDefinition {
                    paths: vec!["/pk".into()],
                    ..Default::default()
                }),
                ..Default::default()
            })
        }

        async fn read_partition_key_ranges(
            &self,
            _: &ResourceLink,
        ) -> azure_core::Result<Vec<PartitionKeyRange>> {
            self.range_reads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                range("2", "80", "FF", &["0"]),
                range("0", "", "FF", &[]),
                range("1", "", "80", &["0"]),
            ])
        }
    }

    fn container() -> ResourceLink {
        ResourceLink::root(ResourceType::Databases)
            .item("db")
            .feed(ResourceType::Containers)
            .item("coll")
    }

    #[tokio::test]
    async fn split_parents_are_dropped_and_ranges_sorted() {
        let cache = PartitionKeyRangeCache::new();
        let provider = Provider::default();
        let ranges = cache.partition_key_ranges(&container(), &provider).await.unwrap();
        let ids: Vec<_> = ranges.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn ranges_are_cached_until_invalidated() {
        let cache = PartitionKeyRangeCache::new();
        let provider = Provider::default();
        cache.partition_key_ranges(&container(), &provider).await.unwrap();
        cache.partition_key_ranges(&container(), &provider).await.unwrap();
        assert_eq!(provider.range_reads.load(Ordering::SeqCst), 1);

        cache.invalidate("dbs/db/colls/coll");
        cache.partition_key_ranges(&container(), &provider).await.unwrap();
        assert_eq!(provider.range_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_ranges_filter_partitions() {
        let cache = PartitionKeyRangeCache::new();
        let provider = Provider::default();
        let query_range = QueryRange {
            min: "90".into(),
            max: "A0".into(),
            is_min_inclusive: true,
            is_max_inclusive: false,
        };
        let ranges = cache
            .overlapping_ranges(&container(), &[query_range], &provider)
            .await
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].id, "2");

        let all = cache.overlapping_ranges(&container(), &[], &provider).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn definition_survives_range_refresh() {
        let cache = PartitionKeyRangeCache::new();
        let provider = Provider::default();
        let definition = cache
            .partition_key_definition(&container(), &provider)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(definition.paths, vec!["/pk"]);
        cache.partition_key_ranges(&container(), &provider).await.unwrap();
        assert!(cache.entry("dbs/db/colls/coll").unwrap().container.is_some());
    }
}
