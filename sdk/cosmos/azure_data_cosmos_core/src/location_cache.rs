// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The account's regional topology and the endpoints currently excluded from routing.

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use arc_swap::ArcSwap;
use tokio::time::Instant;
use url::Url;

use crate::{models::DatabaseAccount, utils, ConnectionPolicy};

/// Whether an endpoint is used for reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

/// A region of the account and its regional endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    pub endpoint: Url,
}

#[derive(Debug, Default)]
pub(crate) struct TopologySnapshot {
    pub writable_locations: Vec<Location>,
    pub readable_locations: Vec<Location>,
    pub enable_multiple_writable_locations: bool,
    pub last_refreshed_at: Option<Instant>,
}

impl TopologySnapshot {
    fn from_account(account: &DatabaseAccount) -> Self {
        let locations = |regions: &[crate::models::AccountRegion]| {
            regions
                .iter()
                .map(|r| Location {
                    name: r.name.clone(),
                    endpoint: r.database_account_endpoint.clone(),
                })
                .collect()
        };
        Self {
            writable_locations: locations(&account.writable_locations),
            readable_locations: locations(&account.readable_locations),
            enable_multiple_writable_locations: account.enable_multiple_write_locations,
            last_refreshed_at: Some(Instant::now()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LocationCache {
    default_endpoint: Url,
    preferred_locations: Vec<String>,
    use_multiple_write_locations: bool,
    unavailable_expiration: Duration,
    snapshot: ArcSwap<TopologySnapshot>,
    unavailable: Mutex<HashMap<(Url, AccessKind), Instant>>,
}

impl LocationCache {
    pub fn new(default_endpoint: Url, policy: &ConnectionPolicy) -> Self {
        Self {
            default_endpoint,
            preferred_locations: policy.preferred_locations.clone(),
            use_multiple_write_locations: policy.use_multiple_write_locations,
            unavailable_expiration: policy.unavailable_location_expiration,
            snapshot: ArcSwap::from_pointee(TopologySnapshot::default()),
            unavailable: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_endpoint(&self) -> &Url {
        &self.default_endpoint
    }

    pub fn preferred_locations(&self) -> &[String] {
        &self.preferred_locations
    }

    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.snapshot.load_full()
    }

    /// Replaces the topology with the one described by `account`.
    pub fn update(&self, account: &DatabaseAccount) {
        let snapshot = TopologySnapshot::from_account(account);
        tracing::debug!(
            writable = ?snapshot.writable_locations.iter().map(|l| &l.name).collect::<Vec<_>>(),
            readable = ?snapshot.readable_locations.iter().map(|l| &l.name).collect::<Vec<_>>(),
            multiple_write_locations = snapshot.enable_multiple_writable_locations,
            "updated account topology"
        );
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Returns `true` if both the client and the account allow writes to any region.
    pub fn multiple_write_locations_enabled(&self) -> bool {
        self.use_multiple_write_locations && self.snapshot.load().enable_multiple_writable_locations
    }

    pub fn mark_unavailable(&self, endpoint: &Url, kind: AccessKind) {
        tracing::debug!(%endpoint, ?kind, "marking endpoint unavailable");
        utils::lock(&self.unavailable).insert((endpoint.clone(), kind), Instant::now());
    }

    /// Returns `true` if `endpoint` was marked unavailable for `kind` within the expiration window.
    ///
    /// Expired entries are evicted.
    pub fn is_unavailable(&self, endpoint: &Url, kind: AccessKind) -> bool {
        let mut unavailable = utils::lock(&self.unavailable);
        let key = (endpoint.clone(), kind);
        match unavailable.get(&key) {
            Some(marked_at) if marked_at.elapsed() < self.unavailable_expiration => true,
            Some(_) => {
                unavailable.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Orders `locations` by the preferred location list, ignoring locations that aren't preferred.
    fn preferred_order(&self, locations: &[Location]) -> Vec<Url> {
        self.preferred_locations
            .iter()
            .filter_map(|preferred| {
                locations
                    .iter()
                    .find(|l| l.name.eq_ignore_ascii_case(preferred))
                    .map(|l| l.endpoint.clone())
            })
            .collect()
    }

    /// Available candidates first, then unavailable ones, then the default endpoint if nothing matched.
    fn order_candidates(&self, candidates: Vec<Url>, kind: AccessKind) -> Vec<Url> {
        if candidates.is_empty() {
            return vec![self.default_endpoint.clone()];
        }
        let (available, unavailable): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|endpoint| !self.is_unavailable(endpoint, kind));
        available.into_iter().chain(unavailable).collect()
    }

    /// The ordered candidate endpoints for reads.
    pub fn read_endpoints(&self) -> Vec<Url> {
        let snapshot = self.snapshot.load();
        let mut candidates = self.preferred_order(&snapshot.readable_locations);
        if candidates.is_empty() {
            candidates = snapshot
                .readable_locations
                .iter()
                .map(|l| l.endpoint.clone())
                .collect();
        }
        self.order_candidates(candidates, AccessKind::Read)
    }

    /// The ordered candidate endpoints for writes.
    ///
    /// Writable regions are used in the account's order unless `use_preferred_order` is set and
    /// multiple write locations are enabled, in which case the preferred order applies.
    pub fn write_endpoints(&self, use_preferred_order: bool) -> Vec<Url> {
        let snapshot = self.snapshot.load();
        let mut candidates = Vec::new();
        if use_preferred_order && self.multiple_write_locations_enabled() {
            candidates = self.preferred_order(&snapshot.writable_locations);
        }
        if candidates.is_empty() {
            candidates = snapshot
                .writable_locations
                .iter()
                .map(|l| l.endpoint.clone())
                .collect();
        }
        self.order_candidates(candidates, AccessKind::Write)
    }

    fn first_available(&self, candidates: Vec<Url>, kind: AccessKind) -> Url {
        candidates
            .into_iter()
            .find(|endpoint| !self.is_unavailable(endpoint, kind))
            .unwrap_or_else(|| self.default_endpoint.clone())
    }

    /// The first read candidate not marked unavailable, or the default endpoint.
    pub fn resolve_read(&self) -> Url {
        self.first_available(self.read_endpoints(), AccessKind::Read)
    }

    /// The first write candidate not marked unavailable, or the default endpoint.
    pub fn resolve_write(&self, use_preferred_order: bool) -> Url {
        self.first_available(self.write_endpoints(use_preferred_order), AccessKind::Write)
    }

    /// The region name serving `endpoint`, if known.
    pub fn location_name(&self, endpoint: &Url) -> Option<String> {
        let snapshot = self.snapshot.load();
        snapshot
            .readable_locations
            .iter()
            .chain(snapshot.writable_locations.iter())
            .find(|l| &l.endpoint == endpoint)
            .map(|l| l.name.clone())
    }
}
