// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Picks the regional endpoint for each request and keeps the account topology fresh.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use azure_core::{error::ErrorKind, Error};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use url::Url;

use crate::{
    location_cache::{AccessKind, LocationCache},
    models::DatabaseAccount,
    resource_context::{OperationType, ResourceType},
    utils, ConnectionPolicy,
};

/// Reads account metadata from a specific endpoint.
#[async_trait]
pub trait DatabaseAccountReader: Send + Sync + Debug {
    async fn read_database_account(&self, endpoint: &Url) -> azure_core::Result<DatabaseAccount>;
}

type RefreshFuture = Shared<BoxFuture<'static, Result<(), Arc<Error>>>>;

/// Routes requests to regional endpoints.
///
/// Cloning is cheap; clones share the topology, the unavailability map and the refresh task.
#[derive(Clone, Debug)]
pub struct GlobalEndpointManager {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<LocationCache>,
    reader: Arc<dyn DatabaseAccountReader>,
    enable_endpoint_discovery: bool,
    initialized: AtomicBool,
    refresh: Mutex<Option<RefreshFuture>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalEndpointManager")
            .field("cache", &self.cache)
            .field("enable_endpoint_discovery", &self.enable_endpoint_discovery)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = utils::lock(&self.background).take() {
            handle.abort();
        }
    }
}

/// The account's endpoint in a given region: `https://{account}-{region}.{rest}`.
pub(crate) fn locational_endpoint(default_endpoint: &Url, location: &str) -> Option<Url> {
    let host = default_endpoint.host_str()?;
    let (account, rest) = host.split_once('.')?;
    let region: String = location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let mut endpoint = default_endpoint.clone();
    endpoint
        .set_host(Some(&format!("{account}-{region}.{rest}")))
        .ok()?;
    Some(endpoint)
}

async fn refresh_topology(
    cache: Arc<LocationCache>,
    reader: Arc<dyn DatabaseAccountReader>,
) -> azure_core::Result<()> {
    let default_endpoint = cache.default_endpoint().clone();
    let candidates = std::iter::once(default_endpoint.clone()).chain(
        cache
            .preferred_locations()
            .iter()
            .filter_map(|location| locational_endpoint(&default_endpoint, location)),
    );

    let mut last_error = None;
    for endpoint in candidates {
        match reader.read_database_account(&endpoint).await {
            Ok(account) => {
                cache.update(&account);
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%endpoint, error = %e, "failed to read account metadata");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        Error::new(ErrorKind::Other, "no endpoint to read account metadata from")
    }))
}

impl GlobalEndpointManager {
    /// Creates an endpoint manager and, when discovery is enabled and a Tokio runtime is
    /// available, starts the background topology refresh.
    pub fn new(
        default_endpoint: Url,
        policy: &ConnectionPolicy,
        reader: Arc<dyn DatabaseAccountReader>,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(Inner {
                cache: Arc::new(LocationCache::new(default_endpoint, policy)),
                reader,
                enable_endpoint_discovery: policy.enable_endpoint_discovery,
                initialized: AtomicBool::new(false),
                refresh: Mutex::new(None),
                background: Mutex::new(None),
            }),
        };
        if policy.enable_endpoint_discovery {
            manager.start_background_refresh(policy.endpoint_refresh_interval);
        }
        manager
    }

    fn start_background_refresh(&self, interval: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no Tokio runtime; background endpoint refresh disabled");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = GlobalEndpointManager { inner };
                if let Err(e) = manager.refresh_endpoint_list().await {
                    tracing::warn!(error = %e, "background endpoint refresh failed");
                }
            }
        });
        *utils::lock(&self.inner.background) = Some(handle);
    }

    pub fn default_endpoint(&self) -> &Url {
        self.inner.cache.default_endpoint()
    }

    pub fn enable_endpoint_discovery(&self) -> bool {
        self.inner.enable_endpoint_discovery
    }

    /// Reads account metadata and replaces the topology.
    ///
    /// Concurrent callers share a single in-flight refresh.
    pub async fn refresh_endpoint_list(&self) -> azure_core::Result<()> {
        let refresh = {
            let mut slot = utils::lock(&self.inner.refresh);
            match &*slot {
                Some(refresh) => refresh.clone(),
                None => {
                    let cache = self.inner.cache.clone();
                    let reader = self.inner.reader.clone();
                    let weak = Arc::downgrade(&self.inner);
                    let refresh = async move {
                        let result = refresh_topology(cache, reader).await;
                        if let Some(inner) = weak.upgrade() {
                            *utils::lock(&inner.refresh) = None;
                            if result.is_ok() {
                                inner.initialized.store(true, Ordering::Release);
                            }
                        }
                        result.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await.map_err(|e| Error::new(ErrorKind::Other, e))
    }

    /// Loads the topology on first use. Failures are logged and retried on the next call.
    async fn ensure_initialized(&self) {
        if !self.inner.enable_endpoint_discovery
            || self.inner.initialized.load(Ordering::Acquire)
        {
            return;
        }
        if let Err(e) = self.refresh_endpoint_list().await {
            tracing::warn!(
                error = %e,
                "failed to initialize account topology; using the default endpoint"
            );
        }
    }

    pub async fn get_write_endpoint(&self) -> Url {
        if !self.inner.enable_endpoint_discovery {
            return self.default_endpoint().clone();
        }
        self.ensure_initialized().await;
        self.inner.cache.resolve_write(true)
    }

    pub async fn get_read_endpoint(&self) -> Url {
        if !self.inner.enable_endpoint_discovery {
            return self.default_endpoint().clone();
        }
        self.ensure_initialized().await;
        self.inner.cache.resolve_read()
    }

    /// The ordered candidate endpoints for writes, available ones first.
    pub async fn get_write_endpoints(&self) -> Vec<Url> {
        if !self.inner.enable_endpoint_discovery {
            return vec![self.default_endpoint().clone()];
        }
        self.ensure_initialized().await;
        self.inner.cache.write_endpoints(true)
    }

    /// The ordered candidate endpoints for reads, available ones first.
    pub async fn get_read_endpoints(&self) -> Vec<Url> {
        if !self.inner.enable_endpoint_discovery {
            return vec![self.default_endpoint().clone()];
        }
        self.ensure_initialized().await;
        self.inner.cache.read_endpoints()
    }

    pub fn mark_endpoint_unavailable_for_read(&self, endpoint: &Url) {
        self.inner.cache.mark_unavailable(endpoint, AccessKind::Read);
    }

    pub fn mark_endpoint_unavailable_for_write(&self, endpoint: &Url) {
        self.inner.cache.mark_unavailable(endpoint, AccessKind::Write);
    }

    /// Returns `true` if a write of this kind may go to any writable region.
    pub fn can_use_multiple_write_locations(
        &self,
        resource_type: ResourceType,
        operation_type: OperationType,
    ) -> bool {
        self.inner.cache.multiple_write_locations_enabled()
            && (resource_type == ResourceType::Items
                || (resource_type == ResourceType::StoredProcedures
                    && operation_type == OperationType::Execute))
    }

    /// Picks the endpoint for an operation.
    pub async fn resolve_service_endpoint(
        &self,
        resource_type: ResourceType,
        operation_type: OperationType,
    ) -> Url {
        if !self.inner.enable_endpoint_discovery {
            return self.default_endpoint().clone();
        }
        self.ensure_initialized().await;
        let endpoint = if operation_type.is_read_only() {
            self.inner.cache.resolve_read()
        } else {
            let use_preferred_order =
                self.can_use_multiple_write_locations(resource_type, operation_type);
            self.inner.cache.resolve_write(use_preferred_order)
        };
        tracing::debug!(
            %endpoint,
            region = self.inner.cache.location_name(&endpoint).as_deref(),
            ?resource_type,
            ?operation_type,
            "resolved service endpoint"
        );
        endpoint
    }

    /// Picks a read endpoint other than `exclude`, if the topology has one.
    pub(crate) async fn alternate_read_endpoint(&self, exclude: &Url) -> Option<Url> {
        self.get_read_endpoints()
            .await
            .into_iter()
            .chain(self.inner.cache.write_endpoints(false))
            .find(|endpoint| endpoint != exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::AccountRegion, CosmosErrorExt, ServiceError};
    use azure_core::http::{headers::Headers, StatusCode};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct StaticReader {
        account: DatabaseAccount,
        fail: AtomicBool,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl StaticReader {
        fn new(account: DatabaseAccount) -> Self {
            Self {
                account,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl DatabaseAccountReader for StaticReader {
        async fn read_database_account(&self, _endpoint: &Url) -> azure_core::Result<DatabaseAccount> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(
                    ServiceError::new(StatusCode::ServiceUnavailable, Headers::new(), b"")
                        .into_error(),
                );
            }
            Ok(self.account.clone())
        }
    }

    fn region(name: &str) -> AccountRegion {
        let host = name.to_lowercase().replace(' ', "");
        AccountRegion {
            name: name.to_owned(),
            database_account_endpoint: Url::parse(&format!(
                "https://acct-{host}.documents.azure.com/"
            ))
            .unwrap(),
        }
    }

    fn account() -> DatabaseAccount {
        DatabaseAccount {
            writable_locations: vec![region("East US")],
            readable_locations: vec![region("West US"), region("East US")],
            ..Default::default()
        }
    }

    fn policy(preferred: &[&str]) -> ConnectionPolicy {
        ConnectionPolicy {
            preferred_locations: preferred.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn default_endpoint() -> Url {
        Url::parse("https://acct.documents.azure.com/").unwrap()
    }

    #[test]
    fn locational_endpoints_embed_region() {
        assert_eq!(
            locational_endpoint(&default_endpoint(), "West US 2")
                .unwrap()
                .as_str(),
            "https://acct-westus2.documents.azure.com/"
        );
    }

    #[tokio::test]
    async fn preferred_locations_route_reads_and_writes() {
        let reader = Arc::new(StaticReader::new(account()));
        let manager =
            GlobalEndpointManager::new(default_endpoint(), &policy(&["West US", "East US"]), reader);

        assert_eq!(manager.get_write_endpoint().await, region("East US").database_account_endpoint);
        assert_eq!(manager.get_read_endpoint().await, region("West US").database_account_endpoint);
        assert_eq!(
            manager
                .resolve_service_endpoint(ResourceType::Items, OperationType::Create)
                .await,
            region("East US").database_account_endpoint
        );
    }

    #[tokio::test]
    async fn discovery_disabled_uses_default_endpoint() {
        let reader = Arc::new(StaticReader::new(account()));
        let policy = ConnectionPolicy {
            enable_endpoint_discovery: false,
            ..policy(&["West US"])
        };
        let manager = GlobalEndpointManager::new(default_endpoint(), &policy, reader.clone());

        assert_eq!(manager.get_read_endpoint().await, default_endpoint());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_initialization_falls_back_and_retries() {
        let reader = Arc::new(StaticReader::new(account()));
        reader.fail.store(true, Ordering::SeqCst);
        let manager =
            GlobalEndpointManager::new(default_endpoint(), &policy(&["West US"]), reader.clone());

        assert_eq!(manager.get_read_endpoint().await, default_endpoint());

        reader.fail.store(false, Ordering::SeqCst);
        assert_eq!(manager.get_read_endpoint().await, region("West US").database_account_endpoint);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_request() {
        let mut reader = StaticReader::new(account());
        reader.delay = Duration::from_millis(100);
        let reader = Arc::new(reader);
        let manager = GlobalEndpointManager::new(default_endpoint(), &policy(&[]), reader.clone());

        let (a, b, c) = tokio::join!(
            manager.refresh_endpoint_list(),
            manager.refresh_endpoint_list(),
            manager.refresh_endpoint_list()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_refresh_failure_reaches_every_caller() {
        let mut reader = StaticReader::new(account());
        reader.delay = Duration::from_millis(100);
        reader.fail.store(true, Ordering::SeqCst);
        let reader = Arc::new(reader);
        let policy = ConnectionPolicy {
            enable_endpoint_discovery: false,
            ..policy(&[])
        };
        let manager = GlobalEndpointManager::new(default_endpoint(), &policy, reader.clone());

        let (a, b) = tokio::join!(
            manager.refresh_endpoint_list(),
            manager.refresh_endpoint_list()
        );
        for result in [a, b] {
            assert_eq!(
                result.unwrap_err().status(),
                Some(StatusCode::ServiceUnavailable)
            );
        }
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_runs_on_interval() {
        let reader = Arc::new(StaticReader::new(account()));
        let policy = ConnectionPolicy {
            endpoint_refresh_interval: Duration::from_secs(60),
            ..policy(&[])
        };
        let manager = GlobalEndpointManager::new(default_endpoint(), &policy, reader.clone());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);

        drop(manager);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_write_endpoint_is_skipped() {
        let reader = Arc::new(StaticReader::new(DatabaseAccount {
            writable_locations: vec![region("East US"), region("West US")],
            readable_locations: vec![region("East US"), region("West US")],
            ..Default::default()
        }));
        let manager = GlobalEndpointManager::new(default_endpoint(), &policy(&[]), reader);

        let first = manager.get_write_endpoint().await;
        manager.mark_endpoint_unavailable_for_write(&first);
        assert_eq!(manager.get_write_endpoint().await, region("West US").database_account_endpoint);
        assert_eq!(manager.get_read_endpoint().await, first);
    }
}
