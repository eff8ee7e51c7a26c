// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::time::Duration;

use crate::constants;

/// Controls how the client discovers and routes to regional endpoints.
///
/// # Examples
///
/// ```rust
/// # use azure_data_cosmos_core::ConnectionPolicy;
/// let policy = ConnectionPolicy {
///     preferred_locations: vec!["West US".into(), "East US".into()],
///     ..Default::default()
/// };
/// assert!(policy.enable_endpoint_discovery);
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionPolicy {
    /// Route requests to regional endpoints discovered from account metadata. Defaults to `true`.
    ///
    /// When disabled, every request goes to the configured account endpoint.
    pub enable_endpoint_discovery: bool,

    /// Region names, in order of preference, used to pick read endpoints and, with
    /// [`use_multiple_write_locations`](Self::use_multiple_write_locations), write endpoints.
    pub preferred_locations: Vec<String>,

    /// Allow writes to any writable region when the account enables multiple write locations.
    /// Defaults to `false`.
    pub use_multiple_write_locations: bool,

    pub retry_options: RetryOptions,

    /// Time to wait for a single network attempt. Defaults to 60 seconds.
    pub request_timeout: Duration,

    /// Interval of the background topology refresh. Defaults to 5 minutes.
    pub endpoint_refresh_interval: Duration,

    /// How long an endpoint stays excluded from routing after being marked unavailable.
    /// Defaults to 5 minutes.
    pub unavailable_location_expiration: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            enable_endpoint_discovery: true,
            preferred_locations: Vec::new(),
            use_multiple_write_locations: false,
            retry_options: RetryOptions::default(),
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            endpoint_refresh_interval: constants::DEFAULT_ENDPOINT_REFRESH_INTERVAL,
            unavailable_location_expiration: constants::DEFAULT_UNAVAILABLE_LOCATION_EXPIRATION,
        }
    }
}

/// Limits applied by the built-in retry policy.
#[derive(Clone, Debug)]
pub struct RetryOptions {
    /// Maximum number of retries for a single logical operation. Defaults to 9.
    pub max_retry_attempt_count: u32,

    /// When set, throttled requests wait this long instead of the service's retry-after hint.
    pub fixed_retry_interval: Option<Duration>,

    /// Upper bound on the cumulative time spent waiting between retries. Defaults to 30 seconds.
    pub max_wait_time: Duration,

    /// Base delay between retries of network failures; doubled on each retry. Defaults to 1 second.
    pub network_retry_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempt_count: constants::DEFAULT_MAX_RETRY_ATTEMPT_COUNT,
            fixed_retry_interval: None,
            max_wait_time: constants::DEFAULT_MAX_WAIT_TIME,
            network_retry_interval: constants::DEFAULT_NETWORK_RETRY_INTERVAL,
        }
    }
}
