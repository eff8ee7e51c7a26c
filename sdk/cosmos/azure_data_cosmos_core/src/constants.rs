// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Header names, sub-status codes and defaults used on the wire.

use std::time::Duration;

use azure_core::http::headers::HeaderName;

pub const AUTHORIZATION: HeaderName = HeaderName::from_static("authorization");
pub const CONTENT_TYPE: HeaderName = HeaderName::from_static("content-type");
pub const ACCEPT: HeaderName = HeaderName::from_static("accept");
pub const USER_AGENT: HeaderName = HeaderName::from_static("user-agent");
pub const IF_MATCH: HeaderName = HeaderName::from_static("if-match");
pub const IF_NONE_MATCH: HeaderName = HeaderName::from_static("if-none-match");
pub const ETAG: HeaderName = HeaderName::from_static("etag");

pub const MS_DATE: HeaderName = HeaderName::from_static("x-ms-date");
pub const VERSION: HeaderName = HeaderName::from_static("x-ms-version");
pub const ACTIVITY_ID: HeaderName = HeaderName::from_static("x-ms-activity-id");
pub const REQUEST_CHARGE: HeaderName = HeaderName::from_static("x-ms-request-charge");
pub const SESSION_TOKEN: HeaderName = HeaderName::from_static("x-ms-session-token");
pub const CONSISTENCY_LEVEL: HeaderName = HeaderName::from_static("x-ms-consistency-level");
pub const CONTINUATION: HeaderName = HeaderName::from_static("x-ms-continuation");
pub const MAX_ITEM_COUNT: HeaderName = HeaderName::from_static("x-ms-max-item-count");
pub const RETRY_AFTER_MS: HeaderName = HeaderName::from_static("x-ms-retry-after-ms");
pub const SUB_STATUS: HeaderName = HeaderName::from_static("x-ms-substatus");
pub const ITEM_COUNT: HeaderName = HeaderName::from_static("x-ms-item-count");

pub const QUERY: HeaderName = HeaderName::from_static("x-ms-documentdb-isquery");
pub const ENABLE_CROSS_PARTITION_QUERY: HeaderName =
    HeaderName::from_static("x-ms-documentdb-query-enablecrosspartition");
pub const PARALLELIZE_CROSS_PARTITION_QUERY: HeaderName =
    HeaderName::from_static("x-ms-documentdb-query-parallelizecrosspartitionquery");
pub const ENABLE_SCAN_IN_QUERY: HeaderName =
    HeaderName::from_static("x-ms-documentdb-query-enable-scan");
pub const POPULATE_QUERY_METRICS: HeaderName =
    HeaderName::from_static("x-ms-documentdb-populatequerymetrics");
pub const IS_QUERY_PLAN: HeaderName =
    HeaderName::from_static("x-ms-cosmos-is-query-plan-request");
pub const SUPPORTED_QUERY_FEATURES: HeaderName =
    HeaderName::from_static("x-ms-cosmos-supported-query-features");
pub const QUERY_VERSION: HeaderName = HeaderName::from_static("x-ms-cosmos-query-version");
pub const PARTITION_KEY: HeaderName = HeaderName::from_static("x-ms-documentdb-partitionkey");
pub const PARTITION_KEY_RANGE_ID: HeaderName =
    HeaderName::from_static("x-ms-documentdb-partitionkeyrangeid");
pub const IS_UPSERT: HeaderName = HeaderName::from_static("x-ms-documentdb-is-upsert");
pub const PRE_TRIGGER_INCLUDE: HeaderName =
    HeaderName::from_static("x-ms-documentdb-pre-trigger-include");
pub const POST_TRIGGER_INCLUDE: HeaderName =
    HeaderName::from_static("x-ms-documentdb-post-trigger-include");
pub const INDEXING_DIRECTIVE: HeaderName = HeaderName::from_static("x-ms-indexing-directive");
pub const OFFER_THROUGHPUT: HeaderName = HeaderName::from_static("x-ms-offer-throughput");
pub const OFFER_TYPE: HeaderName = HeaderName::from_static("x-ms-offer-type");
pub const POPULATE_QUOTA_INFO: HeaderName =
    HeaderName::from_static("x-ms-documentdb-populatequotainfo");
pub const ENABLE_SCRIPT_LOGGING: HeaderName =
    HeaderName::from_static("x-ms-documentdb-script-enable-logging");
pub const RESOURCE_TOKEN_EXPIRY: HeaderName =
    HeaderName::from_static("x-ms-documentdb-expiry-seconds");
pub const DISABLE_RU_PER_MINUTE_USAGE: HeaderName =
    HeaderName::from_static("x-ms-documentdb-disable-ru-per-minute-usage");

/// The REST API version this client speaks.
pub const API_VERSION: &str = "2018-12-31";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const QUERY_CONTENT_TYPE: &str = "application/query+json";

/// Query features the client can execute itself when merging cross-partition results.
pub const SUPPORTED_QUERY_FEATURES_VALUE: &str = "Aggregate, CompositeAggregate, MultipleOrderBy, OffsetAndLimit, OrderBy, Top";

/// Sub-status: the session token could not be satisfied by the replica that served the read.
pub const SUB_STATUS_READ_SESSION_NOT_AVAILABLE: u32 = 1002;
/// Sub-status: the partition key range was split or merged and no longer exists.
pub const SUB_STATUS_PARTITION_KEY_RANGE_GONE: u32 = 1002;
/// Sub-status: the partition key range is being split.
pub const SUB_STATUS_COMPLETING_SPLIT: u32 = 1007;
/// Sub-status: writes are not accepted by this region.
pub const SUB_STATUS_WRITE_FORBIDDEN: u32 = 3;
/// Sub-status: the account could not be found in this region.
pub const SUB_STATUS_DATABASE_ACCOUNT_NOT_FOUND: u32 = 1008;

/// How long an endpoint marked unavailable stays excluded from routing.
pub const DEFAULT_UNAVAILABLE_LOCATION_EXPIRATION: Duration = Duration::from_secs(5 * 60);
/// Interval of the background topology refresh.
pub const DEFAULT_ENDPOINT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Wait used for a throttled request when the service sent no retry-after hint.
pub const DEFAULT_THROTTLE_RETRY_AFTER: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRY_ATTEMPT_COUNT: u32 = 9;
pub const DEFAULT_MAX_WAIT_TIME: Duration = Duration::from_secs(30);
pub const DEFAULT_NETWORK_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
