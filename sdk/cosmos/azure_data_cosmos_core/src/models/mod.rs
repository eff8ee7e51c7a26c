// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Model types sent to and received from the service.

mod query_plan;

pub use query_plan::*;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConsistencyLevel, PartitionKeyDefinition};

/// Common system properties returned for most Cosmos DB resources.
#[derive(Clone, Default, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SystemProperties {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "_etag")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "_self")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "_rid")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "_ts")]
    pub last_modified: Option<u64>,
}

/// A region of the account and its regional endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountRegion {
    pub name: String,
    pub database_account_endpoint: Url,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyPolicy {
    pub default_consistency_level: ConsistencyLevel,
}

/// Account metadata, read from the root of the account endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub writable_locations: Vec<AccountRegion>,
    #[serde(default)]
    pub readable_locations: Vec<AccountRegion>,
    #[serde(default)]
    pub enable_multiple_write_locations: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_consistency_policy: Option<ConsistencyPolicy>,
    #[serde(flatten)]
    pub system_properties: SystemProperties,
}

impl DatabaseAccount {
    pub fn consistency_level(&self) -> Option<ConsistencyLevel> {
        self.user_consistency_policy
            .as_ref()
            .map(|p| p.default_consistency_level)
    }
}

/// A contiguous range of effective partition keys served by one physical partition.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
    /// Ids of the ranges this range was split from.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    /// Returns `true` if this range overlaps the half-open range `[min, max)`.
    pub fn overlaps(&self, min: &str, max: &str) -> bool {
        self.min_inclusive.as_str() < max && min < self.max_exclusive.as_str()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct PartitionKeyRanges {
    #[serde(rename = "PartitionKeyRanges")]
    pub ranges: Vec<PartitionKeyRange>,
}

/// The properties of a container that routing depends on.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKeyDefinition>,
    #[serde(flatten)]
    pub system_properties: SystemProperties,
}
