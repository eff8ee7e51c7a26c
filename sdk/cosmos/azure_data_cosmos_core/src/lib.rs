// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

#![doc = include_str!("../README.md")]
// Docs.rs build is done with the nightly compiler, so we can enable nightly features in that build.
// In this case we enable two features:
// - `doc_auto_cfg`: Automatically scans `cfg` attributes and uses them to show those required configurations in the generated documentation.
// - `doc_cfg_hide`: Ignore the `doc` configuration for `doc_auto_cfg`.
// See https://doc.rust-lang.org/rustdoc/unstable-features.html#doc_auto_cfg-automatically-generate-doccfg for more details.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg_hide))]

mod client_context;
mod connection_string;
pub mod constants;
mod error;
mod feed;
mod global_endpoint_manager;
mod location_cache;
pub mod models;
mod options;
mod partition_key;
mod partition_key_range_cache;
pub mod pipeline;
pub mod query;
mod resource_context;
mod response;
pub mod session;
pub(crate) mod utils;

#[doc(inline)]
pub use client_context::ClientContext;

pub use connection_string::*;
pub use error::{CosmosErrorExt, RequestInterrupted, ServiceError};
pub use global_endpoint_manager::{DatabaseAccountReader, GlobalEndpointManager};
pub use location_cache::{AccessKind, Location};
pub use options::*;
pub use partition_key::*;
pub use partition_key_range_cache::{PartitionKeyRangeCache, RoutingMapProvider};
pub use pipeline::{AbortController, AbortSignal, Plugin, PluginConfig, PluginOn};
pub use query::{Query, QueryIterator};
pub use resource_context::{OperationType, ResourceLink, ResourceType};
pub use response::CosmosResponse;

pub use feed::{FeedPage, FeedPager};

/// A logical sequence number (LSN) used in Cosmos DB replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(u64);

impl Lsn {
    /// Creates a new LSN from a u64 value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the inner u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A region identifier used in Cosmos DB multi-region operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u32);

impl RegionId {
    /// Creates a new RegionId from a u32 value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the inner u32 value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// The identifier of a physical partition key range, e.g. `"0"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKeyRangeId(String);

impl PartitionKeyRangeId {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKeyRangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
