// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

mod connection_policy;
mod feed_options;
mod request_options;

pub use connection_policy::*;
pub use feed_options::*;
pub use request_options::*;

use std::{collections::HashMap, fmt, sync::Arc};

use azure_core::{
    credentials::Secret,
    http::{headers::Headers, HttpClient},
};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PluginConfig, TokenProvider};

/// Options used when creating a [`ClientContext`](crate::ClientContext).
#[derive(Clone, Debug, Default)]
pub struct CosmosClientOptions {
    /// The account endpoint, e.g. `https://myaccount.documents.azure.com:443/`.
    pub endpoint: String,
    pub auth: Option<AuthOptions>,
    pub connection_policy: ConnectionPolicy,
    /// The consistency level requested for every operation unless overridden per request.
    pub consistency_level: Option<ConsistencyLevel>,
    /// Headers added to every request.
    pub default_headers: Headers,
    /// User plugins, applied in registration order.
    pub plugins: Vec<PluginConfig>,
    /// The transport. Defaults to `azure_core`'s `reqwest` transport when that feature is enabled.
    pub transport: Option<Arc<dyn HttpClient>>,
}

/// How requests are authorized.
#[derive(Clone)]
pub enum AuthOptions {
    /// Sign every request with the account's primary or secondary key.
    MasterKey(Secret),
    /// Resource tokens keyed by resource path, e.g. `dbs/db/colls/coll`.
    ///
    /// A request uses the token of the longest path that is an ancestor of (or equal to) its target.
    ResourceTokens(HashMap<String, String>),
    /// Ask a callback for the authorization header value of each request.
    TokenProvider(Arc<dyn TokenProvider>),
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOptions::MasterKey(_) => f.write_str("MasterKey"),
            AuthOptions::ResourceTokens(tokens) => f
                .debug_tuple("ResourceTokens")
                .field(&tokens.keys().collect::<Vec<_>>())
                .finish(),
            AuthOptions::TokenProvider(provider) => {
                f.debug_tuple("TokenProvider").field(provider).finish()
            }
        }
    }
}

/// Consistency levels, from strongest to weakest.
///
/// The requested level must match or be weaker than the level provisioned for the account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    #[serde(alias = "Prefix")]
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
            ConsistencyLevel::Eventual => "Eventual",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
