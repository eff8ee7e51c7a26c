// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Identifies the resource a request targets and the operation performed on it.

use std::fmt;

use azure_core::{error::ErrorKind, http::Method, Error};
use url::Url;

use crate::utils::AppendPathSegments;

/// The kind of resource a request operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    DatabaseAccount,
    Databases,
    Containers,
    Items,
    StoredProcedures,
    Triggers,
    UserDefinedFunctions,
    Users,
    Permissions,
    PartitionKeyRanges,
    Offers,
    Conflicts,
}

impl ResourceType {
    /// The path segment naming a feed of this resource type, e.g. `docs`.
    pub fn path_segment(self) -> &'static str {
        match self {
            ResourceType::DatabaseAccount => "",
            ResourceType::Databases => "dbs",
            ResourceType::Containers => "colls",
            ResourceType::Items => "docs",
            ResourceType::StoredProcedures => "sprocs",
            ResourceType::Triggers => "triggers",
            ResourceType::UserDefinedFunctions => "udfs",
            ResourceType::Users => "users",
            ResourceType::Permissions => "permissions",
            ResourceType::PartitionKeyRanges => "pkranges",
            ResourceType::Offers => "offers",
            ResourceType::Conflicts => "conflicts",
        }
    }

    /// Parses a feed path segment back into a resource type.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Some(match segment {
            "dbs" => ResourceType::Databases,
            "colls" => ResourceType::Containers,
            "docs" => ResourceType::Items,
            "sprocs" => ResourceType::StoredProcedures,
            "triggers" => ResourceType::Triggers,
            "udfs" => ResourceType::UserDefinedFunctions,
            "users" => ResourceType::Users,
            "permissions" => ResourceType::Permissions,
            "pkranges" => ResourceType::PartitionKeyRanges,
            "offers" => ResourceType::Offers,
            "conflicts" => ResourceType::Conflicts,
            _ => return None,
        })
    }

    /// The property holding the array of results in a feed response body.
    pub fn feed_body_key(self) -> &'static str {
        match self {
            ResourceType::DatabaseAccount => "DatabaseAccounts",
            ResourceType::Databases => "Databases",
            ResourceType::Containers => "DocumentCollections",
            ResourceType::Items => "Documents",
            ResourceType::StoredProcedures => "StoredProcedures",
            ResourceType::Triggers => "Triggers",
            ResourceType::UserDefinedFunctions => "UserDefinedFunctions",
            ResourceType::Users => "Users",
            ResourceType::Permissions => "Permissions",
            ResourceType::PartitionKeyRanges => "PartitionKeyRanges",
            ResourceType::Offers => "Offers",
            ResourceType::Conflicts => "Conflicts",
        }
    }

    /// Master resources are replicated through the account's metadata path and never carry
    /// session tokens.
    pub fn is_master_resource(self) -> bool {
        !matches!(
            self,
            ResourceType::Items
                | ResourceType::StoredProcedures
                | ResourceType::Triggers
                | ResourceType::UserDefinedFunctions
                | ResourceType::Conflicts
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// The logical operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Create,
    Read,
    Replace,
    Upsert,
    Delete,
    Query,
    Execute,
}

impl OperationType {
    /// Read-only operations may be routed to any readable region and resent after I/O failures.
    pub fn is_read_only(self) -> bool {
        matches!(self, OperationType::Read | OperationType::Query)
    }

    pub fn method(self) -> Method {
        match self {
            OperationType::Create | OperationType::Upsert => Method::Post,
            OperationType::Query | OperationType::Execute => Method::Post,
            OperationType::Read => Method::Get,
            OperationType::Replace => Method::Put,
            OperationType::Delete => Method::Delete,
        }
    }
}

/// A link to a resource, or a feed of resources, within a Cosmos DB account.
///
/// Links are built top-down from [`ResourceLink::root`]:
///
/// ```rust
/// # use azure_data_cosmos_core::{ResourceLink, ResourceType};
/// let items = ResourceLink::root(ResourceType::Databases)
///     .item("db")
///     .feed(ResourceType::Containers)
///     .item("coll")
///     .feed(ResourceType::Items);
/// assert_eq!(items.path(), "dbs/db/colls/coll/docs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLink {
    parent: Option<String>,
    item_id: Option<String>,
    resource_type: ResourceType,
}

impl ResourceLink {
    /// A link to a top-level feed, e.g. `dbs`.
    pub fn root(resource_type: ResourceType) -> Self {
        Self {
            parent: None,
            item_id: None,
            resource_type,
        }
    }

    /// A link to the account itself, used to read account metadata.
    pub fn account() -> Self {
        Self::root(ResourceType::DatabaseAccount)
    }

    /// A link to a feed of child resources beneath this link.
    pub fn feed(&self, resource_type: ResourceType) -> Self {
        Self {
            parent: Some(self.path()),
            item_id: None,
            resource_type,
        }
    }

    /// A link to a single item within this feed.
    pub fn item(&self, item_id: impl Into<String>) -> Self {
        Self {
            parent: self.parent.clone(),
            item_id: Some(item_id.into()),
            resource_type: self.resource_type,
        }
    }

    /// Parses a path such as `/dbs/db/colls/coll/docs/item`.
    pub fn parse(path: &str) -> azure_core::Result<Self> {
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            return Ok(Self::account());
        }

        let invalid =
            || Error::new(ErrorKind::DataConversion, format!("invalid resource path '{path}'"));
        let mut link: Option<Self> = None;
        for pair in segments.chunks(2) {
            let resource_type = ResourceType::from_path_segment(pair[0]).ok_or_else(invalid)?;
            let feed = match &link {
                Some(parent) => parent.feed(resource_type),
                None => Self::root(resource_type),
            };
            link = Some(match pair.get(1) {
                Some(id) => feed.item(*id),
                None => feed,
            });
        }
        link.ok_or_else(invalid)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    /// Returns `true` if this link names a feed rather than a single item.
    pub fn is_feed(&self) -> bool {
        self.item_id.is_none()
    }

    /// The full relative path, without leading slash.
    pub fn path(&self) -> String {
        let mut path = String::new();
        if let Some(parent) = &self.parent {
            path.push_str(parent);
        }
        let segment = self.resource_type.path_segment();
        if !segment.is_empty() {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);
        }
        if let Some(id) = &self.item_id {
            path.push('/');
            path.push_str(id);
        }
        path
    }

    /// The link used when signing requests: the item path, or the parent path for feeds.
    pub fn resource_link(&self) -> String {
        match &self.item_id {
            Some(_) => self.path(),
            None => self.parent.clone().unwrap_or_default(),
        }
    }

    /// The container path (`dbs/{db}/colls/{coll}`) this link lives under, if any.
    ///
    /// Session tokens are scoped to this path.
    pub fn container_link(&self) -> Option<String> {
        let path = self.path();
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            ["dbs", db, "colls", coll, ..] => Some(format!("dbs/{db}/colls/{coll}")),
            _ => None,
        }
    }

    /// Builds the request URL for this link against the given endpoint.
    pub fn url(&self, endpoint: &Url) -> Url {
        let path = self.path();
        let segments = path.split('/').filter(|s| !s.is_empty());
        endpoint.with_path_segments(segments)
    }
}

impl fmt::Display for ResourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items_link() -> ResourceLink {
        ResourceLink::root(ResourceType::Databases)
            .item("db")
            .feed(ResourceType::Containers)
            .item("coll")
            .feed(ResourceType::Items)
    }

    #[test]
    fn feed_and_item_paths() {
        let items = items_link();
        assert_eq!(items.path(), "dbs/db/colls/coll/docs");
        assert_eq!(items.resource_link(), "dbs/db/colls/coll");

        let item = items.item("item1");
        assert_eq!(item.path(), "dbs/db/colls/coll/docs/item1");
        assert_eq!(item.resource_link(), "dbs/db/colls/coll/docs/item1");
        assert_eq!(item.resource_type(), ResourceType::Items);
    }

    #[test]
    fn root_feed_signs_with_empty_link() {
        let dbs = ResourceLink::root(ResourceType::Databases);
        assert_eq!(dbs.path(), "dbs");
        assert_eq!(dbs.resource_link(), "");
        assert_eq!(ResourceLink::account().path(), "");
    }

    #[test]
    fn container_link_scopes_children() {
        assert_eq!(
            items_link().item("x").container_link().as_deref(),
            Some("dbs/db/colls/coll")
        );
        assert_eq!(
            ResourceLink::root(ResourceType::Databases)
                .item("db")
                .container_link(),
            None
        );
    }

    #[test]
    fn parse_round_trips() {
        let link = ResourceLink::parse("/dbs/db/colls/coll/docs/item1/").unwrap();
        assert_eq!(link, items_link().item("item1"));
        let feed = ResourceLink::parse("dbs/db/colls").unwrap();
        assert!(feed.is_feed());
        assert_eq!(feed.resource_type(), ResourceType::Containers);
        assert!(ResourceLink::parse("dbs/db/bogus/x").is_err());
    }

    #[test]
    fn url_appends_segments() {
        let endpoint = Url::parse("https://acct.documents.azure.com/").unwrap();
        let url = items_link().item("a b").url(&endpoint);
        assert_eq!(
            url.as_str(),
            "https://acct.documents.azure.com/dbs/db/colls/coll/docs/a%20b"
        );
    }

    #[test]
    fn master_resources() {
        assert!(ResourceType::Containers.is_master_resource());
        assert!(ResourceType::PartitionKeyRanges.is_master_resource());
        assert!(!ResourceType::Items.is_master_resource());
        assert!(!ResourceType::StoredProcedures.is_master_resource());
    }
}
