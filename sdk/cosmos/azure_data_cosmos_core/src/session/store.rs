// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The per-client session token store.

use std::{collections::HashMap, sync::RwLock};

use super::{container, ContainerSession, SessionTokenError};
use azure_core::http::headers::Headers;

use crate::{
    constants,
    pipeline::RequestContext,
    resource_context::ResourceLink,
    utils, ConsistencyLevel, PartitionKeyRangeId,
};

/// The strongest session token observed for each session scope (a container path such as
/// `dbs/db/colls/coll`).
#[derive(Debug, Default)]
pub struct SessionStore {
    container_sessions: RwLock<HashMap<String, ContainerSession>>,
}

/// `scope` followed by each of its ancestors: `dbs/a/colls/b`, `dbs/a/colls`, `dbs/a`, `dbs`.
fn scope_and_ancestors(scope: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(scope);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.rsplit_once('/').map(|(parent, _)| parent);
        Some(current)
    })
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a container session token into the store.
    pub fn set_session_token(&self, scope: &str, token: &str) -> Result<(), SessionTokenError> {
        {
            let container_sessions = utils::read(&self.container_sessions);
            if let Some(container_session) = container_sessions.get(scope) {
                return container_session.merge_session_token(token);
            }
        }

        let mut container_sessions = utils::write(&self.container_sessions);
        use std::collections::hash_map::Entry;
        match container_sessions.entry(scope.to_owned()) {
            Entry::Occupied(entry) => entry.get().merge_session_token(token),
            Entry::Vacant(entry) => {
                let container_session = ContainerSession::new();
                container_session.merge_session_token(token)?;
                entry.insert(container_session);
                Ok(())
            }
        }
    }

    /// The merged token stored for `scope` and its ancestors, optionally limited to one range.
    pub fn get_session_token(
        &self,
        scope: &str,
        pk_range_id: Option<&PartitionKeyRangeId>,
    ) -> Option<String> {
        let container_sessions = utils::read(&self.container_sessions);
        let mut merged = HashMap::new();
        for scope in scope_and_ancestors(scope) {
            let Some(session) = container_sessions.get(scope) else {
                continue;
            };
            for token in session.partition_tokens() {
                if pk_range_id.is_some_and(|id| id != &token.pkrange_id) {
                    continue;
                }
                container::merge_into(&mut merged, token);
            }
        }
        container::format_container_token(merged.into_values())
    }

    /// Removes the tokens for `scope` and every scope beneath it.
    pub fn clear_session(&self, scope: &str) {
        let prefix = format!("{scope}/");
        utils::write(&self.container_sessions)
            .retain(|key, _| key != scope && !key.starts_with(&prefix));
    }

    pub fn clear_all_sessions(&self) {
        utils::write(&self.container_sessions).clear();
    }

    pub fn container_count(&self) -> usize {
        utils::read(&self.container_sessions).len()
    }

    /// Attaches the stored session token to a request, unless the request already carries one.
    ///
    /// Only non-master resources read under Session (or unspecified) consistency carry tokens.
    pub(crate) fn apply_session_token(&self, ctx: &mut RequestContext) {
        if ctx.headers.get_optional_str(&constants::SESSION_TOKEN).is_some() {
            return;
        }
        if ctx.resource_link.resource_type().is_master_resource() {
            return;
        }
        if !matches!(ctx.consistency_level, None | Some(ConsistencyLevel::Session)) {
            return;
        }
        let Some(scope) = ctx.resource_link.container_link() else {
            return;
        };
        if let Some(token) = self.get_session_token(&scope, ctx.partition_key_range_id.as_ref()) {
            tracing::trace!(%scope, %token, "attaching session token");
            ctx.headers.insert(constants::SESSION_TOKEN, token);
        }
    }

    /// Records the session token a response carried for `link`.
    pub(crate) fn capture_session_token(&self, link: &ResourceLink, headers: &Headers) {
        if link.resource_type().is_master_resource() {
            return;
        }
        let (Some(scope), Some(token)) = (
            link.container_link(),
            headers.get_optional_str(&constants::SESSION_TOKEN),
        ) else {
            return;
        };
        if let Err(e) = self.set_session_token(&scope, token) {
            tracing::warn!(%scope, error = %e, "ignoring unparseable session token");
        }
    }

    /// Forgets the tokens of a deleted resource and everything beneath it.
    pub fn clear_session_token(&self, link: &ResourceLink) {
        self.clear_session(&link.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_context::{OperationType, ResourceType};

    fn container() -> ResourceLink {
        ResourceLink::root(ResourceType::Databases)
            .item("db")
            .feed(ResourceType::Containers)
            .item("coll")
    }

    fn item_context() -> RequestContext {
        RequestContext::new(
            container().feed(ResourceType::Items).item("item1"),
            OperationType::Read,
        )
    }

    fn headers_with_token(token: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert(constants::SESSION_TOKEN, token.to_owned());
        headers
    }

    #[test]
    fn ancestors_are_walked_upwards() {
        let scopes: Vec<_> = scope_and_ancestors("dbs/a/colls/b").collect();
        assert_eq!(scopes, vec!["dbs/a/colls/b", "dbs/a/colls", "dbs/a", "dbs"]);
    }

    #[test]
    fn capture_keeps_strongest_token() {
        let store = SessionStore::new();
        let link = container().feed(ResourceType::Items);

        store.capture_session_token(&link, &headers_with_token("0:150"));
        store.capture_session_token(&link, &headers_with_token("0:100"));
        assert_eq!(
            store.get_session_token("dbs/db/colls/coll", None).as_deref(),
            Some("0:150")
        );

        let other = SessionStore::new();
        other.capture_session_token(&link, &headers_with_token("0:80"));
        other.capture_session_token(&link, &headers_with_token("0:100"));
        assert_eq!(
            other.get_session_token("dbs/db/colls/coll", None).as_deref(),
            Some("0:100")
        );
    }

    #[test]
    fn master_resources_are_not_tracked() {
        let store = SessionStore::new();
        store.capture_session_token(&container(), &headers_with_token("0:150"));
        assert_eq!(store.container_count(), 0);
    }

    #[test]
    fn apply_attaches_token_for_session_reads() {
        let store = SessionStore::new();
        store.set_session_token("dbs/db/colls/coll", "0:10,1:20").unwrap();

        let mut ctx = item_context();
        store.apply_session_token(&mut ctx);
        assert_eq!(
            ctx.headers.get_optional_str(&constants::SESSION_TOKEN),
            Some("0:10,1:20")
        );
    }

    #[test]
    fn apply_limits_pinned_requests_to_their_range() {
        let store = SessionStore::new();
        store.set_session_token("dbs/db/colls/coll", "0:10,1:20").unwrap();

        let mut ctx = item_context();
        ctx.partition_key_range_id = Some(PartitionKeyRangeId::new("1".into()));
        store.apply_session_token(&mut ctx);
        assert_eq!(
            ctx.headers.get_optional_str(&constants::SESSION_TOKEN),
            Some("1:20")
        );
    }

    #[test]
    fn apply_respects_explicit_token_and_consistency() {
        let store = SessionStore::new();
        store.set_session_token("dbs/db/colls/coll", "0:10").unwrap();

        let mut explicit = item_context();
        explicit.headers.insert(constants::SESSION_TOKEN, "0:5");
        store.apply_session_token(&mut explicit);
        assert_eq!(
            explicit.headers.get_optional_str(&constants::SESSION_TOKEN),
            Some("0:5")
        );

        let mut eventual = item_context();
        eventual.consistency_level = Some(ConsistencyLevel::Eventual);
        store.apply_session_token(&mut eventual);
        assert!(eventual
            .headers
            .get_optional_str(&constants::SESSION_TOKEN)
            .is_none());
    }

    #[test]
    fn clearing_a_database_clears_its_containers() {
        let store = SessionStore::new();
        store.set_session_token("dbs/db/colls/coll", "0:10").unwrap();
        store.set_session_token("dbs/db2/colls/coll", "0:10").unwrap();

        store.clear_session_token(&ResourceLink::root(ResourceType::Databases).item("db"));
        assert!(store.get_session_token("dbs/db/colls/coll", None).is_none());
        assert!(store.get_session_token("dbs/db2/colls/coll", None).is_some());
    }

    #[test]
    fn concurrent_captures_converge_to_max() {
        use std::{sync::Arc, thread};

        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (1..=8u64)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .set_session_token("dbs/db/colls/coll", &format!("0:{}", i * 10))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            store.get_session_token("dbs/db/colls/coll", None).as_deref(),
            Some("0:80")
        );
    }
}
