// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Session state for a single container.

use std::{collections::HashMap, sync::RwLock};

use super::{PartitionSessionToken, SessionTokenError};
use crate::{utils, PartitionKeyRangeId};

/// The session tokens observed for each partition key range of one container.
#[derive(Debug, Default)]
pub struct ContainerSession {
    partition_tokens: RwLock<HashMap<PartitionKeyRangeId, PartitionSessionToken>>,
}

/// Parses a container session token: a comma-separated list of partition session tokens,
/// e.g. `"42:1#123#4=500,43:1#124#4=501"`.
pub fn parse_container_token(token: &str) -> Result<Vec<PartitionSessionToken>, SessionTokenError> {
    if token.trim().is_empty() {
        return Err(SessionTokenError::EmptyInput);
    }
    token
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse::<PartitionSessionToken>)
        .collect()
}

impl ContainerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges each partition token of a container session token into the stored state.
    ///
    /// Stored progress never decreases. Nothing is stored if any part of `token` is invalid.
    pub fn merge_session_token(&self, token: &str) -> Result<(), SessionTokenError> {
        let tokens = parse_container_token(token)?;
        let mut partition_tokens = utils::write(&self.partition_tokens);
        for token in tokens {
            merge_into(&mut partition_tokens, token);
        }
        Ok(())
    }

    /// Returns every stored partition token.
    pub fn partition_tokens(&self) -> Vec<PartitionSessionToken> {
        utils::read(&self.partition_tokens)
            .values()
            .cloned()
            .collect()
    }

    /// Serializes the stored tokens into a container session token, sorted by range id.
    ///
    /// Returns `None` if there are no partition tokens.
    pub fn get_session_token(&self) -> Option<String> {
        format_container_token(self.partition_tokens())
    }

    pub fn get_partition_session_token(&self, pk_range_id: &PartitionKeyRangeId) -> Option<String> {
        utils::read(&self.partition_tokens)
            .get(pk_range_id)
            .map(ToString::to_string)
    }

    pub fn clear_session(&self) {
        utils::write(&self.partition_tokens).clear();
    }

    pub fn is_empty(&self) -> bool {
        utils::read(&self.partition_tokens).is_empty()
    }
}

pub(crate) fn merge_into(
    tokens: &mut HashMap<PartitionKeyRangeId, PartitionSessionToken>,
    token: PartitionSessionToken,
) {
    match tokens.remove(&token.pkrange_id) {
        Some(existing) => {
            let merged = existing.merge(token);
            tokens.insert(merged.pkrange_id.clone(), merged);
        }
        None => {
            tokens.insert(token.pkrange_id.clone(), token);
        }
    }
}

pub(crate) fn format_container_token(
    tokens: impl IntoIterator<Item = PartitionSessionToken>,
) -> Option<String> {
    let mut tokens: Vec<String> = tokens.into_iter().map(|t| t.to_string()).collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.sort();
    Some(tokens.join(","))
}
