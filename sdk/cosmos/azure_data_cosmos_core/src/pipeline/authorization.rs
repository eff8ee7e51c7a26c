// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Computes the `authorization` header of each request.

use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use azure_core::{
    credentials::Secret,
    error::ErrorKind,
    hmac::hmac_sha256,
    http::Method,
    time::{to_rfc7231, OffsetDateTime},
    Error,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::{resource_context::ResourceType, AuthOptions};

const VERSION_NUMBER: &str = "1.0";

/// The inputs of a request signature, handed to a [`TokenProvider`].
#[derive(Clone, Debug)]
pub struct AuthorizationRequest<'a> {
    pub method: Method,
    pub resource_type: ResourceType,
    /// The path the signature covers: the item path, or the parent path for feeds.
    pub resource_link: &'a str,
    /// The `x-ms-date` value sent with the request.
    pub date: &'a str,
}

/// Supplies the `authorization` header value for each request.
#[async_trait]
pub trait TokenProvider: Send + Sync + Debug {
    async fn get_authorization_token(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> azure_core::Result<String>;
}

/// Formats `now` as the RFC 7231 date used by `x-ms-date`.
pub(crate) fn format_date(now: OffsetDateTime) -> String {
    to_rfc7231(&now)
}

/// Produces the authorization header value for a request, if the client has credentials.
pub(crate) async fn authorize(
    auth: Option<&AuthOptions>,
    request: &AuthorizationRequest<'_>,
) -> azure_core::Result<Option<String>> {
    let token = match auth {
        None => return Ok(None),
        Some(AuthOptions::MasterKey(key)) => {
            let signature = sign(key, request)?;
            format!("type=master&ver={VERSION_NUMBER}&sig={signature}")
        }
        Some(AuthOptions::ResourceTokens(tokens)) => {
            resource_token(tokens, request.resource_link)?.to_owned()
        }
        Some(AuthOptions::TokenProvider(provider)) => {
            provider.get_authorization_token(request).await?
        }
    };
    Ok(Some(utf8_percent_encode(&token, NON_ALPHANUMERIC).to_string()))
}

fn sign(key: &Secret, request: &AuthorizationRequest<'_>) -> azure_core::Result<String> {
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}\n\n",
        request.method.to_string().to_lowercase(),
        request.resource_type.path_segment(),
        request.resource_link,
        request.date.to_lowercase(),
    );
    hmac_sha256(&string_to_sign, key).map_err(|e| Error::new(ErrorKind::Credential, e))
}

/// The token of the closest resource path at or above `resource_link`.
///
/// Account-level requests may use any token.
fn resource_token<'a>(
    tokens: &'a HashMap<String, String>,
    resource_link: &str,
) -> azure_core::Result<&'a str> {
    let normalized: HashMap<&str, &str> = tokens
        .iter()
        .map(|(path, token)| (path.trim_matches('/'), token.as_str()))
        .collect();

    let link = resource_link.trim_matches('/');
    if link.is_empty() {
        let mut paths: Vec<_> = normalized.keys().collect();
        paths.sort();
        if let Some(path) = paths.first() {
            return Ok(normalized[*path]);
        }
    }

    let mut candidate = Some(link);
    while let Some(path) = candidate {
        if let Some(token) = normalized.get(path) {
            return Ok(token);
        }
        candidate = path.rsplit_once('/').map(|(parent, _)| parent);
    }
    Err(Error::new(
        ErrorKind::Credential,
        format!("no resource token covers '{resource_link}'"),
    ))
}
