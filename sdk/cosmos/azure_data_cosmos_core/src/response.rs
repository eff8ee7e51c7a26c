// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::fmt;

use azure_core::{
    error::ErrorKind,
    http::{headers::Headers, StatusCode},
    Error,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{constants, utils::header_as};

/// A buffered response from the Cosmos DB service.
///
/// The transport's body stream is collected before the response leaves the pipeline; Cosmos DB
/// responses are bounded by the page size the client requests. Use
/// [`CosmosResponse::into_json_body`] to deserialize the body into a model type.
#[derive(Clone)]
pub struct CosmosResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl CosmosResponse {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deconstruct the response into its components.
    pub fn deconstruct(self) -> (StatusCode, Headers, Bytes) {
        (self.status, self.headers, self.body)
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Collect the body into a [`String`].
    pub fn into_string(self) -> azure_core::Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::new(ErrorKind::DataConversion, e))
    }

    /// Deserialize the JSON body into type `T`.
    pub fn into_json_body<T: DeserializeOwned>(self) -> azure_core::Result<T> {
        self.json()
    }

    /// Deserialize the JSON body into type `T` without consuming the response.
    pub fn json<T: DeserializeOwned>(&self) -> azure_core::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The request units charged for this response.
    pub fn request_charge(&self) -> f64 {
        header_as(&self.headers, &constants::REQUEST_CHARGE).unwrap_or_default()
    }

    pub fn activity_id(&self) -> Option<&str> {
        self.headers.get_optional_str(&constants::ACTIVITY_ID)
    }

    pub fn session_token(&self) -> Option<&str> {
        self.headers.get_optional_str(&constants::SESSION_TOKEN)
    }

    /// The continuation token, treating an empty header as absent.
    pub fn continuation(&self) -> Option<&str> {
        self.headers
            .get_optional_str(&constants::CONTINUATION)
            .filter(|c| !c.is_empty())
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get_optional_str(&constants::ETAG)
    }
}

impl fmt::Debug for CosmosResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosResponse")
            .field("status", &self.status)
            .field("activity_id", &self.activity_id())
            .finish_non_exhaustive()
    }
}
