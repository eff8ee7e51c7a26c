// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Errors raised while parsing or merging session tokens.

use azure_core::{error::ErrorKind, Error};

/// Errors that can occur when working with session tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionTokenError {
    #[error("input string is empty")]
    EmptyInput,
    /// The token lacks the partition key range id or the LSN.
    #[error("missing required components")]
    MissingComponents,
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),
    #[error("invalid LSN: '{0}'")]
    InvalidLsn(String),
    #[error("invalid region ID: '{0}'")]
    InvalidRegionId(String),
    #[error("invalid region LSN: '{0}'")]
    InvalidRegionLsn(String),
    /// A regional component is missing the required '=' separator.
    #[error("malformed regional component: '{0}'")]
    MalformedRegionalComponent(String),
    #[error("invalid regions in session token comparison: current='{current}', other='{other}'")]
    InvalidRegions { current: String, other: String },
    #[error("incompatible tokens: {0}")]
    TokensCannotBeMerged(String),
}

impl From<SessionTokenError> for Error {
    fn from(error: SessionTokenError) -> Self {
        Error::new(ErrorKind::DataConversion, error)
    }
}
