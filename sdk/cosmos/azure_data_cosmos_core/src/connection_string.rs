// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::str::FromStr;

use azure_core::{credentials::Secret, error::ErrorKind, Error};

use crate::{AuthOptions, CosmosClientOptions};

/// Represents a Cosmos DB connection string.
///
/// ```rust
/// # use azure_data_cosmos_core::ConnectionString;
/// let connection_string: ConnectionString =
///     "AccountEndpoint=https://accountname.documents.azure.com:443/;AccountKey=key"
///         .parse()
///         .unwrap();
/// assert_eq!(connection_string.account_endpoint, "https://accountname.documents.azure.com:443/");
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionString {
    pub account_endpoint: String,
    pub account_key: Secret,
}

impl ConnectionString {
    /// Client options that connect to this account with its key and default settings.
    pub fn into_client_options(self) -> CosmosClientOptions {
        CosmosClientOptions {
            endpoint: self.account_endpoint,
            auth: Some(AuthOptions::MasterKey(self.account_key)),
            ..Default::default()
        }
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(connection_string: &str) -> Result<Self, Self::Err> {
        let mut account_endpoint = None;
        let mut account_key = None;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            // Account keys end in '=' padding; only the first '=' separates.
            let Some((key, value)) = part.split_once('=') else {
                return Err(Error::new(
                    ErrorKind::Other,
                    "invalid connection string: expected 'key=value' pairs",
                ));
            };
            match key.trim() {
                k if k.eq_ignore_ascii_case("AccountEndpoint") => {
                    account_endpoint = Some(value.to_owned())
                }
                k if k.eq_ignore_ascii_case("AccountKey") => {
                    account_key = Some(Secret::new(value.to_owned()))
                }
                _ => {}
            }
        }

        let Some(account_endpoint) = account_endpoint else {
            return Err(Error::new(
                ErrorKind::Other,
                "invalid connection string, missing 'AccountEndpoint'",
            ));
        };
        let Some(account_key) = account_key else {
            return Err(Error::new(
                ErrorKind::Other,
                "invalid connection string, missing 'AccountKey'",
            ));
        };

        Ok(Self {
            account_endpoint,
            account_key,
        })
    }
}
