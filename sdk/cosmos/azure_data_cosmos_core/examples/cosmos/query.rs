// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::error::Error;

use azure_data_cosmos_core::{
    ClientContext, ConnectionPolicy, ConnectionString, FeedOptions, PartitionKey, ResourceLink,
    ResourceType,
};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tracing_subscriber::EnvFilter;

/// Run a query against a Cosmos DB account.
#[derive(Parser)]
struct Cli {
    /// The connection string of the account. Defaults to the `AZURE_COSMOS_CONNECTION_STRING` variable.
    #[arg(long)]
    connection_string: Option<String>,

    /// Preferred regions, in order.
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Maximum number of items per page.
    #[arg(long)]
    max_item_count: Option<i32>,

    #[command(subcommand)]
    subcommand: Subcommands,
}

#[derive(Clone, Subcommand)]
enum Subcommands {
    Items {
        /// The database to query.
        database: String,

        /// The container to query.
        container: String,

        /// The query to execute.
        query: String,

        /// The partition key to use when querying the container. This can be omitted to run a cross-partition query.
        #[arg(long, short)]
        partition_key: Option<String>,
    },
    Databases {
        /// The query to execute.
        query: String,
    },
    Containers {
        /// The database to query.
        database: String,

        /// The query to execute.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let connection_string = cli
        .connection_string
        .or_else(|| std::env::var("AZURE_COSMOS_CONNECTION_STRING").ok())
        .ok_or("no connection string; pass --connection-string or set AZURE_COSMOS_CONNECTION_STRING")?;
    let mut options = connection_string
        .parse::<ConnectionString>()?
        .into_client_options();
    options.connection_policy = ConnectionPolicy {
        preferred_locations: cli.regions,
        ..Default::default()
    };
    let client = ClientContext::new(options)?;

    let mut feed_options = FeedOptions {
        max_item_count: cli.max_item_count,
        ..Default::default()
    };

    let (feed, query) = match cli.subcommand {
        Subcommands::Items {
            database,
            container,
            query,
            partition_key,
        } => {
            feed_options.partition_key = partition_key.map(PartitionKey::from);
            let feed = ResourceLink::root(ResourceType::Databases)
                .item(database)
                .feed(ResourceType::Containers)
                .item(container)
                .feed(ResourceType::Items);
            (feed, query)
        }
        Subcommands::Databases { query } => (ResourceLink::root(ResourceType::Databases), query),
        Subcommands::Containers { database, query } => (
            ResourceLink::root(ResourceType::Databases)
                .item(database)
                .feed(ResourceType::Containers),
            query,
        ),
    };

    println!("Write endpoint: {}", client.get_write_endpoint().await);
    println!("Read endpoint: {}", client.get_read_endpoint().await);

    let mut pages = client
        .query_feed::<serde_json::Value>(feed, query, Some(feed_options))
        .into_stream();
    while let Some(page) = pages.try_next().await? {
        println!("Results Page ({} RU)", page.request_charge());
        println!("  Items:");
        for item in page.into_items() {
            println!("    * {:#?}", item);
        }
    }
    Ok(())
}
