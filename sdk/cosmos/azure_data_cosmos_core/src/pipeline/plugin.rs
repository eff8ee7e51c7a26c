// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{pipeline::RequestContext, CosmosResponse};

/// Where a plugin sits in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginOn {
    /// Wraps every network attempt, inside the retry loop.
    Request,
    /// Wraps the whole logical operation, retries included.
    Operation,
}

/// A user-supplied step in the request pipeline.
///
/// Call [`Next::run`] to continue down the chain. Returning without calling it short-circuits the
/// rest of the pipeline, including the network call.
///
/// ```rust
/// # use async_trait::async_trait;
/// # use azure_data_cosmos_core::{Plugin, CosmosResponse, pipeline::{Next, RequestContext}};
/// #[derive(Debug)]
/// struct Tag;
///
/// #[async_trait]
/// impl Plugin for Tag {
///     async fn send(
///         &self,
///         ctx: &mut RequestContext,
///         next: Next<'_>,
///     ) -> azure_core::Result<CosmosResponse> {
///         ctx.headers.insert("x-custom-tag", "demo");
///         next.run(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + Debug {
    async fn send(&self, ctx: &mut RequestContext, next: Next<'_>) -> azure_core::Result<CosmosResponse>;
}

/// A plugin and the layer it applies to.
#[derive(Clone, Debug)]
pub struct PluginConfig {
    pub on: PluginOn,
    pub plugin: Arc<dyn Plugin>,
}

impl PluginConfig {
    pub fn new(on: PluginOn, plugin: Arc<dyn Plugin>) -> Self {
        Self { on, plugin }
    }
}

/// What runs after the last plugin of a chain.
#[async_trait]
pub(crate) trait Terminal: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse>;
}

/// The remainder of a plugin chain.
pub struct Next<'a> {
    plugins: &'a [Arc<dyn Plugin>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(plugins: &'a [Arc<dyn Plugin>], terminal: &'a dyn Terminal) -> Self {
        Self { plugins, terminal }
    }

    /// Runs the next plugin, or the pipeline's own handling once the chain is exhausted.
    pub async fn run(self, ctx: &mut RequestContext) -> azure_core::Result<CosmosResponse> {
        match self.plugins.split_first() {
            Some((plugin, rest)) => plugin.send(ctx, Next::new(rest, self.terminal)).await,
            None => self.terminal.call(ctx).await,
        }
    }
}

/// Splits configured plugins into the operation and request layers, keeping registration order.
pub(crate) fn split_plugins(
    plugins: &[PluginConfig],
) -> (Vec<Arc<dyn Plugin>>, Vec<Arc<dyn Plugin>>) {
    let layer = |on| {
        plugins
            .iter()
            .filter(|config| config.on == on)
            .map(|config| config.plugin.clone())
            .collect()
    };
    (layer(PluginOn::Operation), layer(PluginOn::Request))
}
