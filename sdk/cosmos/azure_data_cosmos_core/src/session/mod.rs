// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Session consistency: parsing, merging and storing session tokens.

mod container;
mod error;
mod partition;
mod store;
mod vector;

pub use container::*;
pub use error::*;
pub use partition::*;
pub use store::*;
pub use vector::*;
