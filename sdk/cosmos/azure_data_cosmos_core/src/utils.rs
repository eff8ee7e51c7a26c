// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use azure_core::http::headers::{HeaderName, Headers};
use url::Url;

pub(crate) trait AppendPathSegments {
    fn append_path_segments<'a>(&mut self, segments: impl IntoIterator<Item = &'a str>);

    fn with_path_segments<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Self;
}

impl AppendPathSegments for Url {
    fn append_path_segments<'a>(&mut self, segments: impl IntoIterator<Item = &'a str>) {
        // Endpoints are validated as http(s) URLs when the client is built, so they can always be a base.
        if let Ok(mut path_segments) = self.path_segments_mut() {
            path_segments.pop_if_empty().extend(segments);
        }
    }

    fn with_path_segments<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut url = self.clone();
        url.append_path_segments(segments);
        url
    }
}

/// Parses a header, treating a missing or malformed value as absent.
pub(crate) fn header_as<T: FromStr>(headers: &Headers, name: &HeaderName) -> Option<T> {
    headers
        .get_optional_str(name)
        .and_then(|value| value.trim().parse().ok())
}

/// Copies every header of `from` into `to`, replacing existing values.
pub(crate) fn merge_headers(to: &mut Headers, from: &Headers) {
    for (name, value) in from.iter() {
        to.insert(name.clone(), value.clone());
    }
}

// The guarded state is always left consistent between statements, so a panic on another thread
// never invalidates it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
