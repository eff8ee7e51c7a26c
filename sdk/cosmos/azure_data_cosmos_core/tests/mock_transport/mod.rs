// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! An in-memory Cosmos DB account served through [`HttpClient`].
//!
//! Every regional host serves the same data. Tests script faults per host or path and inspect the
//! recorded requests afterwards.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use azure_core::{
    credentials::Secret,
    error::ErrorKind,
    http::{headers::Headers, AsyncRawResponse, Body, HttpClient, Method, Request, StatusCode},
    Error,
};
use azure_data_cosmos_core::{constants, AuthOptions, CosmosClientOptions};
use serde_json::{json, Value};

pub const ACCOUNT_ENDPOINT: &str = "https://acct.documents.azure.com/";

/// The host serving `region`, e.g. `acct-westus.documents.azure.com`.
pub fn regional_host(region: &str) -> String {
    format!("acct-{}.documents.azure.com", region.to_lowercase().replace(' ', ""))
}

pub fn regional_endpoint(region: &str) -> String {
    format!("https://{}/", regional_host(region))
}

#[derive(Clone, Debug)]
pub enum FaultKind {
    /// Respond with a status, an optional sub-status and an optional retry-after hint in milliseconds.
    Status {
        status: u16,
        sub_status: Option<u32>,
        retry_after_ms: Option<u64>,
    },
    /// Fail as if the host could not be reached.
    Unreachable,
    /// Wait before serving the request normally.
    Delay(Duration),
}

#[derive(Clone, Debug)]
pub struct Fault {
    pub kind: FaultKind,
    pub host: Option<String>,
    pub path_contains: Option<String>,
    pub method: Option<Method>,
    /// How many requests the fault applies to. `usize::MAX` never runs out.
    pub remaining: usize,
}

impl Fault {
    pub fn status(status: u16, sub_status: Option<u32>) -> Self {
        Self::new(FaultKind::Status {
            status,
            sub_status,
            retry_after_ms: None,
        })
    }

    pub fn throttled(retry_after_ms: u64) -> Self {
        Self::new(FaultKind::Status {
            status: 429,
            sub_status: None,
            retry_after_ms: Some(retry_after_ms),
        })
    }

    pub fn unreachable() -> Self {
        Self::new(FaultKind::Unreachable)
    }

    pub fn delay(delay: Duration) -> Self {
        Self::new(FaultKind::Delay(delay))
    }

    fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            host: None,
            path_contains: None,
            method: None,
            remaining: usize::MAX,
        }
    }

    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn on_path(mut self, fragment: impl Into<String>) -> Self {
        self.path_contains = Some(fragment.into());
        self
    }

    pub fn on_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn times(mut self, count: usize) -> Self {
        self.remaining = count;
        self
    }

    fn matches(&self, request: &RecordedRequest) -> bool {
        self.remaining > 0
            && self.host.as_ref().is_none_or(|h| *h == request.host)
            && self
                .path_contains
                .as_ref()
                .is_none_or(|p| request.path.contains(p.as_str()))
            && self.method.is_none_or(|m| m == request.method)
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn header(&self, name: &'static str) -> Option<&str> {
        self.headers.get_optional_str(&name.into())
    }

    pub fn is_query_plan(&self) -> bool {
        self.header("x-ms-cosmos-is-query-plan-request").is_some()
    }
}

#[derive(Debug)]
struct RangeDef {
    id: usize,
    min: String,
    max: String,
    parents: Vec<usize>,
}

#[derive(Debug)]
struct Container {
    partition_key_path: String,
    ranges: Vec<RangeDef>,
    /// Ranges that were split and now answer 410.
    gone: Vec<usize>,
    items: Vec<(usize, Value)>,
    lsn: u64,
}

impl Container {
    fn new(partition_key_path: &str, range_count: usize) -> Self {
        let bounds = |i: usize| match i {
            0 => String::new(),
            i if i == range_count => "FF".to_owned(),
            i => format!("{:02X}", i * 256 / range_count),
        };
        Self {
            partition_key_path: partition_key_path.trim_start_matches('/').to_owned(),
            ranges: (0..range_count)
                .map(|i| RangeDef {
                    id: i,
                    min: bounds(i),
                    max: bounds(i + 1),
                    parents: Vec::new(),
                })
                .collect(),
            gone: Vec::new(),
            items: Vec::new(),
            lsn: 0,
        }
    }

    fn range_of(&self, partition_key: &Value) -> usize {
        let text = match partition_key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.ranges[text.bytes().map(usize::from).sum::<usize>() % self.ranges.len()].id
    }

    /// Splits range `id` in two. Its items alternate between the children.
    fn split(&mut self, id: usize) {
        let index = self
            .ranges
            .iter()
            .position(|r| r.id == id)
            .expect("range must exist");
        let parent = self.ranges.remove(index);
        let left = self
            .ranges
            .iter()
            .map(|r| r.id)
            .chain(self.gone.iter().copied())
            .chain([parent.id])
            .max()
            .unwrap_or_default()
            + 1;
        let right = left + 1;
        let middle = format!("{}7F", parent.min);
        self.ranges.insert(
            index,
            RangeDef {
                id: right,
                min: middle.clone(),
                max: parent.max.clone(),
                parents: vec![parent.id],
            },
        );
        self.ranges.insert(
            index,
            RangeDef {
                id: left,
                min: parent.min.clone(),
                max: middle,
                parents: vec![parent.id],
            },
        );
        let mut moved = 0;
        for (range, _) in self.items.iter_mut().filter(|(range, _)| *range == parent.id) {
            *range = if moved % 2 == 0 { left } else { right };
            moved += 1;
        }
        self.gone.push(parent.id);
    }

    fn partition_key_of(&self, item: &Value) -> Value {
        item.get(&self.partition_key_path)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn ranges_json(&self) -> Value {
        let ranges: Vec<_> = self
            .ranges
            .iter()
            .map(|r| {
                json!({
                    "id": r.id.to_string(),
                    "minInclusive": r.min,
                    "maxExclusive": r.max,
                    "parents": r.parents.iter().map(ToString::to_string).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({ "_rid": "coll", "PartitionKeyRanges": ranges, "_count": ranges.len() })
    }
}

#[derive(Debug, Default)]
struct State {
    writable: Vec<String>,
    readable: Vec<String>,
    multiple_write_locations: bool,
    containers: BTreeMap<String, Container>,
    faults: Vec<Fault>,
    requests: Vec<RecordedRequest>,
}

#[derive(Debug, Default)]
pub struct MockAccount {
    state: Mutex<State>,
}

enum Action {
    Serve,
    Respond(AsyncRawResponse),
    Unreachable,
    DelayThenServe(Duration),
}

fn response(status: StatusCode, headers: Headers, body: &Value) -> AsyncRawResponse {
    AsyncRawResponse::from_bytes(status, headers, body.to_string())
}

fn error_response(status: StatusCode, code: &str) -> AsyncRawResponse {
    response(
        status,
        Headers::new(),
        &json!({ "code": code, "message": format!("mock: {code}") }),
    )
}

impl MockAccount {
    /// A single-region account in `East US`.
    pub fn new() -> Self {
        Self::with_regions(&["East US"], &["East US"])
    }

    pub fn with_regions(writable: &[&str], readable: &[&str]) -> Self {
        let account = Self::default();
        {
            let mut state = account.lock();
            state.writable = writable.iter().map(|r| r.to_string()).collect();
            state.readable = readable.iter().map(|r| r.to_string()).collect();
        }
        account
    }

    pub fn with_multiple_write_locations(self) -> Self {
        self.lock().multiple_write_locations = true;
        self
    }

    /// Adds a container partitioned on the top-level property `partition_key_path`.
    pub fn with_container(self, link: &str, partition_key_path: &str, range_count: usize) -> Self {
        self.lock().containers.insert(
            link.to_owned(),
            Container::new(partition_key_path, range_count),
        );
        self
    }

    /// Splits partition key range `range_id` of `container` into two child ranges with the next
    /// free ids. Requests pinned to the old range then fail with 410 and sub-status 1002.
    pub fn split_range(&self, container: &str, range_id: usize) {
        self.lock()
            .containers
            .get_mut(container)
            .expect("container must exist")
            .split(range_id);
    }

    pub fn insert_items(&self, container: &str, items: impl IntoIterator<Item = Value>) {
        let mut state = self.lock();
        let container = state
            .containers
            .get_mut(container)
            .expect("container must exist");
        for item in items {
            let range = container.range_of(&container.partition_key_of(&item));
            container.items.push((range, item));
        }
    }

    pub fn add_fault(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// The recorded requests whose path contains `fragment`.
    pub fn requests_to(&self, fragment: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path.contains(fragment))
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Options for a client talking to this account.
    pub fn client_options(self: &Arc<Self>) -> CosmosClientOptions {
        CosmosClientOptions {
            endpoint: ACCOUNT_ENDPOINT.to_owned(),
            auth: Some(AuthOptions::MasterKey(Secret::new("a2V5"))),
            transport: Some(self.clone()),
            ..Default::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock account lock poisoned")
    }

    fn plan(&self, request: &RecordedRequest) -> Action {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let Some(fault) = state.faults.iter_mut().find(|f| f.matches(request)) else {
            return Action::Serve;
        };
        fault.remaining = fault.remaining.saturating_sub(1);
        match fault.kind.clone() {
            FaultKind::Status {
                status,
                sub_status,
                retry_after_ms,
            } => {
                let mut headers = Headers::new();
                if let Some(sub_status) = sub_status {
                    headers.insert(constants::SUB_STATUS, sub_status.to_string());
                }
                if let Some(ms) = retry_after_ms {
                    headers.insert(constants::RETRY_AFTER_MS, ms.to_string());
                }
                Action::Respond(response(
                    StatusCode::from(status),
                    headers,
                    &json!({ "code": "MockFault", "message": "scripted fault" }),
                ))
            }
            FaultKind::Unreachable => Action::Unreachable,
            FaultKind::Delay(delay) => Action::DelayThenServe(delay),
        }
    }

    fn serve(&self, request: &RecordedRequest) -> AsyncRawResponse {
        let mut state = self.lock();
        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, []) => response(StatusCode::Ok, Headers::new(), &state.account_json()),
            (Method::Get, ["dbs", db, "colls", coll]) => {
                let link = format!("dbs/{db}/colls/{coll}");
                match state.containers.get(&link) {
                    Some(container) => response(
                        StatusCode::Ok,
                        Headers::new(),
                        &json!({
                            "id": coll,
                            "partitionKey": {
                                "paths": [format!("/{}", container.partition_key_path)],
                                "kind": "Hash",
                            },
                        }),
                    ),
                    None => error_response(StatusCode::NotFound, "NotFound"),
                }
            }
            (Method::Get, ["dbs", db, "colls", coll, "pkranges"]) => {
                match state.containers.get(&format!("dbs/{db}/colls/{coll}")) {
                    Some(container) => {
                        response(StatusCode::Ok, Headers::new(), &container.ranges_json())
                    }
                    None => error_response(StatusCode::NotFound, "NotFound"),
                }
            }
            (method, ["dbs", db, "colls", coll, "docs", rest @ ..]) => {
                let link = format!("dbs/{db}/colls/{coll}");
                let Some(container) = state.containers.get_mut(&link) else {
                    return error_response(StatusCode::NotFound, "NotFound");
                };
                match (method, rest) {
                    (Method::Post, []) if request.is_query_plan() => query_plan(request),
                    (Method::Post, []) if request.header("x-ms-documentdb-isquery").is_some() => {
                        query_page(container, request)
                    }
                    (Method::Get, []) => query_page(container, request),
                    (Method::Post, []) => write_item(container, request),
                    (Method::Put, [id]) => replace_item(container, request, id),
                    (Method::Get, [id]) => read_item(container, id),
                    (Method::Delete, [id]) => delete_item(container, id),
                    _ => error_response(StatusCode::BadRequest, "BadRequest"),
                }
            }
            _ => error_response(StatusCode::NotFound, "NotFound"),
        }
    }
}

impl State {
    fn account_json(&self) -> Value {
        let locations = |regions: &[String]| -> Vec<Value> {
            regions
                .iter()
                .map(|r| json!({ "name": r, "databaseAccountEndpoint": regional_endpoint(r) }))
                .collect()
        };
        json!({
            "id": "acct",
            "writableLocations": locations(&self.writable),
            "readableLocations": locations(&self.readable),
            "enableMultipleWriteLocations": self.multiple_write_locations,
            "userConsistencyPolicy": { "defaultConsistencyLevel": "Session" },
        })
    }
}

fn session_headers(range: usize, lsn: u64) -> Headers {
    let mut headers = Headers::new();
    headers.insert(constants::SESSION_TOKEN, format!("{range}:{lsn}"));
    headers.insert(constants::REQUEST_CHARGE, "1");
    headers
}

fn query_text(request: &RecordedRequest) -> String {
    request
        .body
        .as_ref()
        .and_then(|b| b.get("query"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Plans understand `ORDER BY c.n` and `SELECT VALUE COUNT(1)`. Anything else needs no rewrite.
fn query_plan(request: &RecordedRequest) -> AsyncRawResponse {
    let text = query_text(request);
    let mut info = json!({
        "distinctType": "None",
        "orderBy": [],
        "orderByExpressions": [],
        "aggregates": [],
        "hasSelectValue": false,
        "rewrittenQuery": "",
    });
    if text.contains("ORDER BY") {
        info["orderBy"] = json!(["Ascending"]);
        info["orderByExpressions"] = json!(["c.n"]);
        info["rewrittenQuery"] = json!(
            "SELECT c._rid, [{\"item\": c.n}] AS orderByItems, c AS payload FROM c WHERE ({documentdb-formattableorderbyquery-filter}) ORDER BY c.n"
        );
    } else if text.contains("COUNT(1)") {
        info["aggregates"] = json!(["Count"]);
        info["hasSelectValue"] = json!(true);
        info["rewrittenQuery"] = json!("SELECT VALUE [{\"item\": COUNT(1)}] FROM c");
    }
    response(
        StatusCode::Ok,
        Headers::new(),
        &json!({
            "partitionedQueryExecutionInfoVersion": 2,
            "queryInfo": info,
            "queryRanges": [{ "min": "", "max": "FF", "isMinInclusive": true, "isMaxInclusive": false }],
        }),
    )
}

fn query_page(container: &Container, request: &RecordedRequest) -> AsyncRawResponse {
    let text = query_text(request);
    let pinned: Option<usize> = request
        .header("x-ms-documentdb-partitionkeyrangeid")
        .and_then(|id| id.parse().ok());
    if pinned.is_some_and(|p| container.gone.contains(&p)) {
        let mut headers = Headers::new();
        headers.insert(
            constants::SUB_STATUS,
            constants::SUB_STATUS_PARTITION_KEY_RANGE_GONE.to_string(),
        );
        return response(
            StatusCode::Gone,
            headers,
            &json!({ "code": "Gone", "message": "mock: partition key range is gone" }),
        );
    }
    let partition_key: Option<Value> = request
        .header("x-ms-documentdb-partitionkey")
        .and_then(|pk| serde_json::from_str::<Vec<Value>>(pk).ok())
        .and_then(|pk| pk.into_iter().next());

    let mut items: Vec<&Value> = container
        .items
        .iter()
        .filter(|(range, item)| {
            pinned.is_none_or(|p| p == *range)
                && partition_key
                    .as_ref()
                    .is_none_or(|pk| container.partition_key_of(item) == *pk)
        })
        .map(|(_, item)| item)
        .collect();

    if text.contains("COUNT(1)") {
        let count = items.len();
        let mut headers = session_headers(pinned.unwrap_or_default(), container.lsn);
        headers.insert(constants::REQUEST_CHARGE, "2.5");
        return response(
            StatusCode::Ok,
            headers,
            &json!({ "Documents": [[{ "item": count }]], "_count": 1 }),
        );
    }

    let order_by = text.contains("orderByItems");
    if order_by {
        items.sort_by_key(|item| item.get("n").and_then(Value::as_i64).unwrap_or_default());
    }

    let start: usize = request
        .header("x-ms-continuation")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let page_size = match request
        .header("x-ms-max-item-count")
        .and_then(|c| c.parse::<i64>().ok())
    {
        Some(n) if n > 0 => n as usize,
        _ => 100,
    };
    let end = (start + page_size).min(items.len());
    let documents: Vec<Value> = items[start.min(end)..end]
        .iter()
        .map(|item| {
            if order_by {
                json!({ "orderByItems": [{ "item": item.get("n") }], "payload": item })
            } else {
                (*item).clone()
            }
        })
        .collect();

    let mut headers = session_headers(pinned.unwrap_or_default(), container.lsn);
    headers.insert(constants::REQUEST_CHARGE, "2.5");
    if end < items.len() {
        headers.insert(constants::CONTINUATION, end.to_string());
    }
    response(
        StatusCode::Ok,
        headers,
        &json!({ "Documents": documents, "_count": documents.len() }),
    )
}

fn write_item(container: &mut Container, request: &RecordedRequest) -> AsyncRawResponse {
    let Some(item) = request.body.clone() else {
        return error_response(StatusCode::BadRequest, "BadRequest");
    };
    let id = item.get("id").cloned();
    let upsert = request.header("x-ms-documentdb-is-upsert").is_some();
    let existing = container
        .items
        .iter()
        .position(|(_, i)| i.get("id") == id.as_ref());
    let range = container.range_of(&container.partition_key_of(&item));
    let status = match existing {
        Some(_) if !upsert => return error_response(StatusCode::Conflict, "Conflict"),
        Some(position) => {
            container.items[position] = (range, item.clone());
            StatusCode::Ok
        }
        None => {
            container.items.push((range, item.clone()));
            StatusCode::Created
        }
    };
    container.lsn += 1;
    response(status, session_headers(range, container.lsn), &item)
}

fn replace_item(
    container: &mut Container,
    request: &RecordedRequest,
    id: &str,
) -> AsyncRawResponse {
    let Some(item) = request.body.clone() else {
        return error_response(StatusCode::BadRequest, "BadRequest");
    };
    let Some(position) = container
        .items
        .iter()
        .position(|(_, i)| i.get("id").and_then(Value::as_str) == Some(id))
    else {
        return error_response(StatusCode::NotFound, "NotFound");
    };
    let range = container.items[position].0;
    container.items[position] = (range, item.clone());
    container.lsn += 1;
    response(StatusCode::Ok, session_headers(range, container.lsn), &item)
}

fn read_item(container: &Container, id: &str) -> AsyncRawResponse {
    match container
        .items
        .iter()
        .find(|(_, i)| i.get("id").and_then(Value::as_str) == Some(id))
    {
        Some((range, item)) => {
            response(StatusCode::Ok, session_headers(*range, container.lsn), item)
        }
        None => error_response(StatusCode::NotFound, "NotFound"),
    }
}

fn delete_item(container: &mut Container, id: &str) -> AsyncRawResponse {
    let Some(position) = container
        .items
        .iter()
        .position(|(_, i)| i.get("id").and_then(Value::as_str) == Some(id))
    else {
        return error_response(StatusCode::NotFound, "NotFound");
    };
    let (range, _) = container.items.remove(position);
    container.lsn += 1;
    AsyncRawResponse::from_bytes(
        StatusCode::NoContent,
        session_headers(range, container.lsn),
        Vec::<u8>::new(),
    )
}

#[async_trait]
impl HttpClient for MockAccount {
    async fn execute_request(&self, request: &Request) -> azure_core::Result<AsyncRawResponse> {
        let body = match request.body() {
            Body::Bytes(bytes) => serde_json::from_slice(bytes).ok(),
            #[allow(unreachable_patterns)]
            _ => None,
        };
        let recorded = RecordedRequest {
            method: request.method(),
            host: request.url().host_str().unwrap_or_default().to_owned(),
            path: request.url().path().to_owned(),
            headers: request.headers().clone(),
            body,
        };
        match self.plan(&recorded) {
            Action::Serve => Ok(self.serve(&recorded)),
            Action::Respond(response) => Ok(response),
            Action::Unreachable => Err(Error::new(
                ErrorKind::Io,
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("{} is unreachable", recorded.host),
                ),
            )),
            Action::DelayThenServe(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.serve(&recorded))
            }
        }
    }
}
