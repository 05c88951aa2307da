//! Test doubles shared by the unit tests.

use crate::counter_store::StorageBackend;
use crate::favorites::FavoriteItem;
use crate::mutation::types::{IdentityKey, MembershipRecord};
use crate::remote::{RemoteCollectionService, RemoteError, RemoteQuota, RemoteQuotaService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Backend whose every operation fails, like a full or disabled storage.
pub struct FailingBackend;

impl StorageBackend for FailingBackend {
    fn load(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("storage disabled")
    }

    fn save(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("quota exceeded")
    }

    fn remove(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("storage disabled")
    }
}

/// Scripted quota service. Queued responses are served first, then the
/// fallback response repeats.
pub struct FakeQuotaService {
    queued: Mutex<VecDeque<Result<RemoteQuota, RemoteError>>>,
    fallback: Mutex<Result<RemoteQuota, RemoteError>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    calls: AtomicUsize,
}

impl FakeQuotaService {
    pub fn returning(response: Result<RemoteQuota, RemoteError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(response),
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn remaining(remaining: u32) -> Self {
        Self::returning(Ok(RemoteQuota::limited(remaining)))
    }

    pub fn push(&self, response: Result<RemoteQuota, RemoteError>) {
        self.queued.lock().unwrap().push_back(response);
    }

    pub fn set_fallback(&self, response: Result<RemoteQuota, RemoteError>) {
        *self.fallback.lock().unwrap() = response;
    }

    /// Holds the next call until the returned sender fires (or is dropped).
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteQuotaService for FakeQuotaService {
    async fn fetch_remaining(&self) -> Result<RemoteQuota, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let queued = self.queued.lock().unwrap().pop_front();
        match queued {
            Some(response) => response,
            None => self.fallback.lock().unwrap().clone(),
        }
    }
}

/// In-memory favorites store with optional scripted failures.
#[derive(Default)]
pub struct FakeCollectionService {
    items: Mutex<Vec<(String, Value)>>,
    fail_next: Mutex<VecDeque<RemoteError>>,
    fail_list: Mutex<Option<RemoteError>>,
    enrich: Mutex<Option<Value>>,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

impl FakeCollectionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, item_type: &str, item: Value) {
        self.items
            .lock()
            .unwrap()
            .push((item_type.to_string(), item));
    }

    pub fn fail_next(&self, error: RemoteError) {
        self.fail_next.lock().unwrap().push_back(error);
    }

    pub fn fail_list(&self, error: Option<RemoteError>) {
        *self.fail_list.lock().unwrap() = error;
    }

    /// Fields merged into every added item, like server-generated ids.
    pub fn enrich_with(&self, fields: Value) {
        *self.enrich.lock().unwrap() = Some(fields);
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    fn items_of(&self, item_type: &str) -> Vec<Value> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == item_type)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn take_failure(&self) -> Option<RemoteError> {
        self.fail_next.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl RemoteCollectionService for FakeCollectionService {
    async fn add(&self, item_type: &str, item: Value) -> Result<Vec<Value>, RemoteError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut item = item;
        if let (Some(Value::Object(extra)), Value::Object(map)) =
            (self.enrich.lock().unwrap().clone(), &mut item)
        {
            map.extend(extra);
        }
        self.seed(item_type, item);
        Ok(self.items_of(item_type))
    }

    async fn remove(&self, item_type: &str, id: &str) -> Result<Vec<Value>, RemoteError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.items.lock().unwrap().retain(|(t, v)| {
            t != item_type || !TestItem::from_value(v).is_some_and(|i| i.remote_id() == id)
        });
        Ok(self.items_of(item_type))
    }

    async fn list(&self, item_type: &str) -> Result<Vec<Value>, RemoteError> {
        if let Some(error) = self.fail_list.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.items_of(item_type))
    }
}

/// Record identified by name first, then numeric id, then site id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl TestItem {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn site(site_id: &str) -> Self {
        Self {
            site_id: Some(site_id.to_string()),
            ..Self::default()
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl FavoriteItem for TestItem {
    fn remote_id(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.map(|id| id.to_string()))
            .or_else(|| self.site_id.clone())
            .unwrap_or_default()
    }
}

impl MembershipRecord for TestItem {
    fn identity_keys(&self) -> Vec<IdentityKey> {
        let mut keys = Vec::new();
        if let Some(name) = &self.name {
            keys.push(IdentityKey::new("name", name));
        }
        if let Some(id) = self.id {
            keys.push(IdentityKey::new("id", &id.to_string()));
        }
        if let Some(site_id) = &self.site_id {
            keys.push(IdentityKey::new("site", site_id));
        }
        keys
    }
}

/// Answers one HTTP request on a local port with a canned response.
///
/// Returns the base URL and a handle yielding the raw request, body
/// included.
pub fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&request).to_string()
    });
    (format!("http://{}", addr), handle)
}
