//! Mock inference endpoint shared by the integration tests.
#![allow(dead_code)]

use arogya_lib::ai::gemini;
use arogya_lib::ai::{AiError, InferenceClient, RetryPolicy, Transport, TransportResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use url::Url;

/// A canned reply: an HTTP exchange, or a connection failure.
#[derive(Clone)]
pub enum Reply {
    Http(u16, String),
    Drop(String),
}

pub fn ok_text(text: &str) -> Reply {
    Reply::Http(
        200,
        json!({ "candidates": [ { "content": { "parts": [ { "text": text } ] } } ] }).to_string(),
    )
}

pub struct Call {
    pub at: Instant,
    pub body: Value,
}

/// Replays `replies` in order, then `fallback` forever.
pub struct MockEndpoint {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<Call>>,
    called: Notify,
    gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockEndpoint {
    pub fn new(replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            called: Notify::new(),
            gate: tokio::sync::Mutex::new(None),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(Vec::new(), reply)
    }

    /// The first call blocks until the returned sender fires.
    pub fn gated(reply: Reply) -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let endpoint = Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply,
            calls: Mutex::new(Vec::new()),
            called: Notify::new(),
            gate: tokio::sync::Mutex::new(Some(rx)),
        });
        (endpoint, tx)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|c| c.at).collect()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.calls.lock().unwrap().iter().map(|c| c.body.clone()).collect()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            self.called.notified().await;
        }
    }
}

#[async_trait]
impl Transport for MockEndpoint {
    async fn post_json(&self, _url: &Url, body: &Value) -> Result<TransportResponse, AiError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            body: body.clone(),
        });
        self.called.notify_one();

        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Http(status, body) => Ok(TransportResponse { status, body }),
            Reply::Drop(reason) => Err(AiError::ConnectionError(reason)),
        }
    }
}

pub fn client_for(endpoint: Arc<MockEndpoint>) -> Arc<InferenceClient> {
    let url = gemini::endpoint_url("https://example.invalid", "test-model", "test-key").unwrap();
    Arc::new(InferenceClient::new(endpoint, url, RetryPolicy::default()))
}
