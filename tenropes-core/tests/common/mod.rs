#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::sync::Notify;

use tenropes_core::api::{ChatApi, LiveStream, LiveTransport};
use tenropes_core::models::{ChannelId, ChannelMetadata, Content, Message, UserMetadata};

pub const CHANNEL: ChannelId = 7;

pub fn text_message(channel: ChannelId, author: &str, millis: i64, body: &str) -> Message {
    Message {
        id: None,
        channel_id: channel,
        author: author.to_string(),
        timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
        content: Content::Text(body.to_string()),
    }
}

/// `count` messages oldest to newest, the way the server orders a page.
pub fn page(channel: ChannelId, first_millis: i64, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let millis = first_millis + i as i64 * 1000;
            text_message(channel, "alice", millis, &format!("message {millis}"))
        })
        .collect()
}

pub fn push_payload(channel: ChannelId, author: &str, millis: i64, body: &str) -> String {
    serde_json::json!({
        "channel_id": channel,
        "timestamp": millis,
        "author": author,
        "content": { "type": "Text", "value": body },
    })
    .to_string()
}

pub fn channel(id: ChannelId) -> ChannelMetadata {
    ChannelMetadata {
        id,
        name: "general".to_string(),
        img: String::new(),
        creator: "alice".to_string(),
        theme: None,
        users: vec!["alice".to_string(), "bob".to_string()],
    }
}

/// Holds history fetches (other than the initial page) until released.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeApi {
    /// offset -> page; offsets without an entry return an empty page
    pub pages: Mutex<HashMap<usize, Vec<Message>>>,
    pub failing_offsets: Mutex<Vec<usize>>,
    pub requested_offsets: Mutex<Vec<usize>>,
    pub members: Vec<UserMetadata>,
    pub fail_members: bool,
    pub fail_send: AtomicBool,
    pub sent: Mutex<Vec<(ChannelId, Content)>>,
    pub gate: Option<Gate>,
    pub history_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_pages(pages: Vec<(usize, Vec<Message>)>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn fail_at(&self, offset: usize) {
        self.failing_offsets.lock().unwrap().push(offset);
    }

    pub fn recover_at(&self, offset: usize) {
        self.failing_offsets.lock().unwrap().retain(|o| *o != offset);
    }

    pub fn sent(&self) -> Vec<(ChannelId, Content)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn fetch_channel_history(
        &self,
        channel_id: ChannelId,
        offset: usize,
    ) -> Result<Vec<Message>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_offsets.lock().unwrap().push(offset);

        if offset > 0 {
            if let Some(gate) = &self.gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
        }

        if self.failing_offsets.lock().unwrap().contains(&offset) {
            return Err(anyhow!("connection reset fetching channel {channel_id}"));
        }

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&offset)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_members(&self, _usernames: &[String]) -> Result<Vec<UserMetadata>> {
        if self.fail_members {
            return Err(anyhow!("members unavailable"));
        }
        Ok(self.members.clone())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &Content) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(anyhow!("cannot send message with status 500"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, content.clone()));
        Ok(())
    }

    async fn fetch_channels(&self) -> Result<Vec<ChannelMetadata>> {
        Ok(vec![channel(CHANNEL)])
    }
}

/// Live transport fed by the test through an unbounded channel.
pub struct FakeTransport {
    stream: Mutex<Option<LiveStream>>,
}

impl FakeTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<String>>) {
        let (sender, receiver) = mpsc::unbounded();
        let transport = Self {
            stream: Mutex::new(Some(receiver.boxed())),
        };
        (transport, sender)
    }

    pub fn refusing() -> Self {
        Self {
            stream: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn subscribe(&self, _channel_id: ChannelId) -> Result<LiveStream> {
        self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}
