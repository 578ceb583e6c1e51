//! One focus session on a channel: the feed, its live subscription and the
//! pagination requests made while the channel is on screen.
//!
//! Everything is discarded on [`ChannelSession::close`]; refocusing the channel
//! opens a new session. Results of requests still in flight at close time are
//! dropped instead of being applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::api::{ChatApi, LiveStream, LiveTransport};
use crate::compose::Draft;
use crate::context::SessionContext;
use crate::feed::{Feed, HistoryProgress, LivePolicy};
use crate::models::{ChannelId, ChannelMetadata, Message, UserMetadata};

/// Set once when a session is torn down; checked by every async completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Notifications sent to the shell while the session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Pushed(Message),
    Dropped(String),
    /// The live connection ended on its own.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOlder {
    /// Another fetch is in flight, history is exhausted, or the feed is not loaded yet.
    Skipped,
    Appended(usize),
    Exhausted,
    /// The session was closed while the page was being fetched.
    Stale,
}

#[derive(Debug, Default)]
pub struct SessionOptions {
    pub policy: LivePolicy,
    pub events: Option<mpsc::UnboundedSender<FeedEvent>>,
}

pub struct ChannelSession<A: ChatApi + 'static> {
    channel: ChannelId,
    api: Arc<A>,
    feed: Arc<Mutex<Feed>>,
    members: Mutex<Vec<UserMetadata>>,
    cancel: CancelFlag,
    context: SessionContext,
    live_task: Option<JoinHandle<()>>,
}

impl<A: ChatApi + 'static> ChannelSession<A> {
    /// Focuses `channel`: subscribes to live pushes, then loads the first history
    /// page and the member list. Failures are logged and leave the feed (or the
    /// member list) empty; the session is usable either way.
    pub async fn open<T>(
        channel: &ChannelMetadata,
        api: Arc<A>,
        transport: &T,
        context: SessionContext,
        options: SessionOptions,
    ) -> Self
    where
        T: LiveTransport + ?Sized,
    {
        let channel_id = channel.id;
        info!("opening channel {} ({})", channel_id, channel.name);
        context.set_active_channel(Some(channel_id));

        // built before any await so that dropping this future still tears it down
        let mut session = Self {
            channel: channel_id,
            api,
            feed: Arc::new(Mutex::new(Feed::new(channel_id, options.policy))),
            members: Mutex::new(Vec::new()),
            cancel: CancelFlag::default(),
            context,
            live_task: None,
        };

        match transport.subscribe(channel_id).await {
            Ok(stream) => {
                session.live_task = Some(tokio::spawn(pump_live(
                    stream,
                    channel_id,
                    session.feed.clone(),
                    session.cancel.clone(),
                    options.events,
                )));
            }
            Err(e) => error!("no live updates for channel {channel_id}: {e:#}"),
        }

        let (history, members) = tokio::join!(
            session.api.fetch_channel_history(channel_id, 0),
            session.api.fetch_members(&channel.users),
        );

        match history {
            Ok(page) if !session.cancel.is_cancelled() => {
                session.feed.lock().await.apply_initial(page)
            }
            Ok(_) => debug!("channel {channel_id} closed before its history arrived"),
            Err(e) => error!("failed to load messages of channel {channel_id}: {e:#}"),
        }

        match members {
            Ok(list) => *session.members.lock().await = list,
            Err(e) => warn!("failed to load members of channel {channel_id}: {e:#}"),
        }

        session
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Read access to the feed. Do not hold the guard across an await.
    pub async fn feed(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().await
    }

    /// Snapshot of the feed, newest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.feed.lock().await.messages().to_vec()
    }

    pub async fn members(&self) -> Vec<UserMetadata> {
        self.members.lock().await.clone()
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .live_task
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches the next older page. Only one fetch runs at a time; extra calls
    /// return [`LoadOlder::Skipped`] without touching the network.
    pub async fn load_older(&self) -> Result<LoadOlder> {
        if self.cancel.is_cancelled() {
            return Ok(LoadOlder::Stale);
        }

        let Some(next_offset) = self.feed.lock().await.begin_older() else {
            return Ok(LoadOlder::Skipped);
        };
        let mut pending = PendingHistory::new(self.feed.clone());

        let requested_for = self.channel;
        debug!("channel {requested_for}: loading history at offset {next_offset}");
        let page = self
            .api
            .fetch_channel_history(requested_for, next_offset)
            .await;

        let mut feed = self.feed.lock().await;
        pending.disarm();
        if self.cancel.is_cancelled() || feed.channel() != requested_for {
            debug!("channel {requested_for}: discarding history fetched after close");
            return Ok(LoadOlder::Stale);
        }

        match feed.finish_older(next_offset, page) {
            Ok(HistoryProgress::Appended(count)) => Ok(LoadOlder::Appended(count)),
            Ok(HistoryProgress::Exhausted) => {
                info!("channel {requested_for}: reached the beginning of history");
                Ok(LoadOlder::Exhausted)
            }
            Err(e) => {
                warn!("channel {requested_for}: failed to load history: {e:#}");
                Err(e.context(format!(
                    "Failed to load history of channel {requested_for} at offset {next_offset}"
                )))
            }
        }
    }

    /// Sends the draft. The message is not inserted locally, it comes back through
    /// the live feed. The draft is cleared only on success. Returns `false` when
    /// the draft was blank and nothing was sent.
    pub async fn send(&self, draft: &mut Draft) -> Result<bool> {
        let Some(content) = draft.outgoing() else {
            return Ok(false);
        };

        self.api
            .send_message(self.channel, &content)
            .await
            .with_context(|| format!("Failed to send message to channel {}", self.channel))?;

        draft.clear();
        Ok(true)
    }

    /// Tears the session down: closes the live connection and makes pending
    /// completions no-ops. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("closing channel {}", self.channel);
        }
        self.cancel.cancel();
        if let Some(task) = &self.live_task {
            task.abort();
        }
        self.context.leave_channel(self.channel);
    }
}

/// Reopens the history gate when a `load_older` future is dropped mid-fetch.
struct PendingHistory {
    feed: Arc<Mutex<Feed>>,
    armed: bool,
}

impl PendingHistory {
    fn new(feed: Arc<Mutex<Feed>>) -> Self {
        Self { feed, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingHistory {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        debug!("history fetch abandoned before completion");
        match self.feed.try_lock() {
            Ok(mut feed) => feed.abandon_older(),
            Err(_) => {
                // the live pump holds the lock briefly, finish the reset once it lets go
                if let Ok(runtime) = Handle::try_current() {
                    let feed = self.feed.clone();
                    runtime.spawn(async move { feed.lock().await.abandon_older() });
                }
            }
        }
    }
}

impl<A: ChatApi + 'static> Drop for ChannelSession<A> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump_live(
    mut stream: LiveStream,
    channel: ChannelId,
    feed: Arc<Mutex<Feed>>,
    cancel: CancelFlag,
    events: Option<mpsc::UnboundedSender<FeedEvent>>,
) {
    let notify = |event: FeedEvent| {
        if let Some(events) = &events {
            let _ = events.send(event);
        }
    };

    while let Some(frame) = stream.next().await {
        if cancel.is_cancelled() {
            return;
        }

        match frame.and_then(|raw| Message::parse(&raw)) {
            Ok(message) => {
                let inserted = feed.lock().await.push_live(message.clone());
                if inserted {
                    notify(FeedEvent::Pushed(message));
                }
            }
            Err(e) => {
                warn!("channel {channel}: dropping live event: {e:#}");
                notify(FeedEvent::Dropped(format!("{e:#}")));
            }
        }
    }

    if !cancel.is_cancelled() {
        info!("live feed of channel {channel} ended");
        notify(FeedEvent::Disconnected);
    }
}
