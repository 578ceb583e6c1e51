//! Ordered, newest-first message feed of one channel.
//!
//! The feed is filled from three sources: the initial history page, older
//! history pages appended at the tail, and live pushes prepended at the head.
//! Live pushes are never re-sorted by timestamp.

use std::collections::HashSet;

use anyhow::Result;
use log::debug;

use crate::models::{ChannelId, Message, MessageKey};

/// Messages per history page; the pagination cursor moves by this much.
pub const PAGE_SIZE: usize = 40;

/// What to do with a message that is already in the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LivePolicy {
    /// Insert everything, duplicates included.
    #[default]
    Prepend,
    /// Skip pushes and history items whose identity is already present.
    Dedupe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryProgress {
    /// The page held messages; the count is how many were inserted.
    Appended(usize),
    /// The page was empty, there is nothing older.
    Exhausted,
}

#[derive(Debug)]
pub struct Feed {
    channel: ChannelId,
    policy: LivePolicy,
    messages: Vec<Message>,
    keys: HashSet<MessageKey>,
    batch_offset: usize,
    has_more: bool,
    fetching_history: bool,
    loaded: bool,
}

impl Feed {
    pub fn new(channel: ChannelId, policy: LivePolicy) -> Self {
        Self {
            channel,
            policy,
            messages: Vec::new(),
            keys: HashSet::new(),
            batch_offset: 0,
            has_more: true,
            fetching_history: false,
            loaded: false,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn policy(&self) -> LivePolicy {
        self.policy
    }

    /// Newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn batch_offset(&self) -> usize {
        self.batch_offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_fetching_history(&self) -> bool {
        self.fetching_history
    }

    /// Whether the initial page has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn is_known(&self, message: &Message) -> bool {
        self.policy == LivePolicy::Dedupe && self.keys.contains(&message.key())
    }

    /// Applies the first history page (oldest first, as served). Pushes that
    /// arrived while it was loading stay in front of it.
    pub fn apply_initial(&mut self, page: Vec<Message>) {
        let before = self.messages.len();
        for message in page.into_iter().rev() {
            if self.is_known(&message) {
                continue;
            }
            self.keys.insert(message.key());
            self.messages.push(message);
        }
        self.loaded = true;
        debug!(
            "channel {}: initial page applied, {} messages ({} pushed while loading)",
            self.channel,
            self.messages.len(),
            before
        );
    }

    /// Prepends a live message. Returns `false` when it was not inserted, because
    /// it belongs to another channel or, with [`LivePolicy::Dedupe`], is already shown.
    pub fn push_live(&mut self, message: Message) -> bool {
        if message.channel_id != self.channel {
            debug!(
                "channel {}: ignoring push for channel {}",
                self.channel, message.channel_id
            );
            return false;
        }
        if self.is_known(&message) {
            debug!("channel {}: duplicate push skipped", self.channel);
            return false;
        }

        self.keys.insert(message.key());
        self.messages.insert(0, message);
        true
    }

    /// Single-flight gate for older history. Returns the offset to fetch, or `None`
    /// while the initial page is missing, a fetch is in flight, or history is exhausted.
    pub fn begin_older(&mut self) -> Option<usize> {
        if !self.loaded || self.fetching_history || !self.has_more {
            return None;
        }

        self.fetching_history = true;
        Some(self.batch_offset + PAGE_SIZE)
    }

    /// Reopens the gate after a fetch started by [`Feed::begin_older`] was given up
    /// without a result. The cursor is left where it was.
    pub fn abandon_older(&mut self) {
        self.fetching_history = false;
    }

    /// Completes the fetch started by [`Feed::begin_older`]. A failed fetch leaves
    /// the cursor where it was so the same page can be retried.
    pub fn finish_older(
        &mut self,
        next_offset: usize,
        page: Result<Vec<Message>>,
    ) -> Result<HistoryProgress> {
        self.fetching_history = false;
        let page = page?;

        if page.is_empty() {
            self.has_more = false;
            return Ok(HistoryProgress::Exhausted);
        }

        let mut appended = 0;
        for message in page.into_iter().rev() {
            if self.is_known(&message) {
                continue;
            }
            self.keys.insert(message.key());
            self.messages.push(message);
            appended += 1;
        }
        self.batch_offset = next_offset;

        Ok(HistoryProgress::Appended(appended))
    }
}
