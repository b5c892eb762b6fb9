//! Message correlation.
//!
//! The [`Correlator`] is the only consumer of a channel's inbound stream. It
//! files every message under the id of the request that caused it and answers
//! "next message of type T for request R" queries. Nothing is ever removed: the
//! [`CorrelationStore`] keeps the full history for the final report.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::models::message::InboundMessage;
use crate::{AppError, Result};

/// Every correlated message of one run, grouped by originating request.
#[derive(Debug, Clone, Default)]
pub struct CorrelationStore {
    entries: HashMap<String, Vec<InboundMessage>>,
    order: Vec<String>,
}

impl CorrelationStore {
    /// File `message` under its parent id.
    ///
    /// Returns `false`, discarding the message, when it has no parent.
    pub fn record(&mut self, message: InboundMessage) -> bool {
        let Some(parent) = message.parent_id() else {
            return false;
        };

        if let Some(messages) = self.entries.get_mut(parent) {
            messages.push(message);
        } else {
            let parent = parent.to_owned();
            self.order.push(parent.clone());
            self.entries.insert(parent, vec![message]);
        }
        true
    }

    /// Messages caused by `request_id`, in arrival order.
    #[must_use]
    pub fn messages(&self, request_id: &str) -> &[InboundMessage] {
        self.entries.get(request_id).map_or(&[], Vec::as_slice)
    }

    /// Whether any message was caused by `request_id`.
    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Request ids in the order their first message arrived.
    pub fn request_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// `(request id, messages)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[InboundMessage])> {
        self.order
            .iter()
            .map(|id| (id.as_str(), self.messages(id)))
    }

    /// Number of distinct request ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has been correlated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// First stored message for `request_id` with `msg_type` matching `predicate`.
    pub fn find<P>(&self, request_id: &str, msg_type: &str, predicate: P) -> Option<&InboundMessage>
    where
        P: Fn(&InboundMessage) -> bool,
    {
        self.messages(request_id)
            .iter()
            .find(|m| m.has_type(msg_type) && predicate(*m))
    }

    fn find_where<P>(&self, predicate: P) -> Option<&InboundMessage>
    where
        P: Fn(&InboundMessage) -> bool,
    {
        self.order
            .iter()
            .flat_map(|id| self.messages(id))
            .find(|m| predicate(*m))
    }
}

/// Single consumer of a kernel's inbound message stream.
#[derive(Debug)]
pub struct Correlator {
    store: CorrelationStore,
    inbound: mpsc::Receiver<InboundMessage>,
}

impl Correlator {
    /// Take ownership of `inbound`.
    #[must_use]
    pub fn new(inbound: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            store: CorrelationStore::default(),
            inbound,
        }
    }

    /// Record one inbound message; unsolicited messages are dropped.
    pub fn observe(&mut self, message: InboundMessage) {
        let msg_type = message.msg_type().to_owned();
        if self.store.record(message) {
            trace!(%msg_type, "correlator: message recorded");
        } else {
            trace!(%msg_type, "correlator: unsolicited message ignored");
        }
    }

    /// Wait for the first message caused by `request_id` with type `msg_type`
    /// that satisfies `predicate`.
    ///
    /// Messages observed before the call count. The match stays in the store.
    /// There is no timeout; wrap the call in `tokio::time::timeout` if needed.
    /// Cancel-safe: dropping the future never loses a received message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the inbound stream closes first.
    pub async fn await_next<P>(
        &mut self,
        request_id: &str,
        msg_type: &str,
        predicate: P,
    ) -> Result<InboundMessage>
    where
        P: Fn(&InboundMessage) -> bool,
    {
        if let Some(found) = self.store.find(request_id, msg_type, &predicate) {
            return Ok(found.clone());
        }

        self.next_matching(|m| {
            m.parent_id() == Some(request_id) && m.has_type(msg_type) && predicate(m)
        })
        .await
    }

    /// Wait for the first correlated message satisfying `predicate`, across
    /// all request ids.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the inbound stream closes first.
    pub async fn await_where<P>(&mut self, predicate: P) -> Result<InboundMessage>
    where
        P: Fn(&InboundMessage) -> bool,
    {
        if let Some(found) = self.store.find_where(&predicate) {
            return Ok(found.clone());
        }
        self.next_matching(predicate).await
    }

    async fn next_matching<P>(&mut self, predicate: P) -> Result<InboundMessage>
    where
        P: Fn(&InboundMessage) -> bool,
    {
        loop {
            let Some(message) = self.inbound.recv().await else {
                return Err(AppError::Channel("inbound message stream closed".into()));
            };

            let matched = (message.parent_id().is_some() && predicate(&message))
                .then(|| message.clone());
            self.observe(message);

            if let Some(found) = matched {
                return Ok(found);
            }
        }
    }

    /// Record every message that arrives within `delay`.
    ///
    /// Returns early if the stream closes.
    pub async fn drain_for(&mut self, delay: Duration) {
        let deadline = tokio::time::Instant::now() + delay;
        let mut drained = 0usize;

        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, self.inbound.recv()).await {
            self.observe(message);
            drained += 1;
        }

        debug!(drained, ?delay, "correlator: drain finished");
    }

    /// Correlated messages so far.
    #[must_use]
    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    /// Give up the stream and keep the history.
    #[must_use]
    pub fn into_store(self) -> CorrelationStore {
        self.store
    }
}
