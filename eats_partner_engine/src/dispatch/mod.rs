//! Asynchronous event dispatch.
//!
//! The webhook endpoint acknowledges receipt as soon as an event is stored; everything after that happens here,
//! decoupled from the request path so a slow handler can never block an acknowledgment. The dispatcher owns:
//!
//! * a work channel fed by the ingestion endpoint, the manual-retry interface and the startup recovery scan,
//! * a retry schedule: a min-heap keyed by next-attempt time, drained as entries come due,
//! * a bounded pool of in-flight processing runs.
//!
//! A scheduled retry leaves the queue only when it comes due or when an operator explicitly cancels it.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
};

use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::*;
use tokio::sync::mpsc;

use crate::{
    api::{EventFlowApi, ProcessOutcome},
    traits::{EventManagement, OrderManagement, PartnerGateway},
};

const DEFAULT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub enum DispatchMessage {
    /// Process the event as soon as a worker slot is free.
    Process(i64),
    /// Process the event no earlier than `run_at`.
    Schedule { event_id: i64, run_at: DateTime<Utc> },
    /// Remove a scheduled retry from the queue. Operator action only.
    CancelRetry(i64),
}

/// Cloneable handle for feeding the dispatcher.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DispatchMessage>,
}

impl DispatchHandle {
    pub async fn submit(&self, event_id: i64) {
        if let Err(e) = self.tx.send(DispatchMessage::Process(event_id)).await {
            error!("🚚️ Could not submit event #{event_id} for dispatch: {e}");
        }
    }

    pub async fn schedule(&self, event_id: i64, run_at: DateTime<Utc>) {
        if let Err(e) = self.tx.send(DispatchMessage::Schedule { event_id, run_at }).await {
            error!("🚚️ Could not schedule event #{event_id}: {e}");
        }
    }

    pub async fn cancel_retry(&self, event_id: i64) {
        if let Err(e) = self.tx.send(DispatchMessage::CancelRetry(event_id)).await {
            error!("🚚️ Could not cancel retry for event #{event_id}: {e}");
        }
    }
}

pub fn dispatch_channel() -> (DispatchHandle, mpsc::Receiver<DispatchMessage>) {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    (DispatchHandle { tx }, rx)
}

/// Runs the dispatch loop until every [`DispatchHandle`] has been dropped, then drains the in-flight pool.
///
/// At most `max_concurrent` events are processed at once; excess due work waits for a slot. Retries requested by
/// processing runs feed straight back into the schedule without a round trip through the channel.
pub async fn run_dispatcher<B, G>(
    api: EventFlowApi<B, G>,
    mut rx: mpsc::Receiver<DispatchMessage>,
    max_concurrent: usize,
) where
    B: EventManagement + OrderManagement + Clone,
    G: PartnerGateway + Clone,
{
    info!("🚚️ Event dispatcher started (worker pool size {max_concurrent})");
    let mut schedule: BinaryHeap<Reverse<(i64, i64)>> = BinaryHeap::new();
    let mut cancelled: HashSet<i64> = HashSet::new();
    let mut in_flight = FuturesUnordered::new();
    loop {
        // Start everything that is due while there is capacity.
        let now = Utc::now().timestamp_millis();
        while in_flight.len() < max_concurrent {
            match schedule.peek() {
                Some(Reverse((due, _))) if *due <= now => {
                    let Reverse((_, event_id)) = schedule.pop().expect("peeked entry vanished");
                    if cancelled.remove(&event_id) {
                        debug!("🚚️ Dropping cancelled retry for event #{event_id}");
                        continue;
                    }
                    let api = api.clone();
                    in_flight.push(async move { (event_id, api.process_event(event_id).await) });
                },
                _ => break,
            }
        }
        let next_due = schedule.peek().map(|Reverse((due, _))| *due);
        tokio::select! {
            msg = rx.recv() => match msg {
                None => break,
                Some(DispatchMessage::Process(event_id)) => {
                    cancelled.remove(&event_id);
                    schedule.push(Reverse((Utc::now().timestamp_millis(), event_id)));
                },
                Some(DispatchMessage::Schedule { event_id, run_at }) => {
                    cancelled.remove(&event_id);
                    schedule.push(Reverse((run_at.timestamp_millis(), event_id)));
                },
                Some(DispatchMessage::CancelRetry(event_id)) => {
                    cancelled.insert(event_id);
                },
            },
            Some((event_id, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                handle_outcome(event_id, outcome, &mut schedule);
            },
            _ = sleep_until_millis(next_due), if next_due.is_some() && in_flight.len() < max_concurrent => {},
        }
    }
    debug!("🚚️ Dispatch channel closed. Draining {} in-flight event(s)", in_flight.len());
    while let Some((event_id, outcome)) = in_flight.next().await {
        if let ProcessOutcome::Retry { at } = outcome {
            warn!("🚚️ Event #{event_id} wanted a retry at {at}, but the dispatcher is shutting down");
        }
    }
    info!("🚚️ Event dispatcher has shut down");
}

fn handle_outcome(event_id: i64, outcome: ProcessOutcome, schedule: &mut BinaryHeap<Reverse<(i64, i64)>>) {
    match outcome {
        ProcessOutcome::Retry { at } => {
            trace!("🚚️ Event #{event_id} rescheduled for {at}");
            schedule.push(Reverse((at.timestamp_millis(), event_id)));
        },
        ProcessOutcome::Processed => trace!("🚚️ Event #{event_id} completed"),
        ProcessOutcome::Failed => trace!("🚚️ Event #{event_id} failed permanently"),
        ProcessOutcome::Skipped => trace!("🚚️ Event #{event_id} skipped"),
    }
}

async fn sleep_until_millis(due: Option<i64>) {
    match due {
        Some(due) => {
            let now = Utc::now().timestamp_millis();
            if due > now {
                #[allow(clippy::cast_sign_loss)]
                tokio::time::sleep(std::time::Duration::from_millis((due - now) as u64)).await;
            }
        },
        None => std::future::pending().await,
    }
}
