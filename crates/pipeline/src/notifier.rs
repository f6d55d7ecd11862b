//! Push-style job status streams.
//!
//! A subscription joins the job's hub channel before reading the store, so
//! no revision published in between is missed. It then yields the current
//! snapshot immediately and afterwards every newer revision, whether it
//! arrives as a hub push or is found by the periodic store resync (lagged
//! receiver, closed channel, writer in another process). A revision is
//! emitted only if its `updated_at` is newer than the last one emitted.
//!
//! The hub channel is released when the stream ends or is dropped, so
//! finished and unknown jobs leave nothing behind.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use omnidocs_core::job::Job;
use omnidocs_core::status_event::StatusEvent;
use omnidocs_core::types::JobId;
use omnidocs_db::JobStore;
use omnidocs_events::JobEventHub;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Lower bound on the resync period; `tokio::time::interval` rejects zero.
const MIN_RESYNC_INTERVAL: Duration = Duration::from_millis(1);

/// Factory for per-client status streams.
#[derive(Clone)]
pub struct StatusNotifier {
    store: Arc<dyn JobStore>,
    hub: JobEventHub,
    resync_interval: Duration,
}

impl StatusNotifier {
    pub fn new(store: Arc<dyn JobStore>, hub: JobEventHub, resync_interval: Duration) -> Self {
        Self {
            store,
            hub,
            resync_interval: resync_interval.max(MIN_RESYNC_INTERVAL),
        }
    }

    /// Open a status stream for `id`.
    ///
    /// The stream is lazy and ends after a terminal snapshot, a `NotFound`
    /// or a `DataLost` event. Dropping it only releases the subscription.
    pub fn subscribe(&self, id: JobId) -> BoxStream<'static, StatusEvent> {
        let subscription = Subscription {
            id,
            store: self.store.clone(),
            hub: self.hub.clone(),
            resync_interval: self.resync_interval,
            state: State::Idle,
            joined: false,
        };

        stream::unfold(subscription, |mut sub| async move {
            let event = sub.next_event().await?;
            Some((event, sub))
        })
        .boxed()
    }
}

enum State {
    Idle,
    Watching {
        /// `None` once the hub channel has closed.
        rx: Option<broadcast::Receiver<Job>>,
        resync: Interval,
        last: Job,
    },
    Done,
}

struct Subscription {
    id: JobId,
    store: Arc<dyn JobStore>,
    hub: JobEventHub,
    resync_interval: Duration,
    state: State,
    /// Whether this subscription may still hold a hub channel open.
    joined: bool,
}

impl Subscription {
    async fn next_event(&mut self) -> Option<StatusEvent> {
        let event = match std::mem::replace(&mut self.state, State::Done) {
            State::Idle => self.first_event().await,
            State::Watching { rx, resync, last } => self.watch(rx, resync, last).await,
            State::Done => return None,
        };

        if matches!(self.state, State::Done) && self.joined {
            self.joined = false;
            self.hub.release(self.id).await;
        }
        Some(event)
    }

    async fn first_event(&mut self) -> StatusEvent {
        let rx = self.hub.subscribe(self.id).await;
        self.joined = true;

        match self.store.get(self.id).await {
            Ok(Some(job)) => {
                let event = StatusEvent::from(&job);
                if !job.is_terminal() {
                    let mut resync = tokio::time::interval_at(
                        Instant::now() + self.resync_interval,
                        self.resync_interval,
                    );
                    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.state = State::Watching {
                        rx: Some(rx),
                        resync,
                        last: job,
                    };
                }
                event
            }
            Ok(None) => StatusEvent::not_found(),
            Err(e) => {
                tracing::warn!(job_id = %self.id, error = %e, "Failed to read job for status stream");
                StatusEvent::data_lost()
            }
        }
    }

    /// Wait for the next revision newer than `last`.
    async fn watch(
        &mut self,
        mut rx: Option<broadcast::Receiver<Job>>,
        mut resync: Interval,
        last: Job,
    ) -> StatusEvent {
        loop {
            let pushed = tokio::select! {
                received = recv(&mut rx) => match received {
                    Ok(job) => Some(job),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(job_id = %self.id, skipped, "Status stream lagged, resyncing");
                        None
                    }
                    Err(RecvError::Closed) => {
                        rx = None;
                        None
                    }
                },
                _ = resync.tick() => None,
            };

            let job = match pushed {
                Some(job) => job,
                None => match self.store.get(self.id).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        tracing::warn!(job_id = %self.id, "Job disappeared while streaming status");
                        return StatusEvent::data_lost();
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %self.id, error = %e, "Failed to re-read job for status stream");
                        return StatusEvent::data_lost();
                    }
                },
            };

            if !job.is_newer_than(&last) {
                continue;
            }

            let event = StatusEvent::from(&job);
            if !job.is_terminal() {
                self.state = State::Watching {
                    rx,
                    resync,
                    last: job,
                };
            }
            return event;
        }
    }
}

impl Drop for Subscription {
    /// A client that disconnects mid-stream drops the receiver together
    /// with the subscription; release the channel once that has happened.
    fn drop(&mut self) {
        if !self.joined {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let hub = self.hub.clone();
            let id = self.id;
            handle.spawn(async move { hub.release(id).await });
        }
    }
}

/// Receive from the hub, or wait forever once the channel is gone.
async fn recv(rx: &mut Option<broadcast::Receiver<Job>>) -> Result<Job, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
