//! Request dispatch
//!
//! Two modes over the same per-request logic ([`apply`]):
//!
//! - **Sequential**: one loop reads, applies and emits in arrival order.
//! - **Parallel**: the calling thread is the producer. It decodes requests
//!   and enqueues them on a [`LockFreeQueue`]; N consumer threads dequeue,
//!   apply and emit. Idle consumers park on a [`WakeSignal`], which also
//!   carries the shutdown flag.
//!
//! Shutdown protocol (parallel):
//!
//! 1. On DONE the producer raises shutdown, enqueues the DONE request
//!    and wakes every consumer.
//! 2. A consumer that dequeues DONE wakes all the others.
//! 3. A consumer exits only when shutdown was already raised before a
//!    dequeue came back empty, so everything enqueued before DONE is
//!    drained first.
//! 4. The producer joins all consumers before returning.
//!
//! End of input and decode failures also raise shutdown; otherwise
//! parked consumers would never be released.
//!
//! In parallel mode each feed operation is linearizable, but responses
//! for different requests may be emitted in any order.

use crate::codec::ResponseSink;
use crate::config::{Mode, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::feed::TimeOrderedFeed;
use crate::request::{Command, Request, Response};
use chirp_core::{LockFreeQueue, WakeSignal};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread;

/// Apply one request to the feed
///
/// Returns the response to emit, or `None` for DONE.
pub fn apply(feed: &TimeOrderedFeed, request: Request) -> Option<Response> {
    let Request { command, id, body, timestamp } = request;
    let response = match command {
        Command::Add => {
            feed.add(body, timestamp);
            Response::Status { success: true, id }
        }
        Command::Remove => Response::Status { success: feed.remove(timestamp), id },
        Command::Contains => Response::Status { success: feed.contains(timestamp), id },
        Command::Feed => Response::Feed { id, feed: feed.snapshot() },
        Command::Done => return None,
    };
    Some(response)
}

/// Counters from one [`Dispatcher::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests decoded, excluding DONE
    pub requests: usize,

    /// Responses emitted
    pub responses: usize,

    /// Whether input ended with an explicit DONE
    pub saw_done: bool,
}

/// What the producer (or the sequential loop) observed on its input
struct Intake {
    requests: usize,
    saw_done: bool,
    failure: Option<ServerError>,
}

/// Applies a request stream to a shared feed
pub struct Dispatcher {
    feed: Arc<TimeOrderedFeed>,
    config: ServerConfig,
}

impl Dispatcher {
    pub fn new(feed: Arc<TimeOrderedFeed>, config: ServerConfig) -> Self {
        Self { feed, config }
    }

    pub fn feed(&self) -> &Arc<TimeOrderedFeed> {
        &self.feed
    }

    /// Process `requests` until DONE, end of input, or a fatal error
    ///
    /// A decode failure stops intake and is returned as the error after
    /// already-accepted requests have been answered.
    pub fn run<I, S>(&self, requests: I, sink: &S) -> ServerResult<DispatchStats>
    where
        I: IntoIterator<Item = ServerResult<Request>>,
        S: ResponseSink + ?Sized,
    {
        self.config.validate()?;
        info!(
            "dispatch starting: mode={} consumers={}",
            self.config.mode,
            if self.config.mode == Mode::Parallel { self.config.consumers } else { 1 }
        );

        let stats = match self.config.mode {
            Mode::Sequential => self.run_sequential(requests, sink)?,
            Mode::Parallel => self.run_parallel(requests, sink)?,
        };

        info!(
            "dispatch finished: {} requests, {} responses",
            stats.requests, stats.responses
        );
        Ok(stats)
    }

    fn run_sequential<I, S>(&self, requests: I, sink: &S) -> ServerResult<DispatchStats>
    where
        I: IntoIterator<Item = ServerResult<Request>>,
        S: ResponseSink + ?Sized,
    {
        let mut stats = DispatchStats::default();

        for item in requests {
            let request = item.map_err(|e| {
                error!("stopping on undecodable request: {}", e);
                e
            })?;
            if request.is_done() {
                stats.saw_done = true;
                break;
            }
            stats.requests += 1;
            if let Some(response) = apply(&self.feed, request) {
                sink.emit(&response)?;
                stats.responses += 1;
            }
        }

        if !stats.saw_done {
            warn!("input ended without DONE");
        }
        Ok(stats)
    }

    fn run_parallel<I, S>(&self, requests: I, sink: &S) -> ServerResult<DispatchStats>
    where
        I: IntoIterator<Item = ServerResult<Request>>,
        S: ResponseSink + ?Sized,
    {
        let queue = LockFreeQueue::new();
        let signal = WakeSignal::new();

        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(self.config.consumers);
            for index in 0..self.config.consumers {
                let (queue, signal) = (&queue, &signal);
                let spawned = thread::Builder::new()
                    .name(format!("chirp-consumer-{}", index))
                    .spawn_scoped(scope, move || self.consume(index, queue, signal, sink));

                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        // Release the consumers already started so the scope can join them
                        signal.shutdown();
                        return Err(ServerError::Spawn(e));
                    }
                }
            }

            let intake = self.produce(requests, &queue, &signal);

            let mut stats = DispatchStats {
                requests: intake.requests,
                saw_done: intake.saw_done,
                ..DispatchStats::default()
            };
            let mut failure = intake.failure;

            for handle in workers {
                match handle.join() {
                    Ok(Ok(emitted)) => stats.responses += emitted,
                    Ok(Err(e)) => {
                        failure.get_or_insert(e);
                    }
                    Err(_) => {
                        failure.get_or_insert(ServerError::WorkerPanicked);
                    }
                }
            }

            match failure {
                Some(e) => Err(e),
                None => Ok(stats),
            }
        })
    }

    /// Producer side: decode, enqueue, and always finish by raising shutdown
    fn produce<I>(&self, requests: I, queue: &LockFreeQueue<Request>, signal: &WakeSignal) -> Intake
    where
        I: IntoIterator<Item = ServerResult<Request>>,
    {
        let mut intake = Intake { requests: 0, saw_done: false, failure: None };

        for item in requests {
            match item {
                Ok(request) if request.is_done() => {
                    intake.saw_done = true;
                    signal.raise_shutdown();
                    queue.enqueue(request);
                    signal.wake_all();
                    return intake;
                }
                Ok(request) => {
                    queue.enqueue(request);
                    intake.requests += 1;
                    signal.wake_one();
                }
                Err(e) => {
                    error!("stopping on undecodable request: {}", e);
                    intake.failure = Some(e);
                    break;
                }
            }
        }

        if intake.failure.is_none() {
            warn!("input ended without DONE");
        }
        signal.shutdown();
        intake
    }

    /// Consumer side: drain the queue until it is empty after shutdown
    fn consume<S>(
        &self,
        index: usize,
        queue: &LockFreeQueue<Request>,
        signal: &WakeSignal,
        sink: &S,
    ) -> ServerResult<usize>
    where
        S: ResponseSink + ?Sized,
    {
        debug!("consumer {} started", index);
        let mut emitted = 0;

        loop {
            // Read the flag before dequeuing. Shutdown is raised only after
            // the last request is enqueued, so an empty dequeue that follows
            // a raised flag means the queue is drained.
            let stopping = signal.is_shutdown();
            match queue.dequeue() {
                Some(request) if request.is_done() => {
                    signal.wake_all();
                }
                Some(request) => {
                    if let Some(response) = apply(&self.feed, request) {
                        if let Err(e) = sink.emit(&response) {
                            error!("consumer {} failed to emit response {}: {}", index, response.id(), e);
                            return Err(e);
                        }
                        emitted += 1;
                    }
                }
                None if stopping => break,
                None => {
                    signal.park();
                }
            }
        }

        debug!("consumer {} exiting after {} responses", index, emitted);
        Ok(emitted)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("feed", &self.feed)
            .field("config", &self.config)
            .finish()
    }
}
