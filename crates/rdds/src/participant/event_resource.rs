// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Timer service: one thread, one deadline heap.
//!
//! All protocol periodics run here: heartbeat periods, nack/heartbeat
//! response delays, SPDP announcements, participant lease checks. Handlers
//! run on the event thread and take the endpoint mutex of whatever they
//! touch, so they must not block for long.
//!
//! Cancellation is by id: a cancelled event that is already in the heap is
//! skipped when it pops. Deleting an endpoint cancels its events before the
//! endpoint `Arc` is released; handlers additionally hold `Weak` references
//! so a late firing is a no-op, never a dangle.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Sender};

/// Handle used to cancel a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// What the event thread should do with a fired handler.
pub enum EventOutcome {
    /// Re-arm with the same period (periodic events).
    Again,
    /// Done; drop the event.
    Done,
}

type Handler = Box<dyn FnMut() -> EventOutcome + Send>;

enum Command {
    Schedule {
        id: EventId,
        delay: Duration,
        period: Option<Duration>,
        handler: Handler,
    },
    Cancel(EventId),
    Shutdown,
}

struct Scheduled {
    deadline: Instant,
    id: EventId,
    period: Option<Duration>,
    handler: Handler,
}

// Heap ordering: earliest deadline first (via Reverse in the heap).
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.id.0.cmp(&other.id.0))
    }
}

/// The participant's timer wheel.
pub struct EventResource {
    tx: Sender<Command>,
    next_id: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl EventResource {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<Command>(256);

        let handle = std::thread::Builder::new()
            .name("rdds-events".into())
            .spawn(move || {
                let mut heap: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
                let mut cancelled: HashSet<EventId> = HashSet::new();

                loop {
                    let timeout = heap
                        .peek()
                        .map(|Reverse(s)| s.deadline.saturating_duration_since(Instant::now()))
                        .unwrap_or(Duration::from_secs(3600));

                    match rx.recv_timeout(timeout) {
                        Ok(Command::Schedule {
                            id,
                            delay,
                            period,
                            handler,
                        }) => {
                            heap.push(Reverse(Scheduled {
                                deadline: Instant::now() + delay,
                                id,
                                period,
                                handler,
                            }));
                        }
                        Ok(Command::Cancel(id)) => {
                            cancelled.insert(id);
                        }
                        Ok(Command::Shutdown) => break,
                        Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
                    }

                    // Fire everything that is due.
                    while let Some(Reverse(next)) = heap.peek() {
                        if next.deadline > Instant::now() {
                            break;
                        }
                        let Some(Reverse(mut event)) = heap.pop() else {
                            break;
                        };
                        if cancelled.remove(&event.id) {
                            continue;
                        }
                        match (event.handler)() {
                            EventOutcome::Again => {
                                if let Some(period) = event.period {
                                    event.deadline = Instant::now() + period;
                                    heap.push(Reverse(event));
                                }
                            }
                            EventOutcome::Done => {}
                        }
                    }
                }
            })
            .expect("event thread spawn");

        Self {
            tx,
            next_id: AtomicU64::new(1),
            handle: Some(handle),
        }
    }

    /// Schedule a one-shot event after `delay`.
    pub fn schedule_once<F>(&self, delay: Duration, mut handler: F) -> EventId
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(delay, None, move || {
            handler();
            EventOutcome::Done
        })
    }

    /// Schedule a periodic event; the first firing happens after `period`.
    pub fn schedule_periodic<F>(&self, period: Duration, handler: F) -> EventId
    where
        F: FnMut() -> EventOutcome + Send + 'static,
    {
        self.schedule(period, Some(period), handler)
    }

    fn schedule<F>(&self, delay: Duration, period: Option<Duration>, handler: F) -> EventId
    where
        F: FnMut() -> EventOutcome + Send + 'static,
    {
        let id = EventId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(Command::Schedule {
            id,
            delay,
            period,
            handler: Box::new(handler),
        });
        id
    }

    /// Cancel a scheduled event. A concurrent in-flight firing may still
    /// complete; handlers guard with `Weak` upgrades for that reason.
    pub fn cancel(&self, id: EventId) {
        let _ = self.tx.send(Command::Cancel(id));
    }
}

impl Drop for EventResource {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for EventResource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_once_fires() {
        let events = EventResource::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();

        events.schedule_once(Duration::from_millis(10), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_periodic_fires_repeatedly() {
        let events = EventResource::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();

        events.schedule_periodic(Duration::from_millis(10), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
            EventOutcome::Again
        });

        std::thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let events = EventResource::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();

        let id = events.schedule_once(Duration::from_millis(100), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        events.cancel(id);

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_periodic_stops_on_done() {
        let events = EventResource::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();

        events.schedule_periodic(Duration::from_millis(10), move || {
            let n = fired2.fetch_add(1, Ordering::SeqCst);
            if n >= 2 {
                EventOutcome::Done
            } else {
                EventOutcome::Again
            }
        });

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_shutdown_on_drop_joins_thread() {
        let events = EventResource::new();
        events.schedule_once(Duration::from_secs(60), || {});
        drop(events); // must not hang
    }
}
