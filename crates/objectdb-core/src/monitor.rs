//! Change monitor: the globally known tick and the waiters blocked on it.
//!
//! [`TickTracker`] is the state machine. [`ChangeMonitor`] is a cloneable
//! handle to a task that owns one tracker and serves commands over a
//! channel, so callers never share the state directly.
//!
//! Ticks learned from notifications or baseline queries go through
//! [`ChangeMonitor::observe`]. The tracker moves forward as if one tick at
//! a time, so a jump from 5 to 9 still releases waiters blocked on 6 and 8.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// The change monitor task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("change monitor stopped")]
pub struct MonitorStopped;

/// Known tick plus pending waiters.
#[derive(Debug, Default)]
pub struct TickTracker {
    known: Option<u64>,
    /// Callers of `current_tick` queued before the first observation.
    tick_waiters: Vec<oneshot::Sender<u64>>,
    /// Callers of `wait_for`, keyed by the exact tick they wait on.
    target_waiters: BTreeMap<u64, Vec<oneshot::Sender<()>>>,
}

impl TickTracker {
    /// A tracker that has not observed any tick.
    pub const fn new() -> Self {
        Self {
            known: None,
            tick_waiters: Vec::new(),
            target_waiters: BTreeMap::new(),
        }
    }

    /// The known tick, if any has been observed.
    pub const fn known(&self) -> Option<u64> {
        self.known
    }

    /// Number of `wait_for` callers still blocked.
    pub fn pending_targets(&self) -> usize {
        self.target_waiters.values().map(Vec::len).sum()
    }

    /// Answer `reply` with the known tick, or queue it until one is known.
    pub fn current_tick(&mut self, reply: oneshot::Sender<u64>) {
        match self.known {
            Some(tick) => {
                let _ = reply.send(tick);
            }
            None => self.tick_waiters.push(reply),
        }
    }

    /// Release `reply` once the known tick is at least `target`.
    pub fn wait_for(&mut self, target: u64, reply: oneshot::Sender<()>) {
        match self.known {
            Some(tick) if tick >= target => {
                let _ = reply.send(());
            }
            _ => self.target_waiters.entry(target).or_default().push(reply),
        }
    }

    /// Learn that tick `t` has committed. Returns how many waiters were
    /// released.
    ///
    /// Observing a tick at or below the known one releases nothing.
    pub fn observe(&mut self, t: u64) -> usize {
        let mut released = 0_usize;

        if self.known.is_none() {
            for waiter in self.tick_waiters.drain(..) {
                released = released.saturating_add(usize::from(waiter.send(t).is_ok()));
            }
        }
        if self.known.is_some_and(|known| known >= t) {
            return released;
        }

        // Same outcome as stepping one tick at a time, visiting only ticks
        // that have waiters.
        let ready: Vec<u64> = self.target_waiters.range(..=t).map(|(k, _)| *k).collect();
        for target in ready {
            released = released.saturating_add(self.release(target));
        }
        self.known = Some(t);
        released
    }

    fn release(&mut self, target: u64) -> usize {
        self.target_waiters.remove(&target).map_or(0, |waiters| {
            waiters
                .into_iter()
                .filter_map(|waiter| waiter.send(()).ok())
                .count()
        })
    }
}

enum Command {
    CurrentTick(oneshot::Sender<u64>),
    WaitFor(u64, oneshot::Sender<()>),
    Observe(u64),
}

/// Handle to the change monitor task.
#[derive(Debug, Clone)]
pub struct ChangeMonitor {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChangeMonitor {
    /// Spawn the monitor task. It runs until every handle is dropped.
    pub fn start() -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve(receiver));
        (Self { commands }, task)
    }

    /// The current tick, suspending until the first one is known.
    pub async fn current_tick(&self) -> Result<u64, MonitorStopped> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::CurrentTick(reply))?;
        answer.await.map_err(|e| {
            debug!(error = %e, "current_tick waiter dropped");
            MonitorStopped
        })
    }

    /// Suspend until the known tick is at least `target`.
    pub async fn wait_for(&self, target: u64) -> Result<(), MonitorStopped> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::WaitFor(target, reply))?;
        answer.await.map_err(|e| {
            debug!(error = %e, target, "wait_for waiter dropped");
            MonitorStopped
        })
    }

    /// Report that tick `t` has committed.
    pub fn observe(&self, t: u64) -> Result<(), MonitorStopped> {
        self.send(Command::Observe(t))
    }

    fn send(&self, command: Command) -> Result<(), MonitorStopped> {
        self.commands.send(command).map_err(|e| {
            debug!(error = %e, "change monitor channel closed");
            MonitorStopped
        })
    }
}

async fn serve(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut tracker = TickTracker::new();
    while let Some(command) = commands.recv().await {
        match command {
            Command::CurrentTick(reply) => tracker.current_tick(reply),
            Command::WaitFor(target, reply) => tracker.wait_for(target, reply),
            Command::Observe(t) => {
                let released = tracker.observe(t);
                debug!(tick = t, known = ?tracker.known(), released, "tick observed");
            }
        }
    }
}
