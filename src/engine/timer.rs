//! Timed transitions.
//!
//! Every timed transition whose source is active owns one tokio task that
//! sleeps for the period and submits a tick through the machine's command
//! queue, so ticks are serialized with ordinary events. Each arming gets a
//! fresh epoch; ticks carrying an older epoch are discarded.

use super::machine::Command;
use crate::core::{EventKey, StateKey, TimerSpec};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

struct Armed {
    epoch: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct Timers<S: StateKey, E: EventKey> {
    sender: Option<UnboundedSender<Command<S, E>>>,
    armed: HashMap<usize, Armed>,
    next_epoch: u64,
}

impl<S: StateKey, E: EventKey> Timers<S, E> {
    pub fn new() -> Self {
        Self {
            sender: None,
            armed: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Ticks are only produced once a queue is attached.
    pub fn attach(&mut self, sender: UnboundedSender<Command<S, E>>) {
        self.sender = Some(sender);
    }

    pub fn arm(&mut self, spec: TimerSpec) {
        self.cancel(spec.transition);
        let Some(sender) = self.sender.clone() else {
            return;
        };

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let TimerSpec {
            transition,
            period,
            count,
        } = spec;

        let handle = tokio::spawn(async move {
            let mut fired = 0u32;
            loop {
                tokio::time::sleep(period).await;
                if sender.send(Command::Tick { transition, epoch }).is_err() {
                    break;
                }
                fired += 1;
                if count.is_some_and(|limit| fired >= limit) {
                    break;
                }
            }
        });

        tracing::debug!(transition, epoch, ?period, "timer armed");
        self.armed.insert(transition, Armed { epoch, handle });
    }

    pub fn cancel(&mut self, transition: usize) {
        if let Some(armed) = self.armed.remove(&transition) {
            armed.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
    }

    /// True when a tick belongs to the current arming of its transition.
    pub fn is_current(&self, transition: usize, epoch: u64) -> bool {
        self.armed
            .get(&transition)
            .is_some_and(|armed| armed.epoch == epoch)
    }

    #[cfg(test)]
    fn is_armed(&self, transition: usize) -> bool {
        self.armed.contains_key(&transition)
    }
}

impl<S: StateKey, E: EventKey> Drop for Timers<S, E> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn spec(transition: usize, count: Option<u32>) -> TimerSpec {
        TimerSpec {
            transition,
            period: Duration::from_millis(5),
            count,
        }
    }

    #[tokio::test]
    async fn counted_timer_ticks_then_stops() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<String, String>>();
        let mut timers = Timers::new();
        timers.attach(tx);

        timers.arm(spec(3, Some(2)));

        let mut ticks = 0;
        while let Ok(Some(command)) =
            tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
        {
            if let Command::Tick { transition, epoch } = command {
                assert_eq!(transition, 3);
                assert!(timers.is_current(transition, epoch));
                ticks += 1;
            }
        }
        assert_eq!(ticks, 2);
    }

    #[tokio::test]
    async fn rearming_invalidates_old_epoch() {
        let (tx, _rx) = mpsc::unbounded_channel::<Command<String, String>>();
        let mut timers = Timers::new();
        timers.attach(tx);

        timers.arm(spec(0, None));
        assert!(timers.is_current(0, 0));

        timers.arm(spec(0, None));
        assert!(!timers.is_current(0, 0));
        assert!(timers.is_current(0, 1));

        timers.cancel(0);
        assert!(!timers.is_armed(0));
    }

    #[tokio::test]
    async fn detached_timers_never_arm() {
        let mut timers: Timers<String, String> = Timers::new();
        timers.arm(spec(1, Some(1)));
        assert!(!timers.is_armed(1));
    }
}
