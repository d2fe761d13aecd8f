use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{MuxError, Result, Terminal};

/// Per-channel flow-control state: sent-but-unacknowledged packet count
/// and the pending-attention flag.
#[derive(Debug, Default)]
struct ChannelWindow {
    outstanding: u8,
    attention_pending: bool,
}

#[derive(Debug, Default)]
struct FlowState {
    channels: HashMap<u16, ChannelWindow>,
    terminal: Option<Terminal>,
}

/// Gates packet writes against the negotiated per-channel window.
///
/// `outstanding` never exceeds `window`: a send at the limit suspends the
/// calling thread on a condvar until an acknowledgment frees capacity or
/// the connection dies. Exhaustion is a scheduling delay, never an error,
/// and never blocks sends on other channels. Attention requests bypass
/// admission entirely.
#[derive(Debug)]
pub struct FlowController {
    window: u8,
    state: Mutex<FlowState>,
    capacity: Condvar,
}

fn lock(state: &Mutex<FlowState>) -> MutexGuard<'_, FlowState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FlowController {
    /// Create a controller with the negotiated window. 0 disables
    /// windowing: every acquire succeeds immediately.
    pub fn new(window: u8) -> Self {
        Self {
            window,
            state: Mutex::new(FlowState::default()),
            capacity: Condvar::new(),
        }
    }

    /// The negotiated window size.
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Acquire one unit of window capacity on a channel, blocking while
    /// the channel is at its limit. Fails only once the connection has
    /// reached a terminal state.
    pub fn acquire(&self, channel: u16) -> Result<()> {
        let mut state = lock(&self.state);
        loop {
            if let Some(terminal) = &state.terminal {
                return Err(terminal.to_error());
            }
            if self.window == 0 {
                return Ok(());
            }
            let entry = state.channels.entry(channel).or_default();
            if entry.outstanding < self.window {
                entry.outstanding += 1;
                return Ok(());
            }
            state = self
                .capacity
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Record an acknowledgment: the channel's outstanding count resets
    /// to zero and suspended senders are woken.
    pub fn acknowledge(&self, channel: u16) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.channels.get_mut(&channel) {
            if entry.outstanding != 0 {
                entry.outstanding = 0;
                self.capacity.notify_all();
            }
        }
    }

    /// Sent-but-unacknowledged packet count for a channel.
    pub fn outstanding(&self, channel: u16) -> u8 {
        let state = lock(&self.state);
        state
            .channels
            .get(&channel)
            .map(|entry| entry.outstanding)
            .unwrap_or(0)
    }

    /// Mark an attention request in flight on the channel. Admission is
    /// bypassed by design; only a duplicate request is refused.
    pub fn begin_attention(&self, channel: u16) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(terminal) = &state.terminal {
            return Err(terminal.to_error());
        }
        let entry = state.channels.entry(channel).or_default();
        if entry.attention_pending {
            return Err(MuxError::AttentionPending(channel));
        }
        entry.attention_pending = true;
        Ok(())
    }

    /// Clear the pending-attention flag after the acknowledgment arrives
    /// (or after a failed attention write).
    pub fn clear_attention(&self, channel: u16) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.channels.get_mut(&channel) {
            entry.attention_pending = false;
        }
    }

    /// Whether an attention request awaits its acknowledgment.
    pub fn attention_pending(&self, channel: u16) -> bool {
        let state = lock(&self.state);
        state
            .channels
            .get(&channel)
            .map(|entry| entry.attention_pending)
            .unwrap_or(false)
    }

    /// Put the controller into a terminal state and wake every suspended
    /// sender with the corresponding error. The first terminal state wins.
    pub(crate) fn abort(&self, terminal: Terminal) {
        let mut state = lock(&self.state);
        state.terminal.get_or_insert(terminal);
        self.capacity.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn acquire_within_window() {
        let flow = FlowController::new(3);
        for expected in 1..=3u8 {
            flow.acquire(7).unwrap();
            assert_eq!(flow.outstanding(7), expected);
        }
    }

    #[test]
    fn window_zero_never_blocks() {
        let flow = FlowController::new(0);
        for _ in 0..1000 {
            flow.acquire(1).unwrap();
        }
        assert_eq!(flow.outstanding(1), 0);
    }

    #[test]
    fn acknowledge_resets_outstanding() {
        let flow = FlowController::new(2);
        flow.acquire(1).unwrap();
        flow.acquire(1).unwrap();
        assert_eq!(flow.outstanding(1), 2);

        flow.acknowledge(1);
        assert_eq!(flow.outstanding(1), 0);
    }

    #[test]
    fn exhausted_window_suspends_until_acknowledged() {
        let flow = Arc::new(FlowController::new(2));
        flow.acquire(5).unwrap();
        flow.acquire(5).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let flow = Arc::clone(&flow);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                flow.acquire(5).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(
            !acquired.load(Ordering::SeqCst),
            "send at the window limit must suspend, not error"
        );

        flow.acknowledge(5);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(flow.outstanding(5), 1);
    }

    #[test]
    fn channels_do_not_block_each_other() {
        let flow = FlowController::new(1);
        flow.acquire(1).unwrap();
        // Channel 1 is exhausted; channel 2 proceeds immediately.
        flow.acquire(2).unwrap();
        assert_eq!(flow.outstanding(1), 1);
        assert_eq!(flow.outstanding(2), 1);
    }

    #[test]
    fn outstanding_never_exceeds_window() {
        let flow = Arc::new(FlowController::new(3));
        let done = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flow = Arc::clone(&flow);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    flow.acquire(9).unwrap();
                    assert!(flow.outstanding(9) <= 3);
                }
            }));
        }

        // Keep acknowledging until all senders drain.
        let acker = {
            let flow = Arc::clone(&flow);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                    flow.acknowledge(9);
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        acker.join().unwrap();
    }

    #[test]
    fn attention_bypasses_window() {
        let flow = FlowController::new(1);
        flow.acquire(3).unwrap();
        assert_eq!(flow.outstanding(3), 1);

        // Window exhausted, attention still goes through.
        flow.begin_attention(3).unwrap();
        assert!(flow.attention_pending(3));
    }

    #[test]
    fn duplicate_attention_rejected() {
        let flow = FlowController::new(0);
        flow.begin_attention(2).unwrap();

        let err = flow.begin_attention(2).unwrap_err();
        assert!(matches!(err, MuxError::AttentionPending(2)));

        // A different channel is unaffected.
        flow.begin_attention(4).unwrap();
    }

    #[test]
    fn clear_attention_allows_a_new_request() {
        let flow = FlowController::new(0);
        flow.begin_attention(1).unwrap();
        flow.clear_attention(1);
        assert!(!flow.attention_pending(1));
        flow.begin_attention(1).unwrap();
    }

    #[test]
    fn abort_wakes_suspended_sender_with_terminal_error() {
        let flow = Arc::new(FlowController::new(1));
        flow.acquire(1).unwrap();

        let waiter = {
            let flow = Arc::clone(&flow);
            std::thread::spawn(move || flow.acquire(1))
        };

        std::thread::sleep(Duration::from_millis(50));
        flow.abort(Terminal::Failed("stream broke".to_string()));

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, MuxError::ConnectionLost(_)));
    }

    #[test]
    fn first_terminal_state_wins() {
        let flow = FlowController::new(0);
        flow.abort(Terminal::Closed);
        flow.abort(Terminal::Failed("late".to_string()));

        let err = flow.acquire(1).unwrap_err();
        assert!(matches!(err, MuxError::Closed));
    }
}
