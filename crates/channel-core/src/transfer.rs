//! Assisted-transfer digit buffering.
//!
//! While a call is up, received DTMF digits are matched against a
//! configured trigger sequence. A full match fires the transfer action;
//! anything else is unrolled, one digit per mismatch, back into the
//! ordinary inbound-DTMF path, and an inter-digit timer flushes whatever
//! is still buffered after silence. Every digit is accounted for
//! exactly once: consumed by a match, unrolled, or flushed.
//!
//! Two action modes exist. `Flash` lines (analog, E1 flash) transfer
//! with a hook-flash command the moment the trigger matches. `SsTransfer`
//! lines (ISDN/QSIG) enter a second collection phase after the trigger:
//! subsequent digits build the transfer-to number, and the same timer
//! (or a repeated trigger match) completes the supplementary-service
//! transfer with that number.
//!
//! This module is pure state: the channel applies the returned outcome
//! (deliver digits, issue commands, arm timers) under its own lock.

/// Which hardware action a matched trigger performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Flash,
    SsTransfer,
}

/// What the caller must do with the inter-digit timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Keep,
    Arm,
    Restart,
    Cancel,
}

/// Transfer action to issue after a digit or timer outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    /// Hook-flash now.
    Flash,
    /// Trigger matched on an SsTransfer line: start collecting the
    /// transfer-to number.
    CollectStart,
    /// Complete the supplementary-service transfer to `dest`.
    SsTransfer { dest: String },
}

/// Result of feeding one digit (or a timer expiry) into the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Digits to hand to the ordinary inbound-DTMF path, in order.
    pub deliver: Vec<char>,
    pub action: Option<TransferAction>,
    pub timer: TimerOp,
}

impl Default for TimerOp {
    fn default() -> Self {
        TimerOp::Keep
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    mode: TransferMode,
    trigger: Vec<char>,
    buffer: Vec<char>,
    /// Inter-digit timer is armed.
    dialing: bool,
    /// SsTransfer mode only: collecting the transfer-to number.
    collecting: bool,
    collected: String,
}

impl TransferState {
    pub fn new(mode: TransferMode, trigger: &str) -> Self {
        Self {
            mode,
            trigger: trigger.chars().collect(),
            buffer: Vec::new(),
            dialing: false,
            collecting: false,
            collected: String::new(),
        }
    }

    /// Trigger configured at all?
    pub fn is_enabled(&self) -> bool {
        !self.trigger.is_empty()
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Digits currently held back from delivery.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Drop all transfer state, e.g. on cleanup. Buffered digits are
    /// discarded along with the call they belonged to.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.dialing = false;
        self.collecting = false;
        self.collected.clear();
    }

    /// Feed one received digit.
    pub fn on_digit(&mut self, digit: char) -> Outcome {
        let mut out = Outcome::default();

        if self.trigger.is_empty() {
            out.deliver.push(digit);
            return out;
        }

        self.buffer.push(digit);

        if self.buffer.len() == self.trigger.len() {
            if self.buffer == self.trigger {
                self.buffer.clear();
                match self.mode {
                    TransferMode::Flash => {
                        self.dialing = false;
                        out.action = Some(TransferAction::Flash);
                        out.timer = TimerOp::Cancel;
                    }
                    TransferMode::SsTransfer => {
                        if self.collecting {
                            // trigger repeated while collecting: done
                            let dest = std::mem::take(&mut self.collected);
                            self.collecting = false;
                            self.dialing = false;
                            out.action = Some(TransferAction::SsTransfer { dest });
                            out.timer = TimerOp::Cancel;
                        } else {
                            self.collecting = true;
                            out.action = Some(TransferAction::CollectStart);
                            out.timer = TimerOp::Restart;
                        }
                    }
                }
                return out;
            }
            // full-length mismatch: unroll the oldest digit
            self.unroll_one(&mut out);
            return out;
        }

        if self.trigger.starts_with(&self.buffer) {
            if self.dialing || self.collecting {
                out.timer = TimerOp::Restart;
            } else {
                self.dialing = true;
                out.timer = TimerOp::Arm;
            }
            return out;
        }

        self.unroll_one(&mut out);
        out
    }

    /// Inter-digit timer expired: flush everything still pending.
    pub fn on_timer(&mut self) -> Outcome {
        let mut out = Outcome::default();
        out.deliver = std::mem::take(&mut self.buffer);
        self.dialing = false;

        if self.collecting {
            self.collecting = false;
            if !self.collected.is_empty() {
                let dest = std::mem::take(&mut self.collected);
                out.action = Some(TransferAction::SsTransfer { dest });
            }
        }
        out
    }

    fn unroll_one(&mut self, out: &mut Outcome) {
        let digit = self.buffer.remove(0);
        if self.collecting {
            // while collecting, unrolled digits extend the transfer-to
            // number instead of going back to the call
            self.collected.push(digit);
            out.timer = TimerOp::Restart;
        } else {
            out.deliver.push(digit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flash(trigger: &str) -> TransferState {
        TransferState::new(TransferMode::Flash, trigger)
    }

    #[test]
    fn disabled_trigger_passes_digits_through() {
        let mut t = flash("");
        let out = t.on_digit('5');
        assert_eq!(out.deliver, vec!['5']);
        assert_eq!(out.action, None);
    }

    #[test]
    fn exact_match_fires_flash() {
        let mut t = flash("#1");
        let out = t.on_digit('#');
        assert!(out.deliver.is_empty());
        assert_eq!(out.timer, TimerOp::Arm);
        let out = t.on_digit('1');
        assert_eq!(out.action, Some(TransferAction::Flash));
        assert_eq!(out.timer, TimerOp::Cancel);
        assert_eq!(t.buffered(), 0);
    }

    #[test]
    fn mismatch_unrolls_oldest_digit() {
        let mut t = flash("#1");
        t.on_digit('#');
        let out = t.on_digit('2');
        // '#2' vs '#1': '#' is unrolled, '2' stays buffered
        assert_eq!(out.deliver, vec!['#']);
        assert_eq!(t.buffered(), 1);
        // flush recovers the '2'
        let out = t.on_timer();
        assert_eq!(out.deliver, vec!['2']);
        assert_eq!(t.buffered(), 0);
    }

    #[test]
    fn non_prefix_digit_unrolls_immediately() {
        let mut t = flash("#1");
        let out = t.on_digit('9');
        assert_eq!(out.deliver, vec!['9']);
        assert_eq!(t.buffered(), 0);
    }

    #[test]
    fn timer_flush_delivers_partial_prefix() {
        let mut t = flash("#12");
        t.on_digit('#');
        t.on_digit('1');
        let out = t.on_timer();
        assert_eq!(out.deliver, vec!['#', '1']);
    }

    #[test]
    fn ss_transfer_collects_number_then_timer_completes() {
        let mut t = TransferState::new(TransferMode::SsTransfer, "#1");
        t.on_digit('#');
        let out = t.on_digit('1');
        assert_eq!(out.action, Some(TransferAction::CollectStart));
        assert!(t.is_collecting());

        // digits now build the destination, not inbound DTMF
        for d in ['2', '0', '4'] {
            let out = t.on_digit(d);
            assert!(out.deliver.is_empty());
        }
        let out = t.on_timer();
        assert_eq!(
            out.action,
            Some(TransferAction::SsTransfer {
                dest: "204".to_string()
            })
        );
        assert!(!t.is_collecting());
    }

    #[test]
    fn repeated_trigger_completes_collection() {
        let mut t = TransferState::new(TransferMode::SsTransfer, "#1");
        t.on_digit('#');
        t.on_digit('1');
        t.on_digit('3');
        t.on_digit('3');
        t.on_digit('#');
        let out = t.on_digit('1');
        assert_eq!(
            out.action,
            Some(TransferAction::SsTransfer {
                dest: "33".to_string()
            })
        );
    }

    #[test]
    fn clear_discards_everything() {
        let mut t = TransferState::new(TransferMode::SsTransfer, "#1");
        t.on_digit('#');
        t.on_digit('1');
        t.on_digit('7');
        t.clear();
        assert_eq!(t.buffered(), 0);
        assert!(!t.is_collecting());
    }
}
