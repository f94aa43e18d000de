//! PIN negotiation.
//!
//! The identity service re-sends ENTER_PIN after every wrong attempt, so the
//! only memory across attempts is the card's retry counter.

use ausweis_protocol::ReaderPrompt;

/// Retry counter of a card that has not seen a failed attempt.
pub const MAX_RETRY_COUNTER: u8 = 3;

/// Derived view of an ENTER_PIN message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChallenge {
    retry_counter: u8,
}

impl PinChallenge {
    /// A missing counter means the card reported nothing, i.e. a fresh card.
    /// Reported counters are clamped to `0..=MAX_RETRY_COUNTER`.
    pub fn new(retry_counter: Option<i64>) -> Self {
        let retry_counter = retry_counter
            .unwrap_or(i64::from(MAX_RETRY_COUNTER))
            .clamp(0, i64::from(MAX_RETRY_COUNTER));
        Self {
            retry_counter: u8::try_from(retry_counter).unwrap_or(MAX_RETRY_COUNTER),
        }
    }

    pub fn from_prompt(prompt: &ReaderPrompt) -> Self {
        Self::new(prompt.retry_counter())
    }

    pub fn retry_counter(&self) -> u8 {
        self.retry_counter
    }

    /// PIN attempts left before the card demands the CAN.
    ///
    /// At counter 1 the service asks for the CAN first; after a CAN unlock in
    /// another app the counter stays at 1 while the PIN is still accepted once,
    /// hence the floor of one.
    pub fn attempts_remaining(&self) -> u8 {
        self.retry_counter.saturating_sub(1).max(1)
    }

    /// Failed attempts, carried over from earlier sessions until a correct PIN.
    pub fn failed_attempts(&self) -> u8 {
        MAX_RETRY_COUNTER - self.retry_counter
    }
}
