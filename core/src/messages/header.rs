use serde::{Deserialize, Serialize};

/// Sequence number and message time carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub sequence: u64,
    /// Seconds; only ever compared against other message timestamps.
    pub timestamp: f64,
}

impl MessageHeader {
    pub fn new(sequence: u64, timestamp: f64) -> Self {
        Self {
            sequence,
            timestamp,
        }
    }
}

/// Per-stage source of outbound sequence numbers, starting at 1.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_header(&mut self, timestamp: f64) -> MessageHeader {
        let header = MessageHeader::new(self.next, timestamp);
        self.next += 1;
        header
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_one() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next_header(0.5).sequence, 1);
        let second = counter.next_header(0.6);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.timestamp, 0.6);
    }
}
