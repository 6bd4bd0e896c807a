/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Credit window shared by the stream bridges.

/// Default number of unacknowledged items a producer may have in flight.
pub const ACK_WINDOW: u64 = 100;

/// Bounds in-flight items between a producer and its remote consumer.
///
/// Producers pause once `sent - acked` reaches the window size and resume as soon
/// as an `Ack` brings it back below. Consumers acknowledge in batches of half the
/// window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreditWindow {
    size: u64,
}

impl CreditWindow {
    /// Windows below two never produce a batched `Ack`, so they are clamped to two.
    pub fn new(size: u64) -> Self {
        Self { size: size.max(2) }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn ack_batch(&self) -> u64 {
        self.size / 2
    }

    pub fn in_flight(sent: u64, acked: u64) -> u64 {
        sent.saturating_sub(acked)
    }

    pub fn must_pause(&self, sent: u64, acked: u64) -> bool {
        Self::in_flight(sent, acked) >= self.size
    }

    pub fn may_resume(&self, sent: u64, acked: u64) -> bool {
        !self.must_pause(sent, acked)
    }

    /// Returns the next cumulative `Ack` value once more than half a window is
    /// unacknowledged.
    pub fn batched_ack(&self, received: u64, acked: u64) -> Option<u64> {
        (Self::in_flight(received, acked) > self.ack_batch()).then(|| acked + self.ack_batch())
    }
}

impl Default for CreditWindow {
    fn default() -> Self {
        Self::new(ACK_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::{CreditWindow, ACK_WINDOW};

    #[test]
    fn default_window_matches_protocol_constant() {
        let window = CreditWindow::default();

        assert_eq!(window.size(), ACK_WINDOW);
        assert_eq!(window.ack_batch(), 50);
    }

    #[test]
    fn producer_pauses_at_window_and_resumes_below_it() {
        let window = CreditWindow::default();

        assert!(!window.must_pause(99, 0));
        assert!(window.must_pause(100, 0));
        assert!(window.may_resume(100, 1));
    }

    #[test]
    fn consumer_acks_once_per_half_window() {
        let window = CreditWindow::default();

        assert_eq!(window.batched_ack(50, 0), None);
        assert_eq!(window.batched_ack(51, 0), Some(50));
        assert_eq!(window.batched_ack(51, 50), None);
        assert_eq!(window.batched_ack(101, 50), Some(100));
    }

    #[test]
    fn stale_ack_never_underflows_in_flight_count() {
        assert_eq!(CreditWindow::in_flight(10, 12), 0);
        assert!(CreditWindow::default().may_resume(10, 12));
    }

    #[test]
    fn tiny_window_is_clamped() {
        let window = CreditWindow::new(0);

        assert_eq!(window.size(), 2);
        assert_eq!(window.batched_ack(2, 0), Some(1));
    }
}
