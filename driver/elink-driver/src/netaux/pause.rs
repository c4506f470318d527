//! 802.3x PAUSE flow control.
//!
//! Received PAUSE frames put the transmit side into a timed `TxPaused`
//! state; pause quanta convert to wall time through the negotiated link
//! speed (one quantum = 512 bit times). A buffer-pressure watchdog can
//! emit PAUSE frames of our own when the RX pool runs hot.

/// Destination address of MAC control frames.
pub const PAUSE_DST: [u8; 6] = [0x01, 0x80, 0xC2, 0x00, 0x00, 0x01];
/// MAC control ethertype.
pub const ETHERTYPE_MAC_CONTROL: u16 = 0x8808;
/// PAUSE opcode.
pub const OPCODE_PAUSE: u16 = 0x0001;

/// Transmit-pause state for one NIC.
#[derive(Debug, Default)]
pub struct PauseState {
    /// Tick at which transmit unblocks, when paused.
    pub paused_until: Option<u64>,
    /// PAUSE frames received and honored.
    pub rx_pause_frames: u32,
    /// PAUSE frames we transmitted under RX pressure.
    pub tx_pause_frames: u32,
}

impl PauseState {
    /// Applies a received quanta value at time `now`.
    ///
    /// Zero quanta is the resume message and clears the state immediately.
    pub fn apply(&mut self, now: u64, pause_ticks: u64) {
        self.rx_pause_frames = self.rx_pause_frames.wrapping_add(1);
        if pause_ticks == 0 {
            self.paused_until = None;
        } else {
            self.paused_until = Some(now.saturating_add(pause_ticks));
        }
    }

    /// True while transmit must hold off.
    #[must_use]
    pub fn tx_blocked(&self, now: u64) -> bool {
        match self.paused_until {
            Some(until) => now < until,
            None => false,
        }
    }

    /// Clears an expired pause. Returns `true` if the state changed.
    pub fn expire(&mut self, now: u64) -> bool {
        if let Some(until) = self.paused_until {
            if now >= until {
                self.paused_until = None;
                return true;
            }
        }
        false
    }
}

/// Parses a frame as a PAUSE request. Returns the quanta field when the
/// frame is a MAC control PAUSE addressed to the control group (or to us).
#[must_use]
pub fn parse(frame: &[u8]) -> Option<u16> {
    if frame.len() < 18 {
        return None;
    }
    if frame[0..6] != PAUSE_DST {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let opcode = u16::from_be_bytes([frame[14], frame[15]]);
    if ethertype != ETHERTYPE_MAC_CONTROL || opcode != OPCODE_PAUSE {
        return None;
    }
    Some(u16::from_be_bytes([frame[16], frame[17]]))
}

/// Converts pause quanta to clock ticks for a link speed in Mbit/s.
#[must_use]
pub fn quanta_to_ticks(quanta: u16, mbps: u32, tick_hz: u64) -> u64 {
    // One quantum is 512 bit times.
    let bits = u64::from(quanta) * 512;
    bits.saturating_mul(tick_hz) / (u64::from(mbps) * 1_000_000)
}

/// Builds a minimum-length PAUSE frame into `out`.
pub fn build_frame(src_mac: [u8; 6], quanta: u16, out: &mut [u8; 60]) {
    out.fill(0);
    out[0..6].copy_from_slice(&PAUSE_DST);
    out[6..12].copy_from_slice(&src_mac);
    out[12..14].copy_from_slice(&ETHERTYPE_MAC_CONTROL.to_be_bytes());
    out[14..16].copy_from_slice(&OPCODE_PAUSE.to_be_bytes());
    out[16..18].copy_from_slice(&quanta.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_built_frames() {
        let mut frame = [0u8; 60];
        build_frame([0, 0x60, 0x97, 1, 2, 3], 0x1234, &mut frame);
        assert_eq!(parse(&frame), Some(0x1234));
    }

    #[test]
    fn non_pause_frames_are_ignored() {
        let mut frame = [0u8; 60];
        build_frame([0, 0x60, 0x97, 1, 2, 3], 7, &mut frame);
        frame[12] = 0x08; // ordinary IP ethertype
        frame[13] = 0x00;
        assert_eq!(parse(&frame), None);
    }

    #[test]
    fn quanta_scale_with_speed() {
        // 100 quanta at 10 Mbit = 5120 µs; at 100 Mbit = 512 µs.
        assert_eq!(quanta_to_ticks(100, 10, 1_000_000), 5_120);
        assert_eq!(quanta_to_ticks(100, 100, 1_000_000), 512);
    }

    #[test]
    fn pause_blocks_until_expiry_and_zero_resumes() {
        let mut st = PauseState::default();
        st.apply(1_000, 500);
        assert!(st.tx_blocked(1_200));
        assert!(!st.tx_blocked(1_500));
        assert!(st.expire(1_500));

        st.apply(2_000, 500);
        st.apply(2_100, 0); // resume
        assert!(!st.tx_blocked(2_101));
    }
}
