//! Time-base, decrementer and 601 real-time clock state.
//!
//! The TBR and DEC are never ticked; their current values are derived on
//! demand from the virtual clock and the timestamp/value pair recorded at
//! the last write. The decrementer's zero crossing is a one-shot timer in
//! the core's event queue.

use gossamer_time::{TbrFreq, VirtualClock, NS_PER_SEC};

pub struct TimeBase {
    pub clock: VirtualClock,
    pub freq: TbrFreq,
    tbr_wr_value: u64,
    tbr_wr_timestamp: u64,
    dec_wr_value: u32,
    dec_wr_timestamp: u64,
    rtc_lo: u32,
    rtc_hi: u32,
    rtc_timestamp: u64,
}

impl TimeBase {
    pub fn new(clock: VirtualClock, tb_freq_hz: u64) -> Self {
        Self {
            clock,
            freq: TbrFreq::from_hz(tb_freq_hz),
            tbr_wr_value: 0,
            tbr_wr_timestamp: 0,
            dec_wr_value: 0,
            dec_wr_timestamp: 0,
            rtc_lo: 0,
            rtc_hi: 0,
            rtc_timestamp: 0,
        }
    }

    #[inline]
    pub fn now_ns(&self, icycles: u64) -> u64 {
        self.clock.now_ns(icycles)
    }

    pub fn tbr_value(&self, now_ns: u64) -> u64 {
        self.tbr_wr_value
            .wrapping_add(self.freq.ticks_in(now_ns - self.tbr_wr_timestamp))
    }

    /// Replace the masked half of the TBR, keeping the other half running.
    pub fn write_tbr(&mut self, now_ns: u64, keep_mask: u64, new_bits: u64) {
        self.tbr_wr_value = (self.tbr_value(now_ns) & keep_mask) | new_bits;
        self.tbr_wr_timestamp = now_ns;
    }

    pub fn dec_value(&self, now_ns: u64) -> u32 {
        let elapsed = self.freq.ticks_in(now_ns - self.dec_wr_timestamp) as u32;
        self.dec_wr_value.wrapping_sub(elapsed)
    }

    /// Record a DEC write; returns the nanosecond delay until zero crossing.
    pub fn write_dec(&mut self, now_ns: u64, val: u32) -> u64 {
        self.dec_wr_value = val;
        self.dec_wr_timestamp = now_ns;
        self.freq.ns_for_ticks(u64::from(val))
    }

    /// Called when the decrementer timer expires: DEC wraps to all-ones.
    pub fn dec_expired(&mut self, now_ns: u64) {
        self.dec_wr_value = u32::MAX;
        self.dec_wr_timestamp = now_ns;
    }

    fn rtc_advance(&mut self, now_ns: u64) {
        let total = u64::from(self.rtc_lo) + (now_ns - self.rtc_timestamp);
        self.rtc_hi = self.rtc_hi.wrapping_add((total / NS_PER_SEC) as u32);
        self.rtc_lo = (total % NS_PER_SEC) as u32;
        self.rtc_timestamp = now_ns;
    }

    /// 601 RTC pair: (seconds, nanoseconds masked as the 601 does).
    pub fn rtc_value(&mut self, now_ns: u64) -> (u32, u32) {
        self.rtc_advance(now_ns);
        (self.rtc_hi, self.rtc_lo & 0x3FFF_FF80)
    }

    pub fn write_rtc_lo(&mut self, now_ns: u64, val: u32) {
        self.rtc_advance(now_ns);
        self.rtc_lo = val & 0x3FFF_FF80;
    }

    pub fn write_rtc_hi(&mut self, now_ns: u64, val: u32) {
        self.rtc_advance(now_ns);
        self.rtc_hi = val;
    }

    /// Soft reset: counters restart from zero.
    pub fn reset(&mut self) {
        self.clock.rezero();
        self.tbr_wr_value = 0;
        self.tbr_wr_timestamp = 0;
        self.dec_wr_value = 0;
        self.dec_wr_timestamp = 0;
        self.rtc_lo = 0;
        self.rtc_hi = 0;
        self.rtc_timestamp = 0;
    }
}
