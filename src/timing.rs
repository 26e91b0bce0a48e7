/// Standard-speed bus timing, all values in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Length of the master reset pulse
    pub reset_low_us: u32,
    /// Release to presence sample
    pub presence_sample_us: u32,
    /// Presence sample to the end of the reset window
    pub presence_window_us: u32,
    /// Low time opening every slot
    pub slot_start_us: u32,
    /// End of the low time to the data-valid sample
    pub slot_sample_us: u32,
    /// Sample to the end of the slot
    pub slot_tail_us: u32,
    /// Idle time after every slot
    pub recovery_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            reset_low_us: 480,
            presence_sample_us: 70,
            presence_window_us: 480 - 70,
            slot_start_us: 2,
            // device data is valid for 15us after the falling edge
            slot_sample_us: 15 - 2,
            slot_tail_us: 60 - 15,
            recovery_us: 100,
        }
    }
}

impl Timing {
    /// Datasheet minimum is 1us; long cables want 30us or more.
    pub fn with_recovery_us(mut self, recovery_us: u32) -> Self {
        self.recovery_us = recovery_us;
        self
    }

    /// Worst-case duration of one bit slot including recovery
    pub fn slot_us(&self) -> u32 {
        self.slot_start_us + self.slot_sample_us + self.slot_tail_us + self.recovery_us
    }
}
