use crate::critical::Atomic;
use crate::{Error, IoWire, OneWire, Timing};
use embedded_hal::delay::DelayNs;
use log::warn;

/// Bit-banged bus master on top of a single open-drain line.
///
/// Every slot and the presence sample run with interrupts masked, so the
/// microsecond windows cannot be stretched by other work.
pub struct Driver<W: IoWire> {
    io_wire: W,
    timing: Timing,
}

impl<W: IoWire> Driver<W> {
    pub fn new(io_wire: W) -> Self {
        Self::with_timing(io_wire, Timing::default())
    }

    pub fn with_timing(io_wire: W, timing: Timing) -> Self {
        Driver { io_wire, timing }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn into_inner(self) -> W {
        self.io_wire
    }
}

impl<W: IoWire> OneWire for Driver<W> {
    type Error = W::Error;

    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<W::Error>> {
        let timing = self.timing;

        self.io_wire.drive_low()?;
        delay.delay_us(timing.reset_low_us);

        let presence = {
            let _atomic = Atomic::enter();
            self.io_wire.release()?;
            delay.delay_us(timing.presence_sample_us);
            self.io_wire.is_low()?
        };

        // devices let go of the line before the window closes
        delay.delay_us(timing.presence_window_us);
        if self.io_wire.is_low()? {
            warn!("bus still low after reset, wire shorted?");
            return Ok(false);
        }
        Ok(presence)
    }

    fn write_bit(
        &mut self,
        delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<W::Error>> {
        let timing = self.timing;

        let sampled = {
            let _atomic = Atomic::enter();
            self.io_wire.drive_low()?;
            delay.delay_us(timing.slot_start_us);
            if bit {
                self.io_wire.release()?;
            }
            delay.delay_us(timing.slot_sample_us);
            let sampled = bit && self.io_wire.is_high()?;
            delay.delay_us(timing.slot_tail_us);
            self.io_wire.release()?;
            sampled
        };

        delay.delay_us(timing.recovery_us);
        Ok(sampled)
    }
}
