use crate::{Address, Command, Error, OpCode};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use log::trace;

/// Bit-level access to a 1-Wire bus.
///
/// Implementors provide [`reset`](OneWire::reset) and
/// [`write_bit`](OneWire::write_bit); bytes and addressed commands are built
/// on top of those two. A bus transaction (reset, select, command, payload)
/// must not be interleaved with another one: callers drive the bus from a
/// single context.
pub trait OneWire {
    type Error: Sized + Debug;

    /// Resets the bus and listens for a presence pulse.
    ///
    /// Returns `Ok(false)` both when nobody answered and when the line was
    /// still held low after the presence window (short circuit).
    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<Self::Error>>;

    /// Emits one time slot and returns the level seen on the bus.
    ///
    /// Writing `true` leaves the line to the devices, so the returned bit is
    /// `false` if any of them pulled it low. This is how bits are read.
    fn write_bit(
        &mut self,
        delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<Self::Error>>;

    fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<Self::Error>> {
        self.write_bit(delay, true)
    }

    /// Writes eight slots, least significant bit first, and returns the byte
    /// read back from the bus.
    fn write_byte(
        &mut self,
        delay: &mut impl DelayNs,
        byte: u8,
    ) -> Result<u8, Error<Self::Error>> {
        let mut byte = byte;
        for _ in 0..8 {
            let bit = byte & 0x01 == 0x01;
            byte >>= 1;
            if self.write_bit(delay, bit)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<Self::Error>> {
        self.write_byte(delay, 0xFF)
    }

    fn write_bytes(
        &mut self,
        delay: &mut impl DelayNs,
        bytes: &[u8],
    ) -> Result<(), Error<Self::Error>> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    fn read_bytes(
        &mut self,
        delay: &mut impl DelayNs,
        dst: &mut [u8],
    ) -> Result<(), Error<Self::Error>> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Resets the bus, selects `target` (or every device for `None`) and
    /// sends `cmd`.
    ///
    /// Returns `Ok(false)` without touching the bus further if nobody
    /// answered the reset.
    fn command(
        &mut self,
        delay: &mut impl DelayNs,
        cmd: impl OpCode,
        target: Option<&Address>,
    ) -> Result<bool, Error<Self::Error>> {
        if !self.reset(delay)? {
            return Ok(false);
        }
        match target {
            Some(address) => {
                trace!("command {:02x} to {}", cmd.op_code(), address);
                self.write_byte(delay, Command::MatchRom.op_code())?;
                self.write_bytes(delay, address.as_ref())?;
            }
            None => {
                trace!("command {:02x} to all devices", cmd.op_code());
                self.write_byte(delay, Command::SkipRom.op_code())?;
            }
        }
        self.write_byte(delay, cmd.op_code())?;
        Ok(true)
    }
}
