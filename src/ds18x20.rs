//! DS18S20 / DS18B20 / DS1822 temperature sensors.
//!
//! Every operation takes a target: `Some(address)` selects one device,
//! `None` addresses every device on the bus at once.

use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use fixed::types::I8F8;
use log::warn;

use crate::{crc8, Address, Error, OneWire, OpCode};

/// Signed Q8.8 degrees Celsius, 256 units per degree.
pub type Temperature = I8F8;

/// Read slots polled after a recall before giving up
pub const RECALL_RETRIES: u8 = 255;

/// Time the EEPROM write cycle of a copy needs
pub const COPY_SCRATCHPAD_DELAY_MS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallE2 = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Supported sensor families, keyed by the first ROM byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Family {
    /// Fixed 9-bit reading, extended through the count registers
    Ds18s20 = 0x10,
    Ds18b20 = 0x28,
    Ds1822 = 0x22,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Ds18s20, Family::Ds18b20, Family::Ds1822];

    pub fn from_code(code: u8) -> Option<Family> {
        Self::ALL.into_iter().find(|family| family.code() == code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the scratchpad carries a writable resolution register.
    pub fn has_resolution_register(self) -> bool {
        !matches!(self, Family::Ds18s20)
    }

    /// Family of a sensor address.
    ///
    /// Three codes are accepted but the error carries a single expected one,
    /// so an unknown code is reported against the DS18B20 code 0x28.
    pub fn of_address<E: Debug>(address: &Address) -> Result<Family, Error<E>> {
        Family::try_from(address)
            .map_err(|code| Error::FamilyCodeMismatch(Family::Ds18b20.code(), code))
    }
}

impl TryFrom<&Address> for Family {
    type Error = u8;

    fn try_from(address: &Address) -> Result<Self, Self::Error> {
        Family::from_code(address.family_code()).ok_or(address.family_code())
    }
}

/// Conversion resolution, stored in bits 6:5 of the configuration register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    const MASK: u8 = 0b0110_0000;

    pub fn from_config(config: u8) -> Resolution {
        match config & Self::MASK {
            0b0000_0000 => Resolution::Bits9,
            0b0010_0000 => Resolution::Bits10,
            0b0100_0000 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Configuration register value, reserved bits set as the device reads them.
    pub fn config(self) -> u8 {
        let bits = match self {
            Resolution::Bits9 => 0b00,
            Resolution::Bits10 => 0b01,
            Resolution::Bits11 => 0b10,
            Resolution::Bits12 => 0b11,
        };
        0b0001_1111 | (bits << 5)
    }

    /// Low bits of the raw reading left undefined at this resolution
    pub fn undefined_bits(self) -> u16 {
        match self {
            Resolution::Bits9 => 0b111,
            Resolution::Bits10 => 0b011,
            Resolution::Bits11 => 0b001,
            Resolution::Bits12 => 0,
        }
    }

    pub fn conversion_time_us(self) -> u32 {
        match self {
            Resolution::Bits9 => 93_750,
            Resolution::Bits10 => 187_500,
            Resolution::Bits11 => 375_000,
            Resolution::Bits12 => 750_000,
        }
    }

    pub fn conversion_time_ms(self) -> u32 {
        self.conversion_time_us().div_ceil(1000)
    }
}

/// Device memory image as read back from the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scratchpad([u8; Scratchpad::BYTES]);

impl Scratchpad {
    pub const BYTES: usize = 9;

    const TEMPERATURE: usize = 0;
    const ALARM_HIGH: usize = 2;
    const ALARM_LOW: usize = 3;
    const CONFIG: usize = 4;
    const COUNT_REMAIN: usize = 6;
    const COUNT_PER_C: usize = 7;
    const CRC: usize = 8;

    pub fn new(raw: [u8; Self::BYTES]) -> Self {
        Scratchpad(raw)
    }

    pub fn raw_temperature(&self) -> u16 {
        LittleEndian::read_u16(&self.0[Self::TEMPERATURE..Self::TEMPERATURE + 2])
    }

    pub fn alarm_high(&self) -> u8 {
        self.0[Self::ALARM_HIGH]
    }

    pub fn alarm_low(&self) -> u8 {
        self.0[Self::ALARM_LOW]
    }

    pub fn config(&self) -> u8 {
        self.0[Self::CONFIG]
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.config())
    }

    pub fn count_remain(&self) -> u8 {
        self.0[Self::COUNT_REMAIN]
    }

    pub fn count_per_c(&self) -> u8 {
        self.0[Self::COUNT_PER_C]
    }

    pub fn ensure_correct_crc8<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc8(&self.0[..Self::CRC]);
        if computed != self.0[Self::CRC] {
            Err(Error::CrcMismatch(computed, self.0[Self::CRC]))
        } else {
            Ok(())
        }
    }
}

impl AsRef<[u8]> for Scratchpad {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Scratchpad> for [u8; Scratchpad::BYTES] {
    fn from(scratchpad: Scratchpad) -> Self {
        scratchpad.0
    }
}

/// Reading in 1/16 degree units, normalised across families.
pub fn decode_sixteenths(family: Family, scratchpad: &Scratchpad) -> i16 {
    let raw = scratchpad.raw_temperature();
    match family {
        Family::Ds18s20 => {
            // half-degree reading without its LSB, promoted to 1/16 degree
            let base = ((raw & 0xFFFE) << 3) as i16;
            let count = scratchpad.count_per_c() as i16 - scratchpad.count_remain() as i16;
            base.wrapping_add(count - 4)
        }
        Family::Ds18b20 | Family::Ds1822 => {
            (raw & !scratchpad.resolution().undefined_bits()) as i16
        }
    }
}

/// Converts a 1/16 degree reading to Q8.8, saturating at the type bounds.
pub fn sixteenths_to_temperature(sixteenths: i16) -> Temperature {
    Temperature::from_bits(sixteenths.saturating_mul(16))
}

pub fn decode(family: Family, scratchpad: &Scratchpad) -> Temperature {
    sixteenths_to_temperature(decode_sixteenths(family, scratchpad))
}

fn send<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    command: Command,
    target: Option<&Address>,
) -> Result<(), Error<B::Error>> {
    if bus.command(delay, command, target)? {
        Ok(())
    } else {
        Err(Error::BusFault)
    }
}

/// Starts a temperature conversion.
pub fn start_conversion<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<(), Error<B::Error>> {
    send(bus, delay, Command::Convert, target)
}

/// Whether a conversion started with [`start_conversion`] is still running.
///
/// Only externally powered devices report this; a parasite-powered one
/// cannot drive the line while converting and always reads as finished.
pub fn conversion_in_progress<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
) -> Result<bool, Error<B::Error>> {
    Ok(!bus.read_bit(delay)?)
}

/// Whether the target draws its power from the data line.
///
/// With a broadcast target this is true if any device is parasite powered.
pub fn parasite_powered<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<bool, Error<B::Error>> {
    send(bus, delay, Command::ReadPowerSupply, target)?;
    Ok(!bus.read_bit(delay)?)
}

pub fn read_scratchpad<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<Scratchpad, Error<B::Error>> {
    send(bus, delay, Command::ReadScratchpad, target)?;
    let mut raw = [0u8; Scratchpad::BYTES];
    bus.read_bytes(delay, &mut raw)?;
    let scratchpad = Scratchpad::new(raw);
    if let Err(e) = scratchpad.ensure_correct_crc8() {
        warn!("scratchpad crc mismatch: {:?}", e);
        return Err(e);
    }
    Ok(scratchpad)
}

/// Writes the alarm registers, plus the configuration register on families
/// that have one.
///
/// A broadcast target is rejected because the family decides how many bytes
/// the devices expect.
pub fn write_scratchpad<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
    alarm_high: u8,
    alarm_low: u8,
    config: u8,
) -> Result<(), Error<B::Error>> {
    let address = target.ok_or(Error::NotSupported)?;
    let family = Family::from_code(address.family_code());
    send(bus, delay, Command::WriteScratchpad, target)?;
    bus.write_byte(delay, alarm_high)?;
    bus.write_byte(delay, alarm_low)?;
    if family.is_some_and(Family::has_resolution_register) {
        bus.write_byte(delay, config)?;
    }
    Ok(())
}

/// Reads and decodes the last conversion result.
///
/// A broadcast target only makes sense on a single-drop bus and decodes as
/// a DS18B20.
pub fn read_temperature<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<Temperature, Error<B::Error>> {
    let family = match target {
        Some(address) => Family::of_address::<B::Error>(address)?,
        None => Family::Ds18b20,
    };
    let scratchpad = read_scratchpad(bus, delay, target)?;
    Ok(decode(family, &scratchpad))
}

/// Stores the alarm and configuration registers in EEPROM.
pub fn copy_scratchpad<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<(), Error<B::Error>> {
    send(bus, delay, Command::CopyScratchpad, target)?;
    delay.delay_ms(COPY_SCRATCHPAD_DELAY_MS);
    Ok(())
}

/// Reloads the alarm and configuration registers from EEPROM.
pub fn recall_eeprom<B: OneWire>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    target: Option<&Address>,
) -> Result<(), Error<B::Error>> {
    send(bus, delay, Command::RecallE2, target)?;
    for _ in 0..RECALL_RETRIES {
        if bus.read_bit(delay)? {
            return Ok(());
        }
    }
    warn!("eeprom recall did not complete");
    Err(Error::Timeout)
}

/// A temperature sensor of one of the supported families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18x20 {
    address: Address,
    family: Family,
}

impl From<Ds18x20> for Address {
    fn from(device: Ds18x20) -> Self {
        device.address
    }
}

impl Ds18x20 {
    pub fn from_address<E: Debug>(address: Address) -> Result<Self, Error<E>> {
        let family = Family::of_address::<E>(&address)?;
        Ok(Ds18x20 { address, family })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Worst-case conversion time, read from the device configuration.
    pub fn conversion_time_ms<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<u32, Error<B::Error>> {
        let resolution = match self.family {
            Family::Ds18s20 => Resolution::Bits12,
            _ => self.read_scratchpad(bus, delay)?.resolution(),
        };
        Ok(resolution.conversion_time_ms())
    }

    pub fn start_conversion<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<B::Error>> {
        start_conversion(bus, delay, Some(&self.address))
    }

    pub fn parasite_powered<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<B::Error>> {
        parasite_powered(bus, delay, Some(&self.address))
    }

    pub fn read_scratchpad<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<B::Error>> {
        read_scratchpad(bus, delay, Some(&self.address))
    }

    pub fn write_scratchpad<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
        alarm_high: u8,
        alarm_low: u8,
        resolution: Resolution,
    ) -> Result<(), Error<B::Error>> {
        write_scratchpad(
            bus,
            delay,
            Some(&self.address),
            alarm_high,
            alarm_low,
            resolution.config(),
        )
    }

    pub fn read_temperature<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Temperature, Error<B::Error>> {
        let scratchpad = self.read_scratchpad(bus, delay)?;
        Ok(decode(self.family, &scratchpad))
    }

    pub fn copy_scratchpad<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<B::Error>> {
        copy_scratchpad(bus, delay, Some(&self.address))
    }

    pub fn recall_eeprom<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<B::Error>> {
        recall_eeprom(bus, delay, Some(&self.address))
    }
}
