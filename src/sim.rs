//! Slot-level bus model for tests.
//!
//! Devices are clocked once per slot with the wired-AND of everything driven
//! onto the line, so collisions behave like on real hardware.

use crate::{crc8, Error, OneWire};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use std::vec::Vec;

const FAMILY_DS18S20: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Rom,
    Scratchpad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    RomCommand { value: u8, bits: u8 },
    Search { bit: u8, step: u8 },
    Match { bit: u8 },
    Function { value: u8, bits: u8 },
    Transmit { source: Source, bit: usize },
    Receive { value: u8, bits: u8, index: usize },
    ConversionStatus,
    Recall { remaining: u32 },
    PowerStatus,
}

#[derive(Debug, Clone)]
pub(crate) struct SimDevice {
    rom: [u8; 8],
    memory: [u8; 8],
    eeprom: [u8; 3],
    parasite: bool,
    alarm: bool,
    corrupt_crc: bool,
    conversion_slots: u32,
    recall_slots: u32,
    converting: u32,
    phase: Phase,
}

impl SimDevice {
    pub(crate) fn new(rom: [u8; 8]) -> Self {
        SimDevice {
            rom,
            // power-on image: 85 degrees, TH 75, TL 70, 12 bit
            memory: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10],
            eeprom: [0x4B, 0x46, 0x7F],
            parasite: false,
            alarm: false,
            corrupt_crc: false,
            conversion_slots: 0,
            recall_slots: 0,
            converting: 0,
            phase: Phase::Idle,
        }
    }

    pub(crate) fn rom_with_crc(family: u8, serial: [u8; 6]) -> [u8; 8] {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc8(&rom[..7]);
        rom
    }

    pub(crate) fn with_memory(mut self, memory: [u8; 8]) -> Self {
        self.memory = memory;
        self
    }

    pub(crate) fn with_temperature(mut self, lsb: u8, msb: u8) -> Self {
        self.memory[0] = lsb;
        self.memory[1] = msb;
        self
    }

    pub(crate) fn with_config(mut self, config: u8) -> Self {
        self.memory[4] = config;
        self
    }

    pub(crate) fn parasite(mut self) -> Self {
        self.parasite = true;
        self
    }

    pub(crate) fn alarmed(mut self) -> Self {
        self.alarm = true;
        self
    }

    pub(crate) fn with_corrupt_crc(mut self) -> Self {
        self.corrupt_crc = true;
        self
    }

    pub(crate) fn with_conversion_slots(mut self, slots: u32) -> Self {
        self.conversion_slots = slots;
        self
    }

    pub(crate) fn with_recall_slots(mut self, slots: u32) -> Self {
        self.recall_slots = slots;
        self
    }

    pub(crate) fn rom(&self) -> [u8; 8] {
        self.rom
    }

    pub(crate) fn scratchpad(&self) -> [u8; 9] {
        let mut image = [0u8; 9];
        image[..8].copy_from_slice(&self.memory);
        image[8] = crc8(&self.memory);
        if self.corrupt_crc {
            image[8] ^= 0x01;
        }
        image
    }

    pub(crate) fn eeprom(&self) -> [u8; 3] {
        self.eeprom
    }

    pub(crate) fn is_selected(&self) -> bool {
        self.phase != Phase::Idle
    }

    fn rom_bit(&self, bit: u8) -> bool {
        self.rom[bit as usize / 8] & (1 << (bit % 8)) != 0
    }

    fn transmit_bit(&self, source: Source, bit: usize) -> bool {
        let bytes = match source {
            Source::Rom => {
                let mut bytes = [0xFFu8; 9];
                bytes[..8].copy_from_slice(&self.rom);
                bytes
            }
            Source::Scratchpad => self.scratchpad(),
        };
        let len = match source {
            Source::Rom => 8,
            Source::Scratchpad => 9,
        };
        bit >= len * 8 || bytes[bit / 8] & (1 << (bit % 8)) != 0
    }

    fn reset(&mut self) {
        self.phase = Phase::RomCommand { value: 0, bits: 0 };
    }

    /// Level this device leaves on the line for the current slot.
    fn output(&self) -> bool {
        match self.phase {
            Phase::Search { bit, step: 0 } => self.rom_bit(bit),
            Phase::Search { bit, step: 1 } => !self.rom_bit(bit),
            Phase::Transmit { source, bit } => self.transmit_bit(source, bit),
            Phase::ConversionStatus => self.parasite || self.converting == 0,
            Phase::Recall { remaining } => remaining == 0,
            Phase::PowerStatus => !self.parasite,
            _ => true,
        }
    }

    fn clock(&mut self, line: bool) {
        self.converting = self.converting.saturating_sub(1);
        let phase = self.phase;
        self.phase = match phase {
            Phase::Idle => Phase::Idle,
            Phase::RomCommand { value, bits } => {
                let value = value | ((line as u8) << bits);
                if bits == 7 {
                    self.rom_command(value)
                } else {
                    Phase::RomCommand {
                        value,
                        bits: bits + 1,
                    }
                }
            }
            Phase::Search { bit, step } if step < 2 => Phase::Search { bit, step: step + 1 },
            Phase::Search { bit, .. } => {
                if line != self.rom_bit(bit) {
                    Phase::Idle
                } else if bit == 63 {
                    Phase::Function { value: 0, bits: 0 }
                } else {
                    Phase::Search {
                        bit: bit + 1,
                        step: 0,
                    }
                }
            }
            Phase::Match { bit } => {
                if line != self.rom_bit(bit) {
                    Phase::Idle
                } else if bit == 63 {
                    Phase::Function { value: 0, bits: 0 }
                } else {
                    Phase::Match { bit: bit + 1 }
                }
            }
            Phase::Function { value, bits } => {
                let value = value | ((line as u8) << bits);
                if bits == 7 {
                    self.function_command(value)
                } else {
                    Phase::Function {
                        value,
                        bits: bits + 1,
                    }
                }
            }
            Phase::Transmit { source, bit } => Phase::Transmit {
                source,
                bit: bit + 1,
            },
            Phase::Receive { value, bits, index } => {
                let value = value | ((line as u8) << bits);
                if bits < 7 {
                    Phase::Receive {
                        value,
                        bits: bits + 1,
                        index,
                    }
                } else {
                    self.store(index, value);
                    if index == 2 {
                        Phase::Idle
                    } else {
                        Phase::Receive {
                            value: 0,
                            bits: 0,
                            index: index + 1,
                        }
                    }
                }
            }
            Phase::ConversionStatus => Phase::ConversionStatus,
            Phase::Recall { remaining } => Phase::Recall {
                remaining: remaining.saturating_sub(1),
            },
            Phase::PowerStatus => Phase::Idle,
        };
    }

    fn rom_command(&self, value: u8) -> Phase {
        match value {
            0xF0 => Phase::Search { bit: 0, step: 0 },
            0xEC if self.alarm => Phase::Search { bit: 0, step: 0 },
            0x55 => Phase::Match { bit: 0 },
            0xCC => Phase::Function { value: 0, bits: 0 },
            0x33 => Phase::Transmit {
                source: Source::Rom,
                bit: 0,
            },
            _ => Phase::Idle,
        }
    }

    fn function_command(&mut self, value: u8) -> Phase {
        match value {
            0x44 => {
                self.converting = self.conversion_slots;
                Phase::ConversionStatus
            }
            0xBE => Phase::Transmit {
                source: Source::Scratchpad,
                bit: 0,
            },
            0x4E => Phase::Receive {
                value: 0,
                bits: 0,
                index: 0,
            },
            0x48 => {
                self.eeprom.copy_from_slice(&self.memory[2..5]);
                Phase::Idle
            }
            0xB8 => {
                self.memory[2..5].copy_from_slice(&self.eeprom);
                Phase::Recall {
                    remaining: self.recall_slots,
                }
            }
            0xB4 => Phase::PowerStatus,
            _ => Phase::Idle,
        }
    }

    fn store(&mut self, index: usize, value: u8) {
        // the legacy family has no configuration register
        if index < 2 || self.rom[0] != FAMILY_DS18S20 {
            self.memory[2 + index] = value;
        }
    }
}

pub(crate) struct SimBus {
    devices: Vec<SimDevice>,
    resets: usize,
    slots: usize,
    shorted: bool,
    unplug_after: Option<usize>,
}

impl SimBus {
    pub(crate) fn new<const N: usize>(devices: [SimDevice; N]) -> Self {
        Self::from_devices(devices.into_iter().collect())
    }

    pub(crate) fn from_devices(devices: Vec<SimDevice>) -> Self {
        SimBus {
            devices,
            resets: 0,
            slots: 0,
            shorted: false,
            unplug_after: None,
        }
    }

    /// Line held low: every reset fails even with devices attached.
    pub(crate) fn shorted(mut self) -> Self {
        self.shorted = true;
        self
    }

    /// All devices stop answering once `slots` more slots have elapsed.
    pub(crate) fn unplug_after(&mut self, slots: usize) {
        self.unplug_after = Some(self.slots + slots);
    }

    pub(crate) fn plug_in(&mut self) {
        self.unplug_after = None;
    }

    pub(crate) fn resets(&self) -> usize {
        self.resets
    }

    pub(crate) fn slots(&self) -> usize {
        self.slots
    }

    pub(crate) fn device(&self, index: usize) -> &SimDevice {
        &self.devices[index]
    }

    fn unplugged(&self) -> bool {
        self.unplug_after.is_some_and(|after| self.slots >= after)
    }
}

impl OneWire for SimBus {
    type Error = Infallible;

    fn reset(&mut self, _delay: &mut impl DelayNs) -> Result<bool, Error<Infallible>> {
        self.resets += 1;
        if self.unplugged() {
            return Ok(false);
        }
        for device in self.devices.iter_mut() {
            device.reset();
        }
        Ok(!self.shorted && !self.devices.is_empty())
    }

    fn write_bit(
        &mut self,
        _delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<Infallible>> {
        let unplugged = self.unplugged();
        self.slots += 1;
        if unplugged {
            return Ok(bit);
        }
        let line = bit && self.devices.iter().all(SimDevice::output);
        for device in self.devices.iter_mut() {
            device.clock(line);
        }
        Ok(line)
    }
}
