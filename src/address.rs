use crate::{crc8, Command, Crc8, Error, OneWire, OpCode};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// 64-bit ROM code: family code, 48-bit serial, CRC-8 of the first seven bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self.raw[0]
    }

    /// The checksum carried in the last byte
    pub fn crc8(&self) -> u8 {
        self.raw[Self::BYTES as usize - 1]
    }

    /// Whether the last byte is the CRC-8 of the first seven.
    pub fn is_valid(&self) -> bool {
        Crc8::validate(&self.raw)
    }

    pub fn ensure_correct_crc8<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc8(&self.raw[..Self::BYTES as usize - 1]);
        if computed != self.crc8() {
            Err(Error::CrcMismatch(computed, self.crc8()))
        } else {
            Ok(())
        }
    }
}

/// Error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES as usize];
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for byte in raw.iter_mut() {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => *byte = (h << 4) | l,
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }
        if chars.next().is_some() {
            return Err(AddressError::Invalid);
        }

        Ok(Address { raw })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

impl Address {
    /// Reads the ROM code of the only device on a single-drop bus.
    ///
    /// With more than one device the answers collide and the CRC check fails.
    pub fn read_single<B: OneWire>(
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<B::Error>> {
        if !bus.reset(delay)? {
            return Err(Error::BusFault);
        }
        bus.write_byte(delay, Command::ReadRom.op_code())?;
        let mut raw = [0u8; Self::BYTES as usize];
        bus.read_bytes(delay, &mut raw)?;
        let address = Address::from(raw);
        address.ensure_correct_crc8()?;
        Ok(address)
    }
}
