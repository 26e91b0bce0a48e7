use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E: Sized + Debug> {
    /// Reset saw no presence pulse, or the line stayed low after it
    BusFault,
    /// Search read `1` for both a bit and its complement
    ProtocolDesync,
    /// Checksum over a ROM code or scratchpad did not match (computed, received)
    CrcMismatch(u8, u8),
    /// Bounded wait for the device ran out of retries
    Timeout,
    /// Operation is not available for the given target
    NotSupported,
    /// Address belongs to another device family (expected, found)
    FamilyCodeMismatch(u8, u8),
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

impl<E: Sized + Debug> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Error::BusFault => f.write_str("no presence on bus"),
            Error::ProtocolDesync => f.write_str("no device answered during search"),
            Error::CrcMismatch(computed, received) => write!(
                f,
                "crc mismatch: computed {:02x}, received {:02x}",
                computed, received
            ),
            Error::Timeout => f.write_str("device did not finish in time"),
            Error::NotSupported => f.write_str("operation not supported"),
            Error::FamilyCodeMismatch(expected, found) => write!(
                f,
                "family code mismatch: expected {:02x}, found {:02x}",
                expected, found
            ),
            Error::PortError(e) => write!(f, "port error: {:?}", e),
        }
    }
}
