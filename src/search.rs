use crate::{Address, Command, Error, OneWire, OpCode};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Where the next walk takes the untried branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Cursor {
    /// Nothing walked yet, every discrepancy goes down the 0 branch
    #[default]
    Fresh,
    /// Bit position of the deepest 0 branch whose 1 branch is still open
    Branch(u8),
    /// Every branch has been walked
    Exhausted,
}

/// Enumeration state carried from one [`DeviceSearch::search`] call to the next.
///
/// Each call walks the ROM tree once and returns one device. Start a new
/// enumeration with [`DeviceSearch::new`] or [`DeviceSearch::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSearch {
    command: Command,
    cursor: Cursor,
    last: Address,
}

impl Default for DeviceSearch {
    fn default() -> Self {
        DeviceSearch::new()
    }
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch {
            command: Command::SearchRom,
            cursor: Cursor::Fresh,
            last: Address::default(),
        }
    }

    /// Only devices with a pending temperature alarm take part.
    pub fn new_alarmed() -> DeviceSearch {
        DeviceSearch {
            command: Command::SearchRomAlarmed,
            ..DeviceSearch::new()
        }
    }

    /// Starts the walk at the first device whose family code is at or after
    /// `family`. Later devices are not filtered.
    pub fn for_family(family: u8) -> DeviceSearch {
        let mut raw = [0u8; Address::BYTES as usize];
        raw[0] = family;
        DeviceSearch {
            cursor: Cursor::Branch(Address::BITS),
            last: Address::from(raw),
            ..DeviceSearch::new()
        }
    }

    /// Forgets all progress, keeping the search command.
    pub fn reset(&mut self) {
        self.cursor = Cursor::Fresh;
        self.last = Address::default();
    }

    /// Whether every device has been returned.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    /// The address returned by the previous call.
    pub fn last_address(&self) -> Option<&Address> {
        match self.cursor {
            Cursor::Fresh => None,
            _ => Some(&self.last),
        }
    }

    /// Bit position of the branch the next call will switch to.
    pub fn last_discrepancy(&self) -> Option<u8> {
        match self.cursor {
            Cursor::Branch(position) if position < Address::BITS => Some(position),
            _ => None,
        }
    }

    /// Walks the ROM tree once.
    ///
    /// Returns the address of one device and whether more devices are left
    /// to enumerate, or `None` when the enumeration is complete or nobody
    /// answered the reset. The address is not checked against its CRC.
    ///
    /// [`Error::ProtocolDesync`] is returned when no device drove a bit; the
    /// state is left as it was, so the call can simply be repeated. An alarm
    /// search that nobody answers from the first bit on ends with `None`
    /// instead, also leaving the state as it was.
    pub fn search<B: OneWire>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Option<(Address, bool)>, Error<B::Error>> {
        if self.cursor == Cursor::Exhausted || !bus.reset(delay)? {
            return Ok(None);
        }

        bus.write_byte(delay, self.command.op_code())?;

        let mut raw = [0u8; Address::BYTES as usize];
        let mut next_branch = None;

        for position in 0..Address::BITS {
            let index = (position / 8) as usize;
            let mask = 1u8 << (position % 8);

            let id_bit = bus.read_bit(delay)?;
            let complement = bus.read_bit(delay)?;

            let bit = match (id_bit, complement) {
                // no alarm pending anywhere, nobody joined the walk
                (true, true)
                    if position == 0 && self.command == Command::SearchRomAlarmed =>
                {
                    return Ok(None);
                }
                (true, true) => {
                    warn!("search lost all devices at bit {}", position);
                    return Err(Error::ProtocolDesync);
                }
                (false, false) => {
                    let bit = match self.cursor {
                        Cursor::Branch(last) if position < last => self.last[index] & mask != 0,
                        Cursor::Branch(last) => position == last,
                        _ => false,
                    };
                    if !bit {
                        next_branch = Some(position);
                    }
                    bit
                }
                (bit, _) => bit,
            };

            // devices whose bit differs drop out until the next reset
            bus.write_bit(delay, bit)?;
            if bit {
                raw[index] |= mask;
            }
        }

        let address = Address::from(raw);
        self.cursor = next_branch.map_or(Cursor::Exhausted, Cursor::Branch);
        self.last = address;
        debug!("found device {}", address);
        Ok(Some((address, next_branch.is_some())))
    }

    pub fn into_iter<'a, B: OneWire, D: DelayNs>(
        self,
        bus: &'a mut B,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, B, D> {
        DeviceSearchIter {
            search: Some(self),
            bus,
            delay,
        }
    }
}

/// Yields every address on the bus, stopping after the first error.
pub struct DeviceSearchIter<'a, B: OneWire, D: DelayNs> {
    search: Option<DeviceSearch>,
    bus: &'a mut B,
    delay: &'a mut D,
}

impl<B: OneWire, D: DelayNs> Iterator for DeviceSearchIter<'_, B, D> {
    type Item = Result<Address, Error<B::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = search
            .search(&mut *self.bus, &mut *self.delay)
            .map(|found| found.map(|(address, _)| address))
            .transpose()?;
        if result.is_ok() {
            self.search = Some(search);
        }
        Some(result)
    }
}
