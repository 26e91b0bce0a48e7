use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, warn};

use crate::ds18x20::{self, Ds18x20, Temperature};
use crate::{DeviceSearch, Error, OneWire};

/// Wait after a broadcast conversion before the busy bit is polled
pub const MIN_CONVERSION_WAIT_MS: u32 = 750;

/// Interval between busy bit polls
pub const BUSY_POLL_INTERVAL_MS: u32 = 10;

/// Polls of the busy bit before a conversion is given up
pub const MAX_BUSY_POLLS: u32 = 100;

/// A discovered sensor and its last reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    sensor: Ds18x20,
    temperature: Option<Temperature>,
}

impl Entry {
    pub fn sensor(&self) -> &Ds18x20 {
        &self.sensor
    }

    /// `None` until a reading succeeded, and again after a failed one.
    pub fn temperature(&self) -> Option<Temperature> {
        self.temperature
    }
}

/// Every temperature sensor of a bus, up to `N` of them.
#[derive(Debug, Clone, Default)]
pub struct SensorTable<const N: usize> {
    entries: Vec<Entry, N>,
}

impl<const N: usize> SensorTable<N> {
    pub fn new() -> Self {
        SensorTable {
            entries: Vec::new(),
        }
    }

    /// Enumerates the bus and keeps the supported sensors with a valid ROM
    /// code, replacing any previous table.
    ///
    /// Stops once `N` sensors are known. A search that loses the devices
    /// midway ends the discovery with whatever was found so far.
    pub fn discover<B: OneWire>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<usize, Error<B::Error>> {
        self.entries.clear();
        let mut search = DeviceSearch::new();

        while !self.entries.is_full() {
            let (address, more) = match search.search(bus, delay) {
                Ok(Some(found)) => found,
                Ok(None) => break,
                Err(Error::ProtocolDesync) => {
                    warn!("discovery stopped after {} sensors", self.entries.len());
                    break;
                }
                Err(e) => return Err(e),
            };

            if let Err(e) = address.ensure_correct_crc8::<B::Error>() {
                warn!("skipping {}: {}", address, e);
            } else if let Ok(sensor) = Ds18x20::from_address::<B::Error>(address) {
                debug!("sensor {} ({:?})", address, sensor.family());
                let entry = Entry {
                    sensor,
                    temperature: None,
                };
                if self.entries.push(entry).is_err() {
                    break;
                }
            } else {
                debug!("ignoring {}", address);
            }

            if !more {
                break;
            }
        }

        Ok(self.entries.len())
    }

    /// Starts a conversion on every device of the bus at once.
    pub fn start_conversion<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<B::Error>> {
        ds18x20::start_conversion(bus, delay, None)
    }

    pub fn conversion_in_progress<B: OneWire>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<B::Error>> {
        ds18x20::conversion_in_progress(bus, delay)
    }

    /// Reads every sensor and returns how many readings succeeded.
    ///
    /// A sensor that fails loses its previous reading. Only pin errors
    /// abort the whole pass.
    pub fn read_all<B: OneWire>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<usize, Error<B::Error>> {
        let mut read = 0;
        for entry in self.entries.iter_mut() {
            entry.temperature = match entry.sensor.read_temperature(bus, delay) {
                Ok(temperature) => {
                    read += 1;
                    Some(temperature)
                }
                Err(Error::PortError(e)) => return Err(Error::PortError(e)),
                Err(e) => {
                    warn!("reading {} failed: {}", entry.sensor.address(), e);
                    None
                }
            };
        }
        Ok(read)
    }

    /// One full poll cycle: convert, wait for the busy bit to clear, read.
    pub fn measure<B: OneWire>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<usize, Error<B::Error>> {
        self.start_conversion(bus, delay)?;
        delay.delay_ms(MIN_CONVERSION_WAIT_MS);

        for _ in 0..MAX_BUSY_POLLS {
            if !self.conversion_in_progress(bus, delay)? {
                return self.read_all(bus, delay);
            }
            delay.delay_ms(BUSY_POLL_INTERVAL_MS);
        }

        warn!("conversion still running after {} polls", MAX_BUSY_POLLS);
        Err(Error::Timeout)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }
}
