#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

mod address;
mod bus;
mod command;
mod crc;
mod critical;
mod driver;
#[cfg(feature = "ds18x20")]
pub mod ds18x20;
mod iowire;
mod result;
mod search;
#[cfg(test)]
mod sim;
#[cfg(feature = "ds18x20")]
mod table;
mod timing;

pub use address::{Address, AddressError};
pub use bus::OneWire;
pub use command::{Command, OpCode};
pub use crc::{crc8, Crc8};
pub use driver::Driver;
pub use iowire::{Inverted, IoWire};
pub use result::Error;
pub use search::{DeviceSearch, DeviceSearchIter};
#[cfg(feature = "ds18x20")]
pub use table::{
    Entry, SensorTable, BUSY_POLL_INTERVAL_MS, MAX_BUSY_POLLS, MIN_CONVERSION_WAIT_MS,
};
pub use timing::Timing;
