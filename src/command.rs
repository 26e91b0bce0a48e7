pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM-level directives, sent right after a reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    MatchRom = 0x55,
    SearchRom = 0xF0,
    SearchRomAlarmed = 0xEC,
    SkipRom = 0xCC,
    ReadRom = 0x33,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

impl OpCode for u8 {
    fn op_code(&self) -> u8 {
        *self
    }
}
