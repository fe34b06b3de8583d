use crate::transport::Transport;

/// Control-register bits that keep the same placement across the supported
/// ASIC generations. Addresses that move between generations live in
/// `asic::AsicTable` instead.
pub const REG_SCANCTL: u16 = 0x01;
pub const SCANCTL_SCAN: u8 = 0x01;
pub const SCANCTL_DVDSET: u8 = 0x04;
pub const SCANCTL_CISSET: u8 = 0x80;

pub const REG_MOTORCTL: u16 = 0x02;
/// Disables backtracking when the buffer runs full.
pub const MOTORCTL_ACDCDIS: u8 = 0x01;
pub const MOTORCTL_MTRREV: u8 = 0x04;
pub const MOTORCTL_FASTFED: u8 = 0x08;
pub const MOTORCTL_MTRPWR: u8 = 0x10;
pub const MOTORCTL_AGOHOME: u8 = 0x40;

pub const REG_LAMPCTL: u16 = 0x03;
pub const LAMPCTL_LAMPPWR: u8 = 0x10;
pub const LAMPCTL_XPASEL: u8 = 0x40;

pub const REG_PIXELCTL: u16 = 0x04;
pub const PIXELCTL_BITSET: u8 = 0x08;
pub const PIXELCTL_FILTER_MASK: u8 = 0x30;
pub const PIXELCTL_FILTER_SHIFT: u8 = 4;
pub const PIXELCTL_LINEART: u8 = 0x80;

pub const REG_DPICTL: u16 = 0x05;
pub const DPICTL_GMMENB: u8 = 0x08;
pub const DPICTL_DPIHW_MASK: u8 = 0xc0;
pub const DPICTL_DPIHW_600: u8 = 0x00;
pub const DPICTL_DPIHW_1200: u8 = 0x40;
pub const DPICTL_DPIHW_2400: u8 = 0x80;
pub const DPICTL_DPIHW_4800: u8 = 0xc0;

pub const REG_MOVE: u16 = 0x0f;

bitflags::bitflags! {
    /// Decoded hardware status bits. Read fresh on every poll; hardware state
    /// changes asynchronously, so a snapshot is only valid for the decision
    /// it was read for.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Status: u8 {
        const MOTOR_ENABLED = 0x01;
        const FRONTEND_BUSY = 0x02;
        const LAMP_ON = 0x04;
        const AT_HOME = 0x08;
        const SCAN_FINISHED = 0x10;
        const FEED_FINISHED = 0x20;
        const BUFFER_EMPTY = 0x40;
        const REPLUGGED = 0x80;
    }
}

/// Sparse in-memory image of the ASIC's register space. Setup code mutates
/// this image; nothing reaches the hardware until an explicit `commit`, so an
/// aborted calibration sub-scan never leaves a partially written live image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSet {
    registers: std::collections::BTreeMap<u16, u8>,
}

impl RegisterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: &[(u16, u8)]) -> Self {
        Self {
            registers: table.iter().copied().collect(),
        }
    }

    pub fn set(&mut self, address: u16, value: u8) {
        self.registers.insert(address, value);
    }

    pub fn get(&self, address: u16) -> u8 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Replaces the bits selected by `mask` and leaves the rest untouched.
    pub fn update(&mut self, address: u16, mask: u8, value: u8) {
        let current = self.get(address);
        self.set(address, (current & !mask) | (value & mask));
    }

    pub fn set_bit(&mut self, address: u16, bit: u8, enabled: bool) {
        self.update(address, bit, if enabled { bit } else { 0 });
    }

    /// Stores a big-endian multi-byte value across `bytes` consecutive
    /// register addresses, most significant byte first.
    pub fn set_wide(&mut self, address: u16, value: u32, bytes: u16) {
        for index in 0..bytes {
            let shift = 8 * (bytes - 1 - index);
            self.set(address + index, ((value >> shift) & 0xff) as u8);
        }
    }

    pub fn get_wide(&self, address: u16, bytes: u16) -> u32 {
        let mut value = 0u32;
        for index in 0..bytes {
            value = (value << 8) | self.get(address + index) as u32;
        }
        value
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.registers.iter().map(|(address, value)| (*address, *value))
    }

    /// Pushes the whole image to hardware. This is the single commit point;
    /// there is no atomicity across registers, so a transport failure here
    /// leaves the device needing an ASIC reboot.
    pub fn commit<T: Transport>(&self, transport: &mut T) -> Result<(), crate::transport::Error> {
        for (address, value) in self.iter() {
            transport.write_register(address, value)?;
        }
        Ok(())
    }
}

pub fn read_status<T: Transport>(
    transport: &mut T,
    status_address: u16,
) -> Result<Status, crate::transport::Error> {
    Ok(Status::from_bits_truncate(
        transport.read_register(status_address)?,
    ))
}
