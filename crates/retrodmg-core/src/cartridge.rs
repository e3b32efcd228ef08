use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    error::{Error, Result},
    rtc::{Clock, Rtc, SystemClock},
};

/// Memory bank controller family, selected once from the header type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub kind: MbcKind,
    pub title: String,
    cart_type: u8,
    rom_banks: usize,
    ram_banks: usize,
    rom_hash: u64,
    save_path: Option<PathBuf>,
    rtc_path: Option<PathBuf>,
    clock: Box<dyn Clock>,
    mbc_state: MbcState,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
        has_rumble: bool,
        rumble: bool,
    },
}

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const MBC2_RAM_SIZE: usize = 0x200;

impl Cartridge {
    /// Parse the header and build the matching controller.
    pub fn load(data: Vec<u8>) -> Result<Self> {
        let header = Header::parse(&data);
        let kind = header.mbc_kind()?;
        let cart_type = header.cart_type();
        let ram_size = header.ram_size(kind);
        let rom_banks = header.rom_banks();
        let ram_banks = ram_size.div_ceil(RAM_BANK_SIZE);
        let title = header.title();

        let actual_banks = data.len().div_ceil(ROM_BANK_SIZE);
        if header.is_present() && actual_banks != rom_banks {
            warn!(
                "ROM size mismatch: header declares {rom_banks} banks, image holds {actual_banks}"
            );
        }

        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let mbc_state = match kind {
            MbcKind::NoMbc => MbcState::NoMbc,
            MbcKind::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcKind::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcKind::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(|| Rtc::new(clock.now())),
                latch_pending: false,
            },
            MbcKind::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                has_rumble: header.has_rumble(),
                rumble: false,
            },
        };

        Ok(Self {
            rom_hash: fnv1a(&data),
            rom: data,
            ram: vec![0; ram_size],
            kind,
            title,
            cart_type,
            rom_banks,
            ram_banks,
            save_path: None,
            rtc_path: None,
            clock,
            mbc_state,
        })
    }

    /// Build a cartridge with an explicit RAM size, ignoring the header RAM code.
    pub fn with_ram_size(data: Vec<u8>, ram_size: usize) -> Result<Self> {
        let mut cart = Self::load(data)?;
        cart.ram = vec![0; ram_size];
        cart.ram_banks = ram_size.div_ceil(RAM_BANK_SIZE);
        Ok(cart)
    }

    /// Load a ROM image from disk along with its `.sav` (and `.rtc`) companions.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data)?;

        if cart.has_battery() {
            let save = path.as_ref().with_extension("sav");
            if let Ok(bytes) = fs::read(&save) {
                cart.set_ram(&bytes);
            }
            cart.save_path = Some(save);
        }

        if cart.has_rtc() {
            let rtc_path = path.as_ref().with_extension("rtc");
            let now = cart.clock.now();
            let saved = fs::read(&rtc_path).ok().and_then(|bytes| {
                let rtc = Rtc::from_record(&bytes);
                if rtc.is_none() {
                    warn!("Failed to parse RTC data from {}", rtc_path.display());
                }
                rtc
            });
            if let Some(rtc) = cart.rtc_mut() {
                if let Some(saved) = saved {
                    *rtc = saved;
                }
                // Time spent with the emulator closed counts too.
                rtc.latch(now);
            }
            cart.rtc_path = Some(rtc_path);
        }

        info!(
            "Loaded ROM: {} (MBC: {:?}, ROM banks: {}, RAM banks: {})",
            cart.title, cart.kind, cart.rom_banks, cart.ram_banks
        );
        Ok(cart)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Raw cartridge type byte from 0x147.
    pub fn cart_type(&self) -> u8 {
        self.cart_type
    }

    pub fn kind(&self) -> MbcKind {
        self.kind
    }

    /// Stable 64-bit FNV-1a digest of the ROM image.
    pub fn rom_hash(&self) -> u64 {
        self.rom_hash
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_banks
    }

    pub fn ram_banks(&self) -> usize {
        self.ram_banks
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        self.rtc_ref().is_some()
    }

    /// Current state of the MBC5 rumble motor. Always false on other carts.
    pub fn rumble_active(&self) -> bool {
        matches!(self.mbc_state, MbcState::Mbc5 { rumble: true, .. })
    }

    /// Snapshot of battery-backed RAM, or `None` when the cart has no RAM.
    pub fn get_ram(&self) -> Option<Vec<u8>> {
        if self.ram.is_empty() {
            return None;
        }
        match self.mbc_state {
            MbcState::Mbc2 { .. } => Some(self.ram.iter().map(|b| b | 0xF0).collect()),
            _ => Some(self.ram.clone()),
        }
    }

    /// Overwrite RAM from a saved buffer. Extra bytes are ignored and a short
    /// buffer only replaces its prefix.
    pub fn set_ram(&mut self, data: &[u8]) {
        let mbc2 = matches!(self.mbc_state, MbcState::Mbc2 { .. });
        for (d, s) in self.ram.iter_mut().zip(data.iter()) {
            *d = if mbc2 { *s & 0x0F } else { *s };
        }
    }

    /// Replace the wall-clock source the RTC counts against. Time between
    /// the old and new clocks is not counted.
    pub fn set_clock<C: Clock + 'static>(&mut self, clock: C) {
        let now = clock.now();
        self.clock = Box::new(clock);
        if let Some(rtc) = self.rtc_mut() {
            rtc.rebase(now);
        }
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    fn rom_byte(&self, bank: usize, addr: u16) -> u8 {
        let offset = bank * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1));
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = self.rom_bank_count();
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                self.rom_byte(bank, addr)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let high = ((*ram_bank as usize) & 0x03) << 5;
                let mut bank = high | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                self.rom_byte(bank % rom_bank_count, addr)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => self.rom_byte(0, addr),
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = ((*rom_bank & 0x0F) as usize).max(1) % rom_bank_count;
                self.rom_byte(bank, addr)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = ((*rom_bank & 0x7F) as usize).max(1) % rom_bank_count;
                self.rom_byte(bank, addr)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize).max(1) % rom_bank_count;
                self.rom_byte(bank, addr)
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                self.ram.get(addr as usize - 0xA000).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512x4-bit internal RAM, mirrored across the whole window.
                    let idx = (addr as usize - 0xA000) & (MBC2_RAM_SIZE - 1);
                    let nibble = self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F;
                    0xF0 | nibble
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    self.ram_index(addr)
                        .and_then(|idx| self.ram.get(idx).copied())
                        .unwrap_or(0xFF)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => self
                            .ram_index(addr)
                            .and_then(|idx| self.ram.get(idx).copied())
                            .unwrap_or(0xFF),
                        0x08..=0x0C => rtc.as_ref().map_or(0xFF, |r| r.read(*ram_bank)),
                        _ => 0xFF,
                    }
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let ram_index = self.ram_index(addr);
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x3FFF) => {}
            (MbcState::NoMbc, 0x4000..=0x7FFF) => {
                // Some homebrew treats the upper ROM area as scratch space.
                if let Some(b) = self.rom.get_mut(addr as usize) {
                    *b = val;
                }
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                if let Some(b) = self.ram.get_mut(addr as usize - 0xA000) {
                    *b = val;
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects between RAMG (clear) and ROMB (set).
                if (addr & 0x0100) == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & (MBC2_RAM_SIZE - 1);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable
                    && let Some(b) = ram_index.and_then(|idx| self.ram.get_mut(idx))
                {
                    *b = val;
                }
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                if val == 0 {
                    *latch_pending = true;
                } else {
                    if val == 1
                        && *latch_pending
                        && let Some(rtc) = rtc
                    {
                        rtc.latch(self.clock.now());
                    }
                    *latch_pending = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            if let Some(b) = ram_index.and_then(|idx| self.ram.get_mut(idx)) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write(*ram_bank, val, self.clock.now());
                            }
                        }
                        _ => {}
                    }
                }
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (
                MbcState::Mbc5 {
                    ram_bank,
                    has_rumble,
                    rumble,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                if *has_rumble {
                    *rumble = val & 0x08 != 0;
                    *ram_bank = val & 0x07;
                } else {
                    *ram_bank = val & 0x0F;
                }
            }
            _ => {}
        }
    }

    /// Offset into `ram` for an address in the 0xA000-0xBFFF window, using
    /// the currently selected RAM bank. Banks wrap by the RAM actually present.
    fn ram_index(&self, addr: u16) -> Option<usize> {
        if !(0xA000..=0xBFFF).contains(&addr) || self.ram.is_empty() {
            return None;
        }
        let offset = addr as usize - 0xA000;
        let bank_count = self.ram.len().div_ceil(RAM_BANK_SIZE);
        let bank = match &self.mbc_state {
            MbcState::NoMbc | MbcState::Mbc2 { .. } => 0,
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                if *mode == 0 {
                    0
                } else {
                    *ram_bank as usize
                }
            }
            MbcState::Mbc3 { ram_bank, .. } => (*ram_bank & 0x03) as usize,
            MbcState::Mbc5 { ram_bank, .. } => *ram_bank as usize,
        };
        let idx = (bank % bank_count) * RAM_BANK_SIZE + offset;
        // Carts with 2KB of RAM mirror it across the window.
        Some(idx % self.ram.len().max(1))
    }

    fn rtc_ref(&self) -> Option<&Rtc> {
        match &self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    /// Write battery RAM (and RTC state) next to the ROM it was loaded from.
    pub fn save_ram(&mut self) -> Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path)
            && let Some(ram) = self.get_ram()
        {
            fs::write(path, ram)?;
        }

        let rtc_path = self.rtc_path.clone();
        let now = self.clock.now();
        if let (Some(path), Some(rtc)) = (rtc_path, self.rtc_mut()) {
            rtc.sync(now);
            fs::write(path, rtc.to_record())?;
        }
        Ok(())
    }
}

/// 64-bit FNV-1a.
fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    data.iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Images shorter than a full header are treated as bare ROM-only code.
    fn is_present(&self) -> bool {
        self.data.len() >= 0x150
    }

    fn title(&self) -> String {
        let end = 0x0144.min(self.data.len());
        let mut slice = &self.data[0x0134.min(end)..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice)
            .trim_matches(|c: char| c.is_whitespace() || c.is_control())
            .to_string()
    }

    fn cart_type(&self) -> u8 {
        if !self.is_present() {
            return 0x00;
        }
        self.data[0x0147]
    }

    fn mbc_kind(&self) -> Result<MbcKind> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcKind::NoMbc),
            0x01..=0x03 => Ok(MbcKind::Mbc1),
            0x05 | 0x06 => Ok(MbcKind::Mbc2),
            0x0F..=0x13 => Ok(MbcKind::Mbc3),
            0x19..=0x1E => Ok(MbcKind::Mbc5),
            other => Err(Error::CartridgeTypeUnrecognized(other)),
        }
    }

    fn has_rtc(&self) -> bool {
        matches!(self.cart_type(), 0x0F | 0x10)
    }

    fn has_rumble(&self) -> bool {
        matches!(self.cart_type(), 0x1C..=0x1E)
    }

    fn rom_banks(&self) -> usize {
        let from_len = self.data.len().div_ceil(ROM_BANK_SIZE).max(2);
        if !self.is_present() {
            return from_len;
        }
        match self.data[0x0148] {
            code @ 0x00..=0x08 => 2usize << code,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            _ => from_len,
        }
    }

    fn ram_size(&self, kind: MbcKind) -> usize {
        if !self.is_present() {
            return 0;
        }

        // MBC2 has 512x4-bit internal RAM regardless of header RAM size.
        if kind == MbcKind::Mbc2 {
            return MBC2_RAM_SIZE;
        }

        match self.data[0x0149] {
            0x00 => 0,
            0x01 => 0x800,   // 2KB
            0x02 => 0x2000,  // 8KB
            0x03 => 0x8000,  // 32KB (4 banks)
            0x04 => 0x20000, // 128KB (16 banks)
            0x05 => 0x10000, // 64KB (8 banks)
            _ => 0x2000,
        }
    }
}
