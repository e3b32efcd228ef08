use log::{info, trace, warn};

use crate::{
    apu::Apu,
    cartridge::Cartridge,
    cpu::Bus,
    input::Input,
    ppu::{OAM_SIZE, Ppu},
    serial::Serial,
    timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const BOOT_ROM_SIZE: usize = 0x100;

pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    pub serial: Serial,
    warned_no_cart: bool,
}

impl Mmu {
    /// Bus in the state the DMG boot ROM leaves behind.
    pub fn new() -> Self {
        let mut timer = Timer::new();
        timer.div = 0xABCC;

        let mut ppu = Ppu::new();
        ppu.apply_boot_state();

        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            if_reg: 0xE1,
            ie_reg: 0,
            ppu,
            apu: Apu::new(),
            timer,
            input: Input::new(),
            serial: Serial::new(),
            warned_no_cart: false,
        }
    }

    /// Bus at power-on, for running a boot ROM: LCD off, sound off, DIV zero.
    pub fn new_power_on() -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            if_reg: 0xE0,
            ie_reg: 0,
            ppu: Ppu::new(),
            apu: Apu::new_power_on(),
            timer: Timer::new(),
            input: Input::new(),
            serial: Serial::new(),
            warned_no_cart: false,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
        self.warned_no_cart = false;
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        if data.len() != BOOT_ROM_SIZE {
            warn!(
                "Boot ROM is {} bytes, expected {BOOT_ROM_SIZE}",
                data.len()
            );
        }
        info!("Boot ROM mapped");
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    fn unmap_boot_rom(&mut self) {
        if self.boot_mapped {
            info!("Boot ROM unmapped");
            self.boot_mapped = false;
        }
    }

    fn cart_read(&mut self, addr: u16) -> u8 {
        match &self.cart {
            Some(cart) => cart.read(addr),
            None => {
                if !self.warned_no_cart {
                    warn!("Read from {addr:04X} with no cartridge loaded");
                    self.warned_no_cart = true;
                }
                0xFF
            }
        }
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        if addr == 0x0100 {
            // Fetching the cartridge entry point ends the boot sequence.
            let value = self.cart_read(addr);
            self.unmap_boot_rom();
            return value;
        }
        self.read_byte_inner(addr)
    }

    fn read_byte_inner(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF => self.cart_read(addr),
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xA000..=0xBFFF => self.cart_read(addr),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0x00,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => match self.cart.as_mut() {
                Some(cart) => cart.write(addr, val),
                None => trace!("Dropped write {val:02X} to {addr:04X}: no cartridge"),
            },
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFF00 => self.input.write(val, &mut self.if_reg),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF44 => trace!("Dropped write {val:02X} to LY"),
            0xFF46 => {
                self.ppu.dma = val;
                self.oam_dma(val);
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF50 => {
                if val != 0 {
                    self.unmap_boot_rom();
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => trace!("Dropped write {val:02X} to {addr:04X}"),
        }
    }

    /// Copy 0xA0 bytes from `page << 8` into OAM in one go.
    fn oam_dma(&mut self, page: u8) {
        let mut src = (page as u16) << 8;
        // Sources above WRAM hit the echo region's backing memory.
        if src >= 0xE000 {
            src -= 0x2000;
        }
        for i in 0..OAM_SIZE as u16 {
            let byte = self.read_byte_inner(src + i);
            self.ppu.oam[i as usize] = byte;
        }
    }

    /// Reset the internal divider, as on a DIV write or STOP.
    pub fn reset_div(&mut self) {
        self.timer.reset_div();
    }

    /// Clock everything that runs alongside the CPU by `cycles` T-cycles.
    pub fn tick(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.if_reg);
        self.ppu.step(cycles, &mut self.if_reg);
        self.serial.step(cycles, &mut self.if_reg);
    }

    pub fn save_cart_ram(&mut self) -> crate::error::Result<()> {
        match self.cart.as_mut() {
            Some(cart) => cart.save_ram(),
            None => Err(crate::error::Error::MbcNotLoaded),
        }
    }
}

impl Bus for Mmu {
    fn read(&mut self, addr: u16) -> u8 {
        self.read_byte(addr)
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.write_byte(addr, val);
    }

    fn tick(&mut self, cycles: u32) {
        Mmu::tick(self, cycles);
    }

    fn interrupt_enable(&self) -> u8 {
        self.ie_reg
    }

    fn interrupt_flag(&self) -> u8 {
        self.if_reg
    }

    fn set_interrupt_flag(&mut self, val: u8) {
        self.if_reg = val;
    }

    fn reset_div(&mut self) {
        Mmu::reset_div(self);
    }

    fn joypad_line_low(&self) -> bool {
        self.input.any_line_low()
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
