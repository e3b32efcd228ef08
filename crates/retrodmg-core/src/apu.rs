//! Sound register file (0xFF10-0xFF3F).
//!
//! No audio is synthesized. Registers keep what software writes so that
//! read-back, the NR52 power switch and wave RAM behave like hardware.

use log::debug;

const REG_COUNT: usize = 0x30;
const NR52: u16 = 0xFF26;

#[derive(Debug, Clone)]
pub struct Apu {
    regs: [u8; REG_COUNT],
    wave_ram: [u8; 0x10],
    nr52: u8,
}

impl Apu {
    pub fn new() -> Self {
        let mut apu = Self {
            regs: [0; REG_COUNT],
            wave_ram: [0; 0x10],
            nr52: 0xF1,
        };
        // Post-boot register values.
        for (addr, val) in [
            (0xFF10, 0x80),
            (0xFF11, 0xBF),
            (0xFF12, 0xF3),
            (0xFF14, 0xBF),
            (0xFF16, 0x3F),
            (0xFF19, 0xBF),
            (0xFF1A, 0x7F),
            (0xFF1B, 0xFF),
            (0xFF1C, 0x9F),
            (0xFF1E, 0xBF),
            (0xFF20, 0xFF),
            (0xFF23, 0xBF),
            (0xFF24, 0x77),
            (0xFF25, 0xF3),
        ] {
            apu.regs[(addr - 0xFF10) as usize] = val;
        }
        apu
    }

    /// Power-on state used when a boot ROM runs: everything cleared and off.
    pub fn new_power_on() -> Self {
        Self {
            regs: [0; REG_COUNT],
            wave_ram: [0; 0x10],
            nr52: 0x00,
        }
    }

    fn read_mask(addr: u16) -> u8 {
        match addr {
            0xFF10 => 0x80,
            0xFF11 => 0x3F,
            0xFF12 => 0x00,
            0xFF13 => 0xFF,
            0xFF14 => 0xBF,
            0xFF16 => 0x3F,
            0xFF17 => 0x00,
            0xFF18 => 0xFF,
            0xFF19 => 0xBF,
            0xFF1A => 0x7F,
            0xFF1B => 0xFF,
            0xFF1C => 0x9F,
            0xFF1D => 0xFF,
            0xFF1E => 0xBF,
            0xFF20 => 0xFF,
            0xFF21 => 0x00,
            0xFF22 => 0x00,
            0xFF23 => 0xBF,
            0xFF24 => 0x00,
            0xFF25 => 0x00,
            0xFF26 => 0x70,
            0xFF30..=0xFF3F => 0x00,
            _ => 0xFF,
        }
    }

    pub fn powered(&self) -> bool {
        self.nr52 & 0x80 != 0
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            NR52 => (self.nr52 & 0x80) | Self::read_mask(addr),
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize],
            0xFF10..=0xFF2F => self.regs[(addr - 0xFF10) as usize] | Self::read_mask(addr),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            NR52 => {
                let was_on = self.powered();
                self.nr52 = 0x70 | (val & 0x80);
                if was_on && !self.powered() {
                    debug!("APU powered off");
                    self.regs.fill(0);
                }
            }
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize] = val,
            0xFF10..=0xFF2F => {
                if self.powered() {
                    self.regs[(addr - 0xFF10) as usize] = val;
                }
            }
            _ => {}
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
