use log::{debug, info};

use crate::{
    cartridge::Cartridge,
    config::Settings,
    cpu::{Cpu, CpuState},
    error::{Error, Result},
    input::Button,
    mmu::Mmu,
    ppu::{LcdMode, SCREEN_HEIGHT, SCREEN_WIDTH},
};

/// T-cycles in one full 154-line frame.
pub const CYCLES_PER_FRAME: u32 = 70_224;

/// Consistent snapshot of the machine for debuggers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub cpu: CpuState,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ly: u8,
    pub mode: LcdMode,
    pub joyp: u8,
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    settings: Settings,
}

impl GameBoy {
    /// Build a machine from `settings`. With a boot ROM the CPU starts from
    /// power-on at 0x0000; without one it starts in the post-boot state.
    pub fn new(settings: Settings) -> Self {
        let (cpu, mmu) = Self::power_up(&settings);
        Self { cpu, mmu, settings }
    }

    fn power_up(settings: &Settings) -> (Cpu, Mmu) {
        match &settings.boot_rom {
            Some(boot) => {
                let mut mmu = Mmu::new_power_on();
                mmu.load_boot_rom(boot.clone());
                (Cpu::new_power_on(), mmu)
            }
            None => (Cpu::new(), Mmu::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings and restart the machine under them. The loaded
    /// cartridge is kept.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.settings = settings.clone();
        self.reset();
    }

    /// Parse `data` as a cartridge image and restart the machine with it.
    pub fn load_rom(&mut self, data: Vec<u8>) -> Result<()> {
        let cart = Cartridge::load(data)?;
        self.load_cartridge(cart);
        Ok(())
    }

    pub fn load_cartridge(&mut self, cart: Cartridge) {
        info!(
            "Inserted \"{}\" ({:?}, type {:02X}, hash {:016X})",
            cart.title(),
            cart.kind(),
            cart.cart_type(),
            cart.rom_hash()
        );
        let (cpu, mmu) = Self::power_up(&self.settings);
        self.cpu = cpu;
        self.mmu = mmu;
        self.mmu.load_cart(cart);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.mmu.cart.as_ref()
    }

    /// Restart from the configured initial state, keeping the cartridge and
    /// the boot ROM.
    pub fn reset(&mut self) {
        let cart = self.mmu.cart.take();
        let (cpu, mmu) = Self::power_up(&self.settings);
        self.cpu = cpu;
        self.mmu = mmu;
        if let Some(cart) = cart {
            self.mmu.load_cart(cart);
        }
    }

    /// Execute one CPU instruction and return the T-cycles it took.
    pub fn step(&mut self) -> Result<u32> {
        if self.mmu.cart.is_none() {
            return Err(Error::MbcNotLoaded);
        }
        self.cpu.step(&mut self.mmu)
    }

    /// Run until the next frame is committed to the viewport. With the LCD
    /// off no frame is ever committed, so this stops after one frame's worth
    /// of cycles instead.
    pub fn run_frame(&mut self) -> Result<u32> {
        if self.mmu.cart.is_none() {
            return Err(Error::MbcNotLoaded);
        }
        self.mmu.ppu.clear_frame_flag();
        let mut cycles = 0;
        while !self.mmu.ppu.frame_ready() && cycles < CYCLES_PER_FRAME {
            cycles += self.cpu.step(&mut self.mmu)?;
        }
        self.mmu.ppu.clear_frame_flag();
        Ok(cycles)
    }

    /// Last committed 160x144 frame of 2-bit shade indices.
    pub fn viewport(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.mmu.ppu.viewport()
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.mmu
            .input
            .set_button(button, pressed, &mut self.mmu.if_reg);
    }

    /// Apply a named input such as "Start" or "Left". Only player 0 is
    /// connected; other slots are accepted and ignored.
    pub fn set_input(&mut self, name: &str, active: bool, player: u8) -> Result<()> {
        let button: Button = name.parse()?;
        if player != 0 {
            debug!("Ignoring {button} for player {player}");
            return Ok(());
        }
        self.set_button(button, active);
        Ok(())
    }

    /// Bytes the game has sent over the link port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.mmu.serial.take_output()
    }

    pub fn battery_ram(&self) -> Result<Option<Vec<u8>>> {
        let cart = self.mmu.cart.as_ref().ok_or(Error::MbcNotLoaded)?;
        Ok(cart.get_ram())
    }

    pub fn load_battery_ram(&mut self, data: &[u8]) -> Result<()> {
        let cart = self.mmu.cart.as_mut().ok_or(Error::MbcNotLoaded)?;
        cart.set_ram(data);
        Ok(())
    }

    /// Write battery RAM (and RTC) next to the ROM file it was loaded from.
    pub fn save_battery(&mut self) -> Result<()> {
        self.mmu.save_cart_ram()
    }

    pub fn state(&self) -> MachineState {
        MachineState {
            cpu: self.cpu.state(),
            if_reg: self.mmu.if_reg | 0xE0,
            ie_reg: self.mmu.ie_reg,
            ly: self.mmu.ppu.ly(),
            mode: self.mmu.ppu.mode(),
            joyp: self.mmu.input.read(),
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
