//! Cycle-stepped original Game Boy (DMG) emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/MMU/PPU/timer
//! and cartridge mappers). Hosts drive the core through the [`gameboy`] facade.

/// Sound register file. No audio is produced.
pub mod apu;

/// Cartridge mappers (MBC) and ROM/RAM/RTC handling.
pub mod cartridge;

/// Machine settings.
pub mod config;

/// LR35902 CPU core.
pub mod cpu;

pub mod error;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod input;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// MBC3 real-time clock and its wall-clock source.
pub mod rtc;

/// Link port with no cable attached.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

pub use config::Settings;
pub use error::{Error, Result};
pub use gameboy::{GameBoy, MachineState};
pub use input::Button;
