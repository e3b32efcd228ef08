use log::debug;
#[cfg(feature = "cpu-trace")]
use log::trace;

use crate::error::{Error, Result};

// Flag bit masks for the F register
const FLAG_Z: u8 = 0x80; // Zero
const FLAG_N: u8 = 0x40; // Subtract
const FLAG_H: u8 = 0x20; // Half Carry
const FLAG_C: u8 = 0x10; // Carry

// Interrupt vectors, in priority order
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

// Register state after the DMG boot ROM hands over to the cartridge
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;
const BOOT_A: u8 = 0x01;
const BOOT_F: u8 = 0xB0;
const BOOT_B: u8 = 0x00;
const BOOT_C: u8 = 0x13;
const BOOT_D: u8 = 0x00;
const BOOT_E: u8 = 0xD8;
const BOOT_H: u8 = 0x01;
const BOOT_L: u8 = 0x4D;

const CYCLES_PER_M_CYCLE: u32 = 4;

/// What the CPU sees of the machine around it. [`Mmu`](crate::mmu::Mmu) is
/// the real one; tests can run the CPU against flat memory.
pub trait Bus {
    fn read(&mut self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, val: u8);

    /// Advance everything clocked alongside the CPU by `cycles` T-cycles.
    fn tick(&mut self, cycles: u32);

    fn interrupt_enable(&self) -> u8;

    fn interrupt_flag(&self) -> u8;

    fn set_interrupt_flag(&mut self, val: u8);

    /// Divider reset performed by STOP.
    fn reset_div(&mut self) {}

    /// Whether any selected joypad line is low, which ends STOP.
    fn joypad_line_low(&self) -> bool {
        false
    }
}

/// Plain copy of the register file for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuState {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    pub cycles: u64,
}

pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    /// Total T-cycles executed.
    pub cycles: u64,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    halt_bug: bool,
    ime_enable_delay: u8,
}

impl Cpu {
    /// CPU in the post-boot register state, starting at the cartridge entry point.
    pub fn new() -> Self {
        Self {
            a: BOOT_A,
            f: BOOT_F,
            b: BOOT_B,
            c: BOOT_C,
            d: BOOT_D,
            e: BOOT_E,
            h: BOOT_H,
            l: BOOT_L,
            pc: BOOT_PC,
            sp: BOOT_SP,
            cycles: 0,
            ime: false,
            halted: false,
            stopped: false,
            halt_bug: false,
            ime_enable_delay: 0,
        }
    }

    /// CPU at power-on, for executing a boot ROM mapped at 0x0000.
    pub fn new_power_on() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: 0x0000,
            sp: 0x0000,
            ..Self::new()
        }
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            a: self.a,
            f: self.f,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
            sp: self.sp,
            pc: self.pc,
            ime: self.ime,
            halted: self.halted,
            stopped: self.stopped,
            cycles: self.cycles,
        }
    }

    pub fn get_bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn get_de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn get_hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    pub fn get_af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0;
    }

    /// BC, DE, HL, SP by the two-bit index used in opcodes.
    fn get_rr(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => self.get_hl(),
            _ => self.sp,
        }
    }

    fn set_rr(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    fn next_interrupt(pending: u8) -> (u8, u16) {
        if pending & 0x01 != 0 {
            (0x01, INTERRUPT_VBLANK)
        } else if pending & 0x02 != 0 {
            (0x02, INTERRUPT_STAT)
        } else if pending & 0x04 != 0 {
            (0x04, INTERRUPT_TIMER)
        } else if pending & 0x08 != 0 {
            (0x08, INTERRUPT_SERIAL)
        } else {
            (0x10, INTERRUPT_JOYPAD)
        }
    }

    #[inline]
    fn tick<B: Bus>(&mut self, bus: &mut B, m_cycles: u32) {
        let cycles = CYCLES_PER_M_CYCLE * m_cycles;
        self.cycles += cycles as u64;
        bus.tick(cycles);
    }

    #[inline(always)]
    fn fetch8<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let val = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.tick(bus, 1);
        val
    }

    #[inline(always)]
    fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    #[inline(always)]
    fn read8<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        let val = bus.read(addr);
        self.tick(bus, 1);
        val
    }

    #[inline(always)]
    fn write8<B: Bus>(&mut self, bus: &mut B, addr: u16, val: u8) {
        bus.write(addr, val);
        self.tick(bus, 1);
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.get_af(),
            self.get_bc(),
            self.get_de(),
            self.get_hl(),
            self.pc,
            self.sp,
            self.cycles
        )
    }

    fn push_stack<B: Bus>(&mut self, bus: &mut B, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, val as u8);
    }

    fn pop_stack<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(bus, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// B, C, D, E, H, L, (HL), A by the three-bit index used in opcodes.
    fn read_reg<B: Bus>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => self.read8(bus, self.get_hl()),
            _ => self.a,
        }
    }

    fn write_reg<B: Bus>(&mut self, bus: &mut B, index: u8, val: u8) {
        match index & 0x07 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => {
                let addr = self.get_hl();
                self.write8(bus, addr, val);
            }
            _ => self.a = val,
        }
    }

    /// NZ, Z, NC, C from bits 3-4 of a conditional opcode.
    fn condition(&self, opcode: u8) -> bool {
        match (opcode >> 3) & 0x03 {
            0 => self.f & FLAG_Z == 0,
            1 => self.f & FLAG_Z != 0,
            2 => self.f & FLAG_C == 0,
            _ => self.f & FLAG_C != 0,
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.f = (self.f & FLAG_C)
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0x0F { FLAG_H } else { 0 };
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.f = (self.f & FLAG_C)
            | FLAG_N
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0 { FLAG_H } else { 0 };
        res
    }

    /// ADD/ADC/SUB/SBC/AND/XOR/OR/CP A, `val`, selected by bits 3-5 of the opcode.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a;
        let carry_in = if self.f & FLAG_C != 0 { 1u8 } else { 0 };
        match op & 0x07 {
            0 | 1 => {
                let cin = if op & 0x07 == 1 { carry_in } else { 0 };
                let res = a as u16 + val as u16 + cin as u16;
                self.a = res as u8;
                self.f = if self.a == 0 { FLAG_Z } else { 0 }
                    | if (a & 0x0F) + (val & 0x0F) + cin > 0x0F {
                        FLAG_H
                    } else {
                        0
                    }
                    | if res > 0xFF { FLAG_C } else { 0 };
            }
            2 | 3 | 7 => {
                let cin = if op & 0x07 == 3 { carry_in } else { 0 };
                let res = (a as i16) - (val as i16) - (cin as i16);
                let out = res as u8;
                self.f = FLAG_N
                    | if out == 0 { FLAG_Z } else { 0 }
                    | if ((a & 0x0F) as i16) - ((val & 0x0F) as i16) - (cin as i16) < 0 {
                        FLAG_H
                    } else {
                        0
                    }
                    | if res < 0 { FLAG_C } else { 0 };
                // CP only updates flags.
                if op & 0x07 != 7 {
                    self.a = out;
                }
            }
            4 => {
                self.a &= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
            }
            5 => {
                self.a ^= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            _ => {
                self.a |= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
        }
    }

    fn add_hl<B: Bus>(&mut self, bus: &mut B, val: u16) {
        let hl = self.get_hl();
        let res = hl as u32 + val as u32;
        self.f = (self.f & FLAG_Z)
            | if (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF {
                FLAG_H
            } else {
                0
            }
            | if res > 0xFFFF { FLAG_C } else { 0 };
        self.set_hl(res as u16);
        self.tick(bus, 1);
    }

    /// SP + signed immediate, with H and C taken from the low byte.
    fn sp_plus_e8(&mut self, e: u8) -> u16 {
        let sp = self.sp;
        let val = e as i8 as i16 as u16;
        self.f = if (sp & 0x0F) + (val & 0x0F) > 0x0F {
            FLAG_H
        } else {
            0
        } | if (sp & 0xFF) + (val & 0xFF) > 0xFF {
            FLAG_C
        } else {
            0
        };
        sp.wrapping_add(val)
    }

    fn daa(&mut self) {
        let mut correction = 0u8;
        let mut carry = false;
        if self.f & FLAG_H != 0 || (self.f & FLAG_N == 0 && (self.a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if self.f & FLAG_C != 0 || (self.f & FLAG_N == 0 && self.a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        if self.f & FLAG_N == 0 {
            self.a = self.a.wrapping_add(correction);
        } else {
            self.a = self.a.wrapping_sub(correction);
        }
        self.f = if self.a == 0 { FLAG_Z } else { 0 }
            | (self.f & FLAG_N)
            | if carry { FLAG_C } else { 0 };
    }

    fn handle_cb<B: Bus>(&mut self, opcode: u8, bus: &mut B) {
        let r = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        match opcode {
            0x00..=0x3F => {
                let val = self.read_reg(bus, r);
                let carry_in = self.f & FLAG_C != 0;
                let (res, carry_out) = match bit {
                    0 => (val.rotate_left(1), val & 0x80 != 0),
                    1 => (val.rotate_right(1), val & 0x01 != 0),
                    2 => ((val << 1) | carry_in as u8, val & 0x80 != 0),
                    3 => ((val >> 1) | ((carry_in as u8) << 7), val & 0x01 != 0),
                    4 => (val << 1, val & 0x80 != 0),
                    5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
                    6 => (val.rotate_left(4), false),
                    _ => (val >> 1, val & 0x01 != 0),
                };
                self.write_reg(bus, r, res);
                self.f = if res == 0 { FLAG_Z } else { 0 } | if carry_out { FLAG_C } else { 0 };
            }
            0x40..=0x7F => {
                let val = self.read_reg(bus, r);
                self.f =
                    (self.f & FLAG_C) | FLAG_H | if val & (1 << bit) == 0 { FLAG_Z } else { 0 };
            }
            0x80..=0xBF => {
                let val = self.read_reg(bus, r);
                self.write_reg(bus, r, val & !(1 << bit));
            }
            0xC0..=0xFF => {
                let val = self.read_reg(bus, r);
                self.write_reg(bus, r, val | (1 << bit));
            }
        }
    }

    fn handle_interrupts<B: Bus>(&mut self, bus: &mut B) {
        let pending = (bus.interrupt_flag() & bus.interrupt_enable()) & 0x1F;
        if pending == 0 {
            return;
        }

        // A pending interrupt always wakes HALT, even with IME clear.
        self.halted = false;
        if !self.ime {
            return;
        }

        self.ime = false;
        let return_pc = self.pc;

        // Upper byte push. If it lands on IE the dispatch target is re-read
        // below and may be cancelled.
        self.tick(bus, 2);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, (return_pc >> 8) as u8);

        let queue = (bus.interrupt_enable() & bus.interrupt_flag()) & 0x1F;
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, return_pc as u8);

        if queue == 0 {
            self.pc = 0;
        } else {
            let (bit, vector) = Self::next_interrupt(queue);
            bus.set_interrupt_flag(bus.interrupt_flag() & !bit);
            self.pc = vector;
        }
        self.tick(bus, 1);
    }

    /// Execute one instruction (or one idle M-cycle while halted/stopped),
    /// then service interrupts. Returns the T-cycles consumed.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32> {
        let start = self.cycles;

        if self.stopped {
            self.tick(bus, 1);
            if bus.joypad_line_low() {
                debug!("Leaving STOP at PC={:04X}", self.pc);
                self.stopped = false;
            }
            return Ok((self.cycles - start) as u32);
        }

        if self.halted {
            self.tick(bus, 1);
            self.handle_interrupts(bus);
            return Ok((self.cycles - start) as u32);
        }

        #[cfg(feature = "cpu-trace")]
        trace!("{}", self.debug_state());

        let enable_after = self.ime_enable_delay == 1;
        let opcode = if self.halt_bug {
            // The byte after HALT is read twice.
            self.halt_bug = false;
            self.read8(bus, self.pc)
        } else {
            self.fetch8(bus)
        };

        match opcode {
            0x00 => {}
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(bus);
                self.set_rr(opcode >> 4, val);
            }
            0x02 | 0x12 => {
                let addr = self.get_rr(opcode >> 4);
                self.write8(bus, addr, self.a);
            }
            0x22 | 0x32 => {
                let addr = self.get_hl();
                self.write8(bus, addr, self.a);
                self.set_hl(if opcode == 0x22 {
                    addr.wrapping_add(1)
                } else {
                    addr.wrapping_sub(1)
                });
            }
            0x0A | 0x1A => {
                let addr = self.get_rr(opcode >> 4);
                self.a = self.read8(bus, addr);
            }
            0x2A | 0x3A => {
                let addr = self.get_hl();
                self.a = self.read8(bus, addr);
                self.set_hl(if opcode == 0x2A {
                    addr.wrapping_add(1)
                } else {
                    addr.wrapping_sub(1)
                });
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let idx = opcode >> 4;
                let val = self.get_rr(idx).wrapping_add(1);
                self.set_rr(idx, val);
                self.tick(bus, 1);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let idx = opcode >> 4;
                let val = self.get_rr(idx).wrapping_sub(1);
                self.set_rr(idx, val);
                self.tick(bus, 1);
            }
            op if op & 0xC7 == 0x04 => {
                let r = (op >> 3) & 0x07;
                let val = self.read_reg(bus, r);
                let res = self.inc8(val);
                self.write_reg(bus, r, res);
            }
            op if op & 0xC7 == 0x05 => {
                let r = (op >> 3) & 0x07;
                let val = self.read_reg(bus, r);
                let res = self.dec8(val);
                self.write_reg(bus, r, res);
            }
            op if op & 0xC7 == 0x06 => {
                let val = self.fetch8(bus);
                self.write_reg(bus, (op >> 3) & 0x07, val);
            }
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | if self.f & FLAG_C != 0 { 0x01 } else { 0 };
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | if self.f & FLAG_C != 0 { 0x80 } else { 0 };
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x08 => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.sp as u8);
                self.write8(bus, addr.wrapping_add(1), (self.sp >> 8) as u8);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let val = self.get_rr(opcode >> 4);
                self.add_hl(bus, val);
            }
            0x10 => {
                // STOP is two bytes long.
                let _ = self.fetch8(bus);
                bus.reset_div();
                debug!("STOP at PC={:04X}", self.pc.wrapping_sub(2));
                self.stopped = true;
            }
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                self.tick(bus, 1);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(bus) as i8;
                if self.condition(opcode) {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    self.tick(bus, 1);
                }
            }
            0x27 => self.daa(),
            0x2F => {
                self.a ^= 0xFF;
                self.f = (self.f & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H;
            }
            0x37 => {
                self.f = (self.f & FLAG_Z) | FLAG_C;
            }
            0x3F => {
                self.f = (self.f & FLAG_Z) | if self.f & FLAG_C != 0 { 0 } else { FLAG_C };
            }
            0x76 => {
                let pending = (bus.interrupt_flag() & bus.interrupt_enable()) & 0x1F;
                if self.ime || self.ime_enable_delay > 0 || pending == 0 {
                    self.halted = true;
                } else {
                    self.halt_bug = true;
                }
            }
            0x40..=0x7F => {
                let val = self.read_reg(bus, opcode & 0x07);
                self.write_reg(bus, (opcode >> 3) & 0x07, val);
            }
            0x80..=0xBF => {
                let val = self.read_reg(bus, opcode & 0x07);
                self.alu((opcode >> 3) & 0x07, val);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                self.tick(bus, 1);
                if self.condition(opcode) {
                    self.pc = self.pop_stack(bus);
                    self.tick(bus, 1);
                }
            }
            0xC1 | 0xD1 | 0xE1 => {
                let val = self.pop_stack(bus);
                self.set_rr((opcode >> 4) & 0x03, val);
            }
            0xF1 => {
                let val = self.pop_stack(bus);
                self.set_af(val);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let addr = self.fetch16(bus);
                if self.condition(opcode) {
                    self.pc = addr;
                    self.tick(bus, 1);
                }
            }
            0xC3 => {
                let addr = self.fetch16(bus);
                self.pc = addr;
                self.tick(bus, 1);
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let addr = self.fetch16(bus);
                if self.condition(opcode) {
                    self.tick(bus, 1);
                    self.push_stack(bus, self.pc);
                    self.pc = addr;
                }
            }
            0xC5 | 0xD5 | 0xE5 => {
                let val = self.get_rr((opcode >> 4) & 0x03);
                self.tick(bus, 1);
                self.push_stack(bus, val);
            }
            0xF5 => {
                let val = self.get_af();
                self.tick(bus, 1);
                self.push_stack(bus, val);
            }
            op if op & 0xC7 == 0xC6 => {
                let val = self.fetch8(bus);
                self.alu((op >> 3) & 0x07, val);
            }
            op if op & 0xC7 == 0xC7 => {
                self.tick(bus, 1);
                self.push_stack(bus, self.pc);
                self.pc = (op & 0x38) as u16;
            }
            0xC9 | 0xD9 => {
                self.pc = self.pop_stack(bus);
                if opcode == 0xD9 {
                    self.ime = true;
                }
                self.tick(bus, 1);
            }
            0xCB => {
                let op = self.fetch8(bus);
                self.handle_cb(op, bus);
            }
            0xCD => {
                let addr = self.fetch16(bus);
                self.tick(bus, 1);
                self.push_stack(bus, self.pc);
                self.pc = addr;
            }
            0xE0 => {
                let offset = self.fetch8(bus);
                self.write8(bus, 0xFF00 | offset as u16, self.a);
            }
            0xF0 => {
                let offset = self.fetch8(bus);
                self.a = self.read8(bus, 0xFF00 | offset as u16);
            }
            0xE2 => {
                self.write8(bus, 0xFF00 | self.c as u16, self.a);
            }
            0xF2 => {
                self.a = self.read8(bus, 0xFF00 | self.c as u16);
            }
            0xEA => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.a);
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = self.read8(bus, addr);
            }
            0xE8 => {
                let e = self.fetch8(bus);
                self.sp = self.sp_plus_e8(e);
                self.tick(bus, 2);
            }
            0xF8 => {
                let e = self.fetch8(bus);
                let val = self.sp_plus_e8(e);
                self.set_hl(val);
                self.tick(bus, 1);
            }
            0xE9 => {
                self.pc = self.get_hl();
            }
            0xF9 => {
                self.sp = self.get_hl();
                self.tick(bus, 1);
            }
            0xF3 => {
                self.ime = false;
                self.ime_enable_delay = 0;
            }
            0xFB => {
                self.ime_enable_delay = 2;
            }
            // D3 DB DD E3 E4 EB EC ED F4 FC FD
            _ => {
                return Err(Error::IllegalOpcode {
                    opcode,
                    pc: self.pc.wrapping_sub(1),
                });
            }
        }

        if enable_after && self.ime_enable_delay > 0 {
            self.ime = true;
        }
        if self.ime_enable_delay > 0 {
            self.ime_enable_delay -= 1;
        }
        self.handle_interrupts(bus);
        Ok((self.cycles - start) as u32)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
