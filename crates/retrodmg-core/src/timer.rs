/// Cycles between a TIMA overflow and the TMA reload/interrupt.
const RELOAD_DELAY: u8 = 4;

/// DIV/TIMA/TMA/TAC.
///
/// TIMA counts falling edges of one bit of the internal 16-bit divider, so
/// DIV resets and TAC writes can produce an extra increment just like on
/// hardware.
#[derive(Debug, Clone)]
pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    last_signal: bool,
    /// Cycles left until TIMA is reloaded after an overflow.
    reload_in: Option<u8>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            reload_in: None,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => {
                // Writing TIMA during the reload window cancels the reload.
                self.tima = val;
                self.reload_in = None;
            }
            0xFF06 => self.tma = val,
            0xFF07 => {
                self.tac = val & 0x07;
                self.update_signal();
            }
            _ => {}
        }
    }

    /// Advance the timer by `cycles` T-cycles, raising the Timer interrupt
    /// in `if_reg` when a TIMA overflow reloads.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        for _ in 0..cycles {
            if let Some(left) = self.reload_in {
                if left <= 1 {
                    self.tima = self.tma;
                    *if_reg |= 0x04;
                    self.reload_in = None;
                } else {
                    self.reload_in = Some(left - 1);
                }
            }
            self.div = self.div.wrapping_add(1);
            self.update_signal();
        }
    }

    /// Reset the internal divider counter, applying TIMA edge logic.
    pub fn reset_div(&mut self) {
        self.div = 0;
        self.update_signal();
    }

    fn update_signal(&mut self) {
        let new = Self::signal_with(self.div, self.tac);
        if self.last_signal && !new {
            self.increment();
        }
        self.last_signal = new;
    }

    fn increment(&mut self) {
        if self.tima == 0xFF {
            self.tima = 0;
            self.reload_in = Some(RELOAD_DELAY);
        } else {
            self.tima += 1;
        }
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        if tac & 0x04 == 0 {
            return false;
        }
        let bit = match tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (div >> bit) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
