//! SB/SC with nothing plugged into the link port.

/// T-cycles per bit at the 8192 Hz internal clock.
const CYCLES_PER_BIT: u32 = 512;

/// Serial registers for an unconnected port: an internally clocked
/// transfer shifts in all ones and completes after eight bits, an
/// externally clocked one never completes.
#[derive(Debug, Clone)]
pub struct Serial {
    sb: u8,
    sc: u8,
    /// Remaining T-cycles of an internally clocked transfer.
    countdown: Option<u32>,
    /// Every byte shifted out, in order.
    pub(crate) out_buf: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0x7E,
            countdown: None,
            out_buf: Vec::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val & 0x81;
                self.countdown = match val & 0x81 {
                    0x81 => Some(8 * CYCLES_PER_BIT),
                    _ => None,
                };
            }
            _ => {}
        }
    }

    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        let Some(left) = self.countdown else {
            return;
        };
        if left > cycles {
            self.countdown = Some(left - cycles);
            return;
        }
        self.countdown = None;
        self.out_buf.push(self.sb);
        self.sb = 0xFF;
        self.sc &= 0x7F;
        *if_reg |= 0x08;
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }

    /// Bytes sent so far, drained.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}
