use std::{
    fmt::Debug,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Wall-clock source for the cartridge RTC.
pub trait Clock: Debug + Send {
    fn now(&self) -> SystemTime;
}

/// The host's real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

const SECONDS_PER_DAY: u64 = 86_400;
const DAY_MASK: u16 = 0x01FF;

const RECORD_MAGIC: &[u8; 4] = b"RTC1";
const RECORD_VERSION: u8 = 1;
// magic, version, 6 register bytes, sync time (u64), partial second (u32)
const RECORD_LEN: usize = 4 + 1 + 6 + 8 + 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl Counters {
    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds,
            0x09 => self.minutes,
            0x0A => self.hours,
            0x0B => self.days as u8,
            0x0C => self.control(),
            _ => 0xFF,
        }
    }

    fn control(&self) -> u8 {
        let mut out = (self.days >> 8) as u8 & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn in_range(&self) -> bool {
        self.seconds < 60 && self.minutes < 60 && self.hours < 24
    }

    /// One second. A field holding a value software wrote out of range
    /// counts up to its bit width and wraps to zero without carrying.
    fn tick(&mut self) {
        if self.seconds != 59 {
            self.seconds = (self.seconds + 1) & 0x3F;
            return;
        }
        self.seconds = 0;
        if self.minutes != 59 {
            self.minutes = (self.minutes + 1) & 0x3F;
            return;
        }
        self.minutes = 0;
        if self.hours != 23 {
            self.hours = (self.hours + 1) & 0x1F;
            return;
        }
        self.hours = 0;
        if self.days == DAY_MASK {
            self.days = 0;
            self.carry = true;
        } else {
            self.days += 1;
        }
    }

    fn advance(&mut self, mut secs: u64) {
        while secs > 0 && !self.in_range() {
            self.tick();
            secs -= 1;
        }
        if secs == 0 {
            return;
        }

        let time_of_day =
            self.seconds as u64 + 60 * self.minutes as u64 + 3600 * self.hours as u64;
        let total = time_of_day + secs;
        let time_of_day = total % SECONDS_PER_DAY;
        self.hours = (time_of_day / 3600) as u8;
        self.minutes = (time_of_day / 60 % 60) as u8;
        self.seconds = (time_of_day % 60) as u8;

        let days = self.days as u64 + total / SECONDS_PER_DAY;
        if days > DAY_MASK as u64 {
            self.carry = true;
        }
        self.days = (days & DAY_MASK as u64) as u16;
    }
}

/// MBC3 real-time clock. The counters only catch up with the wall clock
/// when the cartridge touches them: on a latch, a register write or a save.
#[derive(Debug, Clone)]
pub(crate) struct Rtc {
    live: Counters,
    latched: Counters,
    synced_at: SystemTime,
    partial: Duration,
}

impl Rtc {
    pub(crate) fn new(now: SystemTime) -> Self {
        Self {
            live: Counters::default(),
            latched: Counters::default(),
            synced_at: now,
            partial: Duration::ZERO,
        }
    }

    /// Restart elapsed-time accounting from `now` without counting the gap.
    pub(crate) fn rebase(&mut self, now: SystemTime) {
        self.synced_at = now;
    }

    pub(crate) fn sync(&mut self, now: SystemTime) {
        // A clock that went backwards counts as no time passing.
        let elapsed = now.duration_since(self.synced_at).unwrap_or_default();
        self.synced_at = now;
        if self.live.halt {
            return;
        }
        let total = self.partial + elapsed;
        self.partial = Duration::from_nanos(total.subsec_nanos() as u64);
        self.live.advance(total.as_secs());
    }

    pub(crate) fn latch(&mut self, now: SystemTime) {
        self.sync(now);
        self.latched = self.live;
    }

    pub(crate) fn read(&self, reg: u8) -> u8 {
        self.latched.read(reg)
    }

    pub(crate) fn write(&mut self, reg: u8, value: u8, now: SystemTime) {
        self.sync(now);
        let c = &mut self.live;
        match reg {
            0x08 => {
                c.seconds = value & 0x3F;
                self.partial = Duration::ZERO;
            }
            0x09 => c.minutes = value & 0x3F,
            0x0A => c.hours = value & 0x1F,
            0x0B => c.days = (c.days & 0x0100) | value as u16,
            0x0C => {
                c.days = (c.days & 0x00FF) | ((value as u16 & 0x01) << 8);
                c.halt = value & 0x40 != 0;
                c.carry = value & 0x80 != 0;
            }
            _ => return,
        }
        self.latched = self.live;
    }

    pub(crate) fn to_record(&self) -> Vec<u8> {
        let c = &self.live;
        let mut flags = 0u8;
        if c.halt {
            flags |= 0x01;
        }
        if c.carry {
            flags |= 0x02;
        }
        let synced_secs = self
            .synced_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut out = Vec::with_capacity(RECORD_LEN);
        out.extend_from_slice(RECORD_MAGIC);
        out.push(RECORD_VERSION);
        out.extend_from_slice(&[c.seconds, c.minutes, c.hours]);
        out.extend_from_slice(&c.days.to_le_bytes());
        out.push(flags);
        out.extend_from_slice(&synced_secs.to_le_bytes());
        out.extend_from_slice(&self.partial.subsec_nanos().to_le_bytes());
        out
    }

    pub(crate) fn from_record(data: &[u8]) -> Option<Self> {
        if data.len() < RECORD_LEN || &data[..4] != RECORD_MAGIC || data[4] != RECORD_VERSION {
            return None;
        }
        let regs = &data[5..11];
        let live = Counters {
            seconds: regs[0] & 0x3F,
            minutes: regs[1] & 0x3F,
            hours: regs[2] & 0x1F,
            days: u16::from_le_bytes([regs[3], regs[4]]) & DAY_MASK,
            halt: regs[5] & 0x01 != 0,
            carry: regs[5] & 0x02 != 0,
        };
        let synced_secs = u64::from_le_bytes(data[11..19].try_into().ok()?);
        let nanos = u32::from_le_bytes(data[19..23].try_into().ok()?).min(999_999_999);
        Some(Self {
            live,
            latched: live,
            synced_at: UNIX_EPOCH + Duration::from_secs(synced_secs),
            partial: Duration::from_nanos(nanos as u64),
        })
    }
}
