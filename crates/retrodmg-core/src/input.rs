use std::{fmt, str::FromStr};

use crate::error::Error;

/// A physical button on the handheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// Bit in the packed input state. The low nibble holds the d-pad and the
    /// high nibble the action buttons, both in JOYP bit order.
    pub fn mask(self) -> u8 {
        match self {
            Button::Right => 0x01,
            Button::Left => 0x02,
            Button::Up => 0x04,
            Button::Down => 0x08,
            Button::A => 0x10,
            Button::B => 0x20,
            Button::Select => 0x40,
            Button::Start => 0x80,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Right => "Right",
            Button::Left => "Left",
            Button::Up => "Up",
            Button::Down => "Down",
            Button::A => "A",
            Button::B => "B",
            Button::Select => "Select",
            Button::Start => "Start",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| Error::UnknownInput(s.to_string()))
    }
}

/// JOYP (0xFF00).
///
/// `state` is active-low: a cleared bit means the button is held.
#[derive(Debug, Clone)]
pub struct Input {
    state: u8,
    select: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            state: 0xFF,
            select: 0x30,
        }
    }

    /// Low nibble of JOYP for the currently selected line(s).
    fn lines(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= self.state & 0x0F;
        }
        if self.select & 0x20 == 0 {
            low &= self.state >> 4;
        }
        low
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines()
    }

    pub fn write(&mut self, val: u8, if_reg: &mut u8) {
        let before = self.lines();
        self.select = val & 0x30;
        self.raise_on_falling_edge(before, if_reg);
    }

    /// Replace the whole packed state at once.
    pub fn update_state(&mut self, state: u8, if_reg: &mut u8) {
        let before = self.lines();
        self.state = state;
        self.raise_on_falling_edge(before, if_reg);
    }

    pub fn set_button(&mut self, button: Button, pressed: bool, if_reg: &mut u8) {
        let state = if pressed {
            self.state & !button.mask()
        } else {
            self.state | button.mask()
        };
        self.update_state(state, if_reg);
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.state & button.mask() == 0
    }

    /// Whether any selected line currently reads low. STOP mode wakes on this.
    pub fn any_line_low(&self) -> bool {
        self.lines() != 0x0F
    }

    fn raise_on_falling_edge(&self, before: u8, if_reg: &mut u8) {
        if before & !self.lines() & 0x0F != 0 {
            *if_reg |= 0x10;
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
