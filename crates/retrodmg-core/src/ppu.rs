use log::debug;

// Screen resolution used by the Game Boy PPU
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Timing constants per LCD mode in T-cycles
const LINE_CYCLES: u16 = 456;
const MODE2_CYCLES: u16 = 80; // OAM scan
const MODE3_CYCLES: u16 = 172; // Pixel transfer, before penalties
const WINDOW_PENALTY: u16 = 6;

// Number of lines spent in VBlank
const VBLANK_LINES: u8 = 10;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// VRAM layout constants
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_0_BASE: usize = 0x0000;
const TILE_DATA_1_BASE: usize = 0x1000;

/// LCD mode as reported in STAT bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcdMode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Draw = 3,
}

#[derive(Debug, Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
    oam_index: usize,
}

pub struct Ppu {
    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    pub dma: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,
    /// Set once LY == WY is seen with the window enabled; cleared at VBlank.
    wy_triggered: bool,
    window_this_line: bool,
    draw_cycles: u16,

    mode_clock: u16,
    mode: LcdMode,

    /// Shades for the frame being drawn, one byte per pixel.
    frame: [u8; SCREEN_WIDTH * SCREEN_HEIGHT],
    /// Last completed frame.
    viewport: [u8; SCREEN_WIDTH * SCREEN_HEIGHT],
    line_color_zero: [bool; SCREEN_WIDTH],
    /// Sprites selected for the current scanline, in OAM order
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    /// Indicates a completed frame is available in `viewport`
    frame_ready: bool,
    stat_irq_line: bool,
    frame_counter: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            dma: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            wy_triggered: false,
            window_this_line: false,
            draw_cycles: MODE3_CYCLES,
            mode_clock: 0,
            mode: LcdMode::HBlank,
            frame: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            viewport: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            line_color_zero: [false; SCREEN_WIDTH],
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            frame_ready: false,
            stat_irq_line: false,
            frame_counter: 0,
        }
    }

    /// Initialize registers to the state expected after the boot ROM
    /// has finished executing.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.dma = 0xFF;
        self.bgp = 0xFC;
        self.stat = 0x00;
        self.ly = 0;
        self.mode = LcdMode::OamScan;
        self.mode_clock = 0;
        self.win_line_counter = 0;
        self.lyc_eq_ly = self.ly == self.lyc;
        self.stat_irq_line = false;
    }

    /// Collect up to 10 sprites visible on the current scanline.
    fn oam_scan(&mut self) {
        let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            let x = self.oam[base + 1] as i16 - 8;
            let ly = self.ly as i16;
            if ly >= y && ly < y + sprite_height && x >= -7 {
                self.line_sprites[self.sprite_count] = Sprite {
                    x,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                    oam_index: i,
                };
                self.sprite_count += 1;
            }
        }
    }

    pub fn mode(&self) -> LcdMode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    /// Returns true if a full frame has been committed to the viewport.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Returns the current value of the internal window line counter.
    pub fn window_line_counter(&self) -> u8 {
        self.win_line_counter
    }

    /// Committed 160x144 frame of 2-bit shades (0 = lightest, 3 = darkest).
    pub fn viewport(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.viewport
    }

    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    fn update_lyc_compare(&mut self) {
        if self.lcdc & 0x80 != 0 {
            self.lyc_eq_ly = self.ly == self.lyc;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                (self.stat & 0x78)
                    | 0x80
                    | self.mode as u8
                    | if self.lyc_eq_ly { 0x04 } else { 0 }
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcdc & 0x80 != 0;
                self.lcdc = val;
                let is_on = self.lcdc & 0x80 != 0;
                if was_on && !is_on {
                    debug!("LCD off at LY={}", self.ly);
                    self.reset_lcd_off();
                } else if !was_on && is_on {
                    debug!("LCD on");
                    self.mode = LcdMode::OamScan;
                    self.mode_clock = 0;
                    self.update_lyc_compare();
                }
            }
            0xFF41 => self.stat = (self.stat & 0x07) | (val & 0x78),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only.
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                self.update_lyc_compare();
            }
            0xFF46 => self.dma = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    fn reset_lcd_off(&mut self) {
        self.mode = LcdMode::HBlank;
        self.ly = 0;
        self.mode_clock = 0;
        self.win_line_counter = 0;
        self.wy_triggered = false;
        self.window_this_line = false;
        self.stat_irq_line = false;
    }

    #[inline(always)]
    fn dmg_shade(palette: u8, color_id: u8) -> u8 {
        (palette >> (color_id * 2)) & 0x03
    }

    /// Two bitplanes for `row` of the tile referenced by `tile_index`.
    fn bg_tile_row(&self, tile_index: u8, row: usize) -> (u8, u8) {
        let addr = if self.lcdc & 0x10 != 0 {
            TILE_DATA_0_BASE + tile_index as usize * 16
        } else {
            // $8800 method: signed index relative to 0x9000.
            (TILE_DATA_1_BASE as isize + (tile_index as i8 as isize) * 16) as usize
        };
        (self.vram[addr + row * 2], self.vram[addr + row * 2 + 1])
    }

    fn window_active(&self) -> bool {
        self.lcdc & 0x21 == 0x21 && self.wy_triggered && self.wx <= WINDOW_X_MAX
    }

    fn render_scanline(&mut self) {
        if self.lcdc & 0x80 == 0 || self.ly as usize >= SCREEN_HEIGHT {
            return;
        }

        let line = self.ly as usize * SCREEN_WIDTH;
        let bg_enabled = self.lcdc & 0x01 != 0;

        let blank = Self::dmg_shade(self.bgp, 0);
        self.frame[line..line + SCREEN_WIDTH].fill(blank);
        self.line_color_zero.fill(true);

        if bg_enabled {
            let tile_map_base = if self.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            let py = (self.ly as usize + self.scy as usize) & 0xFF;
            let tile_row = py / 8;
            let tile_y = py % 8;

            for x in 0..SCREEN_WIDTH {
                let px = (x + self.scx as usize) & 0xFF;
                let tile_col = px / 8;
                let tile_index = self.vram[tile_map_base + tile_row * 32 + tile_col];
                let (lo, hi) = self.bg_tile_row(tile_index, tile_y);
                let bit = 7 - (px % 8);
                let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                self.frame[line + x] = Self::dmg_shade(self.bgp, color_id);
                self.line_color_zero[x] = color_id == 0;
            }

            if self.window_this_line {
                let window_map_base = if self.lcdc & 0x40 != 0 {
                    BG_MAP_1_BASE
                } else {
                    BG_MAP_0_BASE
                };
                let window_y = self.win_line_counter as usize;
                let start = self.wx as i16 - 7;
                for x in start.max(0) as usize..SCREEN_WIDTH {
                    let window_x = (x as i16 - start) as usize;
                    let tile_index = self.vram
                        [window_map_base + (window_y / 8) * 32 + (window_x / 8)];
                    let (lo, hi) = self.bg_tile_row(tile_index, window_y % 8);
                    let bit = 7 - (window_x % 8);
                    let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                    self.frame[line + x] = Self::dmg_shade(self.bgp, color_id);
                    self.line_color_zero[x] = color_id == 0;
                }
            }
        }

        if self.lcdc & 0x02 != 0 {
            self.render_sprites(line);
        }
    }

    fn render_sprites(&mut self, line: usize) {
        let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        // Lowest X wins, then lowest OAM index.
        let mut order = self.line_sprites;
        let order = &mut order[..self.sprite_count];
        order.sort_by_key(|s| (s.x, s.oam_index));

        let mut drawn = [false; SCREEN_WIDTH];
        for s in order.iter() {
            let mut tile = s.tile;
            if sprite_height == 16 {
                tile &= 0xFE;
            }
            let mut line_idx = self.ly as i16 - s.y;
            if s.flags & 0x40 != 0 {
                line_idx = sprite_height - 1 - line_idx;
            }
            // The sprite was picked with the height in effect during OAM scan;
            // LCDC.2 may have changed since, so only the low row bits count.
            let row = (line_idx & (sprite_height - 1)) as usize;
            let addr = tile as usize * 16 + row * 2;
            let lo = self.vram[addr];
            let hi = self.vram[addr + 1];
            let palette = if s.flags & 0x10 != 0 {
                self.obp1
            } else {
                self.obp0
            };

            for px in 0..8 {
                let sx = s.x + px as i16;
                if !(0i16..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                    continue;
                }
                let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                if color_id == 0 {
                    continue;
                }
                // This sprite owns the pixel even if the background hides it.
                drawn[sx as usize] = true;
                if s.flags & 0x80 != 0 && !self.line_color_zero[sx as usize] {
                    continue;
                }
                self.frame[line + sx as usize] = Self::dmg_shade(palette, color_id);
            }
        }
    }

    /// Advance by `cycles` T-cycles. Requests VBlank/STAT interrupts through
    /// `if_reg`.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        let mut remaining = cycles;
        while remaining > 0 {
            let increment = remaining.min(4) as u16;
            remaining -= increment as u32;
            if self.lcdc & 0x80 == 0 {
                self.mode = LcdMode::HBlank;
                self.ly = 0;
                self.mode_clock = 0;
                self.win_line_counter = 0;
                self.wy_triggered = false;
                continue;
            }

            self.mode_clock += increment;

            match self.mode {
                LcdMode::OamScan => {
                    if self.mode_clock >= MODE2_CYCLES {
                        self.mode_clock -= MODE2_CYCLES;
                        if self.lcdc & 0x20 != 0 && self.ly == self.wy {
                            self.wy_triggered = true;
                        }
                        self.oam_scan();
                        self.window_this_line = self.window_active();
                        self.draw_cycles = MODE3_CYCLES + (self.scx % 8) as u16;
                        if self.window_this_line {
                            self.draw_cycles += WINDOW_PENALTY;
                        }
                        self.mode = LcdMode::Draw;
                    }
                }
                LcdMode::Draw => {
                    if self.mode_clock >= self.draw_cycles {
                        self.mode_clock -= self.draw_cycles;
                        self.render_scanline();
                        self.mode = LcdMode::HBlank;
                    }
                }
                LcdMode::HBlank => {
                    let hblank = LINE_CYCLES - MODE2_CYCLES - self.draw_cycles;
                    if self.mode_clock >= hblank {
                        self.mode_clock -= hblank;
                        if self.window_this_line {
                            self.win_line_counter = self.win_line_counter.wrapping_add(1);
                        }
                        self.window_this_line = false;
                        self.sprite_count = 0;
                        self.ly += 1;
                        self.update_lyc_compare();
                        if self.ly == SCREEN_HEIGHT as u8 {
                            self.enter_vblank(if_reg);
                        } else {
                            self.mode = LcdMode::OamScan;
                        }
                    }
                }
                LcdMode::VBlank => {
                    if self.mode_clock >= LINE_CYCLES {
                        self.mode_clock -= LINE_CYCLES;
                        self.ly += 1;
                        if self.ly > SCREEN_HEIGHT as u8 + VBLANK_LINES - 1 {
                            self.ly = 0;
                            self.mode = LcdMode::OamScan;
                        }
                        self.update_lyc_compare();
                    }
                }
            }

            self.update_stat_irq(if_reg);
        }
    }

    fn enter_vblank(&mut self, if_reg: &mut u8) {
        self.mode = LcdMode::VBlank;
        self.viewport = self.frame;
        self.frame_ready = true;
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.win_line_counter = 0;
        self.wy_triggered = false;
        self.draw_cycles = MODE3_CYCLES;
        *if_reg |= 0x01;
    }

    fn update_stat_irq(&mut self, if_reg: &mut u8) {
        let coincidence = self.lyc_eq_ly && self.stat & 0x40 != 0;
        let mode_signal = match self.mode {
            LcdMode::HBlank => self.stat & 0x08 != 0,
            LcdMode::VBlank => self.stat & 0x10 != 0,
            LcdMode::OamScan => self.stat & 0x20 != 0,
            LcdMode::Draw => false,
        };
        let current = coincidence || mode_signal;
        if current && !self.stat_irq_line {
            *if_reg |= 0x02;
        }
        self.stat_irq_line = current;
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcd_on() -> Ppu {
        let mut ppu = Ppu::new();
        ppu.write_reg(0xFF47, 0xE4);
        ppu.write_reg(0xFF40, 0x91);
        ppu
    }

    fn run_lines(ppu: &mut Ppu, lines: u32, if_reg: &mut u8) {
        ppu.step(lines * LINE_CYCLES as u32, if_reg);
    }

    #[test]
    fn line_and_frame_timing() {
        let mut ppu = lcd_on();
        let mut if_reg = 0;
        assert_eq!(ppu.mode(), LcdMode::OamScan);
        ppu.step(80, &mut if_reg);
        assert_eq!(ppu.mode(), LcdMode::Draw);
        ppu.step(172, &mut if_reg);
        assert_eq!(ppu.mode(), LcdMode::HBlank);
        ppu.step(204, &mut if_reg);
        assert_eq!(ppu.ly(), 1);

        run_lines(&mut ppu, 143, &mut if_reg);
        assert_eq!(ppu.ly(), 144);
        assert_eq!(ppu.mode(), LcdMode::VBlank);
        assert!(ppu.frame_ready());
        assert_eq!(if_reg & 0x01, 0x01);

        run_lines(&mut ppu, 10, &mut if_reg);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), LcdMode::OamScan);
    }

    #[test]
    fn scx_fine_scroll_extends_draw() {
        let mut ppu = lcd_on();
        let mut if_reg = 0;
        ppu.write_reg(0xFF43, 0x03);
        ppu.step(80 + 172, &mut if_reg);
        assert_eq!(ppu.mode(), LcdMode::Draw);
        ppu.step(4, &mut if_reg);
        assert_eq!(ppu.mode(), LcdMode::HBlank);
        // The line still lasts 456 cycles.
        ppu.step(456 - 256, &mut if_reg);
        assert_eq!(ppu.ly(), 1);
    }

    #[test]
    fn lcd_off_pins_ly_and_mode() {
        let mut ppu = lcd_on();
        let mut if_reg = 0;
        run_lines(&mut ppu, 5, &mut if_reg);
        assert_eq!(ppu.ly(), 5);
        ppu.write_reg(0xFF40, 0x11);
        ppu.step(1000, &mut if_reg);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), LcdMode::HBlank);
        assert_eq!(ppu.read_reg(0xFF41) & 0x03, 0);
    }

    #[test]
    fn signed_tile_addressing() {
        let mut ppu = lcd_on();
        // LCDC.4 clear: tile index 0xFF lives at 0x8FF0.
        ppu.write_reg(0xFF40, 0x81);
        ppu.vram[BG_MAP_0_BASE] = 0xFF;
        ppu.vram[0x0FF0] = 0xFF;
        ppu.vram[0x0FF1] = 0xFF;
        let mut if_reg = 0;
        run_lines(&mut ppu, 144, &mut if_reg);
        assert_eq!(&ppu.viewport()[..8], &[3; 8]);
        assert_eq!(ppu.viewport()[8], 0);
    }

    #[test]
    fn offscreen_sprite_x_is_skipped_by_scan() {
        let mut ppu = lcd_on();
        ppu.oam[0] = 16;
        ppu.oam[1] = 0;
        ppu.oam[4] = 16;
        ppu.oam[5] = 1;
        ppu.oam_scan();
        assert_eq!(ppu.sprite_count, 1);
        assert_eq!(ppu.line_sprites[0].oam_index, 1);
    }
}
