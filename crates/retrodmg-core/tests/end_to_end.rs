mod common;

use std::fs;
use std::path::Path;

use common::{load_png_shades, program_rom, rom_path, write_viewport_png};
use retrodmg_core::{
    GameBoy, Settings,
    cartridge::Cartridge,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};

/// Waits for VBlank, turns the LCD off, draws a checkered first tile row and
/// one sprite, then turns the LCD back on and spins.
const CHECKER_PROGRAM: &[u8] = &[
    0xF3, // DI
    0x31, 0xFE, 0xFF, // LD SP,0xFFFE
    0xF0, 0x44, 0xFE, 0x90, 0x20, 0xFA, // wait: LDH A,(LY); CP 144; JR NZ,wait
    0xAF, 0xE0, 0x40, // XOR A; LDH (LCDC),A
    0x21, 0x10, 0x80, // LD HL,0x8010
    0x06, 0x10, 0x3E, 0xFF, 0x22, 0x05, 0x20, 0xFC, // tile 1: color 3
    0x06, 0x08, 0x3E, 0xFF, 0x22, 0xAF, 0x22, 0x05, 0x20, 0xF8, // tile 2: color 1
    0x21, 0x00, 0x98, // LD HL,0x9800
    0x0E, 0x0A, 0x3E, 0x01, 0x22, 0x3C, 0x22, 0x0D, 0x20, 0xF8, // tiles 1,2 x10
    0x21, 0x00, 0xFE, // LD HL,0xFE00
    0x3E, 0x20, 0x22, 0x3E, 0x30, 0x22, 0x3E, 0x01, 0x22, 0xAF, 0x22, // OAM 0
    0x3E, 0xE4, 0xE0, 0x47, // BGP
    0x3E, 0x80, 0xE0, 0x48, // OBP0: color 3 -> shade 2
    0x3E, 0x93, 0xE0, 0x40, // LCD on
    0x18, 0xFE, // JR -2
];

fn expected_checker() -> Vec<u8> {
    let mut frame = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
    for y in 0..8 {
        for x in 0..SCREEN_WIDTH {
            frame[y * SCREEN_WIDTH + x] = if (x / 8) % 2 == 0 { 3 } else { 1 };
        }
    }
    for y in 16..24 {
        for x in 40..48 {
            frame[y * SCREEN_WIDTH + x] = 2;
        }
    }
    frame
}

fn first_mismatch(actual: &[u8], expected: &[u8]) -> Option<(usize, usize, u8, u8)> {
    actual
        .iter()
        .zip(expected)
        .position(|(a, e)| a != e)
        .map(|i| (i % SCREEN_WIDTH, i / SCREEN_WIDTH, actual[i], expected[i]))
}

#[test]
fn program_draws_expected_frame() {
    let mut gb = GameBoy::new(Settings::default());
    gb.load_rom(program_rom(CHECKER_PROGRAM)).unwrap();
    for _ in 0..4 {
        gb.run_frame().unwrap();
    }

    let out = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join("checker.png");
    write_viewport_png(&out, gb.viewport());

    let expected = expected_checker();
    if let Some((x, y, got, want)) = first_mismatch(gb.viewport(), &expected) {
        panic!("pixel ({x}, {y}) is shade {got}, expected {want}");
    }
}

#[test]
fn dmg_acid2() {
    let rom = rom_path("dmg-acid2/dmg-acid2.gb");
    let reference = rom_path("dmg-acid2/dmg-acid2-dmg.png");

    let mut gb = GameBoy::default();
    gb.load_cartridge(Cartridge::load(fs::read(&rom).unwrap()).unwrap());
    for _ in 0..60 {
        gb.run_frame().unwrap();
    }

    let out = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join("dmg-acid2.png");
    write_viewport_png(&out, gb.viewport());

    let (width, height, expected) = load_png_shades(&reference);
    assert_eq!(
        (width as usize, height as usize),
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    );
    if let Some((x, y, got, want)) = first_mismatch(gb.viewport(), &expected) {
        panic!(
            "dmg-acid2 differs at ({x}, {y}): shade {got}, expected {want}; see {}",
            out.display()
        );
    }
}
