mod common;

use std::fs;
use std::time::Duration;
use tempfile::tempdir;

use common::{ManualClock, rom_image};
use retrodmg_core::{
    Error,
    cartridge::{Cartridge, MbcKind},
    mmu::Mmu,
};

#[test]
fn header_selects_controller() {
    for (cart_type, kind) in [
        (0x00, MbcKind::NoMbc),
        (0x03, MbcKind::Mbc1),
        (0x06, MbcKind::Mbc2),
        (0x10, MbcKind::Mbc3),
        (0x13, MbcKind::Mbc3),
        (0x1B, MbcKind::Mbc5),
        (0x1E, MbcKind::Mbc5),
    ] {
        let cart = Cartridge::load(rom_image(cart_type, 0x01, 0x02)).unwrap();
        assert_eq!(cart.kind(), kind, "type {cart_type:02X}");
        assert_eq!(cart.cart_type(), cart_type);
        assert_eq!(cart.title(), "TESTS");
    }
}

#[test]
fn unknown_type_byte_is_rejected() {
    let result = Cartridge::load(rom_image(0xFC, 0x00, 0x00));
    assert!(matches!(result, Err(Error::CartridgeTypeUnrecognized(0xFC))));
}

#[test]
fn bank_zero_reads_as_bank_one() {
    for cart_type in [0x01, 0x11, 0x19] {
        let mut cart = Cartridge::load(rom_image(cart_type, 0x02, 0x00)).unwrap();
        cart.write(0x2000, 0x01);
        let bank_one = cart.read(0x4000);
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), bank_one, "type {cart_type:02X}");
        assert_eq!(bank_one, 1);
        cart.write(0x2000, 0x03);
        assert_eq!(cart.read(0x4000), 3);
    }
}

#[test]
fn mbc2_bank_register_needs_address_bit_8() {
    let mut cart = Cartridge::load(rom_image(0x06, 0x02, 0x00)).unwrap();
    cart.write(0x2000, 0x03);
    assert_eq!(cart.read(0x4000), 1);
    cart.write(0x2100, 0x03);
    assert_eq!(cart.read(0x4000), 3);
    cart.write(0x2100, 0x00);
    assert_eq!(cart.read(0x4000), 1);
}

#[test]
fn mbc5_nine_bit_rom_bank() {
    // 512 banks (8 MiB).
    let mut cart = Cartridge::load(rom_image(0x19, 0x08, 0x00)).unwrap();
    cart.write(0x2000, 0x05);
    cart.write(0x3000, 0x01);
    // Bank 0x105 starts with its index truncated to a byte.
    assert_eq!(cart.read(0x4000), 0x05);
    assert_eq!(cart.rom_banks(), 512);
}

#[test]
fn ram_gate_blocks_reads_and_writes() {
    for cart_type in [0x03, 0x06, 0x13, 0x1B] {
        let mut cart = Cartridge::load(rom_image(cart_type, 0x01, 0x03)).unwrap();
        cart.write(0xA000, 0x05);
        assert_eq!(cart.read(0xA000), 0xFF, "type {cart_type:02X}");

        cart.write(0x0000, 0x0A);
        assert_ne!(cart.read(0xA000) & 0x0F, 0x05, "type {cart_type:02X}");
        cart.write(0xA000, 0x05);
        assert_eq!(cart.read(0xA000) & 0x0F, 0x05);

        // Only a low nibble of 0xA enables RAM.
        cart.write(0x0000, 0x0B);
        assert_eq!(cart.read(0xA000), 0xFF);
        cart.write(0x0000, 0x1A);
        assert_eq!(cart.read(0xA000) & 0x0F, 0x05);
    }
}

#[test]
fn mbc2_ram_is_four_bits_wide() {
    let mut cart = Cartridge::load(rom_image(0x06, 0x01, 0x00)).unwrap();
    cart.write(0x0000, 0x0A);
    cart.write(0xA010, 0x3C);
    assert_eq!(cart.read(0xA010), 0xFC);
    // 512 entries mirrored through the window.
    assert_eq!(cart.read(0xA210), 0xFC);

    let ram = cart.get_ram().unwrap();
    assert_eq!(ram.len(), 512);
    assert_eq!(ram[0x10], 0xFC);
}

#[test]
fn external_ram_roundtrips_through_get_and_set() {
    let mut cart = Cartridge::load(rom_image(0x03, 0x01, 0x02)).unwrap();
    assert_eq!(cart.get_ram().map(|r| r.len()), Some(0x2000));

    let mut save = vec![0u8; 0x2000];
    save[0] = 0x42;
    save[0x1FFF] = 0x99;
    cart.set_ram(&save);
    cart.write(0x0000, 0x0A);
    assert_eq!(cart.read(0xA000), 0x42);
    assert_eq!(cart.read(0xBFFF), 0x99);
    assert_eq!(cart.get_ram().unwrap(), save);

    let no_ram = Cartridge::load(rom_image(0x00, 0x00, 0x00)).unwrap();
    assert_eq!(no_ram.get_ram(), None);
}

#[test]
fn battery_ram_saved_to_disk() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("game.gb");
    fs::write(&rom_path, rom_image(0x03, 0x01, 0x03)).unwrap();

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    cart.ram[0] = 0xAA;
    cart.save_ram().unwrap();

    let data = fs::read(rom_path.with_extension("sav")).unwrap();
    assert_eq!(data.len(), 0x8000);
    assert_eq!(data[0], 0xAA);

    let cart = Cartridge::from_file(&rom_path).unwrap();
    assert_eq!(cart.ram[0], 0xAA);
}

#[test]
fn mbc3_rtc_state_roundtrips_to_disk() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("rtc.gb");
    fs::write(&rom_path, rom_image(0x10, 0x01, 0x03)).unwrap();

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    assert!(cart.has_rtc());
    cart.write(0x0000, 0x0A);
    cart.write(0x4000, 0x0C); // control
    cart.write(0xA000, 0x40); // halt so it doesn't advance between saves
    cart.write(0x4000, 0x08); // seconds
    cart.write(0xA000, 12);
    cart.write(0x4000, 0x09); // minutes
    cart.write(0xA000, 34);
    cart.save_ram().unwrap();
    assert!(rom_path.with_extension("rtc").exists());

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    cart.write(0x0000, 0x0A);
    cart.write(0x6000, 0x00);
    cart.write(0x6000, 0x01);

    cart.write(0x4000, 0x08);
    let seconds = cart.read(0xA000);
    cart.write(0x4000, 0x09);
    let minutes = cart.read(0xA000);
    cart.write(0x4000, 0x0C);
    let control = cart.read(0xA000);

    assert_eq!(seconds, 12);
    assert_eq!(minutes, 34);
    assert_eq!(control & 0x40, 0x40);
}

/// MBC3 with RTC and RAM enabled, counting against a test clock.
fn rtc_cart() -> (Cartridge, ManualClock) {
    let clock = ManualClock::new();
    let mut cart = Cartridge::load(rom_image(0x10, 0x01, 0x03)).unwrap();
    cart.set_clock(clock.clone());
    cart.write(0x0000, 0x0A);
    (cart, clock)
}

fn latch(cart: &mut Cartridge) {
    cart.write(0x6000, 0x00);
    cart.write(0x6000, 0x01);
}

fn rtc_reg(cart: &mut Cartridge, reg: u8) -> u8 {
    cart.write(0x4000, reg);
    cart.read(0xA000)
}

#[test]
fn rtc_latch_needs_zero_then_one() {
    let (mut cart, clock) = rtc_cart();
    latch(&mut cart);
    assert_eq!(rtc_reg(&mut cart, 0x08), 0x00);

    clock.advance(Duration::from_secs(5));
    // Latched copy is stale until the next 0 -> 1 sequence.
    assert_eq!(rtc_reg(&mut cart, 0x08), 0x00);
    cart.write(0x6000, 0x01);
    assert_eq!(rtc_reg(&mut cart, 0x08), 0x00);
    latch(&mut cart);
    assert_eq!(rtc_reg(&mut cart, 0x08), 0x05);
}

#[test]
fn rtc_follows_wall_time_not_emulated_time() {
    let (mut cart, clock) = rtc_cart();
    cart.write(0x4000, 0x08);
    cart.write(0xA000, 10);
    cart.write(0x4000, 0x09);
    cart.write(0xA000, 3);

    clock.advance(Duration::from_secs(61));
    latch(&mut cart);
    assert_eq!(rtc_reg(&mut cart, 0x08), 11);
    assert_eq!(rtc_reg(&mut cart, 0x09), 4);

    // A paused host still counts.
    let mut mmu = Mmu::new();
    mmu.load_cart(cart);
    clock.advance(Duration::from_secs(120));
    mmu.write_byte(0x6000, 0x00);
    mmu.write_byte(0x6000, 0x01);
    mmu.write_byte(0x4000, 0x09);
    assert_eq!(mmu.read_byte(0xA000), 6);

    // Running the machine without wall time passing does not.
    mmu.tick(4_194_304 * 3);
    mmu.write_byte(0x6000, 0x00);
    mmu.write_byte(0x6000, 0x01);
    mmu.write_byte(0x4000, 0x08);
    assert_eq!(mmu.read_byte(0xA000), 11);
}

#[test]
fn rtc_halt_stops_wall_time() {
    let (mut cart, clock) = rtc_cart();
    cart.write(0x4000, 0x0C);
    cart.write(0xA000, 0x40);
    clock.advance(Duration::from_secs(30));
    cart.write(0xA000, 0x00);
    clock.advance(Duration::from_secs(2));
    latch(&mut cart);
    assert_eq!(rtc_reg(&mut cart, 0x08), 2);
}

#[test]
fn rom_hash_is_stable_and_content_keyed() {
    let a = Cartridge::load(rom_image(0x00, 0x00, 0x00)).unwrap();
    let b = Cartridge::load(rom_image(0x00, 0x00, 0x00)).unwrap();
    let mut other = rom_image(0x00, 0x00, 0x00);
    other[0x0200] = 1;
    let c = Cartridge::load(other).unwrap();
    assert_eq!(a.rom_hash(), b.rom_hash());
    assert_ne!(a.rom_hash(), c.rom_hash());
}
