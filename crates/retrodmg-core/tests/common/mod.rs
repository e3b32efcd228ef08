#![allow(dead_code)]

use once_cell::sync::OnceCell;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use retrodmg_core::{GameBoy, Settings, rtc::Clock};

/// Gray level used for each 2-bit shade when viewports are written as PNG.
pub const SHADES: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

/// Where the test program starts; the entry point jumps here.
pub const PROGRAM_START: usize = 0x0150;

static INIT: OnceCell<()> = OnceCell::new();

fn ensure_test_roms() {
    INIT.get_or_init(|| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms");
        fs::create_dir_all(&dir).expect("failed to create test_roms directory");
        ensure_c_sp_test_rom_bundle(&dir);
    });
}

fn ensure_c_sp_test_rom_bundle(dir: &Path) {
    // ROM binaries are not checked in; download the public bundle on demand.
    if dir.join("dmg-acid2").exists() {
        return;
    }

    let url = "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";
    let resp = reqwest::blocking::get(url).expect("failed to download test roms");
    let status = resp.status();
    if !status.is_success() {
        panic!("failed to download test roms: {status}");
    }
    let bytes = resp.bytes().expect("failed to read rom bytes");
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
    archive.extract(dir).expect("failed to extract test roms");
}

fn download_file(url: &str, dest: &Path) {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).expect("failed to create download directory");
    }
    let resp =
        reqwest::blocking::get(url).unwrap_or_else(|e| panic!("failed to download {url}: {e}"));
    let status = resp.status();
    if !status.is_success() {
        panic!("failed to download {url}: {status}");
    }
    let bytes = resp.bytes().expect("failed to read response body");
    let tmp = dest.with_extension("tmp");
    fs::write(&tmp, &bytes).expect("failed to write temporary file");
    fs::rename(&tmp, dest).unwrap_or_else(|_| {
        let _ = fs::remove_file(dest);
        fs::rename(&tmp, dest).expect("failed to move downloaded file into place")
    });
}

/// One opcode's file from the SM83 SingleStepTests set, fetched on first use
/// into test_roms/sm83/. `cb` selects the 0xCB-prefixed table.
pub fn sm83_vectors(opcode: u8, cb: bool) -> PathBuf {
    let name = if cb {
        format!("cb {opcode:02x}.json")
    } else {
        format!("{opcode:02x}.json")
    };
    let dest = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test_roms")
        .join("sm83")
        .join(&name);
    if !dest.exists() {
        let url = format!(
            "https://raw.githubusercontent.com/SingleStepTests/sm83/main/v1/{}",
            name.replace(' ', "%20")
        );
        download_file(&url, &dest);
    }
    dest
}

pub fn rom_path<P: AsRef<Path>>(relative: P) -> PathBuf {
    ensure_test_roms();
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test_roms")
        .join(relative)
}

/// Scan serial output appended since the last call for blargg's verdict.
pub fn serial_contains_result(serial: &[u8], checked_up_to: &mut usize) -> bool {
    const PASSED: &[u8] = b"Passed";
    const FAILED: &[u8] = b"Failed";

    let start = checked_up_to
        .saturating_sub(PASSED.len() - 1)
        .min(serial.len());
    let window = &serial[start..];
    *checked_up_to = serial.len();
    window
        .windows(PASSED.len())
        .any(|chunk| chunk == PASSED || chunk == FAILED)
}

/// Clock that only moves when a test tells it to. Clones share the time.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<SystemTime>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(UNIX_EPOCH + Duration::from_secs(1_000_000))))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}

/// Blank ROM image with a header. Every bank starts with its own index so
/// tests can tell which bank is mapped.
pub fn rom_image(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_size_code;
    let mut rom = vec![0u8; banks * 0x4000];
    for bank in 0..banks {
        rom[bank * 0x4000] = bank as u8;
    }
    rom[0x0134..0x0139].copy_from_slice(b"TESTS");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_size_code;
    rom[0x0149] = ram_size_code;
    rom
}

/// 32 KiB ROM-only image whose entry point jumps to `program`.
pub fn program_rom(program: &[u8]) -> Vec<u8> {
    let mut rom = rom_image(0x00, 0x00, 0x00);
    // NOP; JP 0x0150
    rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
    rom[PROGRAM_START..PROGRAM_START + program.len()].copy_from_slice(program);
    rom
}

/// Post-boot machine with `program` loaded and PC at its first byte.
pub fn boot_program(program: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new(Settings::default());
    gb.load_rom(program_rom(program)).expect("program ROM should load");
    // NOP and JP.
    gb.step().unwrap();
    gb.step().unwrap();
    assert_eq!(gb.cpu.pc as usize, PROGRAM_START);
    gb
}

/// Step until PC reaches `addr`, giving up after `max_steps` instructions.
pub fn run_until_pc(gb: &mut GameBoy, addr: u16, max_steps: usize) {
    for _ in 0..max_steps {
        if gb.cpu.pc == addr {
            return;
        }
        gb.step().unwrap();
    }
    panic!("PC never reached {addr:04X}, stuck at {:04X}", gb.cpu.pc);
}

pub fn write_viewport_png(path: &Path, viewport: &[u8]) {
    let Some(parent) = path.parent() else {
        return;
    };
    let _ = fs::create_dir_all(parent);
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_) => return,
    };
    let mut encoder = png::Encoder::new(BufWriter::new(file), 160, 144);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = match encoder.write_header() {
        Ok(w) => w,
        Err(_) => return,
    };
    let gray: Vec<u8> = viewport.iter().map(|&s| SHADES[s as usize]).collect();
    let _ = writer.write_image_data(&gray);
}

/// Decode a reference image into shade indices, mapping each pixel's
/// luminance onto the nearest of the four DMG grays.
pub fn load_png_shades<P: AsRef<Path>>(path: P) -> (u32, u32, Vec<u8>) {
    let file = File::open(path.as_ref()).expect("failed to open png");
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().expect("failed to read png info");
    let size = reader
        .output_buffer_size()
        .expect("failed to get png output buffer size");
    let mut buf = vec![0; size];
    let info = reader
        .next_frame(&mut buf)
        .expect("failed to decode png frame");
    let data = &buf[..info.buffer_size()];

    let channels = match info.color_type {
        png::ColorType::Grayscale => 1,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Rgb | png::ColorType::Indexed => 3,
        png::ColorType::Rgba => 4,
    };
    let shades = data
        .chunks_exact(channels)
        .map(|px| {
            let luma = if channels >= 3 {
                (px[0] as u32 + px[1] as u32 + px[2] as u32) / 3
            } else {
                px[0] as u32
            };
            SHADES
                .iter()
                .enumerate()
                .min_by_key(|&(_, &g)| (g as i32 - luma as i32).unsigned_abs())
                .map(|(i, _)| i as u8)
                .unwrap()
        })
        .collect();
    (info.width, info.height, shades)
}
