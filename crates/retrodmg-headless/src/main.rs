mod config;

use std::{fs::File, io::BufWriter, path::Path, path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{error, info, warn};
use retrodmg_core::{
    GameBoy, Settings,
    cartridge::Cartridge,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};

use config::HeadlessConfig;

/// Gray level written to the PNG for each 2-bit shade.
const SHADES: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

#[derive(Parser)]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Path to TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u32>,

    /// Write the final frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Do not write battery RAM back on exit
    #[arg(long)]
    no_save: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

fn merge(args: &Args, mut cfg: HeadlessConfig) -> HeadlessConfig {
    if let Some(path) = &args.bootrom {
        cfg.boot_rom_path = Some(path.clone());
    }
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if let Some(path) = &args.screenshot {
        cfg.screenshot_path = Some(path.clone());
    }
    if args.no_save {
        cfg.save_battery = false;
    }
    cfg
}

fn write_png(path: &Path, viewport: &[u8]) -> Result<(), png::EncodingError> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    let pixels: Vec<u8> = viewport.iter().map(|&s| SHADES[(s & 3) as usize]).collect();
    writer.write_image_data(&pixels)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = merge(&args, config::load_from_file(&config_path));

    if args.write_config {
        return match config::save_to_file(&config_path, &cfg) {
            Ok(()) => {
                info!("Wrote {}", config_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to write {}: {e}", config_path.display());
                ExitCode::FAILURE
            }
        };
    }

    let mut settings = Settings::default();
    if let Some(path) = &cfg.boot_rom_path {
        match std::fs::read(path) {
            Ok(data) => settings = Settings::with_boot_rom(data),
            Err(e) => warn!("Failed to load boot ROM {}: {e}", path.display()),
        }
    }

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load ROM {}: {e}", args.rom.display());
            return ExitCode::FAILURE;
        }
    };

    let mut gb = GameBoy::new(settings);
    gb.load_cartridge(cart);

    for frame in 0..cfg.frames {
        if let Err(e) = gb.run_frame() {
            error!("Stopped at frame {frame}: {e}");
            error!("{}", gb.cpu.debug_state());
            return ExitCode::FAILURE;
        }
    }
    info!("Ran {} frames, {} cycles", cfg.frames, gb.cpu.cycles);

    if cfg.save_battery
        && let Err(e) = gb.save_battery()
    {
        warn!("Failed to save battery RAM: {e}");
    }

    if let Some(path) = &cfg.screenshot_path {
        if let Err(e) = write_png(path, gb.viewport()) {
            error!("Failed to write {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
        info!("Wrote {}", path.display());
    }

    ExitCode::SUCCESS
}
