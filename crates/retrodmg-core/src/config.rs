/// Machine configuration. The boot ROM is the only recognized option; `None`
/// starts the CPU from the post-boot register state with the overlay disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub boot_rom: Option<Vec<u8>>,
}

impl Settings {
    pub fn with_boot_rom(boot_rom: Vec<u8>) -> Self {
        Self {
            boot_rom: Some(boot_rom),
        }
    }

    pub fn has_boot_rom(&self) -> bool {
        self.boot_rom.is_some()
    }
}
