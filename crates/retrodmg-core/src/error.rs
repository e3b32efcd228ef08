use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("illegal opcode {opcode:02X} at PC={pc:04X}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    #[error("unrecognized cartridge type {0:02X}")]
    CartridgeTypeUnrecognized(u8),

    #[error("no cartridge loaded")]
    MbcNotLoaded,

    #[error("unknown input {0:?}")]
    UnknownInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
