//! ILI9341 command opcodes

use crate::display_list::Commands;

pub struct Cmd;
#[allow(missing_docs)]
impl Cmd {
    // System
    pub const NOP: u8 = 0x00;
    pub const SWRESET: u8 = 0x01;
    pub const SLPIN: u8 = 0x10;
    pub const SLPOUT: u8 = 0x11;
    pub const PTLON: u8 = 0x12;
    pub const NORON: u8 = 0x13;
    pub const INVOFF: u8 = 0x20;
    pub const INVON: u8 = 0x21;
    pub const GAMMASET: u8 = 0x26;
    pub const DISPOFF: u8 = 0x28;
    pub const DISPON: u8 = 0x29;

    // Status reads
    pub const RDDID: u8 = 0x04;
    pub const RDDST: u8 = 0x09;
    pub const RDMODE: u8 = 0x0A;
    pub const RDMADCTL: u8 = 0x0B;
    pub const RDPIXFMT: u8 = 0x0C;
    pub const RDIMGFMT: u8 = 0x0D;
    pub const RDSIGMODE: u8 = 0x0E;
    pub const RDSELFDIAG: u8 = 0x0F;

    // Memory access
    pub const CASET: u8 = 0x2A;
    pub const PASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const RAMRD: u8 = 0x2E;
    pub const RAMRD_CONT: u8 = 0x3E;
    pub const MADCTL: u8 = 0x36;
    pub const PIXFMT: u8 = 0x3A;

    // Panel setup
    pub const FRMCTR1: u8 = 0xB1;
    pub const DFUNCTR: u8 = 0xB6;
    pub const PWCTR1: u8 = 0xC0;
    pub const PWCTR2: u8 = 0xC1;
    pub const VMCTR1: u8 = 0xC5;
    pub const VMCTR2: u8 = 0xC7;
    pub const PWCTRA: u8 = 0xCB;
    pub const PWCTRB: u8 = 0xCF;
    pub const NVMEMST: u8 = 0xD2;
    pub const GMCTRP1: u8 = 0xE0;
    pub const GMCTRN1: u8 = 0xE1;
    pub const DRVTMA: u8 = 0xE8;
    pub const DRVTMB: u8 = 0xEA;
    pub const PWRSEQ: u8 = 0xED;
    pub const ENA3G: u8 = 0xF2;
    pub const PMPRC: u8 = 0xF7;
}

/// Memory access opcodes used by ILI9341 command lists
pub const COMMANDS: Commands = Commands {
    set_column: Cmd::CASET,
    set_row: Cmd::PASET,
    read_start: Cmd::RAMRD,
    read: Cmd::RAMRD_CONT,
    write_start: Cmd::RAMWR,
};
