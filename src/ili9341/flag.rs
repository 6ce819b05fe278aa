/// Register bit values for the ILI9341
pub struct Flag;
#[allow(missing_docs)]
impl Flag {
    // Memory Access Control (0x36)
    pub const MADCTL_MY: u8 = 0x80; // Row address order
    pub const MADCTL_MX: u8 = 0x40; // Column address order
    pub const MADCTL_MV: u8 = 0x20; // Row/column exchange
    pub const MADCTL_ML: u8 = 0x10; // Vertical refresh order
    pub const MADCTL_RGB: u8 = 0x00;
    pub const MADCTL_BGR: u8 = 0x08;
    pub const MADCTL_MH: u8 = 0x04; // Horizontal refresh order

    // Pixel Format Set (0x3A)
    pub const PIXFMT_16BIT: u8 = 0x55;
    pub const PIXFMT_18BIT: u8 = 0x66;
}
