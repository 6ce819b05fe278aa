//! Binary layout of command list entries
//!
//! Every entry starts with a one byte code followed by its fields.
//! Multi-byte fields are little-endian.
//!
//! | code          | fields                                   |
//! |---------------|------------------------------------------|
//! | `COMMAND`     | cmd, len:u8, params[len]                 |
//! | `WRITE`       | len:u16, bytes[len]                      |
//! | `WRITE_BUFFER`| slot:u8, offset:u32, len:u16             |
//! | `READ`        | cmd, slot:u8, offset:u32, len:u16        |
//! | `FILL`        | len:u8, pattern[len], repeat:u32         |
//! | `CALLBACK`    | index:u8                                 |

pub struct Code;
impl Code {
    pub const COMMAND: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const WRITE_BUFFER: u8 = 0x03;
    pub const READ: u8 = 0x04;
    pub const FILL: u8 = 0x05;
    pub const CALLBACK: u8 = 0x06;
}

/// Encoded size of a command entry, without its parameters
pub const COMMAND_LEN: usize = 3;
/// Encoded size of an inline write entry, without its data
pub const WRITE_LEN: usize = 3;
pub const WRITE_BUFFER_LEN: usize = 8;
pub const READ_LEN: usize = 9;
/// Encoded size of a fill entry, without its pattern
pub const FILL_LEN: usize = 6;
pub const CALLBACK_LEN: usize = 2;

/// One decoded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    /// Command byte followed by optional parameter bytes
    Command { cmd: u8, params: &'a [u8] },
    /// Data bytes carried inside the list
    Write(&'a [u8]),
    /// Data bytes taken from an attached buffer
    WriteBuffer { slot: u8, offset: usize, len: usize },
    /// Read command, dummy byte, then `len` bytes into an attached buffer
    Read {
        cmd: u8,
        slot: u8,
        offset: usize,
        len: usize,
    },
    /// `pattern` sent `repeat` times
    Fill { pattern: &'a [u8], repeat: u32 },
    /// Completion marker
    Callback(u8),
}

/// Iterator over the entries of an encoded list.
///
/// Stops at the first malformed entry.
pub struct Entries<'a> {
    data: &'a [u8],
}

impl<'a> Entries<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Entries { data }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() < n {
            return None;
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<usize> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn decode(&mut self) -> Option<Entry<'a>> {
        let entry = match self.u8()? {
            Code::COMMAND => {
                let cmd = self.u8()?;
                let len = self.u8()? as usize;
                Entry::Command {
                    cmd,
                    params: self.take(len)?,
                }
            }
            Code::WRITE => {
                let len = self.u16()?;
                Entry::Write(self.take(len)?)
            }
            Code::WRITE_BUFFER => Entry::WriteBuffer {
                slot: self.u8()?,
                offset: self.u32()? as usize,
                len: self.u16()?,
            },
            Code::READ => Entry::Read {
                cmd: self.u8()?,
                slot: self.u8()?,
                offset: self.u32()? as usize,
                len: self.u16()?,
            },
            Code::FILL => {
                let len = self.u8()? as usize;
                let pattern = self.take(len)?;
                Entry::Fill {
                    pattern,
                    repeat: self.u32()?,
                }
            }
            Code::CALLBACK => Entry::Callback(self.u8()?),
            code => {
                log::error!("Bad command list code 0x{:02X}", code);
                return None;
            }
        };
        Some(entry)
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let entry = self.decode();
        if entry.is_none() {
            log::error!("Truncated command list entry");
            self.data = &[];
        }
        entry
    }
}

/// Append-only writer used by the list encoders
pub(crate) struct Encoder<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>) -> Self {
        Encoder { out }
    }

    pub(crate) fn command(&mut self, cmd: u8, params: &[u8]) {
        self.out.extend_from_slice(&[Code::COMMAND, cmd, params.len() as u8]);
        self.out.extend_from_slice(params);
    }

    pub(crate) fn write(&mut self, data: &[u8]) {
        self.out.push(Code::WRITE);
        self.out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        self.out.extend_from_slice(data);
    }

    pub(crate) fn write_buffer(&mut self, slot: u8, offset: usize, len: usize) {
        self.out.extend_from_slice(&[Code::WRITE_BUFFER, slot]);
        self.out.extend_from_slice(&(offset as u32).to_le_bytes());
        self.out.extend_from_slice(&(len as u16).to_le_bytes());
    }

    pub(crate) fn read(&mut self, cmd: u8, slot: u8, offset: usize, len: usize) {
        self.out.extend_from_slice(&[Code::READ, cmd, slot]);
        self.out.extend_from_slice(&(offset as u32).to_le_bytes());
        self.out.extend_from_slice(&(len as u16).to_le_bytes());
    }

    pub(crate) fn fill(&mut self, pattern: &[u8], repeat: u32) {
        self.out.extend_from_slice(&[Code::FILL, pattern.len() as u8]);
        self.out.extend_from_slice(pattern);
        self.out.extend_from_slice(&repeat.to_le_bytes());
    }

    pub(crate) fn callback(&mut self, index: u8) {
        self.out.extend_from_slice(&[Code::CALLBACK, index]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_sizes_match_layout() {
        let mut out = Vec::new();
        Encoder::new(&mut out).command(0x2A, &[0, 0, 0, 9]);
        assert_eq!(out.len(), COMMAND_LEN + 4);

        out.clear();
        Encoder::new(&mut out).write_buffer(1, 2, 3);
        assert_eq!(out.len(), WRITE_BUFFER_LEN);

        out.clear();
        Encoder::new(&mut out).read(0x2E, 1, 2, 3);
        assert_eq!(out.len(), READ_LEN);

        out.clear();
        Encoder::new(&mut out).fill(&[0xAB, 0xCD], 7);
        assert_eq!(out.len(), FILL_LEN + 2);

        out.clear();
        Encoder::new(&mut out).callback(4);
        assert_eq!(out.len(), CALLBACK_LEN);
    }

    #[test]
    fn entries_decode_in_order() {
        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        enc.command(0x36, &[0x48]);
        enc.write(&[1, 2]);
        enc.fill(&[0xFF, 0x00], 300);
        enc.read(0x3E, 0, 63, 21);
        enc.callback(0);

        let entries: Vec<_> = Entries::new(&out).collect();
        assert_eq!(
            entries,
            vec![
                Entry::Command {
                    cmd: 0x36,
                    params: &[0x48]
                },
                Entry::Write(&[1, 2]),
                Entry::Fill {
                    pattern: &[0xFF, 0x00],
                    repeat: 300
                },
                Entry::Read {
                    cmd: 0x3E,
                    slot: 0,
                    offset: 63,
                    len: 21
                },
                Entry::Callback(0),
            ]
        );
    }

    #[test]
    fn truncated_entry_stops_iteration() {
        let data = [Code::WRITE, 5, 0, 1, 2];
        assert_eq!(Entries::new(&data).count(), 0);
    }
}
