//! An append-only string table, built up one name at a time as symbols
//! are emitted and finalized once the caller is done adding strings.
//!
//! On the wire this is just the NUL-delimited byte blob pointed to by
//! a symtab command's `stroff`/`strsize`; byte 0 is always a lone NUL
//! so that a `strx` of 0 means "no name".

use core::fmt;
use core::str;

use scroll::{ctx, Pread};

pub struct Strtab {
    bytes: Vec<u8>,
}

impl Strtab {
    pub fn new() -> Strtab {
        Strtab { bytes: vec![0] }
    }

    /// Appends `name` followed by a NUL, returning its offset.
    /// The empty string always returns 0 without growing the table.
    pub fn add(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, offset: u32) -> &str {
        self.bytes.pread_with::<&str>(offset as usize, ctx::StrCtx::from(0u8)).unwrap_or("")
    }
}

impl Default for Strtab {
    fn default() -> Strtab {
        Strtab::new()
    }
}

impl fmt::Debug for Strtab {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Strtab({} bytes)", self.bytes.len())
    }
}
