//! The Mach-O file header, one per width.

use scroll::{Pread, Pwrite, SizeWith};

/// Mach Header magic constant (32-bit).
pub const MH_MAGIC: u32 = 0xfeed_face;
/// Mach Header magic constant (64-bit).
pub const MH_MAGIC_64: u32 = 0xfeed_facf;

/// Relocatable object file — the only filetype this emitter produces.
pub const MH_OBJECT: u32 = 0x1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct MachHeader32 {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

pub const SIZEOF_MACH_HEADER_32: usize = 28;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pread, Pwrite, SizeWith)]
pub struct MachHeader64 {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

pub const SIZEOF_MACH_HEADER_64: usize = 32;
