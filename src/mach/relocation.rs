//! The on-disk relocation entry, the internal classification of a
//! pending relocation, and the type codes for both Mach-O variants.
//!
//! Format of a relocation entry of a Mach-O file (modified 4.3BSD
//! format): a 32-bit section offset, followed by a packed 32-bit word
//! `(snum:24, pcrel:1, length:2, ext:1, type:4)`, LSB-first. Real
//! Mach-O relocations are written with explicit shifts rather than a
//! language bitfield, per spec.md's design note that bitfield layout
//! is not portable — `goblin`'s own `Relocation` accessor in this
//! module (snapshot before this crate forked it) got that masking
//! wrong, which is exactly the trap this avoids.

use scroll::{Pread, Pwrite, SizeWith};

/// The on-wire relocation entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct RelocationInfo {
    pub r_address: i32,
    pub r_info: u32,
}

pub const SIZEOF_RELOCATION_INFO: usize = 8;

impl RelocationInfo {
    pub fn pack(addr: u32, snum: u32, pcrel: bool, length: u8, ext: bool, reloc_type: u8) -> RelocationInfo {
        let word = (snum & 0x00ff_ffff)
            | ((pcrel as u32) << 24)
            | ((length as u32 & 0x3) << 25)
            | ((ext as u32) << 27)
            | ((reloc_type as u32 & 0xf) << 28);
        RelocationInfo { r_address: addr as i32, r_info: word }
    }
}

// Generic (32-bit / i386) relocation type codes.
pub const GENERIC_RELOC_VANILLA: u8 = 0;
pub const GENERIC_RELOC_TLV: u8 = 5;

// x86_64 relocation type codes.
pub const X86_64_RELOC_UNSIGNED: u8 = 0;
pub const X86_64_RELOC_SIGNED: u8 = 1;
pub const X86_64_RELOC_BRANCH: u8 = 2;
pub const X86_64_RELOC_GOT_LOAD: u8 = 3;
pub const X86_64_RELOC_GOT: u8 = 4;
pub const X86_64_RELOC_SUBTRACTOR: u8 = 5;
pub const X86_64_RELOC_SIGNED_1: u8 = 6;
pub const X86_64_RELOC_SIGNED_2: u8 = 7;
pub const X86_64_RELOC_SIGNED_4: u8 = 8;
pub const X86_64_RELOC_TLV: u8 = 9;

/// Internal classification of a pending relocation, decided by the
/// emitter from the address operand's `WRT` modifier and (for direct
/// branches and GOT loads) the trailing opcode bytes already written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Abs,
    Rel,
    Tlv,
    Branch,
    Sub,
    Got,
    GotLoad,
}

/// Ordinal used for `Format::maxreltype` comparisons, matching the
/// enum declaration order in the original assembler.
impl RelKind {
    pub const fn ordinal(self) -> u8 {
        match self {
            RelKind::Abs => 0,
            RelKind::Rel => 1,
            RelKind::Tlv => 2,
            RelKind::Branch => 3,
            RelKind::Sub => 4,
            RelKind::Got => 5,
            RelKind::GotLoad => 6,
        }
    }
}

/// 32-bit targets support up to `RL_TLV`; `RL_SUB`/`RL_GOT`/`RL_GOTLOAD`
/// are x86_64-only.
pub const RL_MAX_32: u8 = RelKind::Tlv.ordinal();
/// 64-bit targets support the full set.
pub const RL_MAX_64: u8 = RelKind::GotLoad.ordinal();

/// A pending relocation, in the form the emitter keeps it in before the
/// write pass packs it onto the wire.
#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    /// In-section byte offset of the operand being relocated.
    pub addr: u32,
    /// For `ext == true`, a symbol index (`initial_snum` until the
    /// layout pass's fixup, `snum` after); for `ext == false`, the
    /// 1-based file index of the target section.
    pub snum: u32,
    pub pcrel: bool,
    /// log2 operand width: 0=1 byte, 1=2, 2=4, 3=8.
    pub length: u8,
    pub ext: bool,
    pub reloc_type: u8,
}

impl Relocation {
    pub fn to_wire(self) -> RelocationInfo {
        RelocationInfo::pack(self.addr, self.snum, self.pcrel, self.length, self.ext, self.reloc_type)
    }
}

/// `1 << length`, i.e. the byte width of the operand this relocation
/// patches.
pub fn length_to_bytes(length: u8) -> u8 {
    1 << length
}

/// Matches byte counts 1, 2, 4, 8 to length codes 0, 1, 2, 3.
/// Panics on any other width — the emitter never asks for one.
pub fn bytes_to_length(bytes: u8) -> u8 {
    match bytes {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => panic!("relocation width must be 1, 2, 4, or 8 bytes, got {}", bytes),
    }
}
