//! The format descriptor: the handful of constants that differ between
//! the 32-bit (i386) and 64-bit (x86_64) Mach-O object variants. There
//! are exactly two instances of this, never a third.

use crate::mach::header;
use crate::mach::load_command;
use crate::mach::relocation;

/// `CPU_SUBTYPE_I386_ALL`. Emitted verbatim for both 32- and 64-bit
/// output — the original assembler this core is grounded on does this
/// too, it is not a bug to fix.
pub const CPU_SUBTYPE_I386_ALL: u32 = 3;

pub mod cputype {
    pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
    pub const CPU_TYPE_X86: u32 = 7;
    pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// 4 or 8.
    pub ptrsize: u8,
    pub mh_magic: u32,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    /// `LC_SEGMENT` or `LC_SEGMENT_64`.
    pub lc_segment: u32,
    pub header_size: usize,
    pub segcmd_size: usize,
    pub sectcmd_size: usize,
    pub nlist_size: usize,
    /// Highest internal relocation kind ordinal this format supports;
    /// `RL_SUB` and beyond require 64-bit.
    pub maxreltype: u8,
    pub reloc_abs: u8,
    pub reloc_rel: u8,
    pub reloc_tlv: u8,
}

impl Format {
    pub const MACHO32: Format = Format {
        ptrsize: 4,
        mh_magic: header::MH_MAGIC,
        cpu_type: cputype::CPU_TYPE_X86,
        cpu_subtype: CPU_SUBTYPE_I386_ALL,
        lc_segment: load_command::LC_SEGMENT,
        header_size: header::SIZEOF_MACH_HEADER_32,
        segcmd_size: load_command::SIZEOF_SEGMENT_COMMAND_32,
        sectcmd_size: load_command::SIZEOF_SECTION_32,
        nlist_size: 12,
        maxreltype: relocation::RL_MAX_32,
        reloc_abs: relocation::GENERIC_RELOC_VANILLA,
        reloc_rel: relocation::GENERIC_RELOC_VANILLA,
        reloc_tlv: relocation::GENERIC_RELOC_TLV,
    };

    pub const MACHO64: Format = Format {
        ptrsize: 8,
        mh_magic: header::MH_MAGIC_64,
        cpu_type: cputype::CPU_TYPE_X86_64,
        cpu_subtype: CPU_SUBTYPE_I386_ALL,
        lc_segment: load_command::LC_SEGMENT_64,
        header_size: header::SIZEOF_MACH_HEADER_64,
        segcmd_size: load_command::SIZEOF_SEGMENT_COMMAND_64,
        sectcmd_size: load_command::SIZEOF_SECTION_64,
        nlist_size: 16,
        maxreltype: relocation::RL_MAX_64,
        reloc_abs: relocation::X86_64_RELOC_UNSIGNED,
        reloc_rel: relocation::X86_64_RELOC_SIGNED,
        reloc_tlv: relocation::X86_64_RELOC_TLV,
    };

    pub fn is64(&self) -> bool {
        self.ptrsize == 8
    }
}
