//! The sizing pass: assigns each section a VM address and an in-file
//! offset, then accumulates the load-command sizes the writer needs.

use crate::mach::constants::{MAX_SECT, S_ZEROFILL};
use crate::mach::Context;

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

/// Outputs of the sizing pass the writer consumes directly.
#[derive(Debug, Default)]
pub struct Sizes {
    pub running_vmsize: u64,
    pub running_filesize: u64,
    pub ncmds: u32,
    pub sizeofcmds: u32,
}

impl Context {
    pub fn size_sections(&mut self) -> Sizes {
        // `select_section` already rejects the section that would push
        // the count past `MAX_SECT`; this is a backstop against that
        // invariant being violated by a future caller of this pass.
        debug_assert!(self.sections.len() <= MAX_SECT, "more than {} sections", MAX_SECT);

        let mut ncmds = 0u32;
        let mut sizeofcmds = 0u32;
        if !self.sections.is_empty() {
            ncmds += 1;
            sizeofcmds += (self.format.segcmd_size + self.sections.len() * self.format.sectcmd_size) as u32;
        }
        if !self.symtab.is_empty() {
            ncmds += 1;
            sizeofcmds += crate::mach::constants::MACHO_SYMCMD_SIZE as u32;
        }

        // Section file offsets are absolute: the segment's raw data
        // starts right after the header and load commands, so the
        // running file-size accumulator is seeded there rather than
        // at 0 (VM addresses stay segment-relative, seeded at 0).
        let cmds_end = self.format.header_size as u64 + sizeofcmds as u64;

        let mut running_vmsize = 0u64;
        let mut running_filesize = cmds_end;

        for section in &mut self.sections {
            if section.align < 0 {
                section.align = 0;
            }
            let align = 1u64 << section.align;
            section.addr = align_up(running_vmsize, align);
            running_vmsize = section.addr + section.size;

            let is_zerofill = section.flags & crate::mach::constants::SECTION_TYPE == S_ZEROFILL;
            if !is_zerofill {
                section.pad = align_up(running_filesize, 4) - running_filesize;
                section.offset = running_filesize + section.pad;
                running_filesize += section.size + section.pad;
            }
        }

        Sizes { running_vmsize, running_filesize: running_filesize - cmds_end, ncmds, sizeofcmds }
    }
}
