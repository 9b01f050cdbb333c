//! The write pass: lays out the fixed file structure described in the
//! emitter's §4.7 and serializes it, patching relocation-bearing
//! payload bytes in place as it goes.

use scroll::Pwrite;

use crate::error::Result;
use crate::mach::constants::{NO_SECT, N_SECT, N_TYPE, SECTION_TYPE, S_ATTR_EXT_RELOC, S_ATTR_LOC_RELOC, S_ZEROFILL, SEG_DATA, SEG_TEXT};
use crate::mach::header::{MachHeader32, MachHeader64, MH_OBJECT};
use crate::mach::load_command::{Section32, Section64, SegmentCommand32, SegmentCommand64, SymtabCommand, LC_SYMTAB};
use crate::mach::relocation::RelocationInfo;
use crate::mach::sizing::Sizes;
use crate::mach::symbol::{Nlist32, Nlist64};
use crate::mach::Context;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

fn set_name(dst: &mut [u8; 16], name: &str) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(16);
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn grow_to(buf: &mut Vec<u8>, len: usize) {
    if buf.len() < len {
        buf.resize(len, 0);
    }
}

impl Context {
    /// Serializes the current state into a Mach-O `MH_OBJECT` byte
    /// buffer. Call only after `layout_symbols` and `size_sections`.
    pub fn write(&mut self, sizes: &Sizes) -> Result<Vec<u8>> {
        let le = scroll::Endian::Little;
        let header_size = self.format.header_size;
        let cmds_end = header_size + sizes.sizeofcmds as usize;

        let data_region_end = cmds_end
            + self
                .sections
                .iter()
                .map(|s| if s.flags & SECTION_TYPE == S_ZEROFILL { 0 } else { (s.pad + s.size) as usize })
                .sum::<usize>();

        let rel_base = align_up(data_region_end, self.format.ptrsize as usize);
        let rel_padcnt = rel_base - data_region_end;

        let mut running_reloff = 0u32;
        let mut section_reloffs = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let nreloc = section.nreloc();
            section_reloffs.push(if nreloc > 0 { rel_base as u32 + running_reloff } else { 0 });
            running_reloff += nreloc * 8;
        }
        let total_reloc_bytes = running_reloff as usize;

        let symoff = rel_base + total_reloc_bytes;
        let nsyms = self.symtab.len() as u32;
        let strsize = self.strtab.len() as u32;
        let stroff = symoff + nsyms as usize * self.format.nlist_size;

        let mut buf: Vec<u8> = Vec::with_capacity(stroff + strsize as usize);
        grow_to(&mut buf, header_size);

        if self.format.is64() {
            let header = MachHeader64 {
                magic: self.format.mh_magic,
                cputype: self.format.cpu_type,
                cpusubtype: self.format.cpu_subtype,
                filetype: MH_OBJECT,
                ncmds: sizes.ncmds,
                sizeofcmds: sizes.sizeofcmds,
                flags: 0,
                reserved: 0,
            };
            buf.pwrite_with(header, 0, le)?;
        } else {
            let header = MachHeader32 {
                magic: self.format.mh_magic,
                cputype: self.format.cpu_type,
                cpusubtype: self.format.cpu_subtype,
                filetype: MH_OBJECT,
                ncmds: sizes.ncmds,
                sizeofcmds: sizes.sizeofcmds,
                flags: 0,
            };
            buf.pwrite_with(header, 0, le)?;
        }

        let mut off = header_size;

        // __DATA,__const is rewritten to __TEXT,__const unless it was
        // introduced through the explicit segment,section form, or a
        // real __TEXT,__const section already exists.
        let has_text_const = self.sections.iter().any(|s| s.segname == SEG_TEXT && s.sectname == "__const");
        let seg_names: Vec<String> = self
            .sections
            .iter()
            .map(|s| {
                if !has_text_const && s.segname == SEG_DATA && s.sectname == "__const" && !s.by_name {
                    SEG_TEXT.to_string()
                } else {
                    s.segname.clone()
                }
            })
            .collect();

        if !self.sections.is_empty() {
            let segname = [0u8; 16];
            let nsects = self.sections.len() as u32;
            let cmdsize = (self.format.segcmd_size + self.sections.len() * self.format.sectcmd_size) as u32;
            grow_to(&mut buf, off + self.format.segcmd_size);
            if self.format.is64() {
                let seg = SegmentCommand64 {
                    cmd: self.format.lc_segment,
                    cmdsize,
                    segname,
                    vmaddr: 0,
                    vmsize: sizes.running_vmsize,
                    fileoff: cmds_end as u64,
                    filesize: sizes.running_filesize,
                    maxprot: crate::mach::constants::VM_PROT_DEFAULT,
                    initprot: crate::mach::constants::VM_PROT_DEFAULT,
                    nsects,
                    flags: 0,
                };
                buf.pwrite_with(seg, off, le)?;
            } else {
                let seg = SegmentCommand32 {
                    cmd: self.format.lc_segment,
                    cmdsize,
                    segname,
                    vmaddr: 0,
                    vmsize: sizes.running_vmsize as u32,
                    fileoff: cmds_end as u32,
                    filesize: sizes.running_filesize as u32,
                    maxprot: crate::mach::constants::VM_PROT_DEFAULT,
                    initprot: crate::mach::constants::VM_PROT_DEFAULT,
                    nsects,
                    flags: 0,
                };
                buf.pwrite_with(seg, off, le)?;
            }
            off += self.format.segcmd_size;

            for (i, section) in self.sections.iter().enumerate() {
                let mut flags = section.flags;
                if section.nreloc() > 0 {
                    flags |= S_ATTR_LOC_RELOC;
                }
                if section.extreloc {
                    flags |= S_ATTR_EXT_RELOC;
                }
                let mut sectname = [0u8; 16];
                let mut segname = [0u8; 16];
                set_name(&mut sectname, &section.sectname);
                set_name(&mut segname, &seg_names[i]);
                let is_zerofill = flags & SECTION_TYPE == S_ZEROFILL;
                let reloff = section_reloffs[i];

                grow_to(&mut buf, off + self.format.sectcmd_size);
                if self.format.is64() {
                    let sect = Section64 {
                        sectname,
                        segname,
                        addr: section.addr,
                        size: section.size,
                        offset: if is_zerofill { 0 } else { section.offset as u32 },
                        align: section.align as u32,
                        reloff,
                        nreloc: section.nreloc(),
                        flags,
                        reserved1: 0,
                        reserved2: 0,
                        reserved3: 0,
                    };
                    buf.pwrite_with(sect, off, le)?;
                } else {
                    let sect = Section32 {
                        sectname,
                        segname,
                        addr: section.addr as u32,
                        size: section.size as u32,
                        offset: if is_zerofill { 0 } else { section.offset as u32 },
                        align: section.align as u32,
                        reloff,
                        nreloc: section.nreloc(),
                        flags,
                        reserved1: 0,
                        reserved2: 0,
                    };
                    buf.pwrite_with(sect, off, le)?;
                }
                off += self.format.sectcmd_size;
            }
        }

        if !self.symtab.is_empty() {
            let symtab_cmd = SymtabCommand {
                cmd: LC_SYMTAB,
                cmdsize: crate::mach::constants::MACHO_SYMCMD_SIZE as u32,
                symoff: symoff as u32,
                nsyms,
                stroff: stroff as u32,
                strsize,
            };
            grow_to(&mut buf, off + crate::mach::constants::MACHO_SYMCMD_SIZE);
            buf.pwrite_with(symtab_cmd, off, le)?;
            off += crate::mach::constants::MACHO_SYMCMD_SIZE;
        }
        debug_assert_eq!(off, cmds_end);

        // Section payloads, patching relocation-bearing bytes in
        // place before writing each section's data.
        let sectstab = self.sectstab();
        for section in &self.sections {
            let is_zerofill = section.flags & SECTION_TYPE == S_ZEROFILL;
            if is_zerofill {
                continue;
            }
            let mut data = section.data.clone();
            for reloc in section.relocs.iter() {
                let len = (1usize << reloc.length).min(8);
                let addr = reloc.addr as usize;
                let mut value: u64 = 0;
                for i in 0..len {
                    value |= (data[addr + i] as u64) << (8 * i);
                }
                if !reloc.ext {
                    value = value.wrapping_add(sectstab.get(reloc.snum as usize).copied().unwrap_or(0));
                    if reloc.pcrel {
                        value = value.wrapping_sub(section.addr);
                    }
                } else if reloc.pcrel && reloc.reloc_type == crate::mach::relocation::GENERIC_RELOC_VANILLA {
                    value = value.wrapping_sub(section.addr);
                }
                for i in 0..len {
                    data[addr + i] = ((value >> (8 * i)) & 0xff) as u8;
                }
            }

            let pos = section.offset as usize;
            grow_to(&mut buf, pos + data.len());
            buf[pos..pos + data.len()].copy_from_slice(&data);
        }

        grow_to(&mut buf, rel_base + rel_padcnt);

        // Relocation entries, per section in creation order, each
        // section's own list in existing order (already
        // address-descending from prepend-on-add).
        let mut pos = rel_base + rel_padcnt;
        for section in &self.sections {
            for reloc in section.relocs.iter() {
                let info = reloc.to_wire();
                grow_to(&mut buf, pos + 8);
                buf.pwrite_with::<RelocationInfo>(info, pos, le)?;
                pos += 8;
            }
        }
        debug_assert_eq!(pos, symoff);

        // Symbol table: locals in original order, then sorted defined
        // externals, then sorted undefined externals.
        let local_indices: Vec<usize> = self
            .symtab
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_external())
            .map(|(i, _)| i)
            .collect();

        let mut pos = symoff;
        for group in [&local_indices, &self.symtab.extdefsyms, &self.symtab.undefsyms] {
            for &i in group.iter() {
                let symbol = &self.symtab.symbols[i];
                let mut value = symbol.value;
                if symbol.sym_type & N_TYPE == N_SECT && symbol.sect != NO_SECT {
                    value = value.wrapping_add(sectstab.get(symbol.sect as usize).copied().unwrap_or(0));
                }
                grow_to(&mut buf, pos + self.format.nlist_size);
                if self.format.is64() {
                    let nlist = Nlist64 { n_strx: symbol.strx, n_type: symbol.sym_type, n_sect: symbol.sect, n_desc: symbol.desc, n_value: value };
                    buf.pwrite_with(nlist, pos, le)?;
                } else {
                    let nlist = Nlist32 { n_strx: symbol.strx, n_type: symbol.sym_type, n_sect: symbol.sect, n_desc: symbol.desc, n_value: value as u32 };
                    buf.pwrite_with(nlist, pos, le)?;
                }
                pos += self.format.nlist_size;
            }
        }
        debug_assert_eq!(pos, stroff);

        grow_to(&mut buf, stroff + strsize as usize);
        buf[stroff..stroff + strsize as usize].copy_from_slice(self.strtab.as_bytes());

        Ok(buf)
    }

    /// `sectstab[0]` is the absolute sentinel (addr 0); `sectstab[fileindex]`
    /// is that section's VM address.
    fn sectstab(&self) -> Vec<u64> {
        let mut table = vec![0u64; self.sections.len() + 1];
        for section in &self.sections {
            table[section.fileindex as usize] = section.addr;
        }
        table
    }
}
