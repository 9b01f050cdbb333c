//! The relocation classifier: given a target section's identity and
//! the already-decided `RelKind`, record a `Relocation` and report the
//! addend adjustment the caller must fold into the immediate value it
//! writes to the section payload.

use crate::error::Diagnostic;
use crate::mach::constants::R_ABS;
use crate::mach::relocation::{
    bytes_to_length, RelKind, Relocation, X86_64_RELOC_BRANCH, GENERIC_RELOC_VANILLA,
};
use crate::mach::Context;

/// Sentinel `ref_section` meaning "no section" (a pure immediate or an
/// absolute symbol).
pub const NO_SEG: usize = usize::MAX;

impl Context {
    /// Classifies and records one pending relocation against the
    /// section currently identified by `section_idx` (an index into
    /// `self.sections`). `offset` is the operand's offset *within the
    /// section `ref_section` names* — distinct from `addr` below,
    /// which is this relocation's own write position — and is
    /// consulted only by the GOT/GOTLOAD/TLV branch, to find the
    /// global symbol the operand actually refers to. Returns the
    /// addend the caller folds into the immediate it writes, or
    /// `None` if the reference could not be classified (the caller
    /// should treat this as a bail: no bytes are written and an error
    /// has already been queued).
    pub fn add_reloc(
        &mut self,
        section_idx: usize,
        ref_section: usize,
        kind: RelKind,
        bytes: u8,
        offset: i64,
    ) -> Option<i64> {
        let size = self.sections[section_idx].size;
        let addr = size as u32;
        let length = bytes_to_length(bytes);
        let mut ext = true;
        let mut snum: u32 = 0;
        let mut reloc_type = match kind {
            RelKind::Abs => self.format.reloc_abs,
            RelKind::Rel | RelKind::Branch => self.format.reloc_rel,
            RelKind::Tlv => self.format.reloc_tlv,
            RelKind::Sub => crate::mach::relocation::X86_64_RELOC_SUBTRACTOR,
            RelKind::Got => crate::mach::relocation::X86_64_RELOC_GOT,
            RelKind::GotLoad => crate::mach::relocation::X86_64_RELOC_GOT_LOAD,
        };
        let mut pcrel = matches!(kind, RelKind::Rel | RelKind::Branch | RelKind::Tlv | RelKind::Got | RelKind::GotLoad);

        let adjust: i64 = match kind {
            RelKind::Abs => {
                if ref_section == NO_SEG {
                    ext = false;
                    snum = R_ABS;
                    bytes as i64
                } else if let Some(target) = self.section_by_id(ref_section) {
                    ext = false;
                    snum = target.fileindex as u32;
                    -(self.sections[section_idx].size as i64)
                } else if let Some(&initial_snum) = self.symtab.external_map.get(&ref_section) {
                    snum = initial_snum as u32;
                    bytes as i64
                } else {
                    self.diagnose(Diagnostic::non_fatal(
                        "absolute relocation against an unknown section or symbol",
                    ));
                    return None;
                }
            }
            RelKind::Rel | RelKind::Branch => {
                if ref_section == NO_SEG {
                    self.diagnostics
                        .push(Diagnostic::non_fatal("relative reference to an absolute address is not supported"));
                    return None;
                } else if let Some(target) = self.section_by_id(ref_section) {
                    ext = false;
                    snum = target.fileindex as u32;
                    -(self.sections[section_idx].size as i64)
                } else if let Some(&initial_snum) = self.symtab.external_map.get(&ref_section) {
                    snum = initial_snum as u32;
                    if kind == RelKind::Branch {
                        reloc_type = X86_64_RELOC_BRANCH;
                    }
                    if self.format.reloc_rel == GENERIC_RELOC_VANILLA {
                        -(self.sections[section_idx].size as i64)
                    } else {
                        bytes as i64
                    }
                } else {
                    self.diagnose(Diagnostic::non_fatal("relative reference to an unknown symbol"));
                    return None;
                }
            }
            RelKind::Got | RelKind::GotLoad | RelKind::Tlv => {
                pcrel = true;
                if ref_section == NO_SEG {
                    self.diagnose(Diagnostic::non_fatal("GOT/TLV reference requires a symbol, not a section"));
                    return None;
                } else if let Some(&initial_snum) = self.symtab.external_map.get(&ref_section) {
                    snum = initial_snum as u32;
                    bytes as i64
                } else if let Some(target) = self.section_by_id(ref_section) {
                    let exact = !matches!(kind, RelKind::Tlv);
                    let found = if exact {
                        target.gsyms.get(&(offset as u64)).copied()
                    } else {
                        target.gsym_at_or_before(offset as u64)
                    };
                    match found {
                        Some(sym_idx) => {
                            snum = self.symtab.symbols[sym_idx].initial_snum as u32;
                            bytes as i64
                        }
                        None => {
                            self.diagnose(Diagnostic::non_fatal(
                                "GOT/GOTLOAD/TLV reference has no enclosing global symbol",
                            ));
                            return None;
                        }
                    }
                } else {
                    self.diagnose(Diagnostic::non_fatal("GOT/TLV reference to an unknown section or symbol"));
                    return None;
                }
            }
            RelKind::Sub => {
                debug_assert!(self.format.maxreltype >= RelKind::Sub.ordinal(), "RL_SUB requires a 64-bit target");
                if ref_section == NO_SEG {
                    self.diagnose(Diagnostic::non_fatal("SUBTRACTOR reference to an absolute address is not supported"));
                    return None;
                } else if let Some(&initial_snum) = self.symtab.external_map.get(&ref_section) {
                    snum = initial_snum as u32;
                    bytes as i64
                } else if let Some(target) = self.section_by_id(ref_section) {
                    ext = false;
                    snum = target.fileindex as u32;
                    -(self.sections[section_idx].size as i64)
                } else {
                    self.diagnose(Diagnostic::non_fatal("SUBTRACTOR reference to an unknown section or symbol"));
                    return None;
                }
            }
        };

        let reloc = Relocation { addr, snum, pcrel, length, ext, reloc_type };
        let section = &mut self.sections[section_idx];
        if ext {
            section.extreloc = true;
        }
        section.relocs.push_front(reloc);
        Some(adjust)
    }
}
