//! The emitter: the single entry point the assembler calls once per
//! output event to append bytes, reserve space, or record an address
//! reference into the current section.

use crate::error::Diagnostic;
use crate::mach::constants::S_ATTR_SOME_INSTRUCTIONS;
use crate::mach::reloc_classify::NO_SEG;
use crate::mach::relocation::RelKind;
use crate::mach::Context;

/// What kind of output event this call represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    /// Uninitialized space of a given byte count; no payload.
    Reserve,
    /// Verbatim bytes; `ref_section` must be `NO_SEG`.
    RawData,
    /// An absolute address of the given byte width (1/2/4/8).
    Address,
    /// A 2-byte PC-relative displacement.
    Rel2Adr,
    /// A 4-byte PC-relative displacement.
    Rel4Adr,
}

/// `WRT` modifier on an address operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrt {
    None,
    GotPcrel,
    Tlvp,
}

impl Context {
    /// Appends `payload` to `section_idx` according to `kind`,
    /// returning the number of bytes actually written (normally
    /// `payload.len()` for everything but `Reserve`, where it is
    /// `size`), or `None` if the caller should treat this event as a
    /// hard stop (an unsupported reference). For `Reserve`, `size` is
    /// the byte count reserved; for `Rel2Adr`/`Rel4Adr`, it is the
    /// distance from the displacement field to the end of the
    /// instruction, so the written displacement is `operand - size`
    /// before the relocation's own addend is folded in — the operand
    /// itself is not necessarily the last field of the instruction.
    pub fn emit(
        &mut self,
        section_idx: usize,
        mut payload: Vec<u8>,
        kind: EmitKind,
        size: u64,
        ref_section: usize,
        wrt: Wrt,
    ) -> Option<usize> {
        match kind {
            EmitKind::Reserve => {
                debug_assert_eq!(ref_section, NO_SEG, "RESERVE carries no section reference");
                let is_zerofill = self.sections[section_idx].is_zerofill();
                if is_zerofill {
                    self.sections[section_idx].size += size;
                } else {
                    self.diagnose(Diagnostic::warning("uninitialized space reserved in a non-BSS section; zero-filling"));
                    let section = &mut self.sections[section_idx];
                    section.data.resize(section.data.len() + size as usize, 0);
                    section.size = section.data.len() as u64;
                }
                Some(size as usize)
            }
            EmitKind::RawData => {
                debug_assert_eq!(ref_section, NO_SEG, "RAWDATA carries no section reference");
                let is_zerofill = self.sections[section_idx].is_zerofill();
                if is_zerofill {
                    self.diagnose(Diagnostic::warning("initialized data written into a BSS section; ignored"));
                    self.sections[section_idx].size += payload.len() as u64;
                    return Some(payload.len());
                }
                self.append_bytes(section_idx, &payload);
                Some(payload.len())
            }
            EmitKind::Address => {
                let bytes = payload.len() as u8;
                if ref_section == NO_SEG {
                    self.append_bytes(section_idx, &payload);
                    return Some(payload.len());
                }
                if ref_section % 2 == 1 {
                    self.diagnose(Diagnostic::non_fatal("section-base references are not supported"));
                    return None;
                }
                if !matches!(wrt, Wrt::None) {
                    self.diagnose(Diagnostic::non_fatal("WRT is not supported on an absolute address"));
                    return None;
                }
                if self.format.is64() && bytes != 8 {
                    self.diagnose(Diagnostic::non_fatal("32-bit absolute addresses are not supported on a 64-bit target"));
                    return None;
                }
                // Unlike REL2ADR/REL4ADR, the addend returned here is not
                // folded into the payload: the caller already passed the
                // target's in-section offset, and the linker-equivalent
                // write pass adds the section's base address to it.
                let operand = decode_le(&payload);
                self.add_reloc(section_idx, ref_section, RelKind::Abs, bytes, operand)?;
                self.append_bytes(section_idx, &payload);
                Some(payload.len())
            }
            EmitKind::Rel2Adr | EmitKind::Rel4Adr => {
                let bytes = payload.len() as u8;
                if ref_section != NO_SEG && ref_section % 2 == 1 {
                    self.diagnose(Diagnostic::non_fatal("section-base references are not supported"));
                    return None;
                }
                if matches!(kind, EmitKind::Rel2Adr) {
                    if self.format.is64() {
                        self.diagnose(Diagnostic::non_fatal("2-byte PC-relative relocations are not supported on a 64-bit target"));
                        return None;
                    }
                    if !matches!(wrt, Wrt::None) {
                        self.diagnose(Diagnostic::non_fatal("WRT is not supported on a 2-byte PC-relative reference"));
                        return None;
                    }
                }

                let kind = match wrt {
                    Wrt::None => {
                        let mut k = RelKind::Rel;
                        let section = &self.sections[section_idx];
                        if self.format.is64() && section.flags & S_ATTR_SOME_INSTRUCTIONS != 0 {
                            // Mirrors the original's own HACK: with only one
                            // byte written so far, the missing byte before it
                            // reads as 0x00, which still satisfies `b0 !=
                            // 0x0f` for the one-byte call/jmp opcodes.
                            let data = &section.data;
                            let (b0, b1) = if data.len() >= 2 {
                                (data[data.len() - 2], data[data.len() - 1])
                            } else if data.len() == 1 {
                                (0, data[0])
                            } else {
                                (0, 0)
                            };
                            let is_branch = (b0 != 0x0f && (b1 & 0xfe) == 0xe8) || (b0 == 0x0f && (b1 & 0xf0) == 0x80);
                            if is_branch {
                                k = RelKind::Branch;
                            }
                        }
                        k
                    }
                    Wrt::GotPcrel => {
                        if !self.format.is64() {
                            self.diagnose(Diagnostic::non_fatal("..gotpcrel is only valid on a 64-bit target"));
                            return None;
                        }
                        let mut k = RelKind::Got;
                        let section = &self.sections[section_idx];
                        if section.flags & S_ATTR_SOME_INSTRUCTIONS != 0 && section.data.len() >= 3 {
                            let data = &section.data;
                            let rex = data[data.len() - 3];
                            let opcode = data[data.len() - 2];
                            let modrm = data[data.len() - 1];
                            let is_load = (0x48..=0x4f).contains(&rex) && opcode == 0x8b && (modrm & 0o307) == 0o005;
                            if is_load {
                                k = RelKind::GotLoad;
                            }
                        }
                        k
                    }
                    Wrt::Tlvp => RelKind::Tlv,
                };

                let operand = decode_le(&payload);
                let disp = operand.wrapping_sub(size as i64);
                let adjust = self.add_reloc(section_idx, ref_section, kind, bytes, operand)?;
                encode_le(&mut payload, disp.wrapping_add(adjust));
                self.append_bytes(section_idx, &payload);
                Some(payload.len())
            }
        }
    }

    fn append_bytes(&mut self, section_idx: usize, payload: &[u8]) {
        let section = &mut self.sections[section_idx];
        section.data.extend_from_slice(payload);
        section.size = section.data.len() as u64;
    }
}

fn decode_le(payload: &[u8]) -> i64 {
    let mut value = 0i64;
    for (i, &b) in payload.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    value
}

fn encode_le(payload: &mut [u8], value: i64) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b = ((value >> (8 * i)) & 0xff) as u8;
    }
}
