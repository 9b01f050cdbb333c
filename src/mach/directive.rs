//! The `.section` directive: resolves a section spec string to a
//! section identity, creating the section on first use.

use crate::error::Diagnostic;
use crate::mach::constants::{
    S_ATTR_PURE_INSTRUCTIONS, S_ATTR_SOME_INSTRUCTIONS, S_REGULAR, S_ZEROFILL,
};
use crate::mach::section::Section;
use crate::mach::Context;

/// A section directive broken into its name and `key[=value]`
/// attributes, already lowercase-normalized by the caller's lexer.
pub struct SectionSpec<'a> {
    pub name: &'a str,
    pub attrs: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attr {
    Data,
    Code,
    Mixed,
    Bss,
}

fn known_alias(name: &str) -> Option<(&'static str, &'static str, u32)> {
    match name {
        ".text" => Some(("__TEXT", "__text", S_REGULAR | S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS)),
        ".data" => Some(("__DATA", "__data", S_REGULAR)),
        ".rodata" => Some(("__DATA", "__const", S_REGULAR)),
        ".bss" => Some(("__DATA", "__bss", S_ZEROFILL)),
        _ => None,
    }
}

fn default_flags_for(sectname: &str) -> u32 {
    match sectname {
        "__text" => S_REGULAR | S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS,
        "__bss" => S_ZEROFILL,
        _ => S_REGULAR,
    }
}

fn parse_attr(token: &str) -> Option<(Attr, Option<u32>)> {
    if let Some(value) = token.strip_prefix("align=") {
        let n = if let Some(hex) = value.strip_prefix("0x") {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            value.parse::<u32>().ok()?
        };
        if n == 0 || !n.is_power_of_two() {
            return None;
        }
        return Some((Attr::Data, Some(n)));
    }
    match token {
        "data" => Some((Attr::Data, None)),
        "code" | "text" => Some((Attr::Code, None)),
        "mixed" => Some((Attr::Mixed, None)),
        "bss" => Some((Attr::Bss, None)),
        _ => None,
    }
}

impl Context {
    /// Resolves `spec` to a section identity, creating the section if
    /// this is the first reference to it.
    pub fn select_section(&mut self, spec: SectionSpec) -> Option<usize> {
        let (segname, sectname, by_name, default_flags) = if spec.name.is_empty() {
            self.diagnose(Diagnostic::warning("no section specified; defaulting to `.text`"));
            let (seg, sect, flags) = known_alias(".text").expect(".text is always a known alias");
            (seg.to_string(), sect.to_string(), false, flags)
        } else if let Some((seg, sect, flags)) = known_alias(spec.name) {
            (seg.to_string(), sect.to_string(), false, flags)
        } else if let Some((seg, sect)) = spec.name.split_once(',') {
            if seg.is_empty() || sect.is_empty() || seg.len() > 15 || sect.len() > 15 {
                self.diagnose(Diagnostic::non_fatal("section or segment name too long or empty"));
                return None;
            }
            (seg.to_string(), sect.to_string(), true, default_flags_for(sect))
        } else {
            self.diagnose(Diagnostic::non_fatal(format!("unknown section alias `{}`", spec.name)));
            return None;
        };

        let mut align_override: Option<u32> = None;
        let mut explicit_type: Option<u32> = None;
        for &token in spec.attrs {
            match parse_attr(token) {
                Some((Attr::Data, Some(n))) => align_override = Some(align_override.map_or(n, |cur| cur.max(n))),
                Some((Attr::Data, None)) => explicit_type = Some(S_REGULAR),
                Some((Attr::Code, None)) => {
                    explicit_type = Some(S_REGULAR | S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS)
                }
                Some((Attr::Mixed, None)) => explicit_type = Some(S_REGULAR | S_ATTR_SOME_INSTRUCTIONS),
                Some((Attr::Bss, None)) => explicit_type = Some(S_ZEROFILL),
                _ => {
                    self.diagnose(Diagnostic::non_fatal(format!("unknown section attribute `{}`", token)));
                    return None;
                }
            }
        }
        let flags = explicit_type.unwrap_or(default_flags);

        if let Some(&idx) = self.section_names.get(&(segname.clone(), sectname.clone())) {
            let section = &mut self.sections[idx];
            if section.by_name != by_name && by_name {
                section.by_name = true;
            }
            let existing_type = section.flags & crate::mach::constants::SECTION_TYPE;
            let new_type = flags & crate::mach::constants::SECTION_TYPE;
            if explicit_type.is_some() && existing_type != new_type {
                self.diagnose(Diagnostic::non_fatal(format!(
                    "section `{},{}` reopened with inconsistent attributes",
                    segname, sectname
                )));
                return None;
            }
            if let Some(n) = align_override {
                let log2 = n.trailing_zeros() as i32;
                if log2 > section.align {
                    section.align = log2;
                }
            }
            return Some(section.index);
        }

        if self.sections.len() >= crate::mach::constants::MAX_SECT {
            self.diagnose(Diagnostic::fatal(format!(
                "more than {} sections",
                crate::mach::constants::MAX_SECT
            )));
            return None;
        }

        let id = self.alloc_id();
        let fileindex = (self.sections.len() + 1) as u8;
        let mut section = Section::new(segname.clone(), sectname.clone(), id, fileindex);
        section.flags = flags;
        section.by_name = by_name;
        if let Some(n) = align_override {
            section.align = n.trailing_zeros() as i32;
        }
        let vec_idx = self.sections.len();
        self.sections.push(section);
        self.section_names.insert((segname, sectname), vec_idx);
        self.id_to_index.insert(id, vec_idx);
        Some(id)
    }
}
