//! The Mach-O `MH_OBJECT` emitter: a single owned `Context` that is
//! mutated by every output event and consumed once by `finalize`.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Diagnostic, Result};
use crate::format::Format;
use crate::mach::constants::{NO_SECT, N_ABS, N_EXT, N_SECT};
use crate::mach::reloc_classify::NO_SEG;
use crate::mach::section::Section;
use crate::mach::symbol::{Symbol, SymbolTable};
use crate::strtab::Strtab;

pub mod constants;
pub mod directive;
pub mod emit;
pub mod header;
pub mod load_command;
pub mod layout;
pub mod reloc_classify;
pub mod relocation;
pub mod section;
pub mod sizing;
pub mod symbol;
pub mod writer;

pub use self::constants::cputype;
pub use self::directive::SectionSpec;
pub use self::emit::{EmitKind, Wrt};
pub use self::reloc_classify::NO_SEG as NO_SECTION;

/// Owns every piece of mutable state this emitter touches: the format
/// descriptor chosen at construction, the section table, the symbol
/// table, the shared string table, and any diagnostics queued along
/// the way. Created once by `Context::new`, mutated by every emitted
/// event, consumed once by `finalize`.
pub struct Context {
    pub format: Format,
    pub sections: Vec<Section>,
    section_names: HashMap<(String, String), usize>,
    id_to_index: HashMap<usize, usize>,
    next_id: usize,
    /// Sentinel section identity for the `..gotpcrel` WRT target
    /// (64-bit only).
    pub gotpcrel_id: usize,
    /// Sentinel section identity for the `..tlvp` WRT target.
    pub tlvp_id: usize,
    pub symtab: SymbolTable,
    pub strtab: Strtab,
    /// Global symbols defined at an absolute address, keyed by value.
    absolute_gsyms: BTreeMap<u64, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Context {
    pub fn new(format: Format) -> Context {
        let mut ctx = Context {
            format,
            sections: Vec::new(),
            section_names: HashMap::new(),
            id_to_index: HashMap::new(),
            next_id: 2,
            gotpcrel_id: 0,
            tlvp_id: 0,
            symtab: SymbolTable::new(),
            strtab: Strtab::new(),
            absolute_gsyms: BTreeMap::new(),
            diagnostics: Vec::new(),
        };
        ctx.gotpcrel_id = ctx.alloc_id();
        ctx.tlvp_id = ctx.alloc_id();
        ctx
    }

    /// Records a diagnostic and echoes it to the `log` facade at the
    /// severity-appropriate level: `Fatal`/`NonFatal` conditions are
    /// accepted-but-degraded or outright rejected input, logged at
    /// `error!`; `Warning`s (an upgraded relocation kind, a defaulted
    /// section) are logged at `warn!`.
    pub(crate) fn diagnose(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            crate::error::Severity::Warning => warn!("{}", diagnostic.message),
            crate::error::Severity::NonFatal | crate::error::Severity::Fatal => error!("{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Allocates a fresh, even-numbered section identity. Mirrors the
    /// assembler's own segment allocator, under which an odd id means
    /// "relative to this section's own base" rather than a real
    /// section reference.
    pub fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 2;
        id
    }

    pub fn section_by_id(&self, id: usize) -> Option<&Section> {
        self.id_to_index.get(&id).map(|&i| &self.sections[i])
    }

    pub fn section_index_by_id(&self, id: usize) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    /// Registers a new label. `section_id` is `NO_SEG` for an absolute
    /// symbol, or a section identity returned by `select_section` or
    /// reserved for an external placeholder via `alloc_id`.
    pub fn define_symbol(&mut self, name: &str, section_id: usize, offset: u64, linkage: u8, special: bool) -> bool {
        if special {
            self.diagnose(Diagnostic::non_fatal("special symbol types are not supported"));
            return false;
        }
        if linkage == 3 {
            self.diagnose(Diagnostic::non_fatal("forward-reference symbol fixups are not supported"));
            return false;
        }
        if let Some(rest) = name.strip_prefix("..") {
            if rest.as_bytes().first() != Some(&b'@') {
                return name == "..gotpcrel" || name == "..tlvp" || {
                    self.diagnose(Diagnostic::non_fatal(format!("unknown assembler-internal symbol `{}`", name)));
                    false
                };
            }
        }

        let nsyms = self.symtab.len() as i64;
        let strx = self.strtab.len() as u32;
        let mut sym_type = 0u8;
        let mut sect = NO_SECT;
        let mut initial_snum = -1i64;
        if linkage != 0 {
            sym_type |= N_EXT;
        }

        if section_id == NO_SEG {
            sym_type |= N_ABS;
            let idx = self.symtab.len();
            self.absolute_gsyms.insert(offset, idx);
        } else if let Some(vec_idx) = self.section_index_by_id(section_id) {
            sym_type |= N_SECT;
            sect = self.sections[vec_idx].fileindex;
            initial_snum = nsyms;
            if linkage != 0 {
                let idx = self.symtab.len();
                self.sections[vec_idx].gsyms.insert(offset, idx);
            }
        } else if linkage != 0 {
            // No section with this identity exists: it's a placeholder
            // the assembler reserved for an external/common symbol.
            // External and common symbols are indistinguishable here —
            // both carry their size in `value` — so both just get
            // `N_EXT` with no `N_SECT` bit.
            initial_snum = nsyms;
            self.symtab.external_map.insert(section_id, nsyms);
            sym_type = N_EXT;
        } else {
            // A local symbol referencing a section identity that was
            // never allocated is a caller-invariant violation: the
            // assembler is expected to `seg_alloc` a fresh identity for
            // every external/common symbol before defining it.
            self.diagnose(Diagnostic::fatal(format!(
                "in-file index for section {} not found for local symbol `{}`",
                section_id, name
            )));
            return false;
        }

        let symbol = Symbol { name: name.to_string(), strx, sym_type, sect, desc: 0, value: offset, initial_snum, snum: 0 };
        self.symtab.symbols.push(symbol);
        true
    }

    /// Runs layout, the relocation `snum` fixup, sizing, and the
    /// write pass, in that order, and returns the finished object
    /// file bytes. Every buffer this `Context` owns is released when
    /// it is dropped.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.layout_symbols();
        let sizes = self.size_sections();
        self.write(&sizes)
    }
}
