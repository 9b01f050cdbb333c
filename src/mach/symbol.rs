//! In-memory symbols, the on-wire `nlist` entry, and the symbol table
//! that owns them.

use std::collections::BTreeMap;

use scroll::{Pread, Pwrite, SizeWith};

use crate::mach::constants::{N_EXT, N_TYPE, N_UNDF};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct Nlist32 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u32,
}

pub const SIZEOF_NLIST_32: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct Nlist64 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

pub const SIZEOF_NLIST_64: usize = 16;

/// A symbol defined (or referenced, for externs) by the assembler.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Offset into the string table; only meaningful for externally
    /// linked symbols until the layout pass also assigns one to
    /// locals.
    pub strx: u32,
    /// nlist type byte: `N_EXT`, and the `N_TYPE` subfield.
    pub sym_type: u8,
    /// File-index of the defining section, or `NO_SECT` for
    /// absolute/undefined symbols.
    pub sect: u8,
    pub desc: u16,
    /// The symbol's value: the in-section offset at definition time,
    /// later rewritten by the writer to `offset + section.addr`.
    pub value: u64,
    /// Pre-sort ordinal, `-1` for absolute symbols (which are never
    /// referenced by `initial_snum` since relocations cannot target
    /// them directly).
    pub initial_snum: i64,
    /// Post-sort index, written on the wire. Populated by the layout
    /// pass.
    pub snum: u32,
}

impl Symbol {
    pub fn is_external(&self) -> bool {
        self.sym_type & N_EXT != 0
    }

    pub fn is_defined(&self) -> bool {
        (self.sym_type & N_TYPE) != N_UNDF
    }
}

/// Owns every symbol plus the sparse map from an external symbol's
/// placeholder section-identity to its pre-sort ordinal.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
    /// section-identity (reserved for an extern, never an actual
    /// section) → `initial_snum`.
    pub external_map: BTreeMap<usize, i64>,
    pub nlocalsym: u32,
    pub nextdefsym: u32,
    pub nundefsym: u32,
    pub ilocalsym: u32,
    pub iextdefsym: u32,
    pub iundefsym: u32,
    /// Indices into `symbols`, sorted by name, populated by the layout
    /// pass.
    pub extdefsyms: Vec<usize>,
    pub undefsyms: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
