//! The layout pass: partitions symbols into the three groups the
//! dynamic linker requires (local, defined-external, undefined-
//! external), sorts the two external groups by name, assigns final
//! symbol numbers, and lays out the string table externals-first.

use std::collections::HashMap;

use crate::mach::constants::N_EXT;
use crate::mach::Context;

impl Context {
    /// Runs the two-scan layout pass, then patches every relocation's
    /// `snum` from `initial_snum` to its final value.
    pub fn layout_symbols(&mut self) {
        let mut nlocalsym = 0u32;

        // A symbol with type 0 (no N_EXT, no N_TYPE bits — never
        // assigned any) is promoted to external-undefined before
        // classification.
        for symbol in &mut self.symtab.symbols {
            if symbol.sym_type == 0 {
                symbol.sym_type |= N_EXT;
            }
        }

        // Scan 1: classify, count, assign local snums immediately.
        for symbol in &mut self.symtab.symbols {
            if symbol.is_external() {
                if symbol.is_defined() {
                    self.symtab.nextdefsym += 1;
                } else {
                    self.symtab.nundefsym += 1;
                }
            } else {
                symbol.snum = nlocalsym;
                nlocalsym += 1;
            }
        }
        self.symtab.nlocalsym = nlocalsym;
        self.symtab.ilocalsym = 0;
        self.symtab.iextdefsym = self.symtab.nlocalsym;
        self.symtab.iundefsym = self.symtab.nlocalsym + self.symtab.nextdefsym;

        // Scan 2: append external names to the string table first,
        // then local names; collect and sort the two external arrays.
        let mut extdefsyms = Vec::new();
        let mut undefsyms = Vec::new();
        for (i, symbol) in self.symtab.symbols.iter_mut().enumerate() {
            if symbol.is_external() {
                symbol.strx = self.strtab.add(&symbol.name);
                if symbol.is_defined() {
                    extdefsyms.push(i);
                } else {
                    undefsyms.push(i);
                }
            }
        }
        for symbol in &mut self.symtab.symbols {
            if !symbol.is_external() {
                symbol.strx = self.strtab.add(&symbol.name);
            }
        }

        extdefsyms.sort_by(|&a, &b| self.symtab.symbols[a].name.cmp(&self.symtab.symbols[b].name));
        undefsyms.sort_by(|&a, &b| self.symtab.symbols[a].name.cmp(&self.symtab.symbols[b].name));

        for (i, &sym_idx) in extdefsyms.iter().enumerate() {
            self.symtab.symbols[sym_idx].snum = self.symtab.iextdefsym + i as u32;
        }
        for (i, &sym_idx) in undefsyms.iter().enumerate() {
            self.symtab.symbols[sym_idx].snum = self.symtab.iundefsym + i as u32;
        }

        self.symtab.extdefsyms = extdefsyms;
        self.symtab.undefsyms = undefsyms;

        // Patch every external relocation's snum from initial_snum to
        // its symbol's final snum.
        let initial_to_final: HashMap<i64, u32> = self
            .symtab
            .symbols
            .iter()
            .filter(|s| s.initial_snum >= 0)
            .map(|s| (s.initial_snum, s.snum))
            .collect();

        for section in &mut self.sections {
            for reloc in section.relocs.iter_mut() {
                if reloc.ext {
                    if let Some(&final_snum) = initial_to_final.get(&(reloc.snum as i64)) {
                        reloc.snum = final_snum;
                    }
                }
            }
        }
    }
}
