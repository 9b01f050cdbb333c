//! A Mach-O (`MH_OBJECT`) relocatable object file emitter for x86/x86-64
//! assemblers.
//!
//! This crate is the backend an assembler's code generator drives: it
//! owns the in-memory model of sections, symbols and pending
//! relocations, classifies address references into the right Mach-O
//! relocation kind, lays out the symbol and string tables in the order
//! the dynamic linker requires, and writes a byte-identical-to-`ld`
//! object file. It does not lex, parse, or choose an output format —
//! callers drive a [`mach::Context`] directly.

#[macro_use]
extern crate log;

pub mod error;
pub mod format;
pub mod mach;
pub mod strtab;

pub use error::{Diagnostic, Error, Result, Severity};
pub use format::Format;
pub use mach::Context;
