//! A library implementing the execution engine for IPPcode22, a three-address
//! intermediate representation encoded as XML. See `ippcode22-cli` for the
//! command-line front end.

pub mod argument;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod symtab;
pub mod trace;
pub mod value;
pub mod vm;
pub mod xml;

use std::collections::HashMap;

/// Label name → index into the sorted instruction vector. Built once at
/// startup (§3).
pub type LabelMap = HashMap<String, usize>;
