/// One opcode per IPPcode22 instruction (§GLOSSARY, §4.5). Mirrors the
/// teacher's `Opcode` enum shape (`vm/opcode.rs`): plain, `Copy`-able, with a
/// layout sanity test.
#[repr(u8)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Opcode {
    Move,
    Createframe,
    Pushframe,
    Popframe,
    Defvar,
    Call,
    Return,
    Pushs,
    Pops,
    Add,
    Sub,
    Mul,
    Idiv,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Not,
    Int2Char,
    Stri2Int,
    Read,
    Write,
    Concat,
    Strlen,
    Getchar,
    Setchar,
    Type,
    Label,
    Jump,
    Jumpifeq,
    Jumpifneq,
    Exit,
    Dprint,
    Break,
}

impl Opcode {
    /// Case-insensitive opcode-name lookup, as used at XML ingest time.
    pub fn from_name(name: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match name.to_ascii_uppercase().as_str() {
            "MOVE" => Move,
            "CREATEFRAME" => Createframe,
            "PUSHFRAME" => Pushframe,
            "POPFRAME" => Popframe,
            "DEFVAR" => Defvar,
            "CALL" => Call,
            "RETURN" => Return,
            "PUSHS" => Pushs,
            "POPS" => Pops,
            "ADD" => Add,
            "SUB" => Sub,
            "MUL" => Mul,
            "IDIV" => Idiv,
            "LT" => Lt,
            "GT" => Gt,
            "EQ" => Eq,
            "AND" => And,
            "OR" => Or,
            "NOT" => Not,
            "INT2CHAR" => Int2Char,
            "STRI2INT" => Stri2Int,
            "READ" => Read,
            "WRITE" => Write,
            "CONCAT" => Concat,
            "STRLEN" => Strlen,
            "GETCHAR" => Getchar,
            "SETCHAR" => Setchar,
            "TYPE" => Type,
            "LABEL" => Label,
            "JUMP" => Jump,
            "JUMPIFEQ" => Jumpifeq,
            "JUMPIFNEQ" => Jumpifneq,
            "EXIT" => Exit,
            "DPRINT" => Dprint,
            "BREAK" => Break,
            _ => return None,
        })
    }
}

/// The static shape an argument in a given position must have, independent
/// of its runtime value.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ArgKind {
    /// A variable reference (frame@name).
    Var,
    /// Any symbol: a variable reference, or a typed literal.
    Symb,
    Label,
    Type,
}

/// The concrete data type an argument in this position must resolve to,
/// or a marker requiring agreement between positions (§4.4).
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DataTypeSpec {
    Any,
    Int,
    Str,
    Bool,
    /// All positions marked `Eq` within one instruction must resolve to the
    /// same data type, with the `Nil`-handling exceptions of §4.1.
    Eq,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Requirement {
    None,
    Declared,
    Defined,
}

#[derive(Debug, Clone, Copy)]
pub struct PositionSpec {
    pub kind: ArgKind,
    pub data_type: DataTypeSpec,
    pub requirement: Requirement,
}

const fn var(requirement: Requirement) -> PositionSpec {
    PositionSpec { kind: ArgKind::Var, data_type: DataTypeSpec::Any, requirement }
}

const fn var_typed(requirement: Requirement, data_type: DataTypeSpec) -> PositionSpec {
    PositionSpec { kind: ArgKind::Var, data_type, requirement }
}

const fn symb(data_type: DataTypeSpec) -> PositionSpec {
    PositionSpec { kind: ArgKind::Symb, data_type, requirement: Requirement::Defined }
}

const fn symb_declared_ok(data_type: DataTypeSpec) -> PositionSpec {
    // TYPE's second argument: may be declared-but-undefined.
    PositionSpec { kind: ArgKind::Symb, data_type, requirement: Requirement::Declared }
}

const fn label(requirement: Requirement) -> PositionSpec {
    PositionSpec { kind: ArgKind::Label, data_type: DataTypeSpec::Any, requirement }
}

const fn type_tag() -> PositionSpec {
    PositionSpec { kind: ArgKind::Type, data_type: DataTypeSpec::Any, requirement: Requirement::None }
}

/// The per-opcode descriptor: the instruction's fixed arity and the static
/// shape of each argument position (§4.4). Validation (`Instruction::validate`)
/// walks this; the actual opcode *semantics* are dispatched by `VirtualMachine`
/// via a plain match, following the teacher's own `vm/mod.rs` — a table of
/// function pointers here would only re-create that match one layer down.
pub fn descriptor(op: Opcode) -> &'static [PositionSpec] {
    use Opcode::*;
    use DataTypeSpec::*;
    use Requirement::*;

    match op {
        Move => &[var(Declared), symb(Any)],
        Createframe | Pushframe | Popframe | Return | Break => &[],
        Defvar => &[var(None)],
        Call => &[label(Declared)],
        Pushs => &[symb(Any)],
        Pops => &[var(Declared)],
        Add | Sub | Mul | Idiv => &[var(Declared), symb(Int), symb(Int)],
        Lt | Gt => &[var(Declared), symb(Eq), symb(Eq)],
        Eq => &[var(Declared), symb(Eq), symb(Eq)],
        And | Or => &[var(Declared), symb(Bool), symb(Bool)],
        Not => &[var(Declared), symb(Bool)],
        Int2Char => &[var(Declared), symb(Int)],
        Stri2Int => &[var(Declared), symb(Str), symb(Int)],
        Read => &[var(Declared), type_tag()],
        Write => &[symb(Any)],
        Concat => &[var(Declared), symb(Str), symb(Str)],
        Strlen => &[var(Declared), symb(Str)],
        Getchar => &[var(Declared), symb(Str), symb(Int)],
        Setchar => &[var_typed(Defined, Str), symb(Int), symb(Str)],
        Type => &[var(Declared), symb_declared_ok(Any)],
        Label => &[label(None)],
        Jump => &[label(Declared)],
        Jumpifeq | Jumpifneq => &[label(Declared), symb(Eq), symb(Eq)],
        Exit => &[symb(Int)],
        Dprint => &[symb(Any)],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(1, std::mem::size_of::<Opcode>());
    }

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(Opcode::from_name("move"), Some(Opcode::Move));
        assert_eq!(Opcode::from_name("MoVe"), Some(Opcode::Move));
        assert_eq!(Opcode::from_name("nonsense"), None);
    }

    #[test]
    fn test_descriptor_arity() {
        assert_eq!(descriptor(Opcode::Createframe).len(), 0);
        assert_eq!(descriptor(Opcode::Move).len(), 2);
        assert_eq!(descriptor(Opcode::Add).len(), 3);
        assert_eq!(descriptor(Opcode::Jumpifeq).len(), 3);
    }

    #[test]
    fn test_setchar_dst_requires_defined() {
        let spec = descriptor(Opcode::Setchar)[0];
        assert_eq!(spec.requirement, Requirement::Defined);
    }
}
