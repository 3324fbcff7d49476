use std::fmt;

use crate::opcode::Opcode;

/// Errors raised by the XML ingest boundary (§6). These have no "current
/// instruction" to blame, unlike `RuntimeError` below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    NotWellFormed(String),
    MissingRootTag,
    WrongLanguage,
    DisallowedTag(String),
    MissingAttribute { tag: &'static str, attr: &'static str },
    NonPositiveOrder(String),
    NonNumericOrder(String),
    DuplicateOrder(u32),
    UnknownOpcode(String),
    MalformedArgumentShape(u32),
    MissingArgType(u32, u8),
    InvalidLiteral { order: u32, position: u8, reason: String },
}

impl IngestError {
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::NotWellFormed(_) => 31,
            _ => 32,
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::NotWellFormed(msg) => write!(f, "input is not well-formed XML: {msg}"),
            IngestError::MissingRootTag => write!(f, "missing or incorrect root element, expected <program>"),
            IngestError::WrongLanguage => write!(f, "missing or incorrect language attribute, expected IPPcode22"),
            IngestError::DisallowedTag(tag) => write!(f, "disallowed tag in program: <{tag}>"),
            IngestError::MissingAttribute { tag, attr } => write!(f, "<{tag}> is missing required attribute '{attr}'"),
            IngestError::NonPositiveOrder(order) => write!(f, "instruction order '{order}' is not a positive integer"),
            IngestError::NonNumericOrder(order) => write!(f, "instruction order '{order}' is not numeric"),
            IngestError::DuplicateOrder(order) => write!(f, "duplicate instruction order: {order}"),
            IngestError::UnknownOpcode(op) => write!(f, "unknown opcode: {op}"),
            IngestError::MalformedArgumentShape(order) => write!(f, "instruction #{order} has a malformed argument shape"),
            IngestError::MissingArgType(order, pos) => write!(f, "instruction #{order} argument {pos} is missing its 'type' attribute"),
            IngestError::InvalidLiteral { order, position, reason } => write!(f, "instruction #{order} argument {position}: {reason}"),
        }
    }
}

/// A blamed runtime failure: which instruction was executing, and why it
/// failed. Fail-fast per §7 — the first violation terminates the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub order: u32,
    pub opcode: Opcode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    UndefinedLabel(String),
    DuplicateLabel(String),
    VariableRedeclared(String),
    WrongArgumentCount { expected: usize, actual: usize },
    WrongArgumentKind,
    WrongDataType { expected: &'static str, actual: String },
    IncompatibleOperands,
    UndeclaredVariable(String),
    NoSuchFrame,
    UndefinedVariable(String),
    EmptyDataStack,
    EmptyReturnStack,
    DivisionByZero,
    ExitCodeOutOfRange(i64),
    StringIndexOutOfRange,
}

impl RuntimeError {
    pub fn exit_code(&self) -> u8 {
        use RuntimeErrorKind::*;
        match &self.kind {
            UndefinedLabel(_) | DuplicateLabel(_) | VariableRedeclared(_) => 52,
            WrongArgumentCount { .. } | WrongArgumentKind | WrongDataType { .. } | IncompatibleOperands => 53,
            UndeclaredVariable(_) => 54,
            NoSuchFrame => 55,
            UndefinedVariable(_) | EmptyDataStack | EmptyReturnStack => 56,
            DivisionByZero | ExitCodeOutOfRange(_) => 57,
            StringIndexOutOfRange => 58,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error at instruction #{} ({:?}): {}", self.order, self.opcode, self.kind.describe())
    }
}

impl RuntimeErrorKind {
    fn describe(&self) -> String {
        use RuntimeErrorKind::*;
        match self {
            UndefinedLabel(name) => format!("reference to undefined label '{name}'"),
            DuplicateLabel(name) => format!("label '{name}' declared more than once"),
            VariableRedeclared(name) => format!("variable '{name}' redeclared in the same frame"),
            WrongArgumentCount { expected, actual } => format!("expected {expected} argument(s), got {actual}"),
            WrongArgumentKind => "argument kind does not match the opcode's descriptor".to_string(),
            WrongDataType { expected, actual } => format!("expected data type '{expected}', got '{actual}'"),
            IncompatibleOperands => "operand data types are incompatible for this opcode".to_string(),
            UndeclaredVariable(name) => format!("access to undeclared variable '{name}'"),
            NoSuchFrame => "access to a non-existent frame".to_string(),
            UndefinedVariable(name) => format!("read of undefined variable '{name}'"),
            EmptyDataStack => "pop from an empty data stack".to_string(),
            EmptyReturnStack => "RETURN with an empty return stack".to_string(),
            DivisionByZero => "division by zero".to_string(),
            ExitCodeOutOfRange(n) => format!("EXIT code {n} is out of range [0, 49]"),
            StringIndexOutOfRange => "string index out of range".to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let e = RuntimeError { kind: RuntimeErrorKind::DivisionByZero, order: 3, opcode: Opcode::Idiv };
        assert_eq!(e.exit_code(), 57);
        assert!(format!("{e}").contains("#3"));
    }

    #[test]
    fn test_ingest_error_codes() {
        assert_eq!(IngestError::NotWellFormed("x".into()).exit_code(), 31);
        assert_eq!(IngestError::MissingRootTag.exit_code(), 32);
    }
}
