use crate::error::{IngestError, RuntimeError, RuntimeErrorKind};
use crate::opcode::Opcode;
use crate::symtab::SymbolTable;
use crate::value::{decode_escapes, Value};

/// A variable reference, split into its frame sigil and bare name at
/// construction time (§4.3's "Resolution of a var reference": split on the
/// first `@`). Two `VarRef`s are equal iff both components are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub frame: Frame,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    Global,
    Local,
    Temporary,
}

impl VarRef {
    pub fn parse(raw: &str) -> Option<VarRef> {
        let (sigil, name) = raw.split_once('@')?;
        let frame = match sigil {
            "GF" => Frame::Global,
            "LF" => Frame::Local,
            "TF" => Frame::Temporary,
            _ => return None,
        };
        Some(VarRef { frame, name: name.to_string() })
    }
}

/// The literal payload of a non-variable argument, already validated and
/// decoded at construction time (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum ArgData {
    Var(VarRef),
    Literal(Value),
    Label(String),
    /// A `type` argument (used by `READ`'s second operand): the requested
    /// target data type name, e.g. `"int"`, `"string"`, `"bool"`.
    Type(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub position: u8,
    pub data: ArgData,
}

impl Argument {
    /// Builds an argument from its XML `type` attribute and text payload.
    /// Validates literal shape and decodes string escapes, per §4.2/§4.1.
    /// `order` is only used to attribute a diagnostic if construction fails.
    pub fn new(order: u32, position: u8, xml_type: &str, text: &str) -> Result<Argument, IngestError> {
        let data = match xml_type {
            "var" => {
                let var_ref = VarRef::parse(text).ok_or_else(|| IngestError::InvalidLiteral {
                    order,
                    position,
                    reason: format!("'{text}' is not a valid frame@name variable reference"),
                })?;
                ArgData::Var(var_ref)
            }
            "int" => {
                let parsed = parse_int_literal(text).ok_or_else(|| IngestError::InvalidLiteral {
                    order,
                    position,
                    reason: format!("'{text}' is not a valid integer literal"),
                })?;
                ArgData::Literal(Value::Int(parsed))
            }
            "string" => ArgData::Literal(Value::Str(decode_escapes(text))),
            "bool" => {
                let parsed = match text {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(IngestError::InvalidLiteral {
                            order,
                            position,
                            reason: format!("'{text}' is not a valid bool literal"),
                        })
                    }
                };
                ArgData::Literal(Value::Bool(parsed))
            }
            "nil" => {
                if text != "nil" {
                    return Err(IngestError::InvalidLiteral {
                        order,
                        position,
                        reason: "nil literal must have text 'nil'".to_string(),
                    });
                }
                ArgData::Literal(Value::Nil)
            }
            "label" => ArgData::Label(text.to_string()),
            "type" => ArgData::Type(text.to_string()),
            other => {
                return Err(IngestError::InvalidLiteral {
                    order,
                    position,
                    reason: format!("unknown argument type '{other}'"),
                })
            }
        };
        Ok(Argument { position, data })
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match &self.data {
            ArgData::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match &self.data {
            ArgData::Label(l) => Some(l),
            _ => None,
        }
    }

    /// Resolves this argument's data type: for a variable, the type
    /// currently in its Cell (or `""` if declared-but-undefined); for a
    /// literal, the literal's own tag (§4.2).
    pub fn symb_type(&self, symtab: &SymbolTable, order: u32, opcode: Opcode) -> Result<String, RuntimeError> {
        match &self.data {
            ArgData::Var(v) => {
                let cell = symtab.get(v).map_err(|kind| RuntimeError { kind, order, opcode })?;
                Ok(match &cell.value {
                    Some((_, value)) => value.type_name().to_string(),
                    None => String::new(),
                })
            }
            ArgData::Literal(value) => Ok(value.type_name().to_string()),
            ArgData::Label(_) => Ok("label".to_string()),
            ArgData::Type(_) => Ok("type".to_string()),
        }
    }

    /// Resolves this argument's underlying value, for use in computation.
    pub fn symb_val(&self, symtab: &SymbolTable, order: u32, opcode: Opcode) -> Result<Value, RuntimeError> {
        match &self.data {
            ArgData::Var(v) => {
                let cell = symtab.get(v).map_err(|kind| RuntimeError { kind, order, opcode })?;
                match &cell.value {
                    Some((_, value)) => Ok(value.clone()),
                    None => Err(RuntimeError {
                        kind: RuntimeErrorKind::UndefinedVariable(v.name.clone()),
                        order,
                        opcode,
                    }),
                }
            }
            ArgData::Literal(value) => Ok(value.clone()),
            ArgData::Label(name) => Ok(Value::Str(name.clone())),
            ArgData::Type(name) => Ok(Value::Str(name.clone())),
        }
    }
}

fn parse_int_literal(text: &str) -> Option<i64> {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(d) => (-1i64, d),
        None => (1i64, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok().map(|v| v * sign)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_varref_parse() {
        let v = VarRef::parse("GF@counter").unwrap();
        assert_eq!(v.frame, Frame::Global);
        assert_eq!(v.name, "counter");
        assert!(VarRef::parse("counter").is_none());
        assert!(VarRef::parse("XX@counter").is_none());
    }

    #[test]
    fn test_int_literal_parsing() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("+42"), Some(42));
        assert_eq!(parse_int_literal("-42"), Some(-42));
        assert_eq!(parse_int_literal("abc"), None);
        assert_eq!(parse_int_literal(""), None);
        assert_eq!(parse_int_literal("-"), None);
        assert_eq!(parse_int_literal("+-5"), None);
        assert_eq!(parse_int_literal("-+5"), None);
        assert_eq!(parse_int_literal("--5"), None);
    }

    #[test]
    fn test_argument_decodes_string_escapes() {
        let a = Argument::new(1, 1, "string", "a\\032b").unwrap();
        assert_eq!(a.data, ArgData::Literal(Value::Str("a b".to_string())));
    }

    #[test]
    fn test_argument_rejects_bad_bool_literal() {
        assert!(Argument::new(1, 1, "bool", "yes").is_err());
    }
}
