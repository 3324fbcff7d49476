use crate::argument::{ArgData, Argument};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::opcode::{descriptor, ArgKind, DataTypeSpec, Opcode, Requirement};
use crate::symtab::SymbolTable;
use crate::LabelMap;

/// An opcode plus its ordered arguments (§3). `order` is the instruction's
/// position in program text — globally unique, `>= 1` — checked at ingest.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub order: u32,
    pub opcode: Opcode,
    pub args: Vec<Argument>,
}

impl Instruction {
    /// Runs the five-step dispatch validation protocol of §4.4, in order,
    /// before the opcode's handler is allowed to run. The first violation
    /// wins (fail-fast, §7).
    pub fn validate(&self, symtab: &SymbolTable, labels: &LabelMap) -> Result<(), RuntimeError> {
        let desc = descriptor(self.opcode);

        // 1. Arity.
        if desc.len() != self.args.len() {
            return Err(self.error(RuntimeErrorKind::WrongArgumentCount {
                expected: desc.len(),
                actual: self.args.len(),
            }));
        }

        // 2. Requirement: label-map membership, or declared/defined state.
        for (spec, arg) in desc.iter().zip(&self.args) {
            if spec.requirement == Requirement::None {
                continue;
            }
            match &arg.data {
                ArgData::Label(name) => {
                    if !labels.contains_key(name) {
                        return Err(self.error(RuntimeErrorKind::UndefinedLabel(name.clone())));
                    }
                }
                ArgData::Var(var) => {
                    let declared = symtab.is_declared(var).map_err(|k| self.error(k))?;
                    if !declared {
                        return Err(self.error(RuntimeErrorKind::UndeclaredVariable(var.name.clone())));
                    }
                    if spec.requirement == Requirement::Defined {
                        let defined = symtab.is_defined(var).map_err(|k| self.error(k))?;
                        if !defined {
                            return Err(self.error(RuntimeErrorKind::UndefinedVariable(var.name.clone())));
                        }
                    }
                }
                _ => {}
            }
        }

        // 3. Kind check: the argument's static kind matches the descriptor.
        for (spec, arg) in desc.iter().zip(&self.args) {
            let matches = match (spec.kind, &arg.data) {
                (ArgKind::Var, ArgData::Var(_)) => true,
                (ArgKind::Symb, ArgData::Var(_)) | (ArgKind::Symb, ArgData::Literal(_)) => true,
                (ArgKind::Label, ArgData::Label(_)) => true,
                (ArgKind::Type, ArgData::Type(_)) => true,
                _ => false,
            };
            if !matches {
                return Err(self.error(RuntimeErrorKind::WrongArgumentKind));
            }
        }

        // 4. Data-type check for concrete (non-`any`, non-`eq`) positions.
        for (spec, arg) in desc.iter().zip(&self.args) {
            let expected = match spec.data_type {
                DataTypeSpec::Int => Some("int"),
                DataTypeSpec::Str => Some("string"),
                DataTypeSpec::Bool => Some("bool"),
                DataTypeSpec::Any | DataTypeSpec::Eq => None,
            };
            if let Some(expected) = expected {
                let actual = arg.symb_type(symtab, self.order, self.opcode)?;
                if actual != expected {
                    return Err(self.error(RuntimeErrorKind::WrongDataType { expected, actual }));
                }
            }
        }

        // 5. Equal-type check among `eq`-marked positions.
        let eq_positions: Vec<&Argument> = desc
            .iter()
            .zip(&self.args)
            .filter(|(spec, _)| spec.data_type == DataTypeSpec::Eq)
            .map(|(_, arg)| arg)
            .collect();
        if !eq_positions.is_empty() {
            let types: Result<Vec<String>, RuntimeError> =
                eq_positions.iter().map(|a| a.symb_type(symtab, self.order, self.opcode)).collect();
            let types = types?;
            let forbids_nil = matches!(self.opcode, Opcode::Lt | Opcode::Gt);
            let permits_mixed_nil = matches!(self.opcode, Opcode::Eq | Opcode::Jumpifeq | Opcode::Jumpifneq);

            let any_nil = types.iter().any(|t| t == "nil");
            if forbids_nil && any_nil {
                return Err(self.error(RuntimeErrorKind::IncompatibleOperands));
            }
            if !(permits_mixed_nil && any_nil) {
                let first = &types[0];
                if types.iter().any(|t| t != first) {
                    return Err(self.error(RuntimeErrorKind::IncompatibleOperands));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        RuntimeError { kind, order: self.order, opcode: self.opcode }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::argument::{Frame as FrameSigil, VarRef};
    use crate::value::Value;
    use std::collections::HashMap;

    fn var_arg(position: u8, frame: FrameSigil, name: &str) -> Argument {
        Argument { position, data: ArgData::Var(VarRef { frame, name: name.to_string() }) }
    }

    fn int_arg(position: u8, v: i64) -> Argument {
        Argument { position, data: ArgData::Literal(Value::Int(v)) }
    }

    #[test]
    fn test_add_with_declared_dst_and_int_literals_validates() {
        let mut symtab = SymbolTable::new();
        let dst = VarRef { frame: FrameSigil::Global, name: "a".to_string() };
        symtab.declare(&dst).unwrap();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Add,
            args: vec![var_arg(1, FrameSigil::Global, "a"), int_arg(2, 2), int_arg(3, 3)],
        };
        assert!(instr.validate(&symtab, &labels).is_ok());
    }

    #[test]
    fn test_add_with_undeclared_dst_fails_54() {
        let symtab = SymbolTable::new();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Add,
            args: vec![var_arg(1, FrameSigil::Global, "a"), int_arg(2, 2), int_arg(3, 3)],
        };
        let err = instr.validate(&symtab, &labels).unwrap_err();
        assert_eq!(err.exit_code(), 54);
    }

    #[test]
    fn test_wrong_arity_fails_53() {
        let symtab = SymbolTable::new();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction { order: 1, opcode: Opcode::Add, args: vec![int_arg(1, 1)] };
        let err = instr.validate(&symtab, &labels).unwrap_err();
        assert_eq!(err.exit_code(), 53);
    }

    #[test]
    fn test_lt_forbids_nil() {
        let mut symtab = SymbolTable::new();
        let dst = VarRef { frame: FrameSigil::Global, name: "r".to_string() };
        symtab.declare(&dst).unwrap();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Lt,
            args: vec![
                var_arg(1, FrameSigil::Global, "r"),
                Argument { position: 2, data: ArgData::Literal(Value::Nil) },
                int_arg(3, 1),
            ],
        };
        let err = instr.validate(&symtab, &labels).unwrap_err();
        assert_eq!(err.exit_code(), 53);
    }

    #[test]
    fn test_eq_permits_mixed_nil() {
        let mut symtab = SymbolTable::new();
        let dst = VarRef { frame: FrameSigil::Global, name: "r".to_string() };
        symtab.declare(&dst).unwrap();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Eq,
            args: vec![
                var_arg(1, FrameSigil::Global, "r"),
                Argument { position: 2, data: ArgData::Literal(Value::Nil) },
                int_arg(3, 1),
            ],
        };
        assert!(instr.validate(&symtab, &labels).is_ok());
    }

    #[test]
    fn test_setchar_with_non_string_dst_fails_53() {
        let mut symtab = SymbolTable::new();
        let dst = VarRef { frame: FrameSigil::Global, name: "s".to_string() };
        symtab.declare(&dst).unwrap();
        symtab.define(&dst, "int", Value::Int(1)).unwrap();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Setchar,
            args: vec![
                var_arg(1, FrameSigil::Global, "s"),
                int_arg(2, 0),
                Argument { position: 3, data: ArgData::Literal(Value::Str("H".to_string())) },
            ],
        };
        let err = instr.validate(&symtab, &labels).unwrap_err();
        assert_eq!(err.exit_code(), 53);
    }

    #[test]
    fn test_undefined_label_fails_52() {
        let symtab = SymbolTable::new();
        let labels: LabelMap = HashMap::new();
        let instr = Instruction {
            order: 1,
            opcode: Opcode::Jump,
            args: vec![Argument { position: 1, data: ArgData::Label("nowhere".to_string()) }],
        };
        let err = instr.validate(&symtab, &labels).unwrap_err();
        assert_eq!(err.exit_code(), 52);
    }
}
