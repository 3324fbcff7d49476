//! The execution engine (§4.5/§4.6): program state plus the fetch-validate-
//! execute loop and all 35 opcode handlers. Generalizes the teacher's
//! `VirtualMachine` (`vm/mod.rs`), which owned a single `Vec<Instruction>`
//! and an `IO` abstraction over stdin/stdout — here the `Input`/`Output`
//! traits play that role so tests can swap in an in-memory buffer.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use num_integer::Integer;

use crate::argument::{ArgData, Argument};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::symtab::SymbolTable;
use crate::value::Value;
use crate::{trace_stack, trace_vm, LabelMap};

/// Abstracts the program-input stream (§4.5 I/O, `READ`). Blanket-implemented
/// for anything `BufRead` so a real file, stdin, or a `Cursor<&[u8]>` in
/// tests all work identically.
pub trait Input {
    /// One line with its trailing `\n` stripped (Open Question, §9); `None`
    /// on EOF or an I/O error — both are folded into `READ`'s `Nil` result.
    fn read_line_or_eof(&mut self) -> Option<String>;
}

impl<R: BufRead> Input for R {
    fn read_line_or_eof(&mut self) -> Option<String> {
        let mut buf = String::new();
        match self.read_line(&mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.ends_with('\n') {
                    buf.pop();
                }
                Some(buf)
            }
            Err(_) => None,
        }
    }
}

/// Abstracts the program-output stream (`WRITE`). A write failure (e.g. a
/// broken pipe) is not part of the error taxonomy in §6 and is swallowed,
/// same as the teacher's own `io::stdout` writes in its `IO` impl.
pub trait Output {
    fn write_text(&mut self, text: &str);
}

impl<W: Write> Output for W {
    fn write_text(&mut self, text: &str) {
        let _ = self.write_all(text.as_bytes());
    }
}

/// What the dispatch of one instruction does to the program counter.
enum Step {
    Next,
    Jump(usize),
    Halt(u8),
}

/// Owns every piece of mutable engine state named in §4.6: the sorted
/// instruction vector, the label map, the program counter, both stacks, the
/// symbol table, and the I/O handles. There is no process-wide mutable state
/// (§9 "Global mutable engine state → owned engine record").
pub struct VirtualMachine<R, W> {
    instrs: Vec<Instruction>,
    labels: LabelMap,
    pos: usize,
    data_stack: Vec<Value>,
    return_stack: Vec<usize>,
    symtab: SymbolTable,
    input: R,
    output: W,
}

impl<R: Input, W: Output> VirtualMachine<R, W> {
    /// Builds the label map by scanning for `LABEL` instructions ahead of
    /// time (§3, "built once at startup"). A malformed `LABEL` (wrong arity
    /// or argument kind) is simply not registered here; it still gets a
    /// proper diagnostic from `Instruction::validate` if execution ever
    /// reaches it.
    pub fn new(instrs: Vec<Instruction>, input: R, output: W) -> Result<VirtualMachine<R, W>, RuntimeError> {
        let mut labels = LabelMap::new();
        for (idx, instr) in instrs.iter().enumerate() {
            if instr.opcode != Opcode::Label {
                continue;
            }
            let Some(name) = instr.args.first().and_then(Argument::as_label) else { continue };
            if labels.insert(name.to_string(), idx).is_some() {
                return Err(instr.error(RuntimeErrorKind::DuplicateLabel(name.to_string())));
            }
        }
        Ok(VirtualMachine {
            instrs,
            labels,
            pos: 0,
            data_stack: Vec::new(),
            return_stack: Vec::new(),
            symtab: SymbolTable::new(),
            input,
            output,
        })
    }

    /// The fetch-validate-execute loop of §4.6. Returns the process exit
    /// code: 0 on falling off the end, or `EXIT`'s argument.
    pub fn run(&mut self) -> Result<u8, RuntimeError> {
        loop {
            if self.pos >= self.instrs.len() {
                return Ok(0);
            }
            let instr = self.instrs[self.pos].clone();
            instr.validate(&self.symtab, &self.labels)?;
            trace_vm!("#{} {:?}", instr.order, instr.opcode);

            match self.dispatch(&instr)? {
                Step::Next => self.pos += 1,
                Step::Jump(idx) => self.pos = idx + 1,
                Step::Halt(code) => return Ok(code),
            }
        }
    }

    fn dispatch(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        use Opcode::*;
        match instr.opcode {
            // Frames & variables.
            Move => self.op_move(instr),
            Createframe => {
                self.symtab.create_frame();
                Ok(Step::Next)
            }
            Pushframe => self.symtab.push_frame().map_err(|k| instr.error(k)).map(|_| Step::Next),
            Popframe => self.symtab.pop_frame().map_err(|k| instr.error(k)).map(|_| Step::Next),
            Defvar => {
                let var = instr.args[0].as_var().expect("DEFVAR's argument is always a var (§4.4)");
                self.symtab.declare(var).map_err(|k| instr.error(k))?;
                Ok(Step::Next)
            }

            // Call flow.
            Call => self.op_call(instr),
            Return => self.op_return(instr),

            // Data stack.
            Pushs => self.op_pushs(instr),
            Pops => self.op_pops(instr),

            // Arithmetic.
            Add | Sub | Mul | Idiv => self.op_arith(instr),

            // Relational.
            Lt | Gt | Eq => self.op_relational(instr),

            // Logical.
            And | Or => self.op_logical(instr),
            Not => self.op_not(instr),

            // String / code-point.
            Int2Char => self.op_int2char(instr),
            Stri2Int => self.op_stri2int(instr),
            Concat => self.op_concat(instr),
            Strlen => self.op_strlen(instr),
            Getchar => self.op_getchar(instr),
            Setchar => self.op_setchar(instr),

            // I/O.
            Read => self.op_read(instr),
            Write => self.op_write(instr),

            // Type introspection.
            Type => self.op_type(instr),

            // Control flow.
            Label => Ok(Step::Next),
            Jump => Ok(Step::Jump(self.labels[instr.args[0].as_label().expect("checked by validate")])),
            Jumpifeq | Jumpifneq => self.op_conditional_jump(instr),

            // Termination & debug.
            Exit => self.op_exit(instr),
            Dprint => {
                let val = instr.args[0].symb_val(&self.symtab, instr.order, instr.opcode)?;
                eprint!("{}", val.display_text());
                Ok(Step::Next)
            }
            Break => {
                self.dump_state();
                Ok(Step::Next)
            }
        }
    }

    fn op_move(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let val = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        self.symtab.define(dst, val.type_name(), val).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_call(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let label = instr.args[0].as_label().expect("checked by validate");
        self.return_stack.push(self.pos);
        Ok(Step::Jump(self.labels[label]))
    }

    fn op_return(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let target = self.return_stack.pop().ok_or_else(|| instr.error(RuntimeErrorKind::EmptyReturnStack))?;
        Ok(Step::Jump(target))
    }

    fn op_pushs(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let val = instr.args[0].symb_val(&self.symtab, instr.order, instr.opcode)?;
        trace_stack!("push {:?}", val);
        self.data_stack.push(val);
        Ok(Step::Next)
    }

    fn op_pops(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let val = self.data_stack.pop().ok_or_else(|| instr.error(RuntimeErrorKind::EmptyDataStack))?;
        trace_stack!("pop {:?}", val);
        self.symtab.define(dst, val.type_name(), val).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_arith(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let b = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let result = match instr.opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Idiv => {
                if b == 0 {
                    return Err(instr.error(RuntimeErrorKind::DivisionByZero));
                }
                a.div_floor(&b)
            }
            _ => unreachable!(),
        };
        self.symtab.define(dst, "int", Value::Int(result)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_relational(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let b = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let result = match instr.opcode {
            Opcode::Eq => a.is_equal(&b),
            Opcode::Lt => a.is_less_than(&b).expect("LT/GT reject Nil operands in validate"),
            Opcode::Gt => a.is_greater_than(&b).expect("LT/GT reject Nil operands in validate"),
            _ => unreachable!(),
        };
        self.symtab.define(dst, "bool", Value::Bool(result)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_logical(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?.as_bool().expect("checked by validate");
        let b = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?.as_bool().expect("checked by validate");
        let result = match instr.opcode {
            Opcode::And => a && b,
            Opcode::Or => a || b,
            _ => unreachable!(),
        };
        self.symtab.define(dst, "bool", Value::Bool(result)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_not(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?.as_bool().expect("checked by validate");
        self.symtab.define(dst, "bool", Value::Bool(!a)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_int2char(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let code = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let ch = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| instr.error(RuntimeErrorKind::StringIndexOutOfRange))?;
        self.symtab.define(dst, "string", Value::Str(ch.to_string())).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_stri2int(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let s = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let s = s.as_str().expect("checked by validate");
        let idx = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let ch = char_at(s, idx).ok_or_else(|| instr.error(RuntimeErrorKind::StringIndexOutOfRange))?;
        self.symtab.define(dst, "int", Value::Int(ch as i64)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_concat(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let b = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let mut out = a.as_str().expect("checked by validate").to_string();
        out.push_str(b.as_str().expect("checked by validate"));
        self.symtab.define(dst, "string", Value::Str(out)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_strlen(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let s = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let len = s.as_str().expect("checked by validate").chars().count() as i64;
        self.symtab.define(dst, "int", Value::Int(len)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_getchar(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let s = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let s = s.as_str().expect("checked by validate");
        let idx = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let ch = char_at(s, idx).ok_or_else(|| instr.error(RuntimeErrorKind::StringIndexOutOfRange))?;
        self.symtab.define(dst, "string", Value::Str(ch.to_string())).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_setchar(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let idx = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        let replacement = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let replacement_ch =
            replacement.as_str().expect("checked by validate").chars().next().ok_or_else(|| instr.error(RuntimeErrorKind::StringIndexOutOfRange))?;

        let cell = self.symtab.get(dst).map_err(|k| instr.error(k))?;
        let mut chars: Vec<char> = cell.value.as_ref().expect("SETCHAR requires a defined dst").1.as_str().expect("checked by validate").chars().collect();
        let i = usize::try_from(idx).ok().filter(|&i| i < chars.len()).ok_or_else(|| instr.error(RuntimeErrorKind::StringIndexOutOfRange))?;
        chars[i] = replacement_ch;
        let result: String = chars.into_iter().collect();
        self.symtab.define(dst, "string", Value::Str(result)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_read(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let requested = match &instr.args[1].data {
            ArgData::Type(name) => name.as_str(),
            _ => unreachable!("checked by validate"),
        };
        let line = self.input.read_line_or_eof();
        let (type_name, value) = match (requested, line) {
            (_, None) => ("nil", Value::Nil),
            ("int", Some(text)) => match text.trim().parse::<i64>() {
                Ok(n) => ("int", Value::Int(n)),
                Err(_) => ("nil", Value::Nil),
            },
            ("bool", Some(text)) => ("bool", Value::Bool(text.eq_ignore_ascii_case("true"))),
            ("string", Some(text)) => ("string", Value::Str(text)),
            (_, Some(_)) => ("nil", Value::Nil),
        };
        self.symtab.define(dst, type_name, value).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_write(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let val = instr.args[0].symb_val(&self.symtab, instr.order, instr.opcode)?;
        self.output.write_text(&val.display_text());
        Ok(Step::Next)
    }

    fn op_type(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let dst = instr.args[0].as_var().expect("checked by validate");
        let type_name = instr.args[1].symb_type(&self.symtab, instr.order, instr.opcode)?;
        self.symtab.define(dst, "string", Value::Str(type_name)).map_err(|k| instr.error(k))?;
        Ok(Step::Next)
    }

    fn op_conditional_jump(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let label = instr.args[0].as_label().expect("checked by validate");
        let a = instr.args[1].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let b = instr.args[2].symb_val(&self.symtab, instr.order, instr.opcode)?;
        let equal = a.is_equal(&b);
        let take = match instr.opcode {
            Opcode::Jumpifeq => equal,
            Opcode::Jumpifneq => !equal,
            _ => unreachable!(),
        };
        Ok(if take { Step::Jump(self.labels[label]) } else { Step::Next })
    }

    fn op_exit(&mut self, instr: &Instruction) -> Result<Step, RuntimeError> {
        let n = instr.args[0].symb_val(&self.symtab, instr.order, instr.opcode)?.as_int().expect("checked by validate");
        if !(0..=49).contains(&n) {
            return Err(instr.error(RuntimeErrorKind::ExitCodeOutOfRange(n)));
        }
        Ok(Step::Halt(n as u8))
    }

    /// `BREAK`'s full-state dump, supplementing the distilled spec from the
    /// original interpreter's equivalent debug hook: current position,
    /// both stacks, and every frame tier.
    fn dump_state(&self) {
        eprintln!("-- BREAK at instruction #{} --", self.instrs.get(self.pos).map(|i| i.order).unwrap_or(0));
        eprintln!("return stack: {:?}", self.return_stack);
        eprintln!("data stack: {:?}", self.data_stack);
        dump_frame("GF", self.symtab.global_frame());
        for (depth, frame) in self.symtab.local_frames().iter().enumerate() {
            dump_frame(&format!("LF[{depth}]"), frame);
        }
        match self.symtab.temporary_frame() {
            Some(frame) => dump_frame("TF", frame),
            None => eprintln!("TF: (none)"),
        }
    }
}

fn dump_frame(label: &str, frame: &crate::symtab::Frame) {
    let names: HashSet<&String> = frame.keys().collect();
    eprint!("{label}: {{");
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            eprint!(", ");
        }
        let cell = &frame[*name];
        match &cell.value {
            Some((ty, val)) => eprint!("{name}: {ty}({})", val.display_text()),
            None => eprint!("{name}: <undefined>"),
        }
    }
    eprintln!("}}");
}

fn char_at(s: &str, idx: i64) -> Option<char> {
    usize::try_from(idx).ok().and_then(|i| s.chars().nth(i))
}
