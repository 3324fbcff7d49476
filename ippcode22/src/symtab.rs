use std::collections::HashMap;

use fxhash::FxBuildHasher;

use crate::argument::{Frame as FrameSigil, VarRef};
use crate::error::RuntimeErrorKind;
use crate::value::Value;

/// A single variable slot. `defined ⇒ declared` is the invariant; we encode
/// it directly by only ever storing a value once `declared` is also true
/// (§3).
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub declared: bool,
    pub value: Option<(&'static str, Value)>,
}

impl Cell {
    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

/// A frame is a name→Cell map; key order is irrelevant (§3). Hashed with
/// `FxBuildHasher` rather than the default `SipHash` since this map is on
/// the hot path of every instruction dispatch, the same tradeoff the
/// teacher's own collection types make (`cordy-sys/src/core/collections.rs`).
pub type Frame = HashMap<String, Cell, FxBuildHasher>;

fn new_frame() -> Frame {
    Frame::default()
}

/// The three-tier frame store of §3/§4.3: a single global frame, an ordered
/// stack of local frames (only the top is addressable), and an optional
/// temporary frame.
#[derive(Debug, Default)]
pub struct SymbolTable {
    global: Frame,
    locals: Vec<Frame>,
    temporary: Option<Frame>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable { global: new_frame(), locals: Vec::new(), temporary: None }
    }

    fn frame(&self, sigil: FrameSigil) -> Result<&Frame, RuntimeErrorKind> {
        match sigil {
            FrameSigil::Global => Ok(&self.global),
            FrameSigil::Temporary => self.temporary.as_ref().ok_or(RuntimeErrorKind::NoSuchFrame),
            FrameSigil::Local => self.locals.last().ok_or(RuntimeErrorKind::NoSuchFrame),
        }
    }

    fn frame_mut(&mut self, sigil: FrameSigil) -> Result<&mut Frame, RuntimeErrorKind> {
        match sigil {
            FrameSigil::Global => Ok(&mut self.global),
            FrameSigil::Temporary => self.temporary.as_mut().ok_or(RuntimeErrorKind::NoSuchFrame),
            FrameSigil::Local => self.locals.last_mut().ok_or(RuntimeErrorKind::NoSuchFrame),
        }
    }

    pub fn declare(&mut self, var: &VarRef) -> Result<(), RuntimeErrorKind> {
        let frame = self.frame_mut(var.frame)?;
        if frame.contains_key(&var.name) {
            return Err(RuntimeErrorKind::VariableRedeclared(var.name.clone()));
        }
        frame.insert(var.name.clone(), Cell { declared: true, value: None });
        Ok(())
    }

    pub fn define(&mut self, var: &VarRef, type_name: &'static str, value: Value) -> Result<(), RuntimeErrorKind> {
        let frame = self.frame_mut(var.frame)?;
        let cell = frame.entry(var.name.clone()).or_insert_with(|| Cell { declared: true, value: None });
        cell.declared = true;
        cell.value = Some((type_name, value));
        Ok(())
    }

    pub fn is_declared(&self, var: &VarRef) -> Result<bool, RuntimeErrorKind> {
        let frame = self.frame(var.frame)?;
        Ok(frame.get(&var.name).map(|c| c.declared).unwrap_or(false))
    }

    pub fn is_defined(&self, var: &VarRef) -> Result<bool, RuntimeErrorKind> {
        let frame = self.frame(var.frame)?;
        Ok(frame.get(&var.name).map(|c| c.is_defined()).unwrap_or(false))
    }

    pub fn get(&self, var: &VarRef) -> Result<&Cell, RuntimeErrorKind> {
        let frame = self.frame(var.frame)?;
        frame.get(&var.name).ok_or_else(|| RuntimeErrorKind::UndeclaredVariable(var.name.clone()))
    }

    pub fn create_frame(&mut self) {
        self.temporary = Some(new_frame());
    }

    pub fn push_frame(&mut self) -> Result<(), RuntimeErrorKind> {
        let frame = self.temporary.take().ok_or(RuntimeErrorKind::NoSuchFrame)?;
        self.locals.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<(), RuntimeErrorKind> {
        let frame = self.locals.pop().ok_or(RuntimeErrorKind::NoSuchFrame)?;
        self.temporary = Some(frame);
        Ok(())
    }

    pub fn global_frame(&self) -> &Frame {
        &self.global
    }

    pub fn local_frames(&self) -> &[Frame] {
        &self.locals
    }

    pub fn temporary_frame(&self) -> Option<&Frame> {
        self.temporary.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gf(name: &str) -> VarRef {
        VarRef { frame: FrameSigil::Global, name: name.to_string() }
    }

    fn tf(name: &str) -> VarRef {
        VarRef { frame: FrameSigil::Temporary, name: name.to_string() }
    }

    fn lf(name: &str) -> VarRef {
        VarRef { frame: FrameSigil::Local, name: name.to_string() }
    }

    #[test]
    fn test_declare_and_define() {
        let mut st = SymbolTable::new();
        st.declare(&gf("x")).unwrap();
        assert!(st.is_declared(&gf("x")).unwrap());
        assert!(!st.is_defined(&gf("x")).unwrap());
        st.define(&gf("x"), "int", Value::Int(42)).unwrap();
        assert!(st.is_defined(&gf("x")).unwrap());
    }

    #[test]
    fn test_redeclaration_errors() {
        let mut st = SymbolTable::new();
        st.declare(&gf("x")).unwrap();
        assert_eq!(st.declare(&gf("x")), Err(RuntimeErrorKind::VariableRedeclared("x".to_string())));
    }

    #[test]
    fn test_temporary_frame_lifecycle() {
        let mut st = SymbolTable::new();
        assert_eq!(st.declare(&tf("x")), Err(RuntimeErrorKind::NoSuchFrame));
        st.create_frame();
        st.declare(&tf("x")).unwrap();
        st.define(&tf("x"), "string", Value::Str("hi".to_string())).unwrap();
        st.push_frame().unwrap();
        assert_eq!(st.declare(&tf("x")), Err(RuntimeErrorKind::NoSuchFrame));
        assert!(st.is_defined(&lf("x")).unwrap());
        st.pop_frame().unwrap();
        assert!(st.is_defined(&tf("x")).unwrap());
    }

    #[test]
    fn test_local_frame_requires_non_empty_stack() {
        let st = SymbolTable::new();
        assert_eq!(st.get(&lf("x")), Err(RuntimeErrorKind::NoSuchFrame));
    }

    #[test]
    fn test_pop_frame_without_push_errors() {
        let mut st = SymbolTable::new();
        assert_eq!(st.pop_frame(), Err(RuntimeErrorKind::NoSuchFrame));
    }
}
