//! The teacher gates verbose interpreter tracing behind Cargo features
//! (`trace_parser`, `trace_interpreter`, `trace_interpreter_stack`) rather
//! than a runtime-configured logger, with a `trace_interpreter!` macro
//! invoked at every opcode dispatch. This crate carries the same convention
//! forward under a single `trace_vm` feature, since there's only one thing
//! left worth tracing in a batch, single-pass interpreter: instruction
//! dispatch and stack mutation.

#[macro_export]
macro_rules! trace_vm {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace_vm")]
        eprintln!("[vm] {}", format!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_stack {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace_vm")]
        eprintln!("[stack] {}", format!($($arg)*));
    };
}
