//! DRA Selector - boolean device selector expressions
//!
//! Layer 1 of the resolver workspace. A CEL subset evaluated against one
//! device at a time, with `device.driverName`, `device.type`, the untyped
//! `device.attributes` map and one typed map per attribute type.
//!
//! Selector text is compiled once into an immutable [`Program`]
//! (lex, parse, resolve names, type-check). Evaluation never panics; a
//! runtime type mismatch is an [`EvalError`] which [`Program::matches`]
//! turns into "device does not match".
//!
//! ```
//! use dra_api::Device;
//! use dra_selector::Program;
//!
//! let program = Program::compile("device.intAttributes['cores.example.com'] >= 8").unwrap();
//! let device = Device::new("gpu.example.com", "gpu-0").with_attribute("cores.example.com", 16i64);
//! assert!(program.matches(&device));
//! ```

pub mod ast;
pub mod cache;
pub mod check;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod value;

pub use cache::{CacheStats, SelectorCache};
pub use error::{EvalError, SelectorError, SelectorResult};
pub use eval::Bindings;
pub use program::{Program, MAX_SELECTOR_LEN};
pub use value::Value;
