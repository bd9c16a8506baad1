//! Reconstruction of Java source constructs on decompiled syntax trees.
//!
//! An upstream decompiler produces a tree that is faithful to the bytecode: loops are `while (true)`
//! with gotos, enums are classes with synthetic arrays, try-with-resources is a thicket of nested
//! handlers. The [`Pipeline`] runs a fixed sequence of rewrite passes that recover what the
//! programmer wrote. Each pass recognizes one compiler idiom with the [`pattern`] engine, proves the
//! rewrite safe with the [`analysis`] module where needed, and edits the [`ast::Arena`] in place.

extern crate alloc;

pub mod analysis;
pub mod ast;
mod error;
pub mod metadata;
pub mod pattern;
mod pipeline;
mod settings;
pub mod transforms;

pub use self::error::{InvariantViolation, TransformError};
pub use self::pipeline::{Context, Pipeline, Transform};
pub use self::settings::Settings;
