#![deny(unused_variables)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Cross-validated error estimates for "select features, then classify"
//! pipelines, with feature selection confined to each training fold.

#[path = "../crossval/mod.rs"]
pub mod crossval;

pub use crossval::*;
