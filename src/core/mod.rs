//! Core package logic: descriptors, naming, loading, building, and the recipe engine.

pub mod codegen;
pub mod executor;
pub mod naming;
pub mod package;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod settings;
pub mod state;
pub mod types;
