//! Core document model, eight-operation algebra, OT engine, delta
//! generator, position mapper, version vectors, batched transport, and
//! plugin/keymap/command kernel for a collaborative rich-text editor.
//!
//! This crate is the engine only: it has no network transport, no
//! storage, and no view layer (§1 Non-goals). A host embeds it and wires
//! `transport::Transport`/`transport::Clock` to its own I/O.

pub mod commands;
pub mod config;
pub mod diff;
pub mod editor;
pub mod error;
pub mod ids;
pub mod keymap;
pub mod logging;
pub mod model;
pub mod ops;
pub mod plugin;
pub mod position;
pub mod transform;
pub mod transport;
pub mod version_vector;
pub mod wire;

pub use editor::Editor;
pub use error::{CoreError, CoreResult};
