//! Extension-side contracts consumed by contribution handlers.
//!
//! This module covers what a handler sees of an installed extension: its
//! description, the proposed-API gate, its diagnostic collector, and the
//! extension-point feed that delivers contribution deltas.

pub mod capability;
pub mod collector;
pub mod manifest;
pub mod point;
