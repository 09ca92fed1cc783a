//! Declared view-welcome data model.
//!
//! # Responsibility
//! - Define the immutable value objects contributed by extensions.
//! - Give every declared entry a stable identity independent of its fields.
//!
//! # Invariants
//! - Entry identity is the surrogate `EntryId`, never structural equality.
//! - Two entries with identical fields but distinct origins are distinct keys.

pub mod welcome;
