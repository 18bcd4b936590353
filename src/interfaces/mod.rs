//! Outer surfaces through which the engine is driven.

pub mod csv;
