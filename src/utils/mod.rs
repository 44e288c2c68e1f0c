//! Small shared helpers that don't belong to any single component.

pub mod id_generator;
