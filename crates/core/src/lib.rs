//! Cascade EQ core: runtime-reconfigurable cascaded IIR filter stages
//!
//! See [`domain`] for the filter engine, its parameter model and the
//! configuration layer.

pub mod domain;
