//! This module contains logging used by the licbundle library

pub mod log;
