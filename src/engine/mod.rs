// Core encode orchestration - independent of the interactive surface

pub mod capability;
pub mod controller;
pub mod core;

pub use core::*;
