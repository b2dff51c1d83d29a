//! Form-factor classification.
//!
//! This module asks HAL for the machine form factor and advertises it as
//! the Computer minor device class.

pub mod class;
pub mod classifier;
pub mod hal;
