//! Bluetooth side of the service.
//!
//! This module provides the adapter accessor handed to drivers, raw HCI
//! access for writing the class of device, and adapter lifecycle tracking.

pub mod adapter;
pub mod hci;
pub mod manager;
