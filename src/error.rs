//! Error types for the form-factor service.
//!
//! This module defines all error types that can occur while classifying an
//! adapter, including bus, Bluetooth, HCI and configuration errors.

use thiserror::Error;

/// Main error type for the form-factor service.
#[derive(Error, Debug)]
pub enum FormFactorError {
   #[error("Out of resources: {0}")]
   Resource(String),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Protocol error: {0}")]
   Protocol(String),

   #[error("Device error: {0}")]
   Device(String),

   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("Request timeout")]
   RequestTimeout,

   #[error("Driver already registered: {0}")]
   DriverAlreadyRegistered(&'static str),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("Manager has been shut down")]
   ManagerShutdown,
}

impl FormFactorError {
   /// Negative errno-style status reported to the driver registry.
   pub const fn errno(&self) -> i32 {
      -match self {
         Self::Resource(_) => libc::ENOMEM,
         Self::Io(_) | Self::DBus(_) | Self::ManagerShutdown => libc::EIO,
         Self::Protocol(_) => libc::EPROTO,
         Self::Device(_) | Self::Bluetooth(_) => libc::ENODEV,
         Self::RequestTimeout => libc::ETIMEDOUT,
         Self::DriverAlreadyRegistered(_) => libc::EEXIST,
         Self::ConfigDirNotFound | Self::TomlParse(_) => libc::EINVAL,
      }
   }
}

/// Convenience type alias for Results with `FormFactorError`.
pub type Result<T> = std::result::Result<T, FormFactorError>;
