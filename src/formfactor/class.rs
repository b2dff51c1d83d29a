//! Class-of-device encoding for the computer major class.
//!
//! The class of device is a 24-bit little-endian value. Byte 0 carries the
//! minor class (bits 2..7) and the format type (bits 0..1), byte 1 carries
//! the major class (bits 8..12) and the low service classes (bits 13..15),
//! byte 2 carries the remaining service classes.

use std::fmt;

use log::debug;

use crate::{bluetooth::hci::ClassWriter, error::Result};

/// Major device class: Computer.
pub const MAJOR_COMPUTER: u8 = 0x01;

const MAJOR_MASK: u8 = 0x1F;
const SERVICE_BITS_MASK: u8 = 0xE0;

/// Form factors reported by HAL under `system.formfactor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FormFactor {
   Laptop,
   Desktop,
   Server,
   Handheld,
}

/// Maps a reported form factor to the computer minor class.
///
/// Unknown or missing form factors leave the minor class at 0
/// (uncategorized). Matching is case-sensitive.
pub fn minor_class_for(formfactor: Option<&str>) -> u8 {
   let mut minor = 0u8;

   match formfactor.and_then(|s| s.parse::<FormFactor>().ok()) {
      Some(FormFactor::Laptop) => minor |= (1 << 2) | (1 << 3),
      Some(FormFactor::Desktop) => minor |= 1 << 2,
      Some(FormFactor::Server) => minor |= 1 << 3,
      // Added rather than OR'd; same result since the bit starts clear.
      Some(FormFactor::Handheld) => minor += 1 << 4,
      None => {},
   }

   minor
}

/// The three class-of-device bytes, least significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceClass(pub [u8; 3]);

impl DeviceClass {
   pub const fn from_u32(value: u32) -> Self {
      Self([value as u8, (value >> 8) as u8, (value >> 16) as u8])
   }

   pub const fn as_u32(self) -> u32 {
      ((self.0[2] as u32) << 16) | ((self.0[1] as u32) << 8) | self.0[0] as u32
   }

   pub const fn bytes(self) -> [u8; 3] {
      self.0
   }

   pub const fn major(self) -> u8 {
      self.0[1] & MAJOR_MASK
   }

   pub const fn minor(self) -> u8 {
      self.0[0]
   }

   /// Replaces the major class, keeping the service-class bits of byte 1.
   pub const fn with_major(self, major: u8) -> Self {
      let [b0, b1, b2] = self.0;
      Self([b0, (b1 & SERVICE_BITS_MASK) | (major & MAJOR_MASK), b2])
   }

   /// Replaces byte 0 with the given minor class.
   pub const fn with_minor(self, minor: u8) -> Self {
      let [_, b1, b2] = self.0;
      Self([minor, b1, b2])
   }
}

impl fmt::Display for DeviceClass {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "0x{:06x}", self.as_u32())
   }
}

/// Writes a new major class through `dd` and records it in `cls`.
pub fn set_major_class<W: ClassWriter + ?Sized>(
   dd: &mut W,
   cls: &mut DeviceClass,
   major: u8,
) -> Result<()> {
   let updated = cls.with_major(major);
   debug!("Writing major class 0x{:02x} ({updated})", major & MAJOR_MASK);
   dd.write_class(updated)?;
   *cls = updated;
   Ok(())
}

/// Writes a new minor class through `dd` and records it in `cls`.
pub fn set_minor_class<W: ClassWriter + ?Sized>(
   dd: &mut W,
   cls: &mut DeviceClass,
   minor: u8,
) -> Result<()> {
   let updated = cls.with_minor(minor);
   debug!("Writing minor class 0x{minor:02x} ({updated})");
   dd.write_class(updated)?;
   *cls = updated;
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[derive(Default)]
   struct RecordingWriter {
      written: Vec<DeviceClass>,
   }

   impl ClassWriter for RecordingWriter {
      fn write_class(&mut self, class: DeviceClass) -> Result<()> {
         self.written.push(class);
         Ok(())
      }
   }

   #[test]
   fn test_minor_class_table() {
      assert_eq!(minor_class_for(Some("laptop")), 0x0C);
      assert_eq!(minor_class_for(Some("desktop")), 0x04);
      assert_eq!(minor_class_for(Some("server")), 0x08);
      assert_eq!(minor_class_for(Some("handheld")), 0x10);
   }

   #[test]
   fn test_unrecognized_formfactor_is_uncategorized() {
      assert_eq!(minor_class_for(None), 0);
      assert_eq!(minor_class_for(Some("")), 0);
      assert_eq!(minor_class_for(Some("tablet")), 0);
      assert_eq!(minor_class_for(Some("Laptop")), 0);
      assert_eq!(minor_class_for(Some(" laptop")), 0);
   }

   #[test]
   fn test_handheld_addition_matches_bitwise_or() {
      // Handheld is the only entry applied with `+=`; starting from a clear
      // minor it must produce exactly the same bits as `|=` would.
      let mut or_minor = 0u8;
      or_minor |= 1 << 4;
      assert_eq!(minor_class_for(Some("handheld")), or_minor);
      assert_eq!(FormFactor::Handheld.to_string(), "handheld");
   }

   #[test]
   fn test_device_class_u32_layout() {
      let cls = DeviceClass::from_u32(0x5a_02_0c);
      assert_eq!(cls.bytes(), [0x0c, 0x02, 0x5a]);
      assert_eq!(cls.as_u32(), 0x5a020c);
      assert_eq!(cls.major(), 0x02);
      assert_eq!(cls.minor(), 0x0c);
      assert_eq!(cls.to_string(), "0x5a020c");
   }

   #[test]
   fn test_major_keeps_service_bits() {
      let cls = DeviceClass([0x00, 0xE2, 0x08]).with_major(MAJOR_COMPUTER);
      assert_eq!(cls.bytes(), [0x00, 0xE1, 0x08]);

      // Out-of-range majors are masked to five bits.
      let cls = DeviceClass::default().with_major(0xFF);
      assert_eq!(cls.major(), 0x1F);
      assert_eq!(cls.bytes()[1], 0x1F);
   }

   #[test]
   fn test_set_major_then_minor_writes_twice() -> Result<()> {
      let mut dd = RecordingWriter::default();
      let mut cls = DeviceClass([0x14, 0x05, 0x20]);

      set_major_class(&mut dd, &mut cls, MAJOR_COMPUTER)?;
      set_minor_class(&mut dd, &mut cls, minor_class_for(Some("laptop")))?;

      assert_eq!(
         dd.written,
         vec![DeviceClass([0x14, 0x01, 0x20]), DeviceClass([0x0C, 0x01, 0x20])]
      );
      assert_eq!(cls, DeviceClass([0x0C, 0x01, 0x20]));
      Ok(())
   }
}
