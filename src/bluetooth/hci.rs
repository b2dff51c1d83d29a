//! Raw HCI access for writing the class of device.
//!
//! BlueZ exposes the class of device as a read-only property, so the value
//! is written straight to the controller over a raw HCI socket bound to the
//! adapter's device id.

use std::{
   io,
   mem,
   os::fd::{AsRawFd, FromRawFd, OwnedFd},
};

use log::debug;

use crate::{
   error::{FormFactorError, Result},
   formfactor::class::DeviceClass,
};

const BTPROTO_HCI: libc::c_int = 1;
const HCI_CHANNEL_RAW: u16 = 0;

/// HCI packet indicator for commands
const HCI_COMMAND_PKT: u8 = 0x01;
/// OGF 0x03 (Controller & Baseband), OCF 0x0024
const OP_WRITE_CLASS_OF_DEVICE: u16 = (0x03 << 10) | 0x0024;

#[repr(C)]
struct SockaddrHci {
   hci_family: libc::sa_family_t,
   hci_dev: u16,
   hci_channel: u16,
}

/// Something that can push a class of device to a controller.
pub trait ClassWriter {
   fn write_class(&mut self, class: DeviceClass) -> Result<()>;
}

/// Opens raw handles to controllers by device id.
pub trait HciAccess: Send + Sync + 'static {
   type Handle: ClassWriter + Send;

   fn open(&self, dev_id: u16) -> Result<Self::Handle>;
}

/// Builds the `Write_Class_Of_Device` command packet.
pub fn write_class_of_device_command(class: DeviceClass) -> [u8; 7] {
   let [op_lo, op_hi] = OP_WRITE_CLASS_OF_DEVICE.to_le_bytes();
   let [b0, b1, b2] = class.bytes();
   [HCI_COMMAND_PKT, op_lo, op_hi, 3, b0, b1, b2]
}

/// Kernel HCI sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHci;

impl HciAccess for RawHci {
   type Handle = HciSocket;

   fn open(&self, dev_id: u16) -> Result<HciSocket> {
      HciSocket::open(dev_id)
   }
}

/// A raw HCI socket bound to one controller. Closed on drop.
#[derive(Debug)]
pub struct HciSocket {
   fd: OwnedFd,
   dev_id: u16,
}

impl HciSocket {
   pub fn open(dev_id: u16) -> Result<Self> {
      // SAFETY: plain socket(2) call, the returned descriptor is checked
      // before being wrapped.
      let raw = unsafe {
         libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC,
            BTPROTO_HCI,
         )
      };
      if raw < 0 {
         return Err(Self::device_error(dev_id, "open", io::Error::last_os_error()));
      }
      // SAFETY: `raw` is a freshly created descriptor we exclusively own.
      let fd = unsafe { OwnedFd::from_raw_fd(raw) };

      let addr = SockaddrHci {
         hci_family: libc::AF_BLUETOOTH as libc::sa_family_t,
         hci_dev: dev_id,
         hci_channel: HCI_CHANNEL_RAW,
      };
      // SAFETY: `addr` is a valid sockaddr_hci and the length matches it.
      let rc = unsafe {
         libc::bind(
            fd.as_raw_fd(),
            (&raw const addr).cast::<libc::sockaddr>(),
            mem::size_of::<SockaddrHci>() as libc::socklen_t,
         )
      };
      if rc < 0 {
         return Err(Self::device_error(dev_id, "bind", io::Error::last_os_error()));
      }

      debug!("Opened raw HCI handle for hci{dev_id}");
      Ok(Self { fd, dev_id })
   }

   fn device_error(dev_id: u16, op: &str, err: io::Error) -> FormFactorError {
      FormFactorError::Device(format!("Failed to {op} HCI device hci{dev_id}: {err}"))
   }
}

impl ClassWriter for HciSocket {
   fn write_class(&mut self, class: DeviceClass) -> Result<()> {
      let packet = write_class_of_device_command(class);
      // SAFETY: writes from a live stack buffer of the stated length.
      let written = unsafe {
         libc::write(
            self.fd.as_raw_fd(),
            packet.as_ptr().cast::<libc::c_void>(),
            packet.len(),
         )
      };
      if written < 0 {
         return Err(io::Error::last_os_error().into());
      }
      if written as usize != packet.len() {
         return Err(
            io::Error::new(
               io::ErrorKind::WriteZero,
               format!("short HCI write on hci{}", self.dev_id),
            )
            .into(),
         );
      }
      Ok(())
   }
}

impl Drop for HciSocket {
   fn drop(&mut self) {
      debug!("Closing raw HCI handle for hci{}", self.dev_id);
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_write_class_of_device_packet() {
      let packet = write_class_of_device_command(DeviceClass([0x0C, 0x01, 0x5A]));
      assert_eq!(packet, [0x01, 0x24, 0x0C, 0x03, 0x0C, 0x01, 0x5A]);
   }

   #[test]
   fn test_opcode_layout() {
      assert_eq!(OP_WRITE_CLASS_OF_DEVICE, 0x0C24);
   }
}
