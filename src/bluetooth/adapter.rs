//! Adapter accessor used by drivers.

use std::future::Future;

use smol_str::SmolStr;

use crate::{
   error::{FormFactorError, Result},
   formfactor::class::DeviceClass,
};

/// The view of a local controller that adapter drivers get to see.
pub trait ClassAdapter: Clone + Send + Sync + 'static {
   /// Adapter name, e.g. `hci0`. Unique among live adapters.
   fn name(&self) -> &str;

   /// Numeric HCI device id used to open a raw handle.
   fn dev_id(&self) -> u16;

   /// Current class of device, read from the controller.
   fn class(&self) -> impl Future<Output = Result<DeviceClass>> + Send;
}

/// A BlueZ adapter reached through `bluer`.
#[derive(Clone, Debug)]
pub struct BluezAdapter {
   adapter: bluer::Adapter,
   name: SmolStr,
   dev_id: u16,
}

impl BluezAdapter {
   pub fn new(adapter: bluer::Adapter) -> Result<Self> {
      let name = SmolStr::from(adapter.name());
      let dev_id = parse_dev_id(&name)?;
      Ok(Self {
         adapter,
         name,
         dev_id,
      })
   }
}

impl ClassAdapter for BluezAdapter {
   fn name(&self) -> &str {
      &self.name
   }

   fn dev_id(&self) -> u16 {
      self.dev_id
   }

   async fn class(&self) -> Result<DeviceClass> {
      let value = self.adapter.class().await.map_err(|e| {
         FormFactorError::Device(format!("Failed to read class of {}: {e}", self.name))
      })?;
      Ok(DeviceClass::from_u32(value))
   }
}

/// Extracts the device id from an `hciN` adapter name.
pub fn parse_dev_id(name: &str) -> Result<u16> {
   name
      .strip_prefix("hci")
      .and_then(|id| id.parse().ok())
      .ok_or_else(|| FormFactorError::Device(format!("Not an HCI adapter name: {name}")))
}
