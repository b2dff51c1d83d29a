//! Adapter driver registry.
//!
//! Drivers are notified when an adapter appears (`probe`) and when it goes
//! away (`remove`). A failing probe only affects the driver that failed.

use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
   bluetooth::{adapter::ClassAdapter, hci::RawHci},
   config::Config,
   error::{FormFactorError, Result},
   formfactor::{classifier::FormFactorClassifier, hal::SystemBus},
};

/// Name under which the form-factor driver registers.
pub const PLUGIN_NAME: &str = "hal";

/// Lifecycle hooks for a driver bound to adapters of type `A`.
pub trait AdapterDriver<A>: Send + Sync {
   fn name(&self) -> &'static str;

   /// Called once an adapter is registered. Must not wait on remote peers.
   fn probe<'a>(&'a self, adapter: &'a A) -> BoxFuture<'a, Result<()>>;

   /// Called once an adapter goes away. Must tolerate repeated calls.
   fn remove(&self, adapter: &A);
}

pub type DriverRef<A> = Arc<dyn AdapterDriver<A>>;

/// The set of registered adapter drivers.
pub struct DriverRegistry<A> {
   drivers: RwLock<Vec<DriverRef<A>>>,
}

impl<A> Default for DriverRegistry<A> {
   fn default() -> Self {
      Self {
         drivers: RwLock::new(Vec::new()),
      }
   }
}

impl<A: ClassAdapter> DriverRegistry<A> {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn register(&self, driver: DriverRef<A>) -> Result<()> {
      let mut drivers = self.drivers.write();
      let name = driver.name();
      if drivers.iter().any(|d| d.name() == name) {
         return Err(FormFactorError::DriverAlreadyRegistered(name));
      }
      debug!("Registered adapter driver {name}");
      drivers.push(driver);
      Ok(())
   }

   pub fn unregister(&self, name: &str) -> bool {
      let mut drivers = self.drivers.write();
      let before = drivers.len();
      drivers.retain(|d| d.name() != name);
      before != drivers.len()
   }

   pub fn len(&self) -> usize {
      self.drivers.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.drivers.read().is_empty()
   }

   fn snapshot(&self) -> Vec<DriverRef<A>> {
      self.drivers.read().clone()
   }

   /// Probes every driver, returning how many accepted the adapter.
   pub async fn probe_all(&self, adapter: &A) -> usize {
      let mut accepted = 0;
      for driver in self.snapshot() {
         match driver.probe(adapter).await {
            Ok(()) => accepted += 1,
            Err(e) => warn!(
               "Driver {} failed to probe {}: {e} ({})",
               driver.name(),
               adapter.name(),
               e.errno()
            ),
         }
      }
      accepted
   }

   pub fn remove_all(&self, adapter: &A) {
      for driver in self.snapshot() {
         driver.remove(adapter);
      }
   }
}

/// Registers the form-factor driver.
pub fn init<A: ClassAdapter>(registry: &DriverRegistry<A>, config: &Config) -> Result<()> {
   let classifier = FormFactorClassifier::new(SystemBus, RawHci, config.reply_timeout());
   registry.register(Arc::new(classifier))?;
   info!("Loaded {PLUGIN_NAME} plugin");
   Ok(())
}

/// Unregisters the form-factor driver.
pub fn exit<A: ClassAdapter>(registry: &DriverRegistry<A>) {
   if registry.unregister(PLUGIN_NAME) {
      info!("Unloaded {PLUGIN_NAME} plugin");
   }
}
