//! Form-factor classifier driver.
//!
//! On probe the classifier asks HAL for the machine form factor and returns
//! right away. When the reply arrives the adapter's class of device is
//! rewritten to the Computer major class with a matching minor class.
//! Each adapter owns its own bus connection and pending request, both
//! released by `remove`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{task::JoinHandle, time};

use crate::{
   bluetooth::{adapter::ClassAdapter, hci::HciAccess},
   error::{FormFactorError, Result},
   formfactor::{
      class::{DeviceClass, MAJOR_COMPUTER, minor_class_for, set_major_class, set_minor_class},
      hal::{BusConnector, FORMFACTOR_PROPERTY, HalBus, PendingReply},
   },
   plugin::{AdapterDriver, PLUGIN_NAME},
};

/// Per-adapter state: the bus connection and the completion task.
struct Probed<B> {
   _bus: B,
   task: JoinHandle<()>,
}

impl<B> Drop for Probed<B> {
   fn drop(&mut self) {
      self.task.abort();
   }
}

/// Per-adapter bookkeeping. Probes still waiting on the bus are tracked by
/// token so that a `remove` (or newer probe) landing meanwhile wins.
struct State<B> {
   probed: HashMap<SmolStr, Probed<B>>,
   probing: HashMap<SmolStr, u64>,
   next_token: u64,
}

impl<B> Default for State<B> {
   fn default() -> Self {
      Self {
         probed: HashMap::new(),
         probing: HashMap::new(),
         next_token: 0,
      }
   }
}

pub struct FormFactorClassifier<C: BusConnector, H: HciAccess> {
   connector: C,
   hci: Arc<H>,
   reply_timeout: Option<Duration>,
   state: Mutex<State<C::Bus>>,
}

impl<C: BusConnector, H: HciAccess> FormFactorClassifier<C, H> {
   pub fn new(connector: C, hci: H, reply_timeout: Option<Duration>) -> Self {
      Self {
         connector,
         hci: Arc::new(hci),
         reply_timeout,
         state: Mutex::new(State::default()),
      }
   }

   /// Sends the form-factor request for `adapter` without waiting for it.
   pub async fn probe<A: ClassAdapter>(&self, adapter: &A) -> Result<()> {
      let name = SmolStr::from(adapter.name());

      let (token, previous) = {
         let mut state = self.state.lock();
         state.next_token += 1;
         let token = state.next_token;
         state.probing.insert(name.clone(), token);
         (token, state.probed.remove(&name))
      };
      if previous.is_some() {
         warn!("Adapter {name} probed again, dropping its previous form factor request");
      }
      drop(previous);

      let request = self.send_request().await;

      let mut state = self.state.lock();
      let current = state.probing.get(&name) == Some(&token);
      if current {
         state.probing.remove(&name);
      }
      let (bus, reply) = request?;
      if !current {
         drop(state);
         debug!("Adapter {name} went away while probing, dropping its form factor request");
         return Ok(());
      }

      let task = tokio::spawn(complete(
         reply,
         self.reply_timeout,
         adapter.clone(),
         Arc::clone(&self.hci),
      ));
      state.probed.insert(name, Probed { _bus: bus, task });
      drop(state);

      debug!("Form factor request queued for {}", adapter.name());
      Ok(())
   }

   async fn send_request(&self) -> Result<(C::Bus, PendingReply)> {
      let bus = self.connector.connect().await?;
      let reply = bus.get_property_string(FORMFACTOR_PROPERTY).await?;
      Ok((bus, reply))
   }

   /// Cancels any pending request for `adapter` and releases its connection.
   pub fn remove<A: ClassAdapter>(&self, adapter: &A) {
      let probed = {
         let mut state = self.state.lock();
         state.probing.remove(adapter.name());
         state.probed.remove(adapter.name())
      };
      match probed {
         Some(probed) => {
            if !probed.task.is_finished() {
               debug!("Cancelling pending form factor request for {}", adapter.name());
            }
            drop(probed);
            debug!(
               "Released bus connection for {} ({} still held, {} pending)",
               adapter.name(),
               self.held_connections(),
               self.pending_requests()
            );
         },
         None => debug!("No form factor state held for {}", adapter.name()),
      }
   }

   /// Number of requests whose completion has not run yet.
   pub fn pending_requests(&self) -> usize {
      self
         .state
         .lock()
         .probed
         .values()
         .filter(|p| !p.task.is_finished())
         .count()
   }

   /// Number of adapters currently holding a bus connection.
   pub fn held_connections(&self) -> usize {
      self.state.lock().probed.len()
   }
}

impl<A, C, H> AdapterDriver<A> for FormFactorClassifier<C, H>
where
   A: ClassAdapter,
   C: BusConnector,
   H: HciAccess,
{
   fn name(&self) -> &'static str {
      PLUGIN_NAME
   }

   fn probe<'a>(&'a self, adapter: &'a A) -> BoxFuture<'a, Result<()>> {
      Box::pin(Self::probe(self, adapter))
   }

   fn remove(&self, adapter: &A) {
      Self::remove(self, adapter);
   }
}

async fn complete<A: ClassAdapter, H: HciAccess>(
   reply: PendingReply,
   reply_timeout: Option<Duration>,
   adapter: A,
   hci: Arc<H>,
) {
   let reply = match reply_timeout {
      Some(limit) => time::timeout(limit, reply)
         .await
         .unwrap_or(Err(FormFactorError::RequestTimeout)),
      None => reply.await,
   };

   let formfactor = match reply {
      Ok(formfactor) => formfactor,
      Err(e) => {
         error!("Wrong formfactor arguments for {}: {e}", adapter.name());
         return;
      },
   };

   match apply_formfactor(&formfactor, &adapter, &*hci).await {
      Ok(cls) => info!(
         "Advertising {} as a computer ({}), device class {cls}",
         adapter.name(),
         if formfactor.is_empty() { "unknown" } else { formfactor.as_str() },
      ),
      Err(e) => warn!("Leaving device class of {} unchanged: {e}", adapter.name()),
   }
}

/// Writes the Computer major class and the minor class matching
/// `formfactor` to `adapter`. Returns the class that was written.
///
/// The raw handle is closed before returning, whether or not the writes
/// succeeded.
pub async fn apply_formfactor<A: ClassAdapter, H: HciAccess>(
   formfactor: &str,
   adapter: &A,
   hci: &H,
) -> Result<DeviceClass> {
   debug!("Computer is classified as {formfactor}");

   let minor = minor_class_for(Some(formfactor).filter(|s| !s.is_empty()));

   let mut cls = adapter.class().await?;
   debug!(
      "Current device class of {} is {cls} (major 0x{:02x}, minor 0x{:02x})",
      adapter.name(),
      cls.major(),
      cls.minor()
   );

   let mut dd = hci.open(adapter.dev_id())?;

   debug!(
      "Setting 0x{:06x} for major/minor device class",
      (u32::from(MAJOR_COMPUTER) << 8) | u32::from(minor)
   );

   set_major_class(&mut dd, &mut cls, MAJOR_COMPUTER)?;
   set_minor_class(&mut dd, &mut cls, minor)?;

   Ok(cls)
}
