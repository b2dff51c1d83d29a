//! Adapter lifecycle tracking.
//!
//! This module watches the BlueZ adapter list and turns adapters appearing
//! and disappearing into driver `probe` and `remove` calls.

use std::{
   collections::{HashMap, HashSet},
   sync::Arc,
};

use bluer::Session;
use log::{debug, info, warn};
use smol_str::SmolStr;
use tokio::{
   select,
   sync::{mpsc, oneshot},
   time::{self, MissedTickBehavior},
};

use crate::{
   bluetooth::adapter::BluezAdapter,
   config::Config,
   error::{FormFactorError, Result},
   plugin::DriverRegistry,
};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 16;

#[derive(Debug)]
enum ManagerCommand {
   Shutdown(oneshot::Sender<()>),
}

/// Adapters that appeared and vanished between two listings.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AdapterDiff {
   pub added: Vec<SmolStr>,
   pub removed: Vec<SmolStr>,
}

/// Compares the adapters we know about with the ones currently present.
pub fn diff_adapters(known: &HashSet<SmolStr>, current: &HashSet<SmolStr>) -> AdapterDiff {
   let mut added: Vec<SmolStr> = current.difference(known).cloned().collect();
   let mut removed: Vec<SmolStr> = known.difference(current).cloned().collect();
   added.sort_unstable();
   removed.sort_unstable();
   AdapterDiff { added, removed }
}

// === Main Manager ===

/// Handle to the actor that binds drivers to BlueZ adapters.
pub struct AdapterManager {
   inbox: mpsc::Sender<ManagerCommand>,
}

impl AdapterManager {
   pub async fn new(registry: Arc<DriverRegistry<BluezAdapter>>, config: Config) -> Result<Self> {
      let session = Session::new().await?;
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(
         ManagerActor {
            config,
            registry,
            session,
            command_rx,
            adapters: HashMap::new(),
         }
         .run(),
      );
      Ok(Self { inbox: command_tx })
   }

   /// Removes every adapter from every driver and stops the actor.
   pub async fn shutdown(&self) -> Result<()> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(ManagerCommand::Shutdown(tx))
         .await
         .map_err(|_| FormFactorError::ManagerShutdown)?;
      rx.await.map_err(|_| FormFactorError::ManagerShutdown)
   }
}

// === Manager Actor ===

struct ManagerActor {
   config: Config,
   registry: Arc<DriverRegistry<BluezAdapter>>,
   session: Session,
   command_rx: mpsc::Receiver<ManagerCommand>,

   // State
   adapters: HashMap<SmolStr, BluezAdapter>,
}

impl ManagerActor {
   async fn run(mut self) {
      info!("Adapter manager starting up");

      self.sync_adapters().await;

      let mut adapter_check_interval = time::interval(self.config.adapter_check_interval());
      adapter_check_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

      loop {
         select! {
             _ = adapter_check_interval.tick() => {
                 self.sync_adapters().await;
             }
             cmd = self.command_rx.recv() => {
                 match cmd {
                     Some(ManagerCommand::Shutdown(reply)) => {
                         self.cleanup();
                         let _ = reply.send(());
                         break;
                     },
                     None => {
                         info!("Adapter manager shutting down");
                         self.cleanup();
                         break;
                     },
                 }
             }
         }
      }
   }

   async fn sync_adapters(&mut self) {
      let names = match self.session.adapter_names().await {
         Ok(names) => names,
         Err(e) => {
            warn!("Failed to poll adapter names: {e}. Retrying later.");
            return;
         },
      };

      let current: HashSet<SmolStr> = names
         .into_iter()
         .map(SmolStr::from)
         .filter(|name| !self.config.is_ignored(name))
         .collect();
      let known: HashSet<SmolStr> = self.adapters.keys().cloned().collect();

      let diff = diff_adapters(&known, &current);
      for name in diff.removed {
         self.remove_adapter(&name);
      }
      for name in diff.added {
         self.add_adapter(name).await;
      }
   }

   async fn add_adapter(&mut self, name: SmolStr) {
      let adapter = match self.session.adapter(&name) {
         Ok(adapter) => adapter,
         Err(e) => {
            warn!("Failed to open adapter {name}: {e}");
            return;
         },
      };
      let adapter = match BluezAdapter::new(adapter) {
         Ok(adapter) => adapter,
         Err(e) => {
            warn!("Skipping adapter {name}: {e}");
            return;
         },
      };

      let bound = self.registry.probe_all(&adapter).await;
      info!("Adapter {name} registered, {bound} driver(s) bound");
      self.adapters.insert(name, adapter);
   }

   fn remove_adapter(&mut self, name: &str) {
      if let Some(adapter) = self.adapters.remove(name) {
         info!("Adapter {name} removed");
         self.registry.remove_all(&adapter);
      }
   }

   fn cleanup(&mut self) {
      debug!("Releasing {} adapter(s)", self.adapters.len());
      for (_, adapter) in self.adapters.drain() {
         self.registry.remove_all(&adapter);
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn set(names: &[&str]) -> HashSet<SmolStr> {
      names.iter().copied().map(SmolStr::from).collect()
   }

   #[test]
   fn test_diff_detects_added_and_removed() {
      let diff = diff_adapters(&set(&["hci0", "hci1"]), &set(&["hci1", "hci3", "hci2"]));
      assert_eq!(
         diff,
         AdapterDiff {
            added: vec![SmolStr::new_static("hci2"), SmolStr::new_static("hci3")],
            removed: vec![SmolStr::new_static("hci0")],
         }
      );
   }

   #[test]
   fn test_diff_unchanged() {
      let adapters = set(&["hci0"]);
      assert_eq!(diff_adapters(&adapters, &adapters), AdapterDiff::default());
   }

   #[test]
   fn test_diff_from_empty() {
      let diff = diff_adapters(&HashSet::new(), &set(&["hci0"]));
      assert_eq!(diff.added, vec![SmolStr::new_static("hci0")]);
      assert!(diff.removed.is_empty());
   }
}
