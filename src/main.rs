//! Bluetooth form-factor service
//!
//! This service advertises the machine form factor reported by HAL as the
//! class of device of every local Bluetooth adapter.

use std::sync::Arc;

use log::{info, warn};
use tokio::signal;

use bluetooth::{adapter::BluezAdapter, manager::AdapterManager};
use plugin::DriverRegistry;

mod bluetooth;
mod config;
mod error;
mod formfactor;
mod plugin;

use crate::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting btformfactord...");

   // Load configuration
   let config = config::Config::load()?;
   info!(
      "Loaded configuration with {} ignored adapters",
      config.ignored_adapters.len()
   );

   // Register drivers
   let registry = Arc::new(DriverRegistry::<BluezAdapter>::new());
   plugin::init(&registry, &config)?;
   if registry.is_empty() {
      warn!("No adapter drivers registered");
   } else {
      info!("{} adapter driver(s) registered", registry.len());
   }

   // Bind drivers to adapters as they come and go
   let manager = AdapterManager::new(registry.clone(), config).await?;

   // Wait for shutdown signal
   signal::ctrl_c().await?;
   info!("Shutting down btformfactord...");

   manager.shutdown().await?;
   plugin::exit(&registry);

   Ok(())
}
