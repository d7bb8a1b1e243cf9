//! exitlist - Tor exit policy engine.
//!
//! This crate answers two questions about Tor relays, given a feed of
//! their published exit policies:
//!
//! - is this address a Tor exit that can reach our service?
//! - which exits can reach a given address and port?
//!
//! # Features
//!
//! - **First-match-wins policies**: each relay's rules are evaluated in
//!   order, falling back to the relay's default action
//! - **Precomputed classification**: `is_tor` is a single hash lookup
//!   against a table computed once per snapshot for the canonical target
//! - **Two enumeration strategies**: sequential scan or a centered
//!   interval tree over rule port ranges
//! - **Incremental reloads**: relays missing from a feed are carried
//!   forward and aged instead of disappearing
//! - **Hot reload**: snapshots are swapped atomically; readers never block
//!
//! # Quick Start
//!
//! ```ignore
//! use exitlist::{AddressPort, LoadMode, Loader};
//! use std::fs::File;
//!
//! let loader = Loader::default();
//! let set = loader.load(File::open("data/exit-policies")?, LoadMode::Full)?;
//!
//! if let Some(fingerprint) = set.is_tor("1.2.3.4") {
//!     println!("Tor exit {}", fingerprint);
//! }
//!
//! let target = AddressPort::new("93.184.216.34", 443);
//! set.dump(&mut std::io::stdout(), &target, 16)?;
//! ```
//!
//! # Serving
//!
//! Long-running services hold a [`ReloadManager`], which owns the current
//! snapshot and rebuilds it from a [`FeedSource`] on every trigger:
//!
//! ```ignore
//! use exitlist::{Loader, ReloadManager, ServiceConfig};
//! use std::sync::Arc;
//!
//! let config = ServiceConfig::from_yaml_file("exitlist.yaml")?;
//! let manager = Arc::new(ReloadManager::start(
//!     Loader::new(config.engine.clone()),
//!     config.open_source(),
//! )?);
//! let handle = manager.spawn_worker()?;
//! handle.trigger();
//! ```

mod dump;
mod error;
mod target;

pub mod config;
pub mod feed;
pub mod heuristic;
pub mod loader;
pub mod policy;
pub mod policyset;
pub mod reload;
pub mod rule;
pub mod source;

// Re-export core types
pub use error::{Error, RecordError, Result};
pub use target::{valid_port, AddressPort, Destination, MAX_PORT};

pub use policy::{Policy, RuleList};
pub use rule::{AddressSpec, PortRange, Rule};

// Re-export snapshot types
pub use policyset::{EngineConfig, ExitEntry, PolicySet, Strategy};

pub use config::ServiceConfig;
pub use loader::{LoadMode, Loader};
pub use reload::{ReloadHandle, ReloadManager, ReloadState};
pub use source::{FeedFetch, FeedSource, FileSource, HttpSource};
