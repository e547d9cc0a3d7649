//! Soft access point lifecycle management: a two-state soft AP machine with a serialized
//! command mailbox, client admission and roster tracking, idle auto-shutdown, dual-band and
//! OWE transition interface topologies, and a scan-result cache.  The native hostapd/nl80211
//! layer is consumed through the [driver::ApDriver] seam.

pub mod ap_state;
pub mod capability;
pub mod command;
pub mod config;
pub mod config_resolver;
pub mod config_store;
pub mod demux;
pub mod driver;
pub mod events;
pub mod mac_address;
pub mod manager;
pub mod metrics;
pub mod roster;
pub mod scan_cache;
pub mod shutdown_timer;
pub mod startup;

mod fsm;
