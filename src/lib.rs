//! Tally GW - switcher on-air state to OSC tally lights
//!
//! Library half of the `tally-gw` binary: state engine, OSC codec,
//! transport, switcher feed and configuration.

pub mod config;
pub mod logging;
pub mod osc;
pub mod paths;
pub mod sniffer;
pub mod switcher;
pub mod tally;
pub mod transport;
