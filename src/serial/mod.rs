//! Serial port communication module for GNSS receivers
//!
//! This module provides functionality for:
//! - Listing available serial ports and detecting likely GNSS receivers
//! - Reading NMEA sentences from a serial connection
//! - Logging sentences to a file for a fixed duration

pub mod logger;
pub mod port;

pub use logger::{GnssLogger, LogConfig};
pub use port::{PortConfig, SerialConnection};
