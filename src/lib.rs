//! # echonet-controller
//!
//! A native ECHONET Lite LAN controller and Wi-SUN B-route smart meter
//! client. Two independent stacks share a frame codec and property
//! decoder:
//!
//! - [`controller`]: listens on the ECHONET Lite multicast/unicast UDP
//!   transport, discovers and polls home air conditioners, and publishes
//!   their temperatures to a metrics sink.
//! - [`electricity`]: drives a ROHM BP35C2 Wi-SUN module over a serial
//!   line to join a B-route smart meter's PAN and read its instantaneous
//!   power consumption.
//!
//! ```rust,ignore
//! use echonet_controller::config::Config;
//! use echonet_controller::controller::ControllerNode;
//! use echonet_controller::class_dictionary::ClassDictionary;
//! use echonet_controller::metrics::PrometheusSink;
//! use clap::Parser;
//! use std::sync::Arc;
//!
//! let config = Config::parse();
//! let dictionary = Arc::new(ClassDictionary::load(config.class_db_dir.as_ref()));
//! let metrics = Arc::new(PrometheusSink::new());
//! let mut node = ControllerNode::new(dictionary, metrics)?;
//! node.start()?;
//! ```

pub mod class_dictionary;
pub mod config;
pub mod controller;
pub mod decode;
pub mod electricity;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod object;
pub mod property;
pub mod serial_line;
pub mod transport;
pub mod wisun;

pub use error::{Error, Result};
