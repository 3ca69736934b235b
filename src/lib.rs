//! # libshadow - Device-side cloud shadow agent
//!
//! A Rust library that keeps a set of named device parameters synchronized with a
//! cloud shadow (device twin) service over a pub/sub transport, and coordinates
//! over-the-air firmware delivery through the same channel. It is designed for
//! embedded systems and supports `no_std` environments.
//!
//! ## Features
//!
//! ### Parameter synchronization
//! - Static identity attributes reported once at boot
//! - Dynamic parameters changeable locally or from the cloud
//! - Dirty tracking folded into bounded-size shadow update documents
//!
//! ### Single-task execution model
//! - One long-running task owns all mutable state
//! - A lock-free bounded work queue is the only cross-context handoff
//!
//! ### Over-the-air updates
//! - Version-compare driven upgrade decisions
//! - A reboot-surviving persisted flag distinguishing app-initiated and
//!   cloud-forced updates
//! - Exactly-once terminal status reporting
//!
//! ### Diagnostics
//! - Periodic reporting hooks that always execute in the agent task's context
//! - One-shot payload publishing with caller-selectable ownership
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libshadow = "0.1.0"
//! ```
//!
//! ### Basic agent setup
//!
//! ```rust,no_run
//! use libshadow::agent::{Agent, AgentEvent, DeviceConfig};
//! use libshadow::queue::WorkQueue;
//! use libshadow::ota::NoOta;
//! # use libshadow::transport::{Transport, InboundMessage};
//! # use libshadow::storage::KeyValueStorage;
//! # struct MockTransport;
//! # impl Transport for MockTransport {
//! #     type Error = ();
//! #     fn connect(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn disconnect(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn publish(&mut self, _t: &str, _p: &[u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn subscribe(&mut self, _t: &str) -> Result<(), Self::Error> { Ok(()) }
//! #     fn unsubscribe(&mut self, _t: &str) -> Result<(), Self::Error> { Ok(()) }
//! #     fn poll(&mut self, _ms: u32) -> Result<Option<InboundMessage>, Self::Error> { Ok(None) }
//! # }
//! # struct MockStorage;
//! # impl KeyValueStorage for MockStorage {
//! #     type Error = ();
//! #     fn get(&mut self, _k: &str, _b: &mut [u8]) -> Result<Option<usize>, Self::Error> { Ok(None) }
//! #     fn set_u8(&mut self, _k: &str, _v: u8) -> Result<(), Self::Error> { Ok(()) }
//! #     fn get_u8(&mut self, _k: &str) -> Result<Option<u8>, Self::Error> { Ok(None) }
//! # }
//! # let transport = MockTransport;
//! # let storage = MockStorage;
//!
//! let queue = WorkQueue::new();
//! let config = DeviceConfig {
//!     name: "Smart Outlet",
//!     device_type: "Outlets",
//!     model: "Outlet-1",
//!     fw_version: "1.0.0",
//!     static_params_count: 1,
//!     dynamic_params_count: 2,
//! };
//!
//! // let mut agent: Agent<_, _, NoOta> = Agent::new(config, transport, storage, &queue)?;
//! // agent.add_dynamic_bool_param("output", true, None)?;
//! // agent.run(&mut |event: AgentEvent| { /* InitDone / OtaStart / OtaEnd */ })?;
//! ```
//!
//! ## Platform support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Crate-wide error type covering configuration, transport, protocol and
/// capacity failures.
pub mod error;

/// Typed parameter values shared by the static and dynamic tables.
pub mod value;

/// The parameter store: static identity attributes and dynamic mutable state
/// with dirty tracking.
pub mod param;

/// The cross-context work queue feeding the agent task.
pub mod queue;

/// The narrow pub/sub transport contract the agent requires, plus topic
/// construction helpers.
pub mod transport;

/// Reboot-surviving key-value storage contract for device identity and OTA
/// bookkeeping.
pub mod storage;

/// Shadow update document construction and remote delta application.
pub mod shadow;

/// Over-the-air update engine: version comparison, status reporting and the
/// persisted upgrade-outcome flag.
pub mod ota;

/// Periodic and one-shot diagnostics reporting layered on the work queue.
pub mod diagnostics;

/// The agent itself: configuration, lifecycle events and the task loop.
pub mod agent;
