//! # MQTT Integration Module
//!
//! The terminal's conversation with the queue server: one publish topic for ticket requests,
//! one subscribe topic on which the server announces the assigned number.
//!
//! ## Why This Module Exists
//!
//! Broker connectivity is the part of the device that fails most often in the field (server
//! rebooted, wrong address after a router swap, WiFi up but broker unreachable). This module
//! keeps that failure local: requests made while offline are buffered and replayed, failed
//! connects are retried, and a broker that stays unreachable escalates to the operator.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker endpoint derived from the device config
//! ├── message_manager.rs  - Outbound/inbound message types, ticket number parsing
//! ├── backlog.rs          - Bounded FIFO of undelivered publishes
//! ├── transport.rs        - BrokerTransport trait and the rumqttc implementation
//! └── mqtt_handler.rs     - Broker session state machine and inbound handling
//! ```
//!
//! ## Delivery Semantics
//!
//! - Connected: publishes go straight to the transport
//! - Disconnected: publishes are queued in the [`backlog::OutboundBacklog`]
//! - On (re)connect: subscribe first, then drain the backlog in FIFO order
//!
//! Replay is at-most-once. A message that fails during the drain is logged and dropped.

pub mod backlog;
pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
pub mod transport;
