// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MUD Forwarder
//!
//! Notification endpoint for mesh device onboarding: peer devices send their
//! Manufacturer Usage Description (MUD) URL and their own address to this
//! node over UDP, and this node advertises itself to the mesh through a
//! network-wide service record.
//!
//! # Components
//!
//! - **TLV Decoder** ([`tlv`]): bounds-checked scan of a TLV chain
//! - **Notification Decoder** ([`notification`]): extracts the MUD URL and
//!   device address with per-field diagnostics
//! - **Advertisement State Machine** ([`advertisement`]): (re-)publishes the
//!   service record on router/leader transitions
//! - **Forwarder Coordinator** ([`forwarder`]): endpoint lifecycle and event
//!   dispatch
//!
//! # Quick Start
//!
//! ```bash
//! # Listen on [::]:1234 as a router with a pinned own address
//! mud-forwarder --role router --own-address fd00::1
//!
//! # Send a test notification
//! mud-forwarder send --to [::1]:1234 --url https://example.com/mud.json --address fd00::2
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! port = 1234
//! address_selection = "first"
//! initial_role = "router"
//! ```

pub mod advertisement;
pub mod config;
pub mod forwarder;
pub mod notification;
pub mod tlv;
pub mod topology;
pub mod transport;

pub use advertisement::{
    AddressSelection, AdvertisementRecord, AdvertisementState, Advertiser, LocalServiceRegistry,
    RegistrationError, RegistrationOutcome, ServiceRegistry, ServiceSettings,
};
pub use config::{ConfigError, ForwarderConfig};
pub use forwarder::{
    Forwarder, ForwarderError, ForwarderStatsSnapshot, LogSink, MudNotification, NotificationSink,
};
pub use notification::{decode, DecodeIssue, Field, NotificationPayload};
pub use tlv::{find, Tlv, TlvCursor, TlvWriter};
pub use topology::{ChangedFlags, DeviceRole, StaticTopology, TopologyProvider, UnicastAddress};
pub use transport::{DatagramEndpoint, UdpEndpoint, MUD_PORT};
