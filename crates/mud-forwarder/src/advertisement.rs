// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service advertisement state machine.
//!
//! Publishes a network-wide service record pointing at the forwarder's own
//! mesh address so peers know where to send their MUD notifications.
//!
//! ```text
//!                 role -> router/leader (publish ok)
//!  Unregistered -------------------------------------> Registered
//!       ^   |                                              |
//!       |   +-- publish failed / no own address (retry)    |
//!       |                                                  |
//!       +---- record no longer in registry (expired) ------+
//! ```
//!
//! There is no explicit withdrawal when the role drops below router: the
//! record is left to the registry's own expiry, which is detected on the next
//! qualifying event and repaired by re-publishing.

use crate::topology::{ChangedFlags, DeviceRole, TopologyProvider, UnicastAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use thiserror::Error;

/// IANA enterprise number under which mesh services are registered.
pub const THREAD_ENTERPRISE_NUMBER: u32 = 44970;

/// Service data identifying the MUD forwarder service.
pub const MUD_SERVICE_DATA: &[u8] = &[0x4D];

/// Largest service data the registry accepts.
pub const MAX_SERVICE_DATA_LEN: usize = 252;

/// Size of the server data blob (one IPv6 address).
pub const SERVER_DATA_LEN: usize = 16;

/// Registration failures. Never fatal; retried on the next qualifying event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("no usable own address (mesh-local, non-RLOC)")]
    NoOwnAddress,

    #[error("registry rejected record: {0}")]
    Rejected(String),
}

/// Service record published on behalf of this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRecord {
    pub enterprise_number: u32,
    pub stable: bool,
    pub service_data: Vec<u8>,
    server_data: [u8; SERVER_DATA_LEN],
}

impl AdvertisementRecord {
    /// Build a record whose server data is `address`.
    pub fn new(
        enterprise_number: u32,
        stable: bool,
        service_data: &[u8],
        address: Ipv6Addr,
    ) -> Self {
        Self {
            enterprise_number,
            stable,
            service_data: service_data.to_vec(),
            server_data: address.octets(),
        }
    }

    pub fn server_data(&self) -> &[u8] {
        &self.server_data
    }

    pub fn server_data_len(&self) -> usize {
        self.server_data.len()
    }

    pub fn service_data_len(&self) -> usize {
        self.service_data.len()
    }

    /// Address carried in the server data.
    pub fn forwarder_address(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.server_data)
    }

    /// Same service identifier (a later record with it supersedes this one).
    pub fn same_service(&self, other: &Self) -> bool {
        self.enterprise_number == other.enterprise_number && self.service_data == other.service_data
    }
}

/// Network-wide service registry.
pub trait ServiceRegistry {
    /// Publish (or supersede) a record and run the registration handshake.
    fn publish(&mut self, record: &AdvertisementRecord) -> Result<(), RegistrationError>;

    /// True if a record with this identifier is currently registered.
    fn contains(&self, enterprise_number: u32, service_data: &[u8]) -> bool;
}

/// In-process registry keyed by service identifier.
#[derive(Debug, Default)]
pub struct LocalServiceRegistry {
    records: HashMap<(u32, Vec<u8>), AdvertisementRecord>,
}

impl LocalServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        enterprise_number: u32,
        service_data: &[u8],
    ) -> Option<&AdvertisementRecord> {
        self.records.get(&(enterprise_number, service_data.to_vec()))
    }

    /// Drop a record, as registry expiry would.
    pub fn expire(
        &mut self,
        enterprise_number: u32,
        service_data: &[u8],
    ) -> Option<AdvertisementRecord> {
        self.records.remove(&(enterprise_number, service_data.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ServiceRegistry for LocalServiceRegistry {
    fn publish(&mut self, record: &AdvertisementRecord) -> Result<(), RegistrationError> {
        if record.service_data.len() > MAX_SERVICE_DATA_LEN {
            return Err(RegistrationError::Rejected(format!(
                "service data of {} bytes exceeds {}",
                record.service_data.len(),
                MAX_SERVICE_DATA_LEN
            )));
        }
        self.records.insert(
            (record.enterprise_number, record.service_data.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn contains(&self, enterprise_number: u32, service_data: &[u8]) -> bool {
        self.get(enterprise_number, service_data).is_some()
    }
}

/// Which advertisable unicast address to use as own address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSelection {
    /// First mesh-local, non-RLOC address in stack order
    #[default]
    First,
    /// Last mesh-local, non-RLOC address in stack order
    Last,
}

impl AddressSelection {
    pub fn select(self, addresses: &[UnicastAddress]) -> Option<Ipv6Addr> {
        let mut candidates = addresses.iter().filter(|a| a.is_advertisable());
        let picked = match self {
            AddressSelection::First => candidates.next(),
            AddressSelection::Last => candidates.last(),
        };
        picked.map(|a| a.address)
    }
}

/// Static parameters of the advertised service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub enterprise_number: u32,
    pub service_data: Vec<u8>,
    pub stable: bool,
    /// Pinned own address; overrides `selection` when set.
    pub own_address: Option<Ipv6Addr>,
    pub selection: AddressSelection,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            enterprise_number: THREAD_ENTERPRISE_NUMBER,
            service_data: MUD_SERVICE_DATA.to_vec(),
            stable: true,
            own_address: None,
            selection: AddressSelection::First,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementState {
    Unregistered,
    Registered,
}

/// Successful outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A record was handed to the registry.
    Published,
    /// Record already registered; nothing sent.
    AlreadyRegistered,
}

/// Keeps the service record in step with the node's mesh role.
#[derive(Debug)]
pub struct Advertiser {
    settings: ServiceSettings,
    state: AdvertisementState,
    published: Option<AdvertisementRecord>,
}

impl Advertiser {
    pub fn new(settings: ServiceSettings) -> Self {
        Self {
            settings,
            state: AdvertisementState::Unregistered,
            published: None,
        }
    }

    pub fn state(&self) -> AdvertisementState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state == AdvertisementState::Registered
    }

    /// Last record successfully published.
    pub fn published(&self) -> Option<&AdvertisementRecord> {
        self.published.as_ref()
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// React to a topology change.
    ///
    /// Qualifying events:
    /// - role changed into router or leader
    /// - address added while router-class and still unregistered (a previous
    ///   attempt may have lacked an own address)
    /// - address removed while registered, when the removed address is the
    ///   one the published record points at
    ///
    /// Returns `None` when the event does not qualify.
    pub fn on_topology_changed<T, R>(
        &mut self,
        previous: DeviceRole,
        current: DeviceRole,
        flags: ChangedFlags,
        topology: &T,
        registry: &mut R,
    ) -> Option<Result<RegistrationOutcome, RegistrationError>>
    where
        T: TopologyProvider + ?Sized,
        R: ServiceRegistry + ?Sized,
    {
        if !current.is_router_class() {
            return None;
        }

        let became_router =
            flags.contains(ChangedFlags::ROLE_CHANGED) && previous != current;
        let address_appeared = flags.contains(ChangedFlags::IP6_ADDRESS_ADDED)
            && self.state == AdvertisementState::Unregistered;
        let address_lost = flags.contains(ChangedFlags::IP6_ADDRESS_REMOVED)
            && self.state == AdvertisementState::Registered
            && self.published_address_gone(topology);

        if !became_router && !address_appeared && !address_lost {
            return None;
        }
        if address_lost {
            tracing::info!("Advertised address no longer assigned, re-publishing");
            self.state = AdvertisementState::Unregistered;
        }

        tracing::debug!(
            "Topology change {} -> {} (flags=0x{:x}) triggers registration",
            previous,
            current,
            flags.bits()
        );
        Some(self.register_now(topology, registry))
    }

    /// Publish the service record unless it is already registered.
    pub fn register_now<T, R>(
        &mut self,
        topology: &T,
        registry: &mut R,
    ) -> Result<RegistrationOutcome, RegistrationError>
    where
        T: TopologyProvider + ?Sized,
        R: ServiceRegistry + ?Sized,
    {
        if self.state == AdvertisementState::Registered {
            if registry.contains(self.settings.enterprise_number, &self.settings.service_data) {
                tracing::debug!("MUD service already registered, skipping");
                return Ok(RegistrationOutcome::AlreadyRegistered);
            }
            tracing::warn!("MUD service record no longer in registry, re-publishing");
            self.state = AdvertisementState::Unregistered;
        }

        let address = self.own_address(topology).ok_or_else(|| {
            tracing::warn!("MUD service registration deferred: no own address yet");
            RegistrationError::NoOwnAddress
        })?;

        let record = AdvertisementRecord::new(
            self.settings.enterprise_number,
            self.settings.stable,
            &self.settings.service_data,
            address,
        );

        if let Err(err) = registry.publish(&record) {
            tracing::warn!("MUD service registration failed: {}", err);
            return Err(err);
        }

        tracing::info!(
            "MUD service registered (enterprise={}, address={})",
            record.enterprise_number,
            address
        );
        self.state = AdvertisementState::Registered;
        self.published = Some(record);
        Ok(RegistrationOutcome::Published)
    }

    /// A pinned address is never considered gone.
    fn published_address_gone<T: TopologyProvider + ?Sized>(&self, topology: &T) -> bool {
        if self.settings.own_address.is_some() {
            return false;
        }
        let Some(record) = &self.published else {
            return false;
        };
        let advertised = record.forwarder_address();
        !topology
            .unicast_addresses()
            .iter()
            .any(|a| a.address == advertised)
    }

    fn own_address<T: TopologyProvider + ?Sized>(&self, topology: &T) -> Option<Ipv6Addr> {
        self.settings
            .own_address
            .or_else(|| self.settings.selection.select(&topology.unicast_addresses()))
    }
}
