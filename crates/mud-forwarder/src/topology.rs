// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh topology interface.
//!
//! The mesh stack owns role computation and address assignment; the forwarder
//! only observes them through [`TopologyProvider`] and change notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Device role within the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    #[default]
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

impl DeviceRole {
    /// Router or leader: roles that advertise services for the mesh.
    pub fn is_router_class(self) -> bool {
        matches!(self, DeviceRole::Router | DeviceRole::Leader)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceRole::Disabled => "disabled",
            DeviceRole::Detached => "detached",
            DeviceRole::Child => "child",
            DeviceRole::Router => "router",
            DeviceRole::Leader => "leader",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(DeviceRole::Disabled),
            "detached" => Ok(DeviceRole::Detached),
            "child" => Ok(DeviceRole::Child),
            "router" => Ok(DeviceRole::Router),
            "leader" => Ok(DeviceRole::Leader),
            other => Err(format!("unknown device role: {}", other)),
        }
    }
}

/// Set of topology aspects reported as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangedFlags(u32);

impl ChangedFlags {
    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// A unicast address was added
    pub const IP6_ADDRESS_ADDED: Self = Self(1 << 0);

    /// A unicast address was removed
    pub const IP6_ADDRESS_REMOVED: Self = Self(1 << 1);

    /// Device role changed
    pub const ROLE_CHANGED: Self = Self(1 << 2);

    /// Partition ID changed
    pub const PARTITION_ID_CHANGED: Self = Self(1 << 4);

    /// Network data changed
    pub const NETWORK_DATA_CHANGED: Self = Self(1 << 9);

    /// Check if flag is set
    pub fn contains(&self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Set a flag
    pub fn set(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    /// Get raw value
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Create from raw value
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl std::ops::BitOr for ChangedFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A unicast address assigned to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicastAddress {
    pub address: Ipv6Addr,
    /// Address lives in the mesh-local prefix
    pub mesh_local: bool,
    /// Address is a routing locator (changes with topology)
    pub rloc: bool,
}

impl UnicastAddress {
    /// Mesh-local, non-RLOC: stable enough to advertise.
    pub fn is_advertisable(&self) -> bool {
        self.mesh_local && !self.rloc
    }
}

/// Read-only view of the mesh stack's topology state.
pub trait TopologyProvider {
    /// Current device role.
    fn role(&self) -> DeviceRole;

    /// Unicast addresses currently assigned, in stack order.
    fn unicast_addresses(&self) -> Vec<UnicastAddress>;
}

/// Fixed topology, set explicitly by its owner.
///
/// Used by the daemon when no mesh stack adapter is wired, and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    role: DeviceRole,
    addresses: Vec<UnicastAddress>,
}

impl StaticTopology {
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            addresses: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: UnicastAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Change role, returning the previous one.
    pub fn set_role(&mut self, role: DeviceRole) -> DeviceRole {
        std::mem::replace(&mut self.role, role)
    }

    pub fn add_address(&mut self, address: UnicastAddress) {
        self.addresses.push(address);
    }

    pub fn remove_address(&mut self, address: &Ipv6Addr) {
        self.addresses.retain(|a| &a.address != address);
    }
}

impl TopologyProvider for StaticTopology {
    fn role(&self) -> DeviceRole {
        self.role
    }

    fn unicast_addresses(&self) -> Vec<UnicastAddress> {
        self.addresses.clone()
    }
}
