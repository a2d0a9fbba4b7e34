// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarder configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.

use crate::advertisement::{
    AddressSelection, ServiceSettings, MAX_SERVICE_DATA_LEN, MUD_SERVICE_DATA,
    THREAD_ENTERPRISE_NUMBER,
};
use crate::topology::DeviceRole;
use crate::transport::MUD_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// MUD forwarder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Address to bind the notification endpoint to (default: `::`).
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Notification port (default: 1234).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enterprise number of the advertised service.
    #[serde(default = "default_enterprise_number")]
    pub enterprise_number: u32,

    /// Service data identifying the MUD forwarder service.
    #[serde(default = "default_service_data")]
    pub service_data: Vec<u8>,

    /// Publish the service as stable network data.
    #[serde(default = "default_true")]
    pub stable: bool,

    /// Own address to advertise. When unset, one is picked from the mesh
    /// stack's unicast addresses using `address_selection`.
    #[serde(default)]
    pub own_address: Option<Ipv6Addr>,

    /// Selection policy among mesh-local, non-RLOC addresses.
    #[serde(default)]
    pub address_selection: AddressSelection,

    /// Role assumed by the static topology when no mesh stack adapter is wired.
    #[serde(default)]
    pub initial_role: DeviceRole,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V6(Ipv6Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    MUD_PORT
}

fn default_enterprise_number() -> u32 {
    THREAD_ENTERPRISE_NUMBER
}

fn default_service_data() -> Vec<u8> {
    MUD_SERVICE_DATA.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            enterprise_number: default_enterprise_number(),
            service_data: default_service_data(),
            stable: true,
            own_address: None,
            address_selection: AddressSelection::default(),
            initial_role: DeviceRole::default(),
            log_level: default_log_level(),
        }
    }
}

impl ForwarderConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.service_data.is_empty() {
            return Err(ConfigError::Invalid("service_data cannot be empty".into()));
        }
        if self.service_data.len() > MAX_SERVICE_DATA_LEN {
            return Err(ConfigError::Invalid(format!(
                "service_data is {} bytes (max {})",
                self.service_data.len(),
                MAX_SERVICE_DATA_LEN
            )));
        }
        if let Some(addr) = self.own_address {
            if addr.is_unspecified() || addr.is_multicast() {
                return Err(ConfigError::Invalid(format!(
                    "own_address {} is not a unicast address",
                    addr
                )));
            }
        }
        Ok(())
    }

    /// Socket address the notification endpoint binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl From<&ForwarderConfig> for ServiceSettings {
    fn from(config: &ForwarderConfig) -> Self {
        Self {
            enterprise_number: config.enterprise_number,
            service_data: config.service_data.clone(),
            stable: config.stable,
            own_address: config.own_address,
            selection: config.address_selection,
        }
    }
}
