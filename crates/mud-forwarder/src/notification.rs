// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MUD notification decoding.
//!
//! A peer announces itself with a TLV chain carrying its MUD URL and its own
//! network address. Both fields are copied into fixed-capacity buffers;
//! anything missing, oversized or malformed is reported as a [`DecodeIssue`]
//! and never aborts decoding of the other field.

use crate::tlv::{self, TlvCursor};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Tag carrying the MUD URL (text).
pub const TAG_MUD_URL: u8 = 0x01;

/// Tag carrying the device's own network address.
pub const TAG_DEVICE_ADDRESS: u8 = 0x02;

/// Capacity of a decoded field.
pub const MAX_FIELD_LEN: usize = 50;

/// Largest datagram payload considered for decoding (link MTU ceiling).
pub const MAX_PAYLOAD_SIZE: usize = 1500;

/// Non-fatal conditions found while decoding a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeIssue {
    #[error("MUD URL TLV absent")]
    UrlMissing,

    #[error("device address TLV absent")]
    AddressMissing,

    #[error("MUD URL value of {len} bytes exceeds 50-byte field")]
    UrlOversize { len: usize },

    #[error("device address value of {len} bytes exceeds 50-byte field")]
    AddressOversize { len: usize },

    #[error("TLV chain truncated at offset {offset}")]
    TruncatedChain { offset: usize },
}

/// Fixed-capacity copy of a TLV value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Field {
    buf: [u8; MAX_FIELD_LEN],
    len: u8,
}

impl Field {
    /// Copy `value` into a new field, or `None` if it does not fit.
    pub fn copy_from(value: &[u8]) -> Option<Self> {
        if value.len() > MAX_FIELD_LEN {
            return None;
        }
        let mut buf = [0u8; MAX_FIELD_LEN];
        buf[..value.len()].copy_from_slice(value);
        Some(Self {
            buf,
            len: value.len() as u8,
        })
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// Field contents as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Ok(s) => write!(f, "Field({:?})", s),
            Err(_) => write!(f, "Field({:02x?})", self.as_bytes()),
        }
    }
}

/// Result of decoding one notification datagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPayload {
    pub mud_url: Option<Field>,
    pub device_address: Option<Field>,
    pub issues: Vec<DecodeIssue>,
}

impl NotificationPayload {
    /// Both mandatory fields are present.
    pub fn is_complete(&self) -> bool {
        self.mud_url.is_some() && self.device_address.is_some()
    }

    /// MUD URL as text, if present and valid UTF-8.
    pub fn mud_url_str(&self) -> Option<&str> {
        self.mud_url.as_ref().and_then(|f| f.as_str().ok())
    }

    /// Device address as an IP address when it has an IPv6 (16 bytes) or
    /// IPv4 (4 bytes) shape.
    pub fn device_ip(&self) -> Option<IpAddr> {
        let bytes = self.device_address.as_ref()?.as_bytes();
        if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
            return Some(IpAddr::V6(Ipv6Addr::from(octets)));
        }
        if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
            return Some(IpAddr::V4(Ipv4Addr::from(octets)));
        }
        None
    }
}

/// Decode a notification payload.
pub fn decode(payload: &[u8]) -> NotificationPayload {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD_SIZE)];
    let mut result = NotificationPayload::default();

    result.mud_url = extract(
        payload,
        TAG_MUD_URL,
        DecodeIssue::UrlMissing,
        |len| DecodeIssue::UrlOversize { len },
        &mut result.issues,
    );
    result.device_address = extract(
        payload,
        TAG_DEVICE_ADDRESS,
        DecodeIssue::AddressMissing,
        |len| DecodeIssue::AddressOversize { len },
        &mut result.issues,
    );

    let mut cursor = TlvCursor::new(payload);
    while cursor.next().is_some() {}
    if let Some(offset) = cursor.truncated_at() {
        result.issues.push(DecodeIssue::TruncatedChain { offset });
    }

    result
}

fn extract(
    payload: &[u8],
    tag: u8,
    missing: DecodeIssue,
    oversize: impl FnOnce(usize) -> DecodeIssue,
    issues: &mut Vec<DecodeIssue>,
) -> Option<Field> {
    let Some(tlv) = tlv::find(tag, payload) else {
        issues.push(missing);
        return None;
    };
    let field = Field::copy_from(tlv.value);
    if field.is_none() {
        issues.push(oversize(tlv.len()));
    }
    field
}

/// Encode a notification (used by the `send` subcommand and tests).
///
/// Returns `None` if either value is too long for a TLV length field.
pub fn encode(mud_url: &str, device_address: &[u8]) -> Option<Vec<u8>> {
    let mut writer = tlv::TlvWriter::new();
    writer
        .push(TAG_MUD_URL, mud_url.as_bytes())?
        .push(TAG_DEVICE_ADDRESS, device_address)?;
    Some(writer.into_bytes())
}
