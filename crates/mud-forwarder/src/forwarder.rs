// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarder coordinator.
//!
//! Owns the datagram endpoint and the advertisement state machine. Events are
//! delivered one at a time by the owner's loop; nothing here blocks except
//! [`Forwarder::poll`], which waits at most the endpoint's read timeout per
//! receive and returns after [`MAX_DATAGRAMS_PER_POLL`] datagrams.

use crate::advertisement::{
    Advertiser, RegistrationError, RegistrationOutcome, ServiceRegistry, ServiceSettings,
};
use crate::config::{ConfigError, ForwarderConfig};
use crate::notification::{self, NotificationPayload, MAX_PAYLOAD_SIZE};
use crate::topology::{ChangedFlags, DeviceRole, TopologyProvider};
use crate::transport::DatagramEndpoint;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;

/// Upper bound on datagrams handled by one [`Forwarder::poll`] call.
pub const MAX_DATAGRAMS_PER_POLL: usize = 64;

/// Forwarder errors surfaced to the owner.
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("Forwarder already active")]
    AlreadyActive,

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A decoded notification together with its origin.
#[derive(Debug, Clone)]
pub struct MudNotification {
    pub sender: SocketAddr,
    pub payload: NotificationPayload,
}

/// Consumer of decoded notifications (e.g. a MUD policy manager).
pub trait NotificationSink {
    fn deliver(&mut self, notification: &MudNotification);
}

/// Sink that logs each notification.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&mut self, notification: &MudNotification) {
        let payload = &notification.payload;
        if payload.is_complete() {
            tracing::info!(
                "MUD notification from {}: url={:?} device={}",
                notification.sender,
                payload.mud_url_str().unwrap_or("<non-utf8>"),
                payload
                    .device_ip()
                    .map(|ip| ip.to_string())
                    .or_else(|| payload.device_address.map(|f| format!("{:02x?}", f.as_bytes())))
                    .unwrap_or_default()
            );
        } else {
            tracing::warn!(
                "Incomplete MUD notification from {} discarded",
                notification.sender
            );
        }
    }
}

/// Forwarder counters.
#[derive(Debug)]
pub struct ForwarderStats {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub notifications_complete: u64,
    pub notifications_incomplete: u64,
    pub registrations: u64,
    pub registration_failures: u64,
    pub started: Instant,
}

impl ForwarderStats {
    pub fn new() -> Self {
        Self {
            datagrams_received: 0,
            bytes_received: 0,
            notifications_complete: 0,
            notifications_incomplete: 0,
            registrations: 0,
            registration_failures: 0,
            started: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> ForwarderStatsSnapshot {
        ForwarderStatsSnapshot {
            datagrams_received: self.datagrams_received,
            bytes_received: self.bytes_received,
            notifications_complete: self.notifications_complete,
            notifications_incomplete: self.notifications_incomplete,
            registrations: self.registrations,
            registration_failures: self.registration_failures,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for ForwarderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of forwarder statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderStatsSnapshot {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub notifications_complete: u64,
    pub notifications_incomplete: u64,
    pub registrations: u64,
    pub registration_failures: u64,
    pub uptime_secs: u64,
}

/// MUD notification forwarder.
pub struct Forwarder<E: DatagramEndpoint, K: NotificationSink> {
    config: ForwarderConfig,
    endpoint: E,
    sink: K,
    advertiser: Advertiser,
    stats: ForwarderStats,
    rx_buf: Vec<u8>,
}

impl<E: DatagramEndpoint, K: NotificationSink> Forwarder<E, K> {
    /// Create a forwarder. The endpoint stays unbound until [`start`](Self::start).
    pub fn new(config: ForwarderConfig, endpoint: E, sink: K) -> Result<Self, ForwarderError> {
        config.validate()?;
        let advertiser = Advertiser::new(ServiceSettings::from(&config));
        Ok(Self {
            config,
            endpoint,
            sink,
            advertiser,
            stats: ForwarderStats::new(),
            rx_buf: vec![0u8; MAX_PAYLOAD_SIZE],
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn advertiser(&self) -> &Advertiser {
        &self.advertiser
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn is_active(&self) -> bool {
        self.endpoint.is_open()
    }

    pub fn stats(&self) -> ForwarderStatsSnapshot {
        self.stats.snapshot()
    }

    /// Bind the endpoint to the configured listen address.
    pub fn start(&mut self) -> Result<(), ForwarderError> {
        if self.endpoint.is_open() {
            return Err(ForwarderError::AlreadyActive);
        }
        let addr = self.config.listen_addr();
        self.endpoint.bind(addr).map_err(|e| {
            tracing::error!("Failed to bind MUD endpoint on {}: {}", addr, e);
            ForwarderError::Transport(e)
        })?;
        tracing::info!("MUD forwarder listening on {}", addr);
        Ok(())
    }

    /// Release the endpoint. Idempotent.
    pub fn stop(&mut self) {
        if self.endpoint.is_open() {
            tracing::debug!("Stopping MUD forwarder");
        }
        self.endpoint.close();
    }

    /// Handle one inbound datagram.
    pub fn on_datagram(&mut self, payload: &[u8], sender: SocketAddr) -> MudNotification {
        tracing::debug!("{} bytes from {}", payload.len(), sender);
        if payload.len() > MAX_PAYLOAD_SIZE {
            tracing::debug!(
                "Datagram from {} exceeds {} bytes, decoding prefix only",
                sender,
                MAX_PAYLOAD_SIZE
            );
        }

        self.stats.datagrams_received += 1;
        self.stats.bytes_received += payload.len() as u64;

        let decoded = notification::decode(payload);
        for issue in &decoded.issues {
            tracing::warn!("MUD notification from {}: {}", sender, issue);
        }
        if decoded.is_complete() {
            self.stats.notifications_complete += 1;
        } else {
            self.stats.notifications_incomplete += 1;
        }

        let notification = MudNotification {
            sender,
            payload: decoded,
        };
        self.sink.deliver(&notification);
        notification
    }

    /// Receive and handle pending datagrams, at most
    /// [`MAX_DATAGRAMS_PER_POLL`] per call so the owner's loop keeps control
    /// under a steady inbound stream.
    ///
    /// Returns the number of datagrams handled.
    pub fn poll(&mut self) -> Result<usize, ForwarderError> {
        let mut buf = std::mem::take(&mut self.rx_buf);
        let result = self.poll_into(&mut buf);
        self.rx_buf = buf;
        result
    }

    fn poll_into(&mut self, buf: &mut [u8]) -> Result<usize, ForwarderError> {
        let mut handled = 0;
        while handled < MAX_DATAGRAMS_PER_POLL {
            let Some((len, sender)) = self.endpoint.recv_from(buf)? else {
                break;
            };
            self.on_datagram(&buf[..len], sender);
            handled += 1;
        }
        Ok(handled)
    }

    /// Forward a topology change to the advertisement state machine.
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
        let outcome = self
            .advertiser
            .on_topology_changed(previous, current, flags, topology, registry);
        if let Some(result) = &outcome {
            self.record_registration(result);
        }
        outcome
    }

    /// Register the service immediately (e.g. at startup when already a router).
    pub fn register_now<T, R>(
        &mut self,
        topology: &T,
        registry: &mut R,
    ) -> Result<RegistrationOutcome, RegistrationError>
    where
        T: TopologyProvider + ?Sized,
        R: ServiceRegistry + ?Sized,
    {
        let result = self.advertiser.register_now(topology, registry);
        self.record_registration(&result);
        result
    }

    fn record_registration(&mut self, result: &Result<RegistrationOutcome, RegistrationError>) {
        match result {
            Ok(RegistrationOutcome::Published) => self.stats.registrations += 1,
            Ok(RegistrationOutcome::AlreadyRegistered) => {}
            Err(_) => self.stats.registration_failures += 1,
        }
    }
}

impl<E: DatagramEndpoint, K: NotificationSink> Drop for Forwarder<E, K> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Default)]
    struct FakeEndpoint {
        open: bool,
        fail_bind: bool,
        binds: Vec<SocketAddr>,
        closes: usize,
        inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    }

    impl DatagramEndpoint for FakeEndpoint {
        fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
            if self.fail_bind {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            self.binds.push(addr);
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            Ok(self.inbox.pop_front().map(|(data, from)| {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                (len, from)
            }))
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            self.binds.last().copied().filter(|_| self.open)
        }

        fn close(&mut self) {
            if self.open {
                self.closes += 1;
            }
            self.open = false;
        }
    }

    #[derive(Default)]
    struct VecSink(Vec<MudNotification>);

    impl NotificationSink for VecSink {
        fn deliver(&mut self, notification: &MudNotification) {
            self.0.push(notification.clone());
        }
    }

    fn peer() -> SocketAddr {
        "[fd00::99]:49152".parse().unwrap()
    }

    fn forwarder() -> Forwarder<FakeEndpoint, VecSink> {
        Forwarder::new(
            ForwarderConfig::default(),
            FakeEndpoint::default(),
            VecSink::default(),
        )
        .expect("forwarder")
    }

    #[test]
    fn test_start_binds_default_port() {
        let mut fwd = forwarder();
        fwd.start().expect("start");
        assert!(fwd.is_active());
        assert_eq!(fwd.endpoint().binds, vec!["[::]:1234".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_start_twice_already_active() {
        let mut fwd = forwarder();
        fwd.start().expect("start");
        assert!(matches!(fwd.start(), Err(ForwarderError::AlreadyActive)));
        assert_eq!(fwd.endpoint().binds.len(), 1);
    }

    #[test]
    fn test_bind_failure_is_transport_error() {
        let endpoint = FakeEndpoint {
            fail_bind: true,
            ..Default::default()
        };
        let mut fwd =
            Forwarder::new(ForwarderConfig::default(), endpoint, VecSink::default()).unwrap();
        assert!(matches!(fwd.start(), Err(ForwarderError::Transport(_))));
        assert!(!fwd.is_active());
    }

    #[test]
    fn test_stop_idempotent() {
        let mut fwd = forwarder();
        fwd.stop();
        fwd.start().unwrap();
        fwd.stop();
        fwd.stop();
        assert!(!fwd.is_active());
        assert_eq!(fwd.endpoint().closes, 1);

        // Restart after stop
        fwd.start().unwrap();
        assert!(fwd.is_active());
    }

    #[test]
    fn test_on_datagram_delivers_to_sink() {
        let mut fwd = forwarder();
        let payload = notification::encode("mud:", &[0xFD, 0, 0, 1]).expect("encode");

        let n = fwd.on_datagram(&payload, peer());
        assert!(n.payload.is_complete());
        assert_eq!(fwd.sink().0.len(), 1);
        assert_eq!(fwd.sink().0[0].sender, peer());
        assert_eq!(fwd.sink().0[0].payload.mud_url_str(), Some("mud:"));

        let stats = fwd.stats();
        assert_eq!(stats.datagrams_received, 1);
        assert_eq!(stats.bytes_received, payload.len() as u64);
        assert_eq!(stats.notifications_complete, 1);
    }

    #[test]
    fn test_malformed_datagram_does_not_stop_service() {
        let mut fwd = forwarder();
        fwd.start().unwrap();

        fwd.endpoint.inbox.push_back((vec![0x01, 0x05, b'h'], peer()));
        fwd.endpoint
            .inbox
            .push_back((notification::encode("mud:", &[1, 2, 3, 4]).unwrap(), peer()));

        assert_eq!(fwd.poll().unwrap(), 2);
        assert!(fwd.is_active());

        let delivered = &fwd.sink().0;
        assert!(!delivered[0].payload.is_complete());
        assert!(delivered[1].payload.is_complete());

        let stats = fwd.stats();
        assert_eq!(stats.notifications_incomplete, 1);
        assert_eq!(stats.notifications_complete, 1);
    }

    #[test]
    fn test_poll_returns_under_endless_stream() {
        struct FloodEndpoint {
            received: usize,
        }
        impl DatagramEndpoint for FloodEndpoint {
            fn bind(&mut self, _addr: SocketAddr) -> io::Result<()> {
                Ok(())
            }
            fn is_open(&self) -> bool {
                true
            }
            fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
                let payload = notification::encode("mud:", &[1, 2, 3, 4]).unwrap();
                buf[..payload.len()].copy_from_slice(&payload);
                self.received += 1;
                Ok(Some((payload.len(), peer())))
            }
            fn local_addr(&self) -> Option<SocketAddr> {
                None
            }
            fn close(&mut self) {}
        }

        let endpoint = FloodEndpoint { received: 0 };
        let mut fwd =
            Forwarder::new(ForwarderConfig::default(), endpoint, VecSink::default()).unwrap();

        assert_eq!(fwd.poll().unwrap(), MAX_DATAGRAMS_PER_POLL);
        assert_eq!(fwd.endpoint().received, MAX_DATAGRAMS_PER_POLL);
        assert_eq!(fwd.poll().unwrap(), MAX_DATAGRAMS_PER_POLL);
        assert_eq!(
            fwd.stats().notifications_complete,
            2 * MAX_DATAGRAMS_PER_POLL as u64
        );
        assert_eq!(fwd.sink().0[0].payload.mud_url_str(), Some("mud:"));
    }

    #[test]
    fn test_poll_on_stopped_forwarder_errors() {
        struct ClosedEndpoint;
        impl DatagramEndpoint for ClosedEndpoint {
            fn bind(&mut self, _addr: SocketAddr) -> io::Result<()> {
                Ok(())
            }
            fn is_open(&self) -> bool {
                false
            }
            fn recv_from(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
                Err(io::Error::new(io::ErrorKind::NotConnected, "closed"))
            }
            fn local_addr(&self) -> Option<SocketAddr> {
                None
            }
            fn close(&mut self) {}
        }

        let mut fwd =
            Forwarder::new(ForwarderConfig::default(), ClosedEndpoint, VecSink::default()).unwrap();
        assert!(matches!(fwd.poll(), Err(ForwarderError::Transport(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ForwarderConfig {
            service_data: Vec::new(),
            ..Default::default()
        };
        let result = Forwarder::new(config, FakeEndpoint::default(), VecSink::default());
        assert!(matches!(result, Err(ForwarderError::Config(_))));
    }
}
