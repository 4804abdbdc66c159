//! Host stack interface.
//!
//! Connections, security, and the ATT bearer are owned by the host stack. The
//! GATT server only reaches them through the [`Host`] trait. Results of
//! asynchronous host procedures (characteristic discovery, notifications) are
//! fed back through [`gatt::Server`] methods by the host glue.
//!
//! [`gatt::Server`]: crate::gatt::Server

use std::fmt::Debug;

#[cfg(test)]
pub(crate) use mock::*;

use crate::att::{Handle, HandleRange};
use crate::gap::Uuid;
use crate::gatt::{Perm, Subscription};
use crate::le::Addr;

#[cfg(test)]
mod mock;

/// Host stack errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("host is busy")]
    Busy,
    #[error("insufficient host resources")]
    NoResources,
    #[error("request rejected by host (errno {0})")]
    Rejected(i32),
}

/// Common host result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reference to an established LE connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub struct Conn {
    peer: Addr,
}

impl Conn {
    /// Creates a connection reference for the specified peer.
    #[inline(always)]
    pub const fn new(peer: Addr) -> Self {
        Self { peer }
    }

    /// Returns the peer address.
    #[inline(always)]
    pub const fn peer(self) -> Addr {
        self.peer
    }
}

/// LE security mode 1 levels ([Vol 3] Part C, Section 10.2.1).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum SecLevel {
    /// No security (BR/EDR only).
    L0 = 0,
    /// No encryption and no authentication.
    #[default]
    L1 = 1,
    /// Encryption and no authentication (no MITM).
    L2 = 2,
    /// Encryption and authentication (MITM).
    L3 = 3,
    /// Authenticated Secure Connections with a 128-bit key.
    L4 = 4,
}

/// Attribute description handed to the host when a service is published.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AttrInfo {
    pub hdl: Handle,
    pub typ: Uuid,
    pub perms: Perm,
}

/// Host stack services used by the GATT server.
pub trait Host: Debug {
    /// Returns the connection to the specified peer, if any.
    fn lookup(&self, peer: Addr) -> Option<Conn>;

    /// Returns the negotiated encryption key size or 0 if the link is not
    /// encrypted.
    fn enc_key_size(&self, conn: Conn) -> u8;

    /// Returns the current security level of the connection.
    fn security(&self, conn: Conn) -> SecLevel;

    /// Publishes one service. `attrs` starts with the service declaration.
    fn register_service(&mut self, attrs: &[AttrInfo]) -> Result<()>;

    /// Removes a published service identified by its declaration handle.
    fn unregister_service(&mut self, svc: Handle) -> Result<()>;

    /// Starts an ATT MTU exchange. The procedure result is not reported.
    fn exchange_mtu(&mut self, conn: Conn) -> Result<()>;

    /// Starts discovery of characteristic declarations on the peer. Each
    /// declaration found must be reported via
    /// [`Server::characteristic_discovered`] followed by a single
    /// [`Server::discovery_complete`].
    ///
    /// [`Server::characteristic_discovered`]: crate::gatt::Server::characteristic_discovered
    /// [`Server::discovery_complete`]: crate::gatt::Server::discovery_complete
    fn discover_characteristics(&mut self, conn: Conn, hdls: HandleRange) -> Result<()>;

    /// Writes the peer's CCC descriptor and starts delivering notifications or
    /// indications for the subscription.
    fn subscribe(&mut self, conn: Conn, sub: &Subscription) -> Result<()>;

    /// Cancels a subscription created by [`Host::subscribe`].
    fn unsubscribe(&mut self, conn: Conn, sub: &Subscription) -> Result<()>;

    /// Sends a notification to all subscribed clients.
    fn notify(&mut self, hdl: Handle, val: &[u8]) -> Result<()>;

    /// Sends an indication to all subscribed clients.
    fn indicate(&mut self, hdl: Handle, val: &[u8]) -> Result<()>;
}
