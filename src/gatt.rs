//! Generic Attribute Profile ([Vol 3] Part G) server database.
//!
//! [`Server`] owns the attribute [`Db`], the notification/indication
//! subscription slots, and the [`Host`] used to publish services and talk to
//! peers. Database construction errors and subscription errors are reported
//! as [`Error`]. Attribute access errors are reported as ATT [`ErrorCode`]s.
//!
//! [`ErrorCode`]: crate::att::ErrorCode
//! [`Host`]: crate::host::Host

pub use {arena::*, consts::*, db::*, io::*, server::*, sub::*};

use crate::att::Handle;
use crate::host;
use crate::le::Addr;

mod arena;
mod consts;
mod db;
mod io;
mod server;
mod sub;

/// Error type returned by database construction and subscription management.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::ConfigError),
    #[error("attribute table is full ({0} attributes)")]
    TableFull(usize),
    #[error("service table is full ({0} services)")]
    ServiceTableFull(usize),
    #[error("arena exhausted ({need} bytes needed, {free} free)")]
    ArenaExhausted { need: usize, free: usize },
    #[error("no open service")]
    NoOpenService,
    #[error("parent {0:#06X} is not the most recent definition")]
    NonSequentialParent(u16),
    #[error("CCC descriptor already added")]
    CccAlreadyAdded,
    #[error("characteristic properties do not permit {0}")]
    NotPermittedByProps(Descriptor),
    #[error("no characteristic precedes the descriptor")]
    NoBaseCharacteristic,
    #[error("value length mismatch (expected {expected}, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid attribute id {0:#06X}")]
    InvalidAttr(u16),
    #[error("{0} is not a service declaration")]
    NotService(Handle),
    #[error("{0} does not hold a value")]
    NotValue(Handle),
    #[error("invalid encryption key size {0}")]
    InvalidKeySize(u8),
    #[error("{0} has no encryption permission")]
    NotEncrypted(Handle),
    #[error("no free subscription slot")]
    NoFreeSlot,
    #[error("characteristic discovery already in progress")]
    DiscoveryBusy,
    #[error("CCC {0} already has a subscription")]
    AlreadySubscribed(Handle),
    #[error("no subscription for CCC {0}")]
    NoSubscription(Handle),
    #[error("no characteristic found before CCC {0}")]
    NoCharacteristic(Handle),
    #[error("not connected to {0}")]
    NotConnected(Addr),
    #[error("host error: {0}")]
    Host(#[from] host::Error),
}

/// Common GATT result type.
pub type Result<T> = std::result::Result<T, Error>;
