use serde::{Deserialize, Serialize};

/// Server capacity limits.
///
/// All limits are fixed for the lifetime of a [`gatt::Server`] and can only
/// be changed by creating a new one.
///
/// [`gatt::Server`]: crate::gatt::Server
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
#[must_use]
pub struct Config {
    /// Maximum number of attributes in the database.
    pub max_attrs: usize,
    /// Maximum number of services in the database.
    pub max_services: usize,
    /// Size of the arena holding attribute types and values.
    pub arena_size: usize,
    /// Number of simultaneous notification/indication subscriptions.
    pub max_subscriptions: usize,
    /// Handle assigned to the first attribute.
    pub first_handle: u16,
    /// Maximum notification payload reported in a BTP event.
    pub max_notify_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attrs: 50,
            max_services: 10,
            arena_size: 2048,
            max_subscriptions: 2,
            first_handle: 1,
            max_notify_len: 244,
        }
    }
}

impl Config {
    /// Checks that all limits are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::*;
        if self.max_attrs == 0 || self.max_services == 0 || self.max_subscriptions == 0 {
            return Err(ZeroCapacity);
        }
        if self.arena_size == 0 || self.arena_size > usize::from(u16::MAX) {
            return Err(ArenaSize(self.arena_size));
        }
        if self.first_handle == 0
            || usize::from(self.first_handle) - 1 + self.max_attrs > usize::from(u16::MAX)
        {
            return Err(HandleSpace {
                first: self.first_handle,
                count: self.max_attrs,
            });
        }
        Ok(())
    }
}

/// Invalid [`Config`] error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("attribute, service, and subscription capacities must be non-zero")]
    ZeroCapacity,
    #[error("arena size {0} is outside 1..=65535")]
    ArenaSize(usize),
    #[error("{count} attributes starting at handle {first} exceed the handle space")]
    HandleSpace { first: u16, count: usize },
}
