use smallvec::SmallVec;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::att::{Handle, HandleRange};
use crate::host::{Conn, Host, SecLevel};

use super::*;

/// Subscription type requested via the peer's CCC descriptor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum SubKind {
    Notify = 0x01,
    Indicate = 0x02,
}

impl SubKind {
    /// Returns the CCC descriptor bit that enables this subscription type.
    #[inline]
    #[must_use]
    pub const fn cccd(self) -> Cccd {
        match self {
            Self::Notify => Cccd::NOTIFY,
            Self::Indicate => Cccd::INDICATE,
        }
    }
}

/// Subscription slot state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Discovering,
    Armed,
}

/// Notification or indication subscription to a characteristic on a peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Subscription {
    conn: Conn,
    ccc: Handle,
    kind: SubKind,
    value: Option<Handle>,
    min_sec: SecLevel,
    state: State,
}

impl Subscription {
    /// Returns the connection on which the subscription was requested.
    #[inline(always)]
    pub const fn conn(&self) -> Conn {
        self.conn
    }

    /// Returns the handle of the peer's CCC descriptor.
    #[inline(always)]
    #[must_use]
    pub const fn ccc(&self) -> Handle {
        self.ccc
    }

    /// Returns the subscription type.
    #[inline(always)]
    #[must_use]
    pub const fn kind(&self) -> SubKind {
        self.kind
    }

    /// Returns the characteristic value handle resolved by discovery.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> Option<Handle> {
        self.value
    }

    /// Returns the connection security level at the time the subscription
    /// was requested.
    #[inline(always)]
    #[must_use]
    pub const fn min_security(&self) -> SecLevel {
        self.min_sec
    }

    /// Returns whether the subscription is active.
    #[inline(always)]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state == State::Armed
    }
}

/// Characteristic discovery in progress.
#[derive(Debug)]
struct Discovery {
    slot: usize,
    conn: Conn,
    tx: oneshot::Sender<Result<()>>,
}

/// Fixed set of subscription slots. At most one slot can be discovering its
/// characteristic at any time.
#[derive(Debug)]
pub(super) struct Subscriptions {
    slot: SmallVec<[Option<Subscription>; 2]>,
    disc: Option<Discovery>,
}

impl Subscriptions {
    /// Creates `n` free slots.
    pub fn new(n: usize) -> Self {
        Self {
            slot: SmallVec::from_elem(None, n),
            disc: None,
        }
    }

    /// Returns the subscription for the specified CCC handle.
    pub fn get(&self, ccc: Handle) -> Option<&Subscription> {
        self.find(ccc).and_then(|i| self.slot[i].as_ref())
    }

    /// Returns whether characteristic discovery is in progress.
    #[inline]
    pub const fn is_discovering(&self) -> bool {
        self.disc.is_some()
    }

    /// Allocates a slot and starts discovery of the characteristic that owns
    /// the peer's CCC descriptor. The returned receiver yields the result of
    /// the subscription once discovery completes.
    pub fn enable(
        &mut self,
        host: &mut impl Host,
        conn: Conn,
        ccc: Handle,
        kind: SubKind,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let Some(i) = self.slot.iter().position(Option::is_none) else {
            return Err(Error::NoFreeSlot);
        };
        if self.disc.is_some() {
            return Err(Error::DiscoveryBusy);
        }
        if self.find(ccc).is_some() {
            return Err(Error::AlreadySubscribed(ccc));
        }
        let min_sec = host.security(conn);
        host.discover_characteristics(conn, HandleRange::new(Handle::MIN, ccc))?;
        self.slot[i] = Some(Subscription {
            conn,
            ccc,
            kind,
            value: None,
            min_sec,
            state: State::Discovering,
        });
        let (tx, rx) = oneshot::channel();
        self.disc = Some(Discovery { slot: i, conn, tx });
        debug!("Discovering characteristic for CCC {ccc} on {}", conn.peer());
        Ok(rx)
    }

    /// Records a characteristic declaration found by discovery. The last
    /// declaration preceding the CCC descriptor wins.
    pub fn discovered(&mut self, conn: Conn, decl: Handle) {
        let Some(sub) = (self.disc.as_ref())
            .filter(|d| d.conn == conn)
            .and_then(|d| self.slot[d.slot].as_mut())
        else {
            warn!("Unexpected characteristic {decl} from {}", conn.peer());
            return;
        };
        if decl < sub.ccc {
            sub.value = decl.next();
        }
    }

    /// Finishes discovery and subscribes with the host. The result is sent
    /// to the receiver returned by [`Self::enable`]. Failed slots are freed.
    pub fn discovery_complete(&mut self, host: &mut impl Host, conn: Conn) {
        if !(self.disc.as_ref()).map_or(false, |d| d.conn == conn) {
            warn!("Unexpected discovery completion from {}", conn.peer());
            return;
        }
        let Some(d) = self.disc.take() else { return };
        let Some(sub) = self.slot[d.slot] else { return };
        let armed = Subscription {
            state: State::Armed,
            ..sub
        };
        let r = match sub.value {
            None => Err(Error::NoCharacteristic(sub.ccc)),
            Some(_) => host.subscribe(conn, &armed).map_err(Error::from),
        };
        match r {
            Ok(()) => {
                info!("Subscribed to {:?} via CCC {}", sub.kind, sub.ccc);
                self.slot[d.slot] = Some(armed);
            }
            Err(e) => {
                warn!("Subscription via CCC {} failed: {e}", sub.ccc);
                self.slot[d.slot] = None;
            }
        }
        if d.tx.send(r).is_err() {
            debug!("Subscription result receiver dropped");
        }
    }

    /// Cancels an active subscription.
    pub fn disable(&mut self, host: &mut impl Host, conn: Conn, ccc: Handle) -> Result<()> {
        let i = self.find(ccc).ok_or(Error::NoSubscription(ccc))?;
        let Some(sub) = self.slot[i] else {
            return Err(Error::NoSubscription(ccc));
        };
        if !sub.is_armed() {
            return Err(Error::DiscoveryBusy);
        }
        host.unsubscribe(conn, &sub)?;
        self.slot[i] = None;
        info!("Unsubscribed from CCC {ccc}");
        Ok(())
    }

    /// Handles a notification or indication received from the peer. A missing
    /// connection or payload means that the host dropped the subscription,
    /// which frees the slot.
    pub fn notification(
        &mut self,
        ccc: Handle,
        conn: Option<Conn>,
        data: Option<&[u8]>,
        max_len: usize,
    ) -> Option<Event> {
        let i = self.find(ccc)?;
        let sub = self.slot[i]?;
        let (Some(conn), Some(data)) = (conn, data) else {
            info!("Subscription via CCC {ccc} removed by host");
            self.slot[i] = None;
            return None;
        };
        if !sub.is_armed() {
            return None;
        }
        Some(Event::Notification {
            peer: conn.peer(),
            kind: sub.kind,
            hdl: sub.value?,
            val: data[..data.len().min(max_len)].to_vec(),
        })
    }

    /// Frees all slots. A pending discovery result receiver is closed.
    pub fn clear(&mut self) {
        self.slot.iter_mut().for_each(|s| *s = None);
        self.disc = None;
    }

    fn find(&self, ccc: Handle) -> Option<usize> {
        (self.slot.iter()).position(|s| s.map_or(false, |s| s.ccc == ccc))
    }
}
