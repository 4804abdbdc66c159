use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::att::{Handle, HandleRange};
use crate::gap::Uuid;
use crate::host::{AttrInfo, Conn, Host};
use crate::le::Addr;
use crate::Config;

use super::*;

/// GATT server database with the host stack used to publish it.
///
/// Services are handed to the host one at a time. A service is registered
/// when the next service is declared, when [`Server::register_service`] is
/// called, or when the server is started.
#[derive(Debug)]
pub struct Server<H: Host> {
    host: H,
    db: Db,
    subs: Subscriptions,
    evt: mpsc::UnboundedSender<Event>,
    max_notify_len: usize,
}

impl<H: Host> Server<H> {
    /// Creates an empty server. Returns the server and the receiver of all
    /// server [`Event`]s.
    pub fn new(cfg: &Config, host: H) -> Result<(Self, mpsc::UnboundedReceiver<Event>)> {
        cfg.validate()?;
        let (evt, rx) = mpsc::unbounded_channel();
        let srv = Self {
            host,
            db: Db::new(cfg),
            subs: Subscriptions::new(cfg.max_subscriptions),
            evt,
            max_notify_len: cfg.max_notify_len,
        };
        Ok((srv, rx))
    }

    /// Returns the attribute database.
    #[inline(always)]
    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    /// Returns the host stack.
    #[inline(always)]
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Returns the host stack.
    #[inline(always)]
    #[must_use]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Registers the open service and declares a new one.
    pub fn add_service(&mut self, primary: bool, uuid: Uuid) -> Result<Handle> {
        self.register_service()?;
        self.db.add_service(primary, uuid)
    }

    /// Declares a characteristic in the open service. `perms` are BTP
    /// permission bits for the value attribute.
    #[inline]
    pub fn add_characteristic(
        &mut self,
        parent: u16,
        props: Prop,
        perms: u8,
        uuid: Uuid,
    ) -> Result<Handle> {
        self.db.add_characteristic(parent, props, perms, uuid)
    }

    /// Adds a descriptor to the most recent characteristic.
    #[inline]
    pub fn add_descriptor(&mut self, parent: u16, perms: u8, uuid: Uuid) -> Result<Handle> {
        self.db.add_descriptor(parent, perms, uuid)
    }

    /// Adds an include declaration for the service declared at `svc`.
    #[inline]
    pub fn add_included(&mut self, svc: u16) -> Result<Handle> {
        self.db.add_included(svc)
    }

    /// Sets an attribute value. If a client enabled notifications or
    /// indications via the local CCC descriptor, the new value is sent.
    pub fn set_value(&mut self, id: u16, v: &[u8]) -> Result<()> {
        let Some(d) = self.db.set_value(id, v)? else {
            return Ok(());
        };
        let r = if d.indicate {
            self.host.indicate(d.hdl, v)
        } else {
            self.host.notify(d.hdl, v)
        };
        match r {
            Ok(()) if d.indicate => debug!("Indicated {}", d.hdl),
            Ok(()) => debug!("Notified {}", d.hdl),
            Err(e) => warn!("Failed to send {} value ({e})", d.hdl),
        }
        Ok(())
    }

    /// Sets the minimum encryption key size of a value attribute.
    #[inline]
    pub fn set_enc_key_size(&mut self, id: u16, key_size: u8) -> Result<()> {
        self.db.set_enc_key_size(id, key_size)
    }

    /// Hands the open service to the host. This is a no-op if there is
    /// nothing to register. On failure, the service remains open and
    /// unregistered.
    pub fn register_service(&mut self) -> Result<()> {
        let Some(attrs) = self.db.pending_attrs() else {
            return Ok(());
        };
        if let Err(e) = self.host.register_service(&attrs) {
            warn!("Failed to register service {} ({e})", attrs[0].hdl);
            return Err(e.into());
        }
        self.db.commit();
        info!("Registered service {} with {} attributes", attrs[0].hdl, attrs.len());
        Ok(())
    }

    /// Registers the last service and returns the first attribute handle and
    /// the number of attributes in the database.
    pub fn start_server(&mut self) -> Result<(Handle, usize)> {
        self.register_service()?;
        self.db.dump();
        Ok((self.db.first_handle(), self.db.len()))
    }

    /// Unregisters all services and removes all attributes and subscriptions.
    pub fn reset(&mut self) {
        for svc in self.db.registered() {
            if let Err(e) = self.host.unregister_service(svc) {
                warn!("Failed to unregister service {svc} ({e})");
            }
        }
        self.db.clear();
        self.subs.clear();
        info!("GATT server reset");
    }

    /// Returns registered attributes within `hdls`, optionally filtered by
    /// type.
    #[inline]
    pub fn attributes(
        &self,
        hdls: HandleRange,
        typ: Option<Uuid>,
    ) -> impl Iterator<Item = AttrInfo> + '_ {
        self.db.attributes(hdls, typ)
    }

    /// Reads an attribute value on behalf of a peer. Reads without a
    /// connection skip the encryption key size check.
    pub fn read(&self, conn: Option<Conn>, req: &mut ReadReq) -> IoResult<()> {
        let key_size = conn.map(|c| self.host.enc_key_size(c));
        self.db.read(key_size, req)
    }

    /// Writes an attribute value on behalf of a peer. Value updates are
    /// reported via [`Event::ValueChanged`] with the complete new value.
    pub fn write(&mut self, conn: Conn, req: &WriteReq) -> IoResult<Written> {
        let w = self.db.write(self.host.enc_key_size(conn), req)?;
        match w {
            Written::Value => {
                let val = self.db.value(req.handle()).unwrap_or_default().to_vec();
                self.emit(Event::ValueChanged {
                    hdl: req.handle(),
                    val,
                });
            }
            Written::Ccc(cfg) => info!("{} configured CCC {} to {cfg:?}", conn.peer(), req.handle()),
            Written::Prepared => {}
        }
        Ok(w)
    }

    /// Starts an ATT MTU exchange with the peer.
    pub fn exchange_mtu(&mut self, peer: Addr) -> Result<()> {
        let conn = self.lookup(peer)?;
        Ok(self.host.exchange_mtu(conn)?)
    }

    /// Returns the connection to the specified peer.
    pub fn lookup(&self, peer: Addr) -> Result<Conn> {
        self.host.lookup(peer).ok_or(Error::NotConnected(peer))
    }

    /// Subscribes to notifications or indications of the peer characteristic
    /// that owns the CCC descriptor at `ccc`. Discovery of the characteristic
    /// starts immediately, and the returned receiver yields the final result.
    /// An error means that the request was rejected without side effects.
    pub fn enable_subscription(
        &mut self,
        peer: Addr,
        ccc: Handle,
        kind: SubKind,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let conn = self.lookup(peer)?;
        self.subs.enable(&mut self.host, conn, ccc, kind)
    }

    /// Cancels a subscription created by [`Self::enable_subscription`].
    pub fn disable_subscription(&mut self, peer: Addr, ccc: Handle) -> Result<()> {
        let conn = self.lookup(peer)?;
        self.subs.disable(&mut self.host, conn, ccc)
    }

    /// Returns the subscription for the specified peer CCC handle.
    #[inline]
    #[must_use]
    pub fn subscription(&self, ccc: Handle) -> Option<&Subscription> {
        self.subs.get(ccc)
    }

    /// Called by the host for each characteristic declaration found by
    /// [`Host::discover_characteristics`].
    #[inline]
    pub fn characteristic_discovered(&mut self, conn: Conn, decl: Handle) {
        self.subs.discovered(conn, decl);
    }

    /// Called by the host when characteristic discovery is finished.
    #[inline]
    pub fn discovery_complete(&mut self, conn: Conn) {
        self.subs.discovery_complete(&mut self.host, conn);
    }

    /// Called by the host for each notification or indication received for
    /// the subscription at `ccc`. A missing payload means that the host
    /// removed the subscription.
    pub fn notification(&mut self, ccc: Handle, conn: Option<Conn>, data: Option<&[u8]>) {
        if let Some(e) = (self.subs).notification(ccc, conn, data, self.max_notify_len) {
            self.emit(e);
        }
    }

    fn emit(&self, e: Event) {
        if self.evt.send(e).is_err() {
            debug!("Event receiver closed");
        }
    }
}
