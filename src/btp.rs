//! Bluetooth Test Protocol (BTP) GATT service commands and events.
//!
//! [`Tester`] decodes raw little-endian command payloads, runs them against
//! the [`gatt::Server`], and encodes the responses. Framing and routing of
//! BTP packets is handled by the caller.

pub use consts::*;

use structbuf::{Pack, StructBuf, Unpack, Unpacker};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::att::{ErrorCode, Handle, HandleRange, MAX_VAL_LEN};
use crate::gap::{Uuid, Uuid16, UuidPacker};
use crate::gatt::{self, Event, Prop, ReadReq, Server, SubKind};
use crate::host::Host;
use crate::le::Addr;
use crate::Config;

mod consts;
#[cfg(test)]
mod tests;

impl From<gatt::Error> for Status {
    #[inline]
    fn from(_: gatt::Error) -> Self {
        Self::Failed
    }
}

/// Command reply.
#[derive(Debug)]
#[must_use]
pub enum Reply {
    /// Successful response with a payload.
    Rsp(StructBuf),
    /// Response without a payload.
    Status(Status),
    /// The status will be available from [`Tester::poll_delayed`].
    Delayed,
}

impl Reply {
    /// Returns the status byte of the reply or [`None`] for delayed replies.
    #[inline]
    #[must_use]
    pub const fn status(&self) -> Option<Status> {
        match *self {
            Self::Rsp(_) => Some(Status::Success),
            Self::Status(st) => Some(st),
            Self::Delayed => None,
        }
    }
}

/// Decoded GATT service command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Command<'a> {
    ReadSupportedCommands,
    AddService {
        primary: bool,
        uuid: Uuid,
    },
    AddCharacteristic {
        svc: u16,
        props: Prop,
        perms: u8,
        uuid: Uuid,
    },
    AddDescriptor {
        chr: u16,
        perms: u8,
        uuid: Uuid,
    },
    AddIncludedService {
        svc: u16,
    },
    SetValue {
        attr: u16,
        val: &'a [u8],
    },
    StartServer,
    ResetServer,
    SetEncKeySize {
        attr: u16,
        key_size: u8,
    },
    ExchangeMtu {
        peer: Addr,
    },
    CfgSubscription {
        peer: Addr,
        enable: bool,
        ccc: Handle,
        kind: SubKind,
    },
    GetAttributes {
        hdls: HandleRange,
        typ: Option<Uuid>,
    },
    GetAttributeValue {
        peer: Addr,
        hdl: Handle,
    },
}

impl<'a> Command<'a> {
    /// Decodes a command payload. Returns [`None`] if the payload length does
    /// not match the command or any parameter is invalid.
    fn parse(op: Opcode, cmd: &'a [u8]) -> Option<Self> {
        use Opcode::*;
        if cmd.is_empty() {
            return match op {
                ReadSupportedCommands => Some(Self::ReadSupportedCommands),
                StartServer => Some(Self::StartServer),
                ResetServer => Some(Self::ResetServer),
                _ => None,
            };
        }
        if op == SetValue {
            // Value length must match the remainder of the payload
            let mut p = Unpacker::new(cmd);
            let (attr, n) = (p.u16(), usize::from(p.u16()));
            let val = p.is_ok().then(|| p.take().into_inner())?;
            return (val.len() == n).then_some(Self::SetValue { attr, val });
        }
        cmd.unpack()
            .map(|p| match op {
                AddService => {
                    let typ = ServiceType::try_from(p.u8()).ok()?;
                    Some(Self::AddService {
                        primary: typ == ServiceType::Primary,
                        uuid: uuid(p)?,
                    })
                }
                AddCharacteristic => Some(Self::AddCharacteristic {
                    svc: p.u16(),
                    props: Prop::from_bits_retain(p.u8()),
                    perms: p.u8(),
                    uuid: uuid(p)?,
                }),
                AddDescriptor => Some(Self::AddDescriptor {
                    chr: p.u16(),
                    perms: p.u8(),
                    uuid: uuid(p)?,
                }),
                AddIncludedService => Some(Self::AddIncludedService { svc: p.u16() }),
                SetEncKeySize => Some(Self::SetEncKeySize {
                    attr: p.u16(),
                    key_size: p.u8(),
                }),
                ExchangeMtu => Addr::unpack(p).map(|peer| Self::ExchangeMtu { peer }),
                CfgNotify | CfgIndicate => {
                    let peer = Addr::unpack(p)?;
                    let enable = p.bool();
                    let ccc = Handle::new(p.u16())?;
                    let kind = if op == CfgNotify {
                        SubKind::Notify
                    } else {
                        SubKind::Indicate
                    };
                    Some(Self::CfgSubscription {
                        peer,
                        enable,
                        ccc,
                        kind,
                    })
                }
                GetAttributes => {
                    let hdls = HandleRange::from_raw(p.u16(), p.u16())?;
                    let typ = match p.u8() {
                        0 => None,
                        n => Some(uuid_n(p, n)?),
                    };
                    Some(Self::GetAttributes { hdls, typ })
                }
                GetAttributeValue => Some(Self::GetAttributeValue {
                    peer: Addr::unpack(p)?,
                    hdl: Handle::new(p.u16())?,
                }),
                _ => None,
            })
            .flatten()
    }
}

/// Decodes a length-prefixed UUID.
fn uuid(p: &mut Unpacker) -> Option<Uuid> {
    let n = p.u8();
    uuid_n(p, n)
}

/// Decodes an `n`-byte UUID.
fn uuid_n(p: &mut Unpacker, n: u8) -> Option<Uuid> {
    match usize::from(n) {
        Uuid16::BYTES => Uuid16::new(p.u16()).map(Uuid16::as_uuid),
        Uuid::BYTES => Uuid::new(p.u128()),
        _ => None,
    }
}

/// BTP GATT service tester.
#[derive(Debug)]
pub struct Tester<H: Host> {
    srv: Server<H>,
    evt: mpsc::UnboundedReceiver<Event>,
    delayed: Option<(Opcode, oneshot::Receiver<gatt::Result<()>>)>,
}

impl<H: Host> Tester<H> {
    /// Creates a tester with an empty GATT server.
    pub fn new(cfg: &Config, host: H) -> gatt::Result<Self> {
        let (srv, evt) = Server::new(cfg, host)?;
        Ok(Self {
            srv,
            evt,
            delayed: None,
        })
    }

    /// Returns the GATT server.
    #[inline(always)]
    #[must_use]
    pub const fn server(&self) -> &Server<H> {
        &self.srv
    }

    /// Returns the GATT server. The host glue uses this to report the results
    /// of asynchronous host procedures.
    #[inline(always)]
    #[must_use]
    pub fn server_mut(&mut self) -> &mut Server<H> {
        &mut self.srv
    }

    /// Handles one GATT service command. While a delayed reply is pending,
    /// all commands other than [`Opcode::ResetServer`] are rejected with
    /// [`Status::NotReady`].
    pub fn handle(&mut self, op: u8, cmd: &[u8]) -> Reply {
        let Ok(op) = Opcode::try_from(op) else {
            warn!("Unknown GATT opcode {op:#04X}");
            return Reply::Status(Status::UnknownCommand);
        };
        if !op.is_supported() {
            warn!("Unsupported GATT command {op}");
            return Reply::Status(Status::UnknownCommand);
        }
        if self.delayed.is_some() && op != Opcode::ResetServer {
            warn!("{op} received while waiting for a delayed reply");
            return Reply::Status(Status::NotReady);
        }
        let Some(c) = Command::parse(op, cmd) else {
            error!("Invalid {op} command: {cmd:02X?}");
            return Reply::Status(Status::Failed);
        };
        trace!("{c:?}");
        self.exec(op, c).unwrap_or_else(|e| {
            warn!("{op} failed: {e}");
            Reply::Status(e.into())
        })
    }

    /// Returns the final status of a command that was answered with
    /// [`Reply::Delayed`], once known.
    pub fn poll_delayed(&mut self) -> Option<(Opcode, Status)> {
        let (op, rx) = self.delayed.as_mut()?;
        let op = *op;
        let st = match rx.try_recv() {
            Ok(Ok(())) => Status::Success,
            Ok(Err(e)) => {
                warn!("{op} failed: {e}");
                Status::Failed
            }
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => {
                warn!("{op} cancelled");
                Status::Failed
            }
        };
        self.delayed = None;
        Some((op, st))
    }

    /// Returns the next encoded GATT service event.
    pub fn next_event(&mut self) -> Option<(EventCode, StructBuf)> {
        let e = self.evt.try_recv().ok()?;
        let mut b = StructBuf::new(MAX_DATA_LEN);
        let code = {
            let mut p = b.append();
            match e {
                Event::ValueChanged { hdl, val } => {
                    let val = &val[..val.len().min(MAX_DATA_LEN - 4)];
                    p.u16(hdl).u16(len16(val)).put(val);
                    EventCode::AttrValueChanged
                }
                Event::Notification {
                    peer,
                    kind,
                    hdl,
                    val,
                } => {
                    let val = &val[..val.len().min(MAX_DATA_LEN - 12)];
                    peer.pack(&mut p);
                    p.u8(u8::from(kind)).u16(hdl).u16(len16(val)).put(val);
                    EventCode::Notification
                }
            }
        };
        Some((code, b))
    }

    fn exec(&mut self, op: Opcode, c: Command) -> gatt::Result<Reply> {
        use Command::*;
        let srv = &mut self.srv;
        Ok(match c {
            ReadSupportedCommands => Reply::Rsp(supported_commands()),
            AddService { primary, uuid } => rsp_id(srv.add_service(primary, uuid)?),
            AddCharacteristic {
                svc,
                props,
                perms,
                uuid,
            } => rsp_id(srv.add_characteristic(svc, props, perms, uuid)?),
            AddDescriptor { chr, perms, uuid } => rsp_id(srv.add_descriptor(chr, perms, uuid)?),
            AddIncludedService { svc } => rsp_id(srv.add_included(svc)?),
            SetValue { attr, val } => {
                srv.set_value(attr, val)?;
                Reply::Status(Status::Success)
            }
            StartServer => {
                let (first, n) = srv.start_server()?;
                let mut b = StructBuf::new(3);
                b.append().u16(first).u8(u8::try_from(n).unwrap_or(u8::MAX));
                Reply::Rsp(b)
            }
            ResetServer => {
                srv.reset();
                Reply::Status(Status::Success)
            }
            SetEncKeySize { attr, key_size } => {
                srv.set_enc_key_size(attr, key_size)?;
                Reply::Status(Status::Success)
            }
            ExchangeMtu { peer } => {
                srv.exchange_mtu(peer)?;
                Reply::Status(Status::Success)
            }
            CfgSubscription {
                peer,
                enable: true,
                ccc,
                kind,
            } => {
                let rx = srv.enable_subscription(peer, ccc, kind)?;
                self.delayed = Some((op, rx));
                Reply::Delayed
            }
            CfgSubscription {
                peer,
                enable: false,
                ccc,
                ..
            } => {
                srv.disable_subscription(peer, ccc)?;
                Reply::Status(Status::Success)
            }
            GetAttributes { hdls, typ } => Reply::Rsp(self.get_attributes(hdls, typ)),
            GetAttributeValue { peer, hdl } => self.get_attribute_value(peer, hdl),
        })
    }

    /// Encodes the registered attributes within `hdls`. Attributes that do
    /// not fit in one response are omitted.
    fn get_attributes(&self, hdls: HandleRange, typ: Option<Uuid>) -> StructBuf {
        let mut n = 1;
        let attrs: Vec<_> = (self.srv.attributes(hdls, typ))
            .take_while(|at| {
                n += 4 + at.typ.encoded_len();
                n <= MAX_DATA_LEN
            })
            .take(usize::from(u8::MAX))
            .collect();
        let mut b = StructBuf::new(MAX_DATA_LEN);
        {
            let mut p = b.append();
            #[allow(clippy::cast_possible_truncation)]
            p.u8(attrs.len() as u8);
            for at in &attrs {
                #[allow(clippy::cast_possible_truncation)]
                let t = at.typ.encoded_len() as u8;
                p.u16(at.hdl).u8(at.perms.host_bits()).u8(t).uuid(at.typ);
            }
        }
        debug!("Found {} attributes in {hdls:?}", attrs.len());
        b
    }

    /// Reads an attribute value. A required encryption key size is reported
    /// as an error unless the peer is connected with a sufficient key size,
    /// but the value is still returned if the read itself succeeded.
    fn get_attribute_value(&self, peer: Addr, hdl: Handle) -> Reply {
        if (self.srv.attributes(HandleRange::new(hdl, hdl), None).next()).is_none() {
            warn!("No attribute at {hdl}");
            return Reply::Status(Status::Failed);
        }
        let conn = self.srv.host().lookup(peer);
        let mut req = ReadReq::new(hdl, 0, MAX_VAL_LEN);
        let (mut att, val) = match self.srv.read(conn, &mut req) {
            Ok(()) => (None, req.value()),
            Err(e) => (Some(e), &[][..]),
        };
        let key_size = self.srv.db().enc_key_size(hdl).unwrap_or(0);
        if att.is_none()
            && key_size > 0
            && conn.map_or(true, |c| key_size > self.srv.host().enc_key_size(c))
        {
            att = Some(ErrorCode::EncryptionKeySizeTooShort);
        }
        let mut b = StructBuf::new(3 + val.len());
        b.append()
            .u8(att.map_or(0, u8::from))
            .u16(len16(val))
            .put(val);
        Reply::Rsp(b)
    }
}

/// Returns a response carrying a single attribute handle.
fn rsp_id(hdl: Handle) -> Reply {
    let mut b = StructBuf::new(2);
    b.append().u16(hdl);
    Reply::Rsp(b)
}

/// Encodes the supported command bitmask, where bit `n` is set if opcode `n`
/// is supported.
fn supported_commands() -> StructBuf {
    let mut bits = [0_u8; 5];
    for op in enum_iterator::all::<Opcode>().filter(|op| op.is_supported()) {
        let i = usize::from(u8::from(op));
        bits[i / 8] |= 1 << (i % 8);
    }
    let n = bits.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let mut b = StructBuf::new(n);
    b.append().put(&bits[..n]);
    b
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
const fn len16(v: &[u8]) -> u16 {
    v.len() as u16
}
