use bitflags::bitflags;
use structbuf::{StructBuf, Unpack};
use tracing::{trace, warn};

use crate::att::{ErrorCode, Handle, MAX_VAL_LEN};
use crate::le::Addr;

use super::db::Kind;
use super::*;

/// Attribute access result.
pub type IoResult<T> = std::result::Result<T, ErrorCode>;

bitflags! {
    /// Attribute write flags set by the host.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct WriteFlags: u8 {
        /// Prepare Write Request. Only authorization and bounds are checked.
        const PREPARE = 0x01;
        /// Write Command (no response).
        const CMD = 0x02;
        /// Execute Write Request for previously prepared data.
        const EXECUTE = 0x04;
    }
}

/// Events emitted by the server.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// A client changed a local attribute value. `val` is the complete value.
    ValueChanged { hdl: Handle, val: Vec<u8> },
    /// A peer notified or indicated a subscribed characteristic value.
    Notification {
        peer: Addr,
        kind: SubKind,
        hdl: Handle,
        val: Vec<u8>,
    },
}

/// Attribute read request.
#[derive(Debug)]
pub struct ReadReq {
    hdl: Handle,
    off: u16,
    buf: StructBuf,
}

impl ReadReq {
    /// Creates a request to read at most `max_len` bytes of the attribute
    /// value starting at `off`.
    #[inline]
    #[must_use]
    pub fn new(hdl: Handle, off: u16, max_len: usize) -> Self {
        Self {
            hdl,
            off,
            buf: StructBuf::new(max_len.min(MAX_VAL_LEN)),
        }
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off as _
    }

    /// Returns the value read by the last successful request.
    #[inline(always)]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// Provides the complete attribute value. The part starting at the
    /// requested offset is copied, truncated to the request limit.
    fn complete(&mut self, v: impl AsRef<[u8]>) -> IoResult<()> {
        let v = (v.as_ref().get(self.offset()..)).ok_or(ErrorCode::InvalidOffset)?;
        self.buf.clear();
        (self.buf).put_at(0, &v[..v.len().min(self.buf.lim())]);
        Ok(())
    }
}

/// Attribute write request.
#[derive(Debug)]
pub struct WriteReq<'a> {
    hdl: Handle,
    off: u16,
    val: &'a [u8],
    flags: WriteFlags,
}

impl<'a> WriteReq<'a> {
    /// Creates a request to write `val` at offset `off`.
    #[inline]
    #[must_use]
    pub const fn new(hdl: Handle, off: u16, val: &'a [u8], flags: WriteFlags) -> Self {
        Self {
            hdl,
            off,
            val,
            flags,
        }
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off as _
    }

    /// Returns the value to be written at the specified offset.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.val
    }

    /// Returns the subslice of `dst` that would be overwritten. Returns either
    /// `InvalidOffset` or `InvalidAttributeValueLength` if the written value
    /// does not fit.
    #[inline]
    fn target<'b>(&self, dst: &'b mut [u8]) -> IoResult<&'b mut [u8]> {
        let Some(dst) = dst.get_mut(self.offset()..) else {
            return Err(ErrorCode::InvalidOffset);
        };
        dst.get_mut(..self.val.len())
            .ok_or(ErrorCode::InvalidAttributeValueLength)
    }
}

/// Outcome of a successful [`Db::write`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Written {
    /// Prepared write was accepted without changing the value.
    Prepared,
    /// The value was updated.
    Value,
    /// The CCC descriptor configuration was updated.
    Ccc(Cccd),
}

impl Db {
    /// Reads an attribute value. `key_size` is the encryption key size of the
    /// requesting connection, or [`None`] for local reads, which skip the key
    /// size check.
    pub fn read(&self, key_size: Option<u8>, req: &mut ReadReq) -> IoResult<()> {
        let i = self.index(req.hdl).ok_or(ErrorCode::InvalidHandle)?;
        let at = &self.attr[i];
        match at.kind {
            Kind::Value(v) => {
                if v.flags.contains(ValueFlags::READ_AUTHZ) {
                    warn!("Denied read of {} without authorization", at.hdl);
                    return Err(ErrorCode::InsufficientAuthorization);
                }
                if at.perms.intersects(Perm::READ_ENC_MASK)
                    && key_size.map_or(false, |n| v.key_size > n)
                {
                    warn!("Denied read of {} due to key size", at.hdl);
                    return Err(ErrorCode::EncryptionKeySizeTooShort);
                }
                req.complete(v.data.map_or(&[][..], |s| self.arena.get(s)))
            }
            Kind::Service(s) | Kind::Characteristic(s) | Kind::Cep(s) => {
                req.complete(self.arena.get(s))
            }
            Kind::Include(svc) => {
                let (v, n) = self.include_value(svc);
                req.complete(&v[..n])
            }
            Kind::Ccc(cfg) => req.complete(cfg.bits().to_le_bytes()),
        }
    }

    /// Writes an attribute value in place. Value length is fixed by
    /// [`Server::set_value`], so writes past the end are rejected rather than
    /// extending the value.
    ///
    /// [`Server::set_value`]: crate::gatt::Server::set_value
    pub fn write(&mut self, key_size: u8, req: &WriteReq) -> IoResult<Written> {
        let i = self.index(req.hdl).ok_or(ErrorCode::InvalidHandle)?;
        let at = &mut self.attr[i];
        match at.kind {
            Kind::Value(v) => {
                if v.flags.contains(ValueFlags::WRITE_AUTHZ) {
                    warn!("Denied write of {} without authorization", at.hdl);
                    return Err(ErrorCode::InsufficientAuthorization);
                }
                if at.perms.intersects(Perm::WRITE_ENC_MASK) && v.key_size > key_size {
                    warn!("Denied write of {} due to key size", at.hdl);
                    return Err(ErrorCode::EncryptionKeySizeTooShort);
                }
                let dst: &mut [u8] = match v.data {
                    Some(s) => self.arena.get_mut(s),
                    None => &mut [],
                };
                let dst = req.target(dst)?;
                if req.flags.contains(WriteFlags::PREPARE) {
                    trace!("Prepared write of {}", req.hdl);
                    return Ok(Written::Prepared);
                }
                dst.copy_from_slice(req.val);
                Ok(Written::Value)
            }
            Kind::Ccc(ref mut cfg) => {
                if req.off != 0 {
                    return Err(ErrorCode::InvalidOffset);
                }
                if req.val.len() != 2 {
                    return Err(ErrorCode::InvalidAttributeValueLength);
                }
                if req.flags.contains(WriteFlags::PREPARE) {
                    return Ok(Written::Prepared);
                }
                *cfg = Cccd::from_bits_truncate(req.val.unpack().u16());
                Ok(Written::Ccc(*cfg))
            }
            _ => Err(ErrorCode::WriteNotPermitted),
        }
    }
}
