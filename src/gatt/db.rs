use std::ops::{Range, RangeBounds};

use bitflags::bitflags;
use structbuf::Unpack;
use tracing::info;

use crate::att::{Handle, HandleRange};
use crate::gap::{Uuid, Uuid16};
use crate::host::AttrInfo;

use super::*;

mod builder;

bitflags! {
    /// Characteristic value and descriptor flags.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct ValueFlags: u8 {
        /// The characteristic has a CCC descriptor.
        const CCC = 1 << 0;
        /// Reads are rejected with `InsufficientAuthorization`.
        const READ_AUTHZ = 1 << 1;
        /// Writes are rejected with `InsufficientAuthorization`.
        const WRITE_AUTHZ = 1 << 2;
    }
}

/// GATT server database.
///
/// Attributes are appended in handle order. Each attribute record has a fixed
/// size. Attribute types and all variable-length data live in the [`Arena`].
#[derive(Clone, Debug)]
pub struct Db {
    pub(super) attr: Vec<Attr>,
    svc: Vec<Service>,
    pub(super) arena: Arena,
    first: Handle,
    open: bool,
    ccc_added: bool,
    max_attrs: usize,
    max_services: usize,
}

/// Attribute record.
#[derive(Clone, Copy, Debug)]
pub(super) struct Attr {
    pub hdl: Handle,
    typ: Span,
    pub perms: Perm,
    pub kind: Kind,
}

/// Attribute role and role-specific data.
#[derive(Clone, Copy, Debug)]
pub(super) enum Kind {
    /// Primary or secondary service declaration holding the service UUID.
    Service(Span),
    /// Include declaration referring to a service declaration index.
    Include(usize),
    /// Characteristic declaration holding properties, value handle, and UUID.
    Characteristic(Span),
    /// Characteristic value or a generic descriptor.
    Value(Value),
    /// Client Characteristic Configuration descriptor.
    Ccc(Cccd),
    /// Characteristic Extended Properties descriptor.
    Cep(Span),
}

/// Settable attribute value.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Value {
    pub data: Option<Span>,
    pub key_size: u8,
    pub flags: ValueFlags,
}

/// Contiguous run of attributes starting with a service declaration.
#[derive(Clone, Copy, Debug)]
struct Service {
    first: usize,
    count: usize,
    registered: bool,
}

impl Service {
    #[inline(always)]
    const fn attrs(&self) -> Range<usize> {
        self.first..self.first + self.count
    }
}

impl Db {
    /// Returns the number of attributes.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.attr.len()
    }

    /// Returns whether the database is empty.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attr.is_empty()
    }

    /// Returns the handle of the first attribute.
    #[inline(always)]
    #[must_use]
    pub const fn first_handle(&self) -> Handle {
        self.first
    }

    /// Returns the number of declared services.
    #[inline(always)]
    #[must_use]
    pub fn services(&self) -> usize {
        self.svc.len()
    }

    /// Returns the attribute data arena.
    #[inline(always)]
    #[must_use]
    pub const fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Returns whether a CCC descriptor was added.
    #[inline(always)]
    #[must_use]
    pub const fn has_ccc(&self) -> bool {
        self.ccc_added
    }

    /// Returns the handles of all attributes in table order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.attr.iter().map(|at| at.hdl)
    }

    /// Returns the handle range of the attributes that were added to the
    /// database, but not yet handed to the host. These are published by the
    /// next service declaration or server start.
    #[must_use]
    pub fn unregistered(&self) -> Option<HandleRange> {
        let r = self.pending()?;
        Some(HandleRange::new(self.attr[r.start].hdl, self.attr[r.end - 1].hdl))
    }

    /// Returns the type of the specified attribute.
    #[must_use]
    pub fn typ(&self, hdl: Handle) -> Option<Uuid> {
        self.index(hdl).map(|i| self.typ_of(&self.attr[i]))
    }

    /// Returns the permissions of the specified attribute.
    #[must_use]
    pub fn perms(&self, hdl: Handle) -> Option<Perm> {
        self.index(hdl).map(|i| self.attr[i].perms)
    }

    /// Returns the stored value of a characteristic value or descriptor
    /// attribute. Values that were never set are empty.
    #[must_use]
    pub fn value(&self, hdl: Handle) -> Option<&[u8]> {
        match self.attr[self.index(hdl)?].kind {
            Kind::Value(v) => Some(v.data.map_or(&[][..], |s| self.arena.get(s))),
            Kind::Cep(s) => Some(self.arena.get(s)),
            _ => None,
        }
    }

    /// Returns the configuration of a CCC descriptor.
    #[must_use]
    pub fn ccc_config(&self, hdl: Handle) -> Option<Cccd> {
        match self.attr[self.index(hdl)?].kind {
            Kind::Ccc(cfg) => Some(cfg),
            _ => None,
        }
    }

    /// Returns the required encryption key size of a value attribute.
    #[must_use]
    pub fn enc_key_size(&self, hdl: Handle) -> Option<u8> {
        match self.attr[self.index(hdl)?].kind {
            Kind::Value(v) => Some(v.key_size),
            _ => None,
        }
    }

    /// Returns published attributes within `hdls`, optionally filtered by
    /// type.
    pub fn attributes(
        &self,
        hdls: HandleRange,
        typ: Option<Uuid>,
    ) -> impl Iterator<Item = AttrInfo> + '_ {
        let published = self.svc.iter().filter(|s| s.registered).map(|s| s.count);
        let n: usize = published.sum();
        (self.attr[..n].iter())
            .filter(move |at| hdls.contains(&at.hdl))
            .map(|at| AttrInfo {
                hdl: at.hdl,
                typ: self.typ_of(at),
                perms: at.perms,
            })
            .filter(move |at| typ.map_or(true, |t| at.typ == t))
    }

    /// Logs database contents.
    pub fn dump(&self) {
        macro_rules! log {
            ($at:ident, $fmt:expr$(, $($args:tt)*)?) => {
                info!("[{:#06X}] {}", u16::from($at.hdl), format_args!($fmt$(, $($args)*)?))
            };
        }
        info!(
            "GATT database ({} attributes, arena {}/{}):",
            self.attr.len(),
            self.arena.used(),
            self.arena.cap()
        );
        for at in &self.attr {
            let typ = self.typ_of(at);
            match at.kind {
                Kind::Service(uuid) => {
                    let sec = if typ == Declaration::SecondaryService {
                        "(Secondary) "
                    } else {
                        ""
                    };
                    log!(at, "{sec}Service <{}>", self.uuid_at(uuid));
                }
                Kind::Include(i) => {
                    let r = self.service_range(i);
                    log!(at, "|__ [Include {:#06X}..={:#06X}]", u16::from(r.start()), u16::from(r.end()));
                }
                Kind::Characteristic(decl) => {
                    let (props, _, uuid) = self.decl(decl);
                    log!(at, "|__ Characteristic <{uuid}> {props:?}");
                }
                Kind::Value(v) if v.flags.contains(ValueFlags::CCC) || self.is_char_value(at) => {
                    let n = v.data.map_or(0, Span::len);
                    log!(at, "    |__ [Value <{typ}> len={n}]");
                }
                Kind::Value(v) => {
                    let n = v.data.map_or(0, Span::len);
                    log!(at, "    |__ Descriptor <{typ}> len={n}");
                }
                Kind::Ccc(cfg) => log!(at, "    |__ CCC {cfg:?}"),
                Kind::Cep(s) => log!(at, "    |__ CEP {:#06X}", self.arena.get(s).unpack().u16()),
            }
        }
        if let Some(r) = self.unregistered() {
            info!("Unregistered: {r:?}");
        }
    }

    /// Returns the table index of the specified handle.
    #[inline]
    pub(super) fn index(&self, hdl: Handle) -> Option<usize> {
        (hdl.index_from(self.first)).filter(|&i| i < self.attr.len())
    }

    /// Resolves a BTP attribute id, where 0 refers to the most recently added
    /// attribute.
    fn resolve(&self, id: u16) -> Result<usize> {
        if id == 0 {
            return self.attr.len().checked_sub(1).ok_or(Error::InvalidAttr(id));
        }
        (Handle::new(id).and_then(|h| self.index(h))).ok_or(Error::InvalidAttr(id))
    }

    /// Returns the attribute range of the open service if it has not been
    /// handed to the host.
    fn pending(&self) -> Option<Range<usize>> {
        (self.svc.last()).and_then(|s| (!s.registered && s.count > 0).then(|| s.attrs()))
    }

    /// Returns the handle range of the service declared at index `i`.
    fn service_range(&self, i: usize) -> HandleRange {
        let n = (self.svc.iter().find(|s| s.first == i)).map_or(1, |s| s.count.max(1));
        HandleRange::new(self.attr[i].hdl, self.attr[i + n - 1].hdl)
    }

    /// Returns whether `at` immediately follows a characteristic declaration.
    fn is_char_value(&self, at: &Attr) -> bool {
        (self.index(at.hdl)).map_or(false, |i| {
            i > 0 && matches!(self.attr[i - 1].kind, Kind::Characteristic(_))
        })
    }

    /// Returns the attribute type.
    #[inline]
    fn typ_of(&self, at: &Attr) -> Uuid {
        self.uuid_at(at.typ)
    }

    /// Decodes a UUID stored in the arena.
    fn uuid_at(&self, s: Span) -> Uuid {
        Uuid::try_from(self.arena.get(s)).expect("corrupt attribute UUID")
    }

    /// Decodes a characteristic declaration value.
    fn decl(&self, s: Span) -> (Prop, Handle, Uuid) {
        let v = self.arena.get(s);
        let (mut hdr, uuid) = (v.unpack(), v.get(3..).unwrap_or_default());
        let props = Prop::from_bits_retain(hdr.u8());
        let vhdl = Handle::new(hdr.u16()).unwrap_or(Handle::MAX);
        let uuid = Uuid::try_from(uuid).expect("corrupt characteristic UUID");
        (props, vhdl, uuid)
    }

    /// Encodes an include declaration value.
    pub(super) fn include_value(&self, i: usize) -> ([u8; 6], usize) {
        let r = self.service_range(i);
        let uuid = match self.attr[i].kind {
            Kind::Service(s) => self.uuid_at(s).as_uuid16(),
            _ => None,
        };
        let mut v = [0; 6];
        v[..2].copy_from_slice(&u16::from(r.start()).to_le_bytes());
        v[2..4].copy_from_slice(&u16::from(r.end()).to_le_bytes());
        if let Some(u) = uuid.map(Uuid16::to_bytes) {
            v[4..].copy_from_slice(&u);
            return (v, 6);
        }
        (v, 4)
    }
}

#[cfg(test)]
mod tests;
