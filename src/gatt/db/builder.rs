use structbuf::{Pack, StructBuf};
use tracing::{debug, warn};

use crate::gap::UuidPacker;
use crate::Config;

use super::*;

/// Characteristic value delivery requested by [`Db::set_value`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(in crate::gatt) struct Delivery {
    pub hdl: Handle,
    pub indicate: bool,
}

impl Db {
    /// Creates an empty database. `cfg` must be valid.
    #[must_use]
    pub(in crate::gatt) fn new(cfg: &Config) -> Self {
        Self {
            attr: Vec::with_capacity(cfg.max_attrs),
            svc: Vec::with_capacity(cfg.max_services),
            arena: Arena::new(cfg.arena_size),
            first: Handle::new(cfg.first_handle).unwrap_or(Handle::MIN),
            open: false,
            ccc_added: false,
            max_attrs: cfg.max_attrs,
            max_services: cfg.max_services,
        }
    }

    /// Declares a primary or secondary service ([Vol 3] Part G, Section 3.1).
    /// Any previously open service must already be registered.
    pub(in crate::gatt) fn add_service(&mut self, primary: bool, uuid: Uuid) -> Result<Handle> {
        debug_assert!(self.pending().is_none(), "unregistered service would be lost");
        if self.svc.len() >= self.max_services {
            return Err(Error::ServiceTableFull(self.max_services));
        }
        let was_open = self.open;
        self.svc.push(Service {
            first: self.attr.len(),
            count: 0,
            registered: false,
        });
        self.open = true;
        let typ = if primary {
            Declaration::PrimaryService
        } else {
            Declaration::SecondaryService
        };
        self.append(typ.uuid(), Perm::READ, &uuid.to_vec(), Kind::Service)
            .map_err(|e| {
                self.svc.pop();
                self.open = was_open;
                e
            })
    }

    /// Declares a characteristic ([Vol 3] Part G, Section 3.3). The
    /// declaration and value attributes are added atomically. `parent` must
    /// be 0, referring to the current service.
    pub(in crate::gatt) fn add_characteristic(
        &mut self,
        parent: u16,
        props: Prop,
        perms: u8,
        uuid: Uuid,
    ) -> Result<Handle> {
        if parent != 0 {
            return Err(Error::NonSequentialParent(parent));
        }
        let (m, n) = (self.arena.mark(), self.attr.len());
        let vhdl = (self.next_handle()?.next()).ok_or(Error::TableFull(self.max_attrs))?;
        let mut decl = StructBuf::new(3 + Uuid::BYTES);
        decl.append().u8(props.bits()).u16(vhdl).uuid(uuid);
        let hdl = self.append(
            Declaration::Characteristic.uuid(),
            Perm::READ,
            decl.as_ref(),
            Kind::Characteristic,
        )?;
        let (perms, flags) = Perm::from_btp(perms);
        let val = Value {
            flags,
            ..Value::default()
        };
        if let Err(e) = self.append(uuid, perms, &[], |_| Kind::Value(val)) {
            warn!("Failed to add value for characteristic {hdl} ({e})");
            self.rollback(n, m);
            return Err(e);
        }
        Ok(hdl)
    }

    /// Adds a descriptor to the most recent characteristic
    /// ([Vol 3] Part G, Section 3.3.3). `parent` must be 0.
    pub(in crate::gatt) fn add_descriptor(
        &mut self,
        parent: u16,
        perms: u8,
        uuid: Uuid,
    ) -> Result<Handle> {
        use Descriptor::*;
        // Service, characteristic declaration, and value must precede
        if self.svc.is_empty() || self.attr.len() < 3 {
            return Err(Error::NoBaseCharacteristic);
        }
        if parent != 0 {
            return Err(Error::NonSequentialParent(parent));
        }
        let c = self.base_characteristic().ok_or(Error::NoBaseCharacteristic)?;
        let Kind::Characteristic(decl) = self.attr[c].kind else {
            return Err(Error::NoBaseCharacteristic);
        };
        let (props, ..) = self.decl(decl);
        if uuid == CharacteristicExtendedProperties {
            if !props.contains(Prop::EXT_PROPS) {
                return Err(Error::NotPermittedByProps(CharacteristicExtendedProperties));
            }
            return self.append(uuid, Perm::READ, &[0; 2], Kind::Cep);
        }
        if uuid == ClientCharacteristicConfiguration {
            if self.ccc_added {
                return Err(Error::CccAlreadyAdded);
            }
            if !props.intersects(Prop::NOTIFY | Prop::INDICATE) {
                return Err(Error::NotPermittedByProps(ClientCharacteristicConfiguration));
            }
            let hdl = self.append(uuid, Perm::READ | Perm::WRITE, &[], |_| {
                Kind::Ccc(Cccd::empty())
            })?;
            if let Kind::Value(ref mut v) = self.attr[c + 1].kind {
                v.flags.insert(ValueFlags::CCC);
            }
            self.ccc_added = true;
            return Ok(hdl);
        }
        let (perms, flags) = Perm::from_btp(perms);
        let val = Value {
            flags,
            ..Value::default()
        };
        self.append(uuid, perms, &[], |_| Kind::Value(val))
    }

    /// Adds an include declaration for the service declared at `svc`
    /// ([Vol 3] Part G, Section 3.2).
    pub(in crate::gatt) fn add_included(&mut self, svc: u16) -> Result<Handle> {
        if svc == 0 {
            return Err(Error::InvalidAttr(svc));
        }
        let i = self.resolve(svc)?;
        if !matches!(self.attr[i].kind, Kind::Service(_)) {
            return Err(Error::NotService(self.attr[i].hdl));
        }
        self.append(Declaration::Include.uuid(), Perm::READ, &[], |_| {
            Kind::Include(i)
        })
    }

    /// Sets the value of a characteristic value or descriptor attribute. The
    /// first non-empty value fixes the value length. Returns the notification
    /// or indication to send if a client enabled one via the CCC descriptor.
    pub(in crate::gatt) fn set_value(&mut self, id: u16, v: &[u8]) -> Result<Option<Delivery>> {
        let i = self.resolve(id)?;
        let hdl = self.attr[i].hdl;
        let mut val = match self.attr[i].kind {
            Kind::Ccc(_) => return Ok(None), // Configured by the client
            Kind::Cep(s) => {
                if v.len() != s.len() {
                    return Err(Error::LengthMismatch {
                        expected: s.len(),
                        actual: v.len(),
                    });
                }
                self.arena.get_mut(s).copy_from_slice(v);
                return Ok(None);
            }
            Kind::Value(val) => val,
            _ => return Err(Error::NotValue(hdl)),
        };
        let s = match val.data {
            Some(s) if !s.is_empty() => s,
            _ => {
                let s = self.arena.push(v.len())?;
                val.data = Some(s);
                self.attr[i].kind = Kind::Value(val);
                s
            }
        };
        if s.len() != v.len() {
            return Err(Error::LengthMismatch {
                expected: s.len(),
                actual: v.len(),
            });
        }
        self.arena.get_mut(s).copy_from_slice(v);
        debug!("Set {hdl} value to {v:02X?}");
        if !val.flags.contains(ValueFlags::CCC) {
            return Ok(None);
        }
        let cfg = self.ccc_after(i).unwrap_or_default();
        Ok((!cfg.is_empty()).then_some(Delivery {
            hdl,
            indicate: cfg != Cccd::NOTIFY,
        }))
    }

    /// Sets the minimum encryption key size required to access a value
    /// attribute with an encryption permission.
    pub(in crate::gatt) fn set_enc_key_size(&mut self, id: u16, key_size: u8) -> Result<()> {
        if !(7..=15).contains(&key_size) {
            return Err(Error::InvalidKeySize(key_size));
        }
        let i = self.resolve(id)?;
        let at = &mut self.attr[i];
        if matches!(at.kind, Kind::Service(_) | Kind::Include(_)) {
            return Err(Error::NotValue(at.hdl));
        }
        if !at.perms.is_encrypted() {
            return Err(Error::NotEncrypted(at.hdl));
        }
        let Kind::Value(ref mut v) = at.kind else {
            return Err(Error::NotValue(at.hdl));
        };
        v.key_size = key_size;
        Ok(())
    }

    /// Returns the attributes of the open service that must be handed to the
    /// host.
    pub(in crate::gatt) fn pending_attrs(&self) -> Option<Vec<AttrInfo>> {
        let r = self.pending()?;
        Some(
            (self.attr[r].iter())
                .map(|at| AttrInfo {
                    hdl: at.hdl,
                    typ: self.typ_of(at),
                    perms: at.perms,
                })
                .collect(),
        )
    }

    /// Marks the open service as registered and closes it. Further attributes
    /// require a new service declaration.
    pub(in crate::gatt) fn commit(&mut self) {
        if let Some(s) = self.svc.last_mut() {
            s.registered = true;
        }
        self.open = false;
    }

    /// Returns the declaration handles of all registered services.
    pub(in crate::gatt) fn registered(&self) -> impl Iterator<Item = Handle> + '_ {
        (self.svc.iter()).filter_map(|s| s.registered.then(|| self.attr[s.first].hdl))
    }

    /// Removes all attributes and services.
    pub(in crate::gatt) fn clear(&mut self) {
        self.attr.clear();
        self.svc.clear();
        self.arena.clear();
        self.open = false;
        self.ccc_added = false;
    }

    /// Appends an attribute to the open service. The attribute type and
    /// `data` are copied into the arena.
    fn append(
        &mut self,
        typ: Uuid,
        perms: Perm,
        data: &[u8],
        kind: impl FnOnce(Span) -> Kind,
    ) -> Result<Handle> {
        if !self.open {
            return Err(Error::NoOpenService);
        }
        let hdl = self.next_handle()?;
        let m = self.arena.mark();
        let t = self.arena.push_copy(&typ.to_vec())?;
        let d = (self.arena.push_copy(data)).map_err(|e| {
            self.arena.rewind_to(m);
            e
        })?;
        self.attr.push(Attr {
            hdl,
            typ: t,
            perms,
            kind: kind(d),
        });
        if let Some(s) = self.svc.last_mut() {
            s.count += 1;
        }
        debug!("Added {hdl} <{typ}>");
        Ok(hdl)
    }

    /// Returns the handle that will be assigned to the next attribute.
    fn next_handle(&self) -> Result<Handle> {
        let n = self.attr.len();
        if n >= self.max_attrs {
            return Err(Error::TableFull(self.max_attrs));
        }
        (self.first.offset(n)).ok_or(Error::TableFull(self.max_attrs))
    }

    /// Removes all attributes after the first `n` and restores the arena.
    fn rollback(&mut self, n: usize, m: Mark) {
        let removed = self.attr.len().saturating_sub(n);
        self.attr.truncate(n);
        if let Some(s) = self.svc.last_mut() {
            s.count -= removed.min(s.count);
        }
        self.arena.rewind_to(m);
    }

    /// Returns the index of the characteristic declaration that owns the last
    /// attribute, stopping at the service declaration.
    fn base_characteristic(&self) -> Option<usize> {
        for (i, at) in self.attr.iter().enumerate().rev() {
            match at.kind {
                Kind::Service(_) => break,
                Kind::Characteristic(_) => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Returns the configuration of the CCC descriptor belonging to the
    /// characteristic value at index `i`.
    fn ccc_after(&self, i: usize) -> Option<Cccd> {
        for at in &self.attr[i + 1..] {
            match at.kind {
                Kind::Ccc(cfg) => return Some(cfg),
                Kind::Service(_) | Kind::Include(_) | Kind::Characteristic(_) => break,
                _ => {}
            }
        }
        None
    }
}
