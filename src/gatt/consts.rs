use bitflags::bitflags;

use crate::gap::uuid16_enum;

/// GATT attribute type declarations ([Vol 3] Part G, Section 3.4).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Declaration {
    PrimaryService = 0x2800,
    SecondaryService = 0x2801,
    Include = 0x2802,
    Characteristic = 0x2803,
}

/// GATT characteristic descriptors used by the tester
/// ([Assigned Numbers] Section 3.7).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    ClientCharacteristicConfiguration = 0x2902,
}

uuid16_enum! { Declaration Descriptor }
crate::util::impl_display_via_debug! { Declaration, Descriptor }

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value using Server
        /// Characteristic Configuration Descriptor.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_CMD = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. Requires a Client Characteristic Configuration
        /// descriptor.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        /// Requires a Client Characteristic Configuration descriptor.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const SIGNED_WRITE_CMD = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties descriptor.
        const EXT_PROPS = 0x80;
    }
}

bitflags! {
    /// Characteristic extended properties
    /// ([Vol 3] Part G, Section 3.3.3.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct ExtProp: u16 {
        /// Permits reliable writes of the Characteristic Value.
        const RELIABLE_WRITE = 0x0001;
        /// Permits writes to the characteristic descriptor.
        const WRITABLE_AUX = 0x0002;
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

bitflags! {
    /// Attribute permissions. The low byte uses the BTP command encoding.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perm: u16 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_ENCRYPT = 0x04;
        const WRITE_ENCRYPT = 0x08;
        const READ_AUTHEN = 0x10;
        const WRITE_AUTHEN = 0x20;
        const READ_AUTHZ = 0x40;
        const WRITE_AUTHZ = 0x80;
        /// Client may queue prepared writes.
        const PREPARE_WRITE = 0x100;

        /// Reads require an encrypted link.
        const READ_ENC_MASK = Self::READ_ENCRYPT.bits() | Self::READ_AUTHEN.bits();
        /// Writes require an encrypted link.
        const WRITE_ENC_MASK = Self::WRITE_ENCRYPT.bits() | Self::WRITE_AUTHEN.bits();
    }
}

impl Perm {
    /// Converts BTP permission bits into permissions and value flags. Each
    /// authorization bit implies the matching plain access bit unless an
    /// encrypted access bit is present. Prepared writes are always allowed.
    pub(crate) fn from_btp(v: u8) -> (Self, crate::gatt::ValueFlags) {
        use crate::gatt::ValueFlags;
        let mut p = Self::from_bits_truncate(u16::from(v));
        let mut f = ValueFlags::empty();
        if p.contains(Self::READ_AUTHZ) {
            f.insert(ValueFlags::READ_AUTHZ);
            if !p.intersects(Self::READ_ENC_MASK) {
                p.insert(Self::READ);
            }
        }
        if p.contains(Self::WRITE_AUTHZ) {
            f.insert(ValueFlags::WRITE_AUTHZ);
            if !p.intersects(Self::WRITE_ENC_MASK) {
                p.insert(Self::WRITE);
            }
        }
        p.remove(Self::READ_AUTHZ | Self::WRITE_AUTHZ);
        (p | Self::PREPARE_WRITE, f)
    }

    /// Returns the single-byte host stack encoding reported by
    /// `get_attributes`, where bit 6 indicates prepared write support.
    #[inline]
    #[must_use]
    pub const fn host_bits(self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.bits() & 0x3F) as u8;
        if self.contains(Self::PREPARE_WRITE) {
            v | 0x40
        } else {
            v
        }
    }

    /// Returns whether the permissions include any encryption requirement.
    #[inline(always)]
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        self.intersects(Self::READ_ENC_MASK.union(Self::WRITE_ENC_MASK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::ValueFlags;

    #[test]
    fn btp_perms() {
        let (p, f) = Perm::from_btp(0x40);
        assert_eq!(p, Perm::READ | Perm::PREPARE_WRITE);
        assert_eq!(f, ValueFlags::READ_AUTHZ);

        let (p, f) = Perm::from_btp(0x80 | 0x08);
        assert_eq!(p, Perm::WRITE_ENCRYPT | Perm::PREPARE_WRITE);
        assert_eq!(f, ValueFlags::WRITE_AUTHZ);
        assert!(p.is_encrypted());

        let (p, f) = Perm::from_btp(0x01);
        assert!(f.is_empty());
        assert_eq!(p.host_bits(), 0x41);
        assert_eq!(Perm::READ.host_bits(), 0x01);
    }

    #[test]
    fn decl_uuid() {
        assert_eq!(Declaration::Characteristic.uuid16().raw(), 0x2803);
        assert_eq!(
            crate::gap::Uuid16::new(0x2902).unwrap().as_uuid(),
            Descriptor::ClientCharacteristicConfiguration
        );
    }
}
