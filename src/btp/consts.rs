/// BTP header length (service id, opcode, controller index, and data length).
pub const HDR_LEN: usize = 5;

/// Maximum BTP packet length.
pub const MTU: usize = 1024;

/// Maximum length of a command, response, or event payload.
pub const MAX_DATA_LEN: usize = MTU - HDR_LEN;

/// GATT service command opcodes.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    enum_iterator::Sequence,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Opcode {
    ReadSupportedCommands = 0x01,
    AddService = 0x02,
    AddCharacteristic = 0x03,
    AddDescriptor = 0x04,
    AddIncludedService = 0x05,
    SetValue = 0x06,
    StartServer = 0x07,
    ResetServer = 0x08,
    SetEncKeySize = 0x09,
    ExchangeMtu = 0x0A,
    DiscAllPrim = 0x0B,
    DiscPrimUuid = 0x0C,
    FindIncluded = 0x0D,
    DiscAllChrc = 0x0E,
    DiscChrcUuid = 0x0F,
    DiscAllDesc = 0x10,
    Read = 0x11,
    ReadUuid = 0x12,
    ReadLong = 0x13,
    ReadMultiple = 0x14,
    WriteWithoutRsp = 0x15,
    SignedWriteWithoutRsp = 0x16,
    Write = 0x17,
    WriteLong = 0x18,
    WriteReliable = 0x19,
    CfgNotify = 0x1A,
    CfgIndicate = 0x1B,
    GetAttributes = 0x1C,
    GetAttributeValue = 0x1D,
    ChangeDb = 0x1E,
    EattConnect = 0x1F,
    ReadMultipleVar = 0x20,
    NotifyMultiple = 0x21,
}

impl Opcode {
    /// Returns whether the command is handled by the GATT server. Client
    /// procedures are forwarded by the host glue and are not supported here.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            ReadSupportedCommands
                | AddService
                | AddCharacteristic
                | AddDescriptor
                | AddIncludedService
                | SetValue
                | StartServer
                | ResetServer
                | SetEncKeySize
                | ExchangeMtu
                | CfgNotify
                | CfgIndicate
                | GetAttributes
                | GetAttributeValue
        )
    }
}

/// GATT service event codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum EventCode {
    Notification = 0x80,
    AttrValueChanged = 0x81,
}

/// BTP response status.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum Status {
    #[default]
    Success = 0x00,
    Failed = 0x01,
    UnknownCommand = 0x02,
    NotReady = 0x03,
}

/// Service type in the add service command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub(super) enum ServiceType {
    Primary = 0x00,
    Secondary = 0x01,
}

crate::util::impl_display_via_debug! { Opcode, EventCode, Status }
