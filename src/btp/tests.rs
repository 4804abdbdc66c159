use crate::gatt::{WriteFlags, WriteReq};
use crate::host::{Call, Conn, MockHost, SecLevel};
use crate::le::RawAddr;

use super::*;

fn peer() -> Addr {
    Addr::Random(RawAddr::from([0xC0, 1, 2, 3, 4, 5]))
}

/// BTP encoding of `peer()`.
const PEER: [u8; 7] = [0x01, 0xC0, 1, 2, 3, 4, 5];

fn hdl(h: u16) -> Handle {
    Handle::new(h).unwrap()
}

fn tester() -> Tester<MockHost> {
    let host = MockHost::connected(peer(), 16, SecLevel::L2);
    Tester::new(&Config::default(), host).unwrap()
}

fn rsp(r: Reply) -> Vec<u8> {
    match r {
        Reply::Rsp(b) => b.as_ref().to_vec(),
        r => panic!("unexpected reply: {r:?}"),
    }
}

fn cmd(t: &mut Tester<MockHost>, op: Opcode, c: &[u8]) -> Reply {
    t.handle(u8::from(op), c)
}

/// Service at 1, characteristic at 2 with the value at 3, and a CCC
/// descriptor at 4.
fn build(t: &mut Tester<MockHost>) {
    use Opcode::*;
    assert_eq!(rsp(cmd(t, AddService, &[0x00, 0x02, 0x00, 0x18])), [1, 0]);
    let c = [0, 0, 0x1A, 0x03, 0x02, 0x00, 0x2A];
    assert_eq!(rsp(cmd(t, AddCharacteristic, &c)), [2, 0]);
    let c = [0, 0, 0x03, 0x02, 0x02, 0x29];
    assert_eq!(rsp(cmd(t, AddDescriptor, &c)), [4, 0]);
    let r = cmd(t, SetValue, &[3, 0, 2, 0, 0xAB, 0xCD]);
    assert_eq!(r.status(), Some(Status::Success));
}

#[test]
fn build_and_start() {
    let mut t = tester();
    build(&mut t);
    assert_eq!(rsp(cmd(&mut t, Opcode::StartServer, &[])), [1, 0, 4]);
    assert_eq!(
        t.server_mut().host_mut().take(),
        [Call::Register(vec![hdl(1), hdl(2), hdl(3), hdl(4)])]
    );

    let all = rsp(cmd(&mut t, Opcode::GetAttributes, &[1, 0, 0xFF, 0xFF, 0]));
    assert_eq!(all[0], 4);
    assert_eq!(all[1..3], [1, 0]);
    assert_eq!(all[4..7], [2, 0x00, 0x28]);

    let c = [1, 0, 0xFF, 0xFF, 2, 0x03, 0x28];
    let chars = rsp(cmd(&mut t, Opcode::GetAttributes, &c));
    assert_eq!(chars.len(), 7);
    assert_eq!(chars[..3], [1, 2, 0]);
    assert_eq!(chars[4..], [2, 0x03, 0x28]);

    let c = [2, 0, 3, 0, 0];
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributes, &c))[0], 2);
    let c = [5, 0, 0xFF, 0xFF, 0];
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributes, &c)), [0]);
}

#[test]
fn invalid_commands() {
    use Opcode::*;
    let mut t = tester();
    assert_eq!(t.handle(0x40, &[]).status(), Some(Status::UnknownCommand));
    assert_eq!(
        cmd(&mut t, Read, &[]).status(),
        Some(Status::UnknownCommand)
    );
    for (op, c) in [
        (AddService, &[0x00, 0x03, 0x00, 0x18, 0x00][..]),
        (AddService, &[0x02, 0x02, 0x00, 0x18]),
        (AddService, &[0x00, 0x02, 0x00]),
        (AddService, &[0x00, 0x02, 0x00, 0x18, 0x00]),
        (StartServer, &[0]),
        (GetAttributes, &[2, 0, 1, 0, 0]),
        (GetAttributes, &[0, 0, 1, 0, 0]),
        (GetAttributeValue, &[0x01, 0xC0, 1, 2, 3, 4, 5, 0, 0]),
        (ExchangeMtu, &[0x07, 0xC0, 1, 2, 3, 4, 5]),
    ] {
        assert_eq!(cmd(&mut t, op, c).status(), Some(Status::Failed), "{op} {c:02X?}");
    }
    assert!(t.server().db().is_empty());

    rsp(cmd(&mut t, AddService, &[0x00, 0x02, 0x00, 0x18]));
    rsp(cmd(&mut t, AddCharacteristic, &[0, 0, 0x02, 0x01, 0x02, 0x00, 0x2A]));
    for c in [&[3, 0, 3, 0, 1, 2][..], &[3, 0, 1, 0, 1, 2], &[3, 0]] {
        assert_eq!(cmd(&mut t, SetValue, c).status(), Some(Status::Failed));
    }
    // Database errors
    let c = [0, 0, 0x01, 0x02, 0x02, 0x29];
    assert_eq!(cmd(&mut t, AddDescriptor, &c).status(), Some(Status::Failed));
    assert_eq!(
        cmd(&mut t, SetEncKeySize, &[3, 0, 6]).status(),
        Some(Status::Failed)
    );
}

#[test]
fn supported_commands() {
    let mut t = tester();
    let bits = rsp(cmd(&mut t, Opcode::ReadSupportedCommands, &[]));
    assert_eq!(bits, [0xFE, 0x07, 0x00, 0x3C]);
    for op in enum_iterator::all::<Opcode>() {
        let i = usize::from(u8::from(op));
        let set = bits.get(i / 8).map_or(false, |b| b & (1 << (i % 8)) != 0);
        assert_eq!(set, op.is_supported(), "{op}");
    }
}

#[test]
fn exchange_mtu() {
    let mut t = tester();
    let r = cmd(&mut t, Opcode::ExchangeMtu, &PEER);
    assert_eq!(r.status(), Some(Status::Success));
    assert_eq!(t.server_mut().host_mut().take(), [Call::ExchangeMtu(peer())]);
    let other = [0x00, 1, 2, 3, 4, 5, 6];
    let r = cmd(&mut t, Opcode::ExchangeMtu, &other);
    assert_eq!(r.status(), Some(Status::Failed));
}

#[test]
fn delayed_subscription() {
    let mut t = tester();
    let conn = Conn::new(peer());
    let enable = [&PEER[..], &[1, 4, 0]].concat();
    assert!(matches!(cmd(&mut t, Opcode::CfgNotify, &enable), Reply::Delayed));
    assert_eq!(t.poll_delayed(), None);
    assert_eq!(
        cmd(&mut t, Opcode::ReadSupportedCommands, &[]).status(),
        Some(Status::NotReady)
    );
    assert_eq!(
        cmd(&mut t, Opcode::CfgIndicate, &enable).status(),
        Some(Status::NotReady)
    );

    t.server_mut().characteristic_discovered(conn, hdl(2));
    t.server_mut().discovery_complete(conn);
    assert_eq!(t.poll_delayed(), Some((Opcode::CfgNotify, Status::Success)));
    assert_eq!(t.poll_delayed(), None);
    assert!(t.server().subscription(hdl(4)).unwrap().is_armed());

    t.server_mut().notification(hdl(4), Some(conn), Some(&[1, 2]));
    let (code, b) = t.next_event().unwrap();
    assert_eq!(code, EventCode::Notification);
    assert_eq!(b.as_ref(), [&PEER[..], &[0x01, 3, 0, 2, 0, 1, 2]].concat());
    assert!(t.next_event().is_none());

    let disable = [&PEER[..], &[0, 4, 0]].concat();
    let r = cmd(&mut t, Opcode::CfgNotify, &disable);
    assert_eq!(r.status(), Some(Status::Success));
    assert_eq!(
        t.server_mut().host_mut().take().last(),
        Some(&Call::Unsubscribe(peer(), hdl(4)))
    );
    let r = cmd(&mut t, Opcode::CfgNotify, &disable);
    assert_eq!(r.status(), Some(Status::Failed));
}

#[test]
fn delayed_failure() {
    let mut t = tester();
    let enable = [&PEER[..], &[1, 9, 0]].concat();
    assert!(matches!(cmd(&mut t, Opcode::CfgIndicate, &enable), Reply::Delayed));
    t.server_mut().discovery_complete(Conn::new(peer()));
    assert_eq!(t.poll_delayed(), Some((Opcode::CfgIndicate, Status::Failed)));
    assert!(t.server().subscription(hdl(9)).is_none());

    // Synchronous rejections are not delayed
    t.server_mut().host_mut().fail_discover = Some(crate::host::Error::Busy);
    let r = cmd(&mut t, Opcode::CfgIndicate, &enable);
    assert_eq!(r.status(), Some(Status::Failed));
    assert_eq!(t.poll_delayed(), None);
}

#[test]
fn reset_cancels_delayed() {
    let mut t = tester();
    build(&mut t);
    let enable = [&PEER[..], &[1, 9, 0]].concat();
    assert!(matches!(cmd(&mut t, Opcode::CfgNotify, &enable), Reply::Delayed));
    let r = cmd(&mut t, Opcode::ResetServer, &[]);
    assert_eq!(r.status(), Some(Status::Success));
    assert!(t.server().db().is_empty());
    assert_eq!(t.poll_delayed(), Some((Opcode::CfgNotify, Status::Failed)));
    assert_eq!(
        rsp(cmd(&mut t, Opcode::AddService, &[0x01, 0x02, 0x0F, 0x18])),
        [1, 0]
    );
}

#[test]
fn value_changed_event() {
    let mut t = tester();
    rsp(cmd(&mut t, Opcode::AddService, &[0x00, 0x02, 0x00, 0x18]));
    let c = [0, 0, 0x0A, 0x03, 0x02, 0x00, 0x2A];
    rsp(cmd(&mut t, Opcode::AddCharacteristic, &c));
    let r = cmd(&mut t, Opcode::SetValue, &[0, 0, 2, 0, 0, 0]);
    assert_eq!(r.status(), Some(Status::Success));
    rsp(cmd(&mut t, Opcode::StartServer, &[]));

    let w = WriteReq::new(hdl(3), 0, &[9, 9], WriteFlags::empty());
    t.server_mut().write(Conn::new(peer()), &w).unwrap();
    let (code, b) = t.next_event().unwrap();
    assert_eq!(code, EventCode::AttrValueChanged);
    assert_eq!(b.as_ref(), [3, 0, 2, 0, 9, 9]);
}

#[test]
fn get_attribute_value() {
    let mut t = tester();
    rsp(cmd(&mut t, Opcode::AddService, &[0x00, 0x02, 0x00, 0x18]));
    rsp(cmd(&mut t, Opcode::AddCharacteristic, &[0, 0, 0x02, 0x01, 0x02, 0x00, 0x2A]));
    rsp(cmd(&mut t, Opcode::AddCharacteristic, &[0, 0, 0x02, 0x04, 0x02, 0x01, 0x2A]));
    assert_eq!(
        cmd(&mut t, Opcode::SetEncKeySize, &[0, 0, 15]).status(),
        Some(Status::Success)
    );
    let get = |h: u8| [&PEER[..], &[h, 0]].concat();
    assert_eq!(
        cmd(&mut t, Opcode::GetAttributeValue, &get(3)).status(),
        Some(Status::Failed)
    );
    for c in [[3, 0, 1, 0, 5], [5, 0, 1, 0, 6]] {
        let r = cmd(&mut t, Opcode::SetValue, &c);
        assert_eq!(r.status(), Some(Status::Success));
    }
    assert_eq!(rsp(cmd(&mut t, Opcode::StartServer, &[])), [1, 0, 5]);

    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributeValue, &get(3))), [0, 1, 0, 5]);
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributeValue, &get(5))), [0, 1, 0, 6]);
    assert_eq!(
        rsp(cmd(&mut t, Opcode::GetAttributeValue, &get(1))),
        [0, 2, 0, 0x00, 0x18]
    );
    assert_eq!(
        cmd(&mut t, Opcode::GetAttributeValue, &get(6)).status(),
        Some(Status::Failed)
    );

    let weak = [0x00, 9, 9, 9, 9, 9, 9];
    (t.server_mut().host_mut().conns).insert(Addr::Public(RawAddr::from([9; 6])), (7, SecLevel::L2));
    let c = [&weak[..], &[5, 0]].concat();
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributeValue, &c)), [0x0C, 0, 0]);
    // Unconnected peers get the value along with the key size error
    let c = [&[0x00, 1, 1, 1, 1, 1, 1][..], &[5, 0]].concat();
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributeValue, &c)), [0x0C, 1, 0, 6]);
    let c = [&weak[..], &[3, 0]].concat();
    assert_eq!(rsp(cmd(&mut t, Opcode::GetAttributeValue, &c)), [0, 1, 0, 5]);
}

#[test]
fn empty_payloads() {
    use Opcode::*;
    let mut t = tester();
    assert!(!rsp(cmd(&mut t, ReadSupportedCommands, &[])).is_empty());
    rsp(cmd(&mut t, AddService, &[0x00, 0x02, 0x00, 0x18]));
    assert_eq!(rsp(cmd(&mut t, StartServer, &[])), [1, 0, 1]);
    assert_eq!(cmd(&mut t, ResetServer, &[]).status(), Some(Status::Success));
    assert!(t.server().db().is_empty());
    for op in [AddService, AddIncludedService, SetValue, ExchangeMtu, GetAttributes] {
        assert_eq!(cmd(&mut t, op, &[]).status(), Some(Status::Failed), "{op}");
    }
    assert_eq!(cmd(&mut t, ResetServer, &[0]).status(), Some(Status::Failed));
}

#[test]
fn zero_length_value() {
    let mut t = tester();
    rsp(cmd(&mut t, Opcode::AddService, &[0x00, 0x02, 0x00, 0x18]));
    rsp(cmd(&mut t, Opcode::AddCharacteristic, &[0, 0, 0x02, 0x01, 0x02, 0x00, 0x2A]));
    let r = cmd(&mut t, Opcode::SetValue, &[3, 0, 0, 0]);
    assert_eq!(r.status(), Some(Status::Success));
    assert_eq!(t.server().db().value(hdl(3)), Some(&[][..]));
}

#[test]
fn status_bytes() {
    assert_eq!(u8::from(Status::NotReady), 0x03);
    assert_eq!(Status::from(gatt::Error::NoFreeSlot), Status::Failed);
    assert_eq!(Status::default(), Status::Success);
    assert_eq!(u8::from(EventCode::AttrValueChanged), 0x81);
}
