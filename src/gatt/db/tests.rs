use crate::Config;

use super::*;

fn hdl(h: u16) -> Handle {
    Handle::new(h).unwrap()
}

fn uuid(v: u16) -> Uuid {
    Uuid16::new(v).unwrap().as_uuid()
}

fn read(db: &Db, h: u16) -> Vec<u8> {
    let mut r = ReadReq::new(hdl(h), 0, 64);
    db.read(None, &mut r).unwrap();
    r.value().to_vec()
}

const CEP: Descriptor = Descriptor::CharacteristicExtendedProperties;

#[test]
fn sequencing() {
    let mut db = Db::new(&Config::default());
    assert_eq!(db.add_descriptor(0, 0x01, uuid(0x2901)), Err(Error::NoBaseCharacteristic));
    assert_eq!(
        db.add_characteristic(0, Prop::READ, 0x01, uuid(0x2A00)),
        Err(Error::NoOpenService)
    );
    assert_eq!(db.add_included(0), Err(Error::InvalidAttr(0)));
    assert!(db.is_empty() && db.arena().used() == 0);

    db.add_service(true, uuid(0x1800)).unwrap();
    assert_eq!(db.add_descriptor(0, 0x01, uuid(0x2901)), Err(Error::NoBaseCharacteristic));
    assert_eq!(
        db.add_characteristic(1, Prop::READ, 0x01, uuid(0x2A00)),
        Err(Error::NonSequentialParent(1))
    );
    db.add_characteristic(0, Prop::READ, 0x01, uuid(0x2A00))
        .unwrap();
    assert_eq!(
        db.add_descriptor(3, 0x01, uuid(0x2901)),
        Err(Error::NonSequentialParent(3))
    );
    assert_eq!(db.add_descriptor(0, 0x01, uuid(0x2901)), Ok(hdl(4)));
    assert_eq!(db.add_included(3), Err(Error::NotService(hdl(3))));
    assert_eq!(db.add_included(0x20), Err(Error::InvalidAttr(0x20)));
    assert_eq!(db.len(), 4);
}

#[test]
fn descriptor_needs_characteristic() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_included(1).unwrap();
    db.add_included(1).unwrap();
    assert_eq!(db.add_descriptor(0, 0x01, uuid(0x2901)), Err(Error::NoBaseCharacteristic));
}

#[test]
fn service_table_full() {
    let mut db = Db::new(&Config {
        max_services: 1,
        ..Config::default()
    });
    db.add_service(true, uuid(0x1800)).unwrap();
    db.commit();
    assert_eq!(
        db.add_service(true, uuid(0x1801)),
        Err(Error::ServiceTableFull(1))
    );
    assert_eq!(db.services(), 1);
    assert_eq!(db.registered().collect::<Vec<_>>(), [hdl(1)]);
}

#[test]
fn extended_properties() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x180F)).unwrap();
    db.add_characteristic(0, Prop::READ, 0x01, uuid(0x2A19))
        .unwrap();
    assert_eq!(
        db.add_descriptor(0, 0x01, CEP.uuid()),
        Err(Error::NotPermittedByProps(CEP))
    );
    db.add_characteristic(0, Prop::READ | Prop::EXT_PROPS, 0x01, uuid(0x2A1A))
        .unwrap();
    let cep = db.add_descriptor(0, 0x00, CEP.uuid()).unwrap();
    assert_eq!(db.value(cep), Some(&[0, 0][..]));
    assert_eq!(db.perms(cep), Some(Perm::READ));
    db.set_value(0, &[0x01, 0x00]).unwrap();
    assert_eq!(
        db.set_value(0, &[0x01]),
        Err(Error::LengthMismatch {
            expected: 2,
            actual: 1
        })
    );
    assert_eq!(read(&db, 6), [0x01, 0x00]);
}

#[test]
fn ccc_descriptor() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x180D)).unwrap();
    db.add_characteristic(0, Prop::INDICATE, 0x01, uuid(0x2A37))
        .unwrap();
    assert_eq!(db.enc_key_size(hdl(3)), Some(0));
    let ccc = Descriptor::ClientCharacteristicConfiguration.uuid();
    assert_eq!(db.add_descriptor(0, 0x04, ccc), Ok(hdl(4)));
    assert!(db.has_ccc());
    assert_eq!(db.perms(hdl(4)), Some(Perm::READ | Perm::WRITE));
    assert_eq!(db.ccc_config(hdl(4)), Some(Cccd::empty()));
    assert_eq!(db.ccc_config(hdl(3)), None);
    assert!(matches!(db.attr[2].kind, Kind::Value(v) if v.flags == ValueFlags::CCC));

    // Client configuration is not changed by set_value
    assert_eq!(db.set_value(4, &[1, 0]), Ok(None));
    assert_eq!(read(&db, 4), [0, 0]);
    assert_eq!(db.set_value(3, &[7]), Ok(None));
}

#[test]
fn authorization_flags() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_characteristic(0, Prop::READ | Prop::WRITE, 0x40 | 0x80, uuid(0x2A00))
        .unwrap();
    db.add_descriptor(0, 0x40 | 0x08, uuid(0x2901)).unwrap();
    assert_eq!(
        db.perms(hdl(3)),
        Some(Perm::READ | Perm::WRITE | Perm::PREPARE_WRITE)
    );
    assert_eq!(
        db.perms(hdl(4)),
        Some(Perm::READ | Perm::WRITE_ENCRYPT | Perm::PREPARE_WRITE)
    );
    let Kind::Value(v) = db.attr[2].kind else {
        panic!("not a value");
    };
    assert_eq!(v.flags, ValueFlags::READ_AUTHZ | ValueFlags::WRITE_AUTHZ);
    assert_eq!(db.perms(hdl(3)).map(Perm::host_bits), Some(0x43));
}

#[test]
fn enc_key_size() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_characteristic(0, Prop::READ, 0x01, uuid(0x2A00))
        .unwrap();
    let ccc = Descriptor::ClientCharacteristicConfiguration.uuid();
    db.add_descriptor(0, 0x08, uuid(0x2901)).unwrap();
    assert_eq!(db.set_enc_key_size(0, 6), Err(Error::InvalidKeySize(6)));
    assert_eq!(db.set_enc_key_size(0, 16), Err(Error::InvalidKeySize(16)));
    assert_eq!(db.set_enc_key_size(1, 7), Err(Error::NotValue(hdl(1))));
    assert_eq!(db.set_enc_key_size(3, 7), Err(Error::NotEncrypted(hdl(3))));
    assert_eq!(db.set_enc_key_size(5, 7), Err(Error::InvalidAttr(5)));
    db.set_enc_key_size(0, 7).unwrap();
    assert_eq!(db.enc_key_size(hdl(4)), Some(7));
    assert_eq!(
        db.add_descriptor(0, 0x01, ccc),
        Err(Error::NotPermittedByProps(
            Descriptor::ClientCharacteristicConfiguration
        ))
    );
}

#[test]
fn include_values() {
    let mut db = Db::new(&Config::default());
    db.add_service(false, uuid(0x180F)).unwrap();
    db.add_characteristic(0, Prop::READ | Prop::EXT_PROPS, 0x01, uuid(0x2A19))
        .unwrap();
    db.add_descriptor(0, 0x01, CEP.uuid()).unwrap();
    db.commit();
    let custom = Uuid::new(0x1234_5678_9ABC_DEF0_1234_5678_9ABC_DEF0).unwrap();
    db.add_service(true, custom).unwrap();
    db.commit();
    db.add_service(true, uuid(0x180D)).unwrap();
    assert_eq!(db.add_included(1), Ok(hdl(7)));
    assert_eq!(db.add_included(5), Ok(hdl(8)));
    assert_eq!(db.add_included(0), Err(Error::InvalidAttr(0)));
    assert_eq!(read(&db, 7), [0x01, 0x00, 0x04, 0x00, 0x0F, 0x18]);
    assert_eq!(read(&db, 8), [0x05, 0x00, 0x05, 0x00]);
    assert_eq!(read(&db, 5), custom.to_bytes());
    assert_eq!(db.typ(hdl(1)), Some(Declaration::SecondaryService.uuid()));
    assert_eq!(db.typ(hdl(8)), Some(Declaration::Include.uuid()));
    assert_eq!(db.unregistered(), HandleRange::from_raw(6, 8));
    db.dump();
}

#[test]
fn published_attributes() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_characteristic(0, Prop::READ, 0x04, uuid(0x2A00))
        .unwrap();
    db.commit();
    db.add_service(true, uuid(0x1801)).unwrap();
    let all: Vec<_> = db.attributes(HandleRange::ALL, None).collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].typ, uuid(0x2A00));
    assert_eq!(all[2].perms.host_bits(), 0x44);
    let svc = Declaration::PrimaryService.uuid();
    let r = HandleRange::from_raw(2, 9).unwrap();
    assert_eq!(db.attributes(r, Some(svc)).count(), 0);
    assert_eq!(db.attributes(HandleRange::ALL, Some(svc)).count(), 1);
}

#[test]
fn clear() {
    let mut db = Db::new(&Config::default());
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_characteristic(0, Prop::NOTIFY, 0x01, uuid(0x2A00))
        .unwrap();
    let ccc = Descriptor::ClientCharacteristicConfiguration.uuid();
    db.add_descriptor(0, 0x01, ccc).unwrap();
    db.set_value(3, &[1; 8]).unwrap();
    let hwm = db.arena().high_water();
    db.clear();
    assert!(db.is_empty() && !db.has_ccc() && db.services() == 0);
    assert_eq!(db.arena().used(), 0);
    assert_eq!(db.arena().high_water(), hwm);
    db.add_service(true, uuid(0x1800)).unwrap();
    db.add_characteristic(0, Prop::NOTIFY, 0x01, uuid(0x2A00))
        .unwrap();
    assert_eq!(db.add_descriptor(0, 0x01, ccc), Ok(hdl(4)));
}
