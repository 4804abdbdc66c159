//! Runs a scripted BTP GATT session against a loopback host and logs every
//! reply and event.

#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use bttester_gatt::att::{Handle, HandleRange};
use bttester_gatt::btp::{Opcode, Reply, Tester};
use bttester_gatt::gatt::Subscription;
use bttester_gatt::host::{self, AttrInfo, Conn, Host, SecLevel};
use bttester_gatt::le::{Addr, RawAddr};
use bttester_gatt::Config;

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// JSON file with server limits.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Host that accepts every request and keeps a single connected peer.
#[derive(Debug, Default)]
struct Loopback {
    conns: HashMap<Addr, u8>,
    discovering: Option<(Conn, HandleRange)>,
}

impl Host for Loopback {
    fn lookup(&self, peer: Addr) -> Option<Conn> {
        self.conns.contains_key(&peer).then(|| Conn::new(peer))
    }

    fn enc_key_size(&self, conn: Conn) -> u8 {
        self.conns.get(&conn.peer()).copied().unwrap_or_default()
    }

    fn security(&self, conn: Conn) -> SecLevel {
        if self.enc_key_size(conn) > 0 {
            SecLevel::L2
        } else {
            SecLevel::L1
        }
    }

    fn register_service(&mut self, attrs: &[AttrInfo]) -> host::Result<()> {
        for at in attrs {
            info!("  {} {} {:?}", at.hdl, at.typ, at.perms);
        }
        Ok(())
    }

    fn unregister_service(&mut self, svc: Handle) -> host::Result<()> {
        info!("Unregistered {svc}");
        Ok(())
    }

    fn exchange_mtu(&mut self, conn: Conn) -> host::Result<()> {
        info!("MTU exchange with {}", conn.peer());
        Ok(())
    }

    fn discover_characteristics(&mut self, conn: Conn, hdls: HandleRange) -> host::Result<()> {
        self.discovering = Some((conn, hdls));
        Ok(())
    }

    fn subscribe(&mut self, conn: Conn, sub: &Subscription) -> host::Result<()> {
        info!("Subscribed to {} on {}", sub.ccc(), conn.peer());
        Ok(())
    }

    fn unsubscribe(&mut self, conn: Conn, sub: &Subscription) -> host::Result<()> {
        info!("Unsubscribed from {} on {}", sub.ccc(), conn.peer());
        Ok(())
    }

    fn notify(&mut self, hdl: Handle, val: &[u8]) -> host::Result<()> {
        info!("Notify {hdl}: {val:02X?}");
        Ok(())
    }

    fn indicate(&mut self, hdl: Handle, val: &[u8]) -> host::Result<()> {
        info!("Indicate {hdl}: {val:02X?}");
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let cfg = match args.config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => Config::default(),
    };
    let peer = Addr::Random(RawAddr::from([0xC0, 0x11, 0x22, 0x33, 0x44, 0x55]));
    let mut host = Loopback::default();
    host.conns.insert(peer, 16);
    let mut t = Tester::new(&cfg, host)?;

    let mut addr = vec![peer.typ()];
    addr.extend_from_slice(peer.raw().as_ref());
    let cfg_notify = [&addr[..], &[1, 0x10, 0x00]].concat();
    let script: [(Opcode, &[u8]); 9] = [
        (Opcode::ReadSupportedCommands, &[]),
        (Opcode::AddService, &[0x00, 0x02, 0x0F, 0x18]),
        (Opcode::AddCharacteristic, &[0, 0, 0x12, 0x01, 0x02, 0x19, 0x2A]),
        (Opcode::AddDescriptor, &[0, 0, 0x03, 0x02, 0x02, 0x29]),
        (Opcode::SetValue, &[0, 0, 1, 0, 100]),
        (Opcode::StartServer, &[]),
        (Opcode::GetAttributes, &[0x01, 0x00, 0xFF, 0xFF, 0x00]),
        (Opcode::ExchangeMtu, &addr),
        (Opcode::CfgNotify, &cfg_notify),
    ];
    for (op, cmd) in script {
        match t.handle(op.into(), cmd) {
            Reply::Rsp(b) => println!("{op}: {:02X?}", b.as_ref()),
            Reply::Status(st) => println!("{op}: {st}"),
            Reply::Delayed => println!("{op}: delayed"),
        }
    }

    // Complete the discovery started by the last command
    if let Some((conn, hdls)) = t.server_mut().host_mut().discovering.take() {
        // Peer characteristic declaration two handles before its CCC
        if let Some(decl) = Handle::new(u16::from(hdls.end()).saturating_sub(2)) {
            t.server_mut().characteristic_discovered(conn, decl);
        }
        t.server_mut().discovery_complete(conn);
        let data = [0x42];
        t.server_mut().notification(hdls.end(), Some(conn), Some(&data));
    }
    if let Some((op, st)) = t.poll_delayed() {
        println!("{op}: {st}");
    } else {
        warn!("No delayed reply");
    }
    while let Some((code, b)) = t.next_event() {
        println!("{code}: {:02X?}", b.as_ref());
    }
    Ok(())
}
