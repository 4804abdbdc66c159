use std::collections::HashMap;

use super::*;

/// Recorded [`Host`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Call {
    Register(Vec<Handle>),
    Unregister(Handle),
    ExchangeMtu(Addr),
    Discover(Addr, HandleRange),
    Subscribe(Addr, Handle, Option<Handle>),
    Unsubscribe(Addr, Handle),
    Notify(Handle, Vec<u8>),
    Indicate(Handle, Vec<u8>),
}

/// Host that records every call and fails on request.
#[derive(Debug, Default)]
pub(crate) struct MockHost {
    pub conns: HashMap<Addr, (u8, SecLevel)>,
    pub calls: Vec<Call>,
    pub fail_register: Option<Error>,
    pub fail_discover: Option<Error>,
    pub fail_subscribe: Option<Error>,
    pub fail_unsubscribe: Option<Error>,
}

impl MockHost {
    /// Creates a host with a single connection.
    pub fn connected(peer: Addr, key_size: u8, sec: SecLevel) -> Self {
        let mut h = Self::default();
        h.conns.insert(peer, (key_size, sec));
        h
    }

    /// Returns and clears the recorded calls.
    pub fn take(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    fn fail(e: Option<Error>) -> Result<()> {
        e.map_or(Ok(()), Err)
    }
}

impl Host for MockHost {
    fn lookup(&self, peer: Addr) -> Option<Conn> {
        self.conns.contains_key(&peer).then(|| Conn::new(peer))
    }

    fn enc_key_size(&self, conn: Conn) -> u8 {
        self.conns.get(&conn.peer()).map_or(0, |c| c.0)
    }

    fn security(&self, conn: Conn) -> SecLevel {
        self.conns.get(&conn.peer()).map_or_else(SecLevel::default, |c| c.1)
    }

    fn register_service(&mut self, attrs: &[AttrInfo]) -> Result<()> {
        Self::fail(self.fail_register)?;
        (self.calls).push(Call::Register(attrs.iter().map(|at| at.hdl).collect()));
        Ok(())
    }

    fn unregister_service(&mut self, svc: Handle) -> Result<()> {
        self.calls.push(Call::Unregister(svc));
        Ok(())
    }

    fn exchange_mtu(&mut self, conn: Conn) -> Result<()> {
        self.calls.push(Call::ExchangeMtu(conn.peer()));
        Ok(())
    }

    fn discover_characteristics(&mut self, conn: Conn, hdls: HandleRange) -> Result<()> {
        Self::fail(self.fail_discover)?;
        self.calls.push(Call::Discover(conn.peer(), hdls));
        Ok(())
    }

    fn subscribe(&mut self, conn: Conn, sub: &Subscription) -> Result<()> {
        Self::fail(self.fail_subscribe)?;
        (self.calls).push(Call::Subscribe(conn.peer(), sub.ccc(), sub.value()));
        Ok(())
    }

    fn unsubscribe(&mut self, conn: Conn, sub: &Subscription) -> Result<()> {
        Self::fail(self.fail_unsubscribe)?;
        self.calls.push(Call::Unsubscribe(conn.peer(), sub.ccc()));
        Ok(())
    }

    fn notify(&mut self, hdl: Handle, val: &[u8]) -> Result<()> {
        self.calls.push(Call::Notify(hdl, val.to_vec()));
        Ok(())
    }

    fn indicate(&mut self, hdl: Handle, val: &[u8]) -> Result<()> {
        self.calls.push(Call::Indicate(hdl, val.to_vec()));
        Ok(())
    }
}
