use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

/// Subprotocol the daemon agrees to when a client offers it.
pub const SUBPROTOCOL: &str = "soap";

pub enum InboundMsg {
    ClientConnected { socket_addr: SocketAddr },
    ClientDisconnected,
    Command { cmd: ClientCommand },
}

pub enum OutboundMsg {
    Send { msg: ServerMessage },
}

pub use webmpc_protocol::{ClientCommand, PlaybackState, ServerMessage, Status, Track};
