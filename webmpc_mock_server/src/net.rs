use crate::protocol::{ClientCommand, InboundMsg, OutboundMsg, ServerMessage, SUBPROTOCOL};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::HeaderValue;
use tungstenite::protocol::Message;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_millis(30);

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

#[derive(Default)]
struct Flags {
    shutdown: AtomicBool,
    drop_client: AtomicBool,
    accepted: AtomicUsize,
}

pub struct NetworkThread {
    flags: Arc<Flags>,
    listen_addr: SocketAddr,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, String> {
        let listener = TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws local_addr failed: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws set_nonblocking failed: {e}"))?;

        let flags = Arc::new(Flags::default());
        let flags_for_thread = Arc::clone(&flags);
        let join_handle = thread::spawn(move || run_server(listener, in_tx, out_rx, flags_for_thread));

        Ok(Self {
            flags,
            listen_addr,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Number of websocket handshakes completed so far.
    pub fn accepted(&self) -> usize {
        self.flags.accepted.load(Ordering::Relaxed)
    }

    /// Closes the current client's socket, as a daemon restart would.
    pub fn drop_client(&self) {
        self.flags.drop_client.store(true, Ordering::Relaxed);
    }

    pub fn shutdown(&self) {
        self.flags.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    flags: Arc<Flags>,
) {
    let mut active: Option<ActiveClient> = None;

    while !flags.shutdown.load(Ordering::Relaxed) {
        // Accept new connections (single-client policy).
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let ws = match handshake(stream) {
                        Ok(ws) => ws,
                        Err(e) => {
                            eprintln!("ws handshake failed: {e}");
                            continue;
                        }
                    };
                    flags.accepted.fetch_add(1, Ordering::Relaxed);

                    // Newest client wins.
                    if let Some(mut prev) = active.take() {
                        eprintln!("replacing client {}", prev.socket_addr);
                        let _ = prev.ws.close(None);
                        let _ = prev.ws.flush();
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                    let _ = in_tx.try_send(InboundMsg::ClientConnected { socket_addr });
                    active = Some(ActiveClient { ws, socket_addr });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    eprintln!("ws accept failed: {e}");
                    break;
                }
            }
        }

        if flags.drop_client.swap(false, Ordering::Relaxed) {
            if let Some(mut client) = active.take() {
                eprintln!("dropping client {}", client.socket_addr);
                let _ = client.ws.close(None);
                let _ = client.ws.flush();
                let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
            }
        }

        // Outbound: drain queued messages. Without a client they are lost,
        // like the daemon's replies to a socket that just went away.
        loop {
            match out_rx.try_recv() {
                Ok(OutboundMsg::Send { msg }) => {
                    let Some(client) = active.as_mut() else { continue };
                    if send_server_message(&mut client.ws, &msg).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        // Inbound: read at most one message per loop (timeouts keep the loop moving).
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => {
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
            }
        } else {
            // If no active client, avoid busy-looping.
            thread::sleep(Duration::from_millis(25));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
        let _ = client.ws.flush();
    }
}

fn handshake(stream: TcpStream) -> Result<tungstenite::WebSocket<TcpStream>, String> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));

    let ws = tungstenite::accept_hdr(stream, agree_subprotocol).map_err(|e| e.to_string())?;
    let _ = ws.get_ref().set_read_timeout(Some(POLL_TIMEOUT));
    Ok(ws)
}

fn agree_subprotocol(req: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = req
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if offered.split(',').any(|p| p.trim() == SUBPROTOCOL) {
        response
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
    }
    Ok(response)
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Close(_) => return Err(()),
    };

    // The daemon has no error reply; bad commands are only logged.
    let cmd: ClientCommand = match serde_json::from_str(text.as_str()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ignoring bad command from {}: {e}", client.socket_addr);
            return Ok(());
        }
    };

    if in_tx.try_send(InboundMsg::Command { cmd }).is_err() {
        eprintln!("command queue full; dropping command");
    }
    Ok(())
}

fn send_server_message(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let payload = serde_json::to_string(msg).map_err(|_| ())?;
    ws.send(Message::Text(payload.into())).map_err(|_| ())
}
