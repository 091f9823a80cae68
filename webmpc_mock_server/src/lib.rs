mod daemon;
mod main_loop;
mod net;
mod protocol;

pub use crate::daemon::FakeDaemon;
pub use crate::main_loop::{CommandLog, MainLoop};
pub use crate::net::NetworkThread;
pub use crate::protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP, SUBPROTOCOL};

use crossbeam_channel::bounded;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use webmpc_protocol::ClientCommand;

const TICK: Duration = Duration::from_millis(10);

/// Network thread plus a ticker thread driving the main loop; what the
/// binary runs and what integration tests start on a loopback port.
pub struct MockServer {
    net: NetworkThread,
    log: CommandLog,
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start(addr: &str) -> Result<Self, String> {
        Self::start_with(addr, FakeDaemon::default())
    }

    pub fn start_with(addr: &str, daemon: FakeDaemon) -> Result<Self, String> {
        let (in_tx, in_rx) = bounded(INBOUND_CAP);
        let (out_tx, out_rx) = bounded(OUTBOUND_CAP);

        let net = NetworkThread::spawn_with_addr(addr, in_tx, out_rx)?;
        let mut main_loop = MainLoop::with_daemon(in_rx, out_tx, daemon);
        let log = main_loop.command_log();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let ticker = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                main_loop.tick();
                thread::sleep(TICK);
            }
        });

        Ok(Self {
            net,
            log,
            stop,
            ticker: Some(ticker),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.net.listen_addr()
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr())
    }

    pub fn received(&self) -> Vec<ClientCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn accepted(&self) -> usize {
        self.net.accepted()
    }

    pub fn drop_client(&self) {
        self.net.drop_client();
    }

    pub fn shutdown(&mut self) {
        self.net.shutdown();
        self.stop.store(true, Ordering::Relaxed);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
