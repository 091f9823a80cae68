use crate::daemon::FakeDaemon;
use crate::protocol::{ClientCommand, InboundMsg, OutboundMsg, ServerMessage};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

/// Shared log of every command the daemon has accepted, in arrival order.
pub type CommandLog = Arc<Mutex<Vec<ClientCommand>>>;

pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    daemon: FakeDaemon,
    received: CommandLog,
    connected: bool,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self::with_daemon(inbound_rx, outbound_tx, FakeDaemon::default())
    }

    pub fn with_daemon(
        inbound_rx: Receiver<InboundMsg>,
        outbound_tx: Sender<OutboundMsg>,
        daemon: FakeDaemon,
    ) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            daemon,
            received: Arc::default(),
            connected: false,
        }
    }

    pub fn command_log(&self) -> CommandLog {
        Arc::clone(&self.received)
    }

    pub fn tick(&mut self) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(InboundMsg::ClientConnected { socket_addr }) => {
                    eprintln!("client connected from {socket_addr}");
                    self.connected = true;
                }
                Ok(InboundMsg::ClientDisconnected) => {
                    self.connected = false;
                }
                Ok(InboundMsg::Command { cmd }) => self.apply(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    pub fn try_send(&mut self, msg: OutboundMsg) {
        let _ = self.outbound_tx.try_send(msg);
    }

    fn apply(&mut self, cmd: ClientCommand) {
        let replies = self.daemon.handle(&cmd);
        if let Ok(mut log) = self.received.lock() {
            log.push(cmd);
        }
        if !self.connected {
            return;
        }
        for msg in replies {
            self.send(msg);
        }
    }

    fn send(&mut self, msg: ServerMessage) {
        self.try_send(OutboundMsg::Send { msg });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::net::SocketAddr;

    #[test]
    fn commands_are_logged_and_answered() {
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);
        let mut main_loop = MainLoop::new(in_rx, out_tx);
        let log = main_loop.command_log();

        let socket_addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        in_tx.send(InboundMsg::ClientConnected { socket_addr }).unwrap();
        in_tx
            .send(InboundMsg::Command {
                cmd: ClientCommand::GetFiles,
            })
            .unwrap();
        in_tx
            .send(InboundMsg::Command {
                cmd: ClientCommand::Next,
            })
            .unwrap();
        main_loop.tick();

        assert_eq!(*log.lock().unwrap(), vec![ClientCommand::GetFiles, ClientCommand::Next]);
        let Ok(OutboundMsg::Send { msg }) = out_rx.try_recv() else {
            panic!("expected a reply");
        };
        assert!(matches!(msg, ServerMessage::Files(files) if files.len() == 5));
        assert!(out_rx.try_recv().is_err());
    }
}
