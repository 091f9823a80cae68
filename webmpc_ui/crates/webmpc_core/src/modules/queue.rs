use crate::transport::RawSink;
use std::collections::VecDeque;
use tracing::{debug, warn};
use webmpc_protocol::ClientCommand;

/// Commands waiting for a ready transport, oldest first.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<ClientCommand>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends right away when the sink is ready and nothing older is
    /// waiting; otherwise the command joins the tail of the buffer.
    pub fn submit(&mut self, cmd: ClientCommand, sink: &mut impl RawSink) {
        self.pending.push_back(cmd);
        if sink.is_ready() {
            self.drain(sink);
        } else {
            debug!(queued = self.pending.len(), "transport not ready; command buffered");
        }
    }

    /// Sends buffered commands head to tail. Stops at the first rejected
    /// send and keeps that command at the head.
    pub fn drain(&mut self, sink: &mut impl RawSink) -> usize {
        let mut sent = 0;
        while let Some(cmd) = self.pending.pop_front() {
            let payload = match serde_json::to_string(&cmd) {
                Ok(p) => p,
                Err(e) => {
                    warn!(cmd = cmd.name(), error = %e, "dropping unserializable command");
                    continue;
                }
            };
            if let Err(e) = sink.send_raw(payload) {
                debug!(cmd = cmd.name(), error = %e, "send rejected; keeping command buffered");
                self.pending.push_front(cmd);
                break;
            }
            sent += 1;
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
