use crate::transport::{Connector, EventSender, TransportEvent, TransportHandle};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;
use webmpc_protocol::ClientCommand;

struct FakeLink {
    events: EventSender,
    outbound: mpsc::UnboundedReceiver<String>,
    sent: Vec<ClientCommand>,
}

/// Connector whose sockets are driven by the test: `emit` plays the
/// server side, `sent` collects what the client wrote.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    links: Arc<Mutex<Vec<FakeLink>>>,
}

impl Connector for FakeConnector {
    fn open(
        &mut self,
        generation: u64,
        _endpoint: &Url,
        _subprotocol: &str,
        events: EventSender,
    ) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().unwrap().push(FakeLink {
            events,
            outbound: rx,
            sent: Vec::new(),
        });
        TransportHandle::new(generation, tx, None)
    }
}

impl FakeConnector {
    pub(crate) fn opens(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub(crate) fn emit(&self, generation: u64, event: TransportEvent) {
        let links = self.links.lock().unwrap();
        let link = &links[generation as usize - 1];
        link.events.send((generation, event)).unwrap();
    }

    /// Everything written on the given socket so far, decoded.
    pub(crate) fn sent(&self, generation: u64) -> Vec<ClientCommand> {
        let mut links = self.links.lock().unwrap();
        let link = &mut links[generation as usize - 1];
        while let Ok(payload) = link.outbound.try_recv() {
            link.sent.push(serde_json::from_str(&payload).unwrap());
        }
        link.sent.clone()
    }
}

/// Lets spawned tasks run without advancing the paused clock.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
