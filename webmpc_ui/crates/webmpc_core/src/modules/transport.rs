use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Raw socket lifecycle, as seen by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// Every event carries the generation of the socket that produced it.
pub type EventSender = mpsc::UnboundedSender<(u64, TransportEvent)>;

/// Opens sockets. Implementations must report `Closed` exactly once per
/// opened generation, including when the initial connect fails.
pub trait Connector: Send + 'static {
    fn open(
        &mut self,
        generation: u64,
        endpoint: &Url,
        subprotocol: &str,
        events: EventSender,
    ) -> TransportHandle;
}

/// Anything the outbound queue can push serialized commands into.
pub trait RawSink {
    fn is_ready(&self) -> bool;
    fn send_raw(&mut self, payload: String) -> Result<(), ClientError>;
}

pub struct TransportHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    open: bool,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn new(
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            generation,
            outbound,
            open: false,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mark_open(&mut self) {
        self.open = true;
    }
}

impl RawSink for TransportHandle {
    fn is_ready(&self) -> bool {
        self.open && !self.outbound.is_closed()
    }

    fn send_raw(&mut self, payload: String) -> Result<(), ClientError> {
        if !self.is_ready() {
            return Err(ClientError::NotReady);
        }
        self.outbound.send(payload).map_err(|_| ClientError::NotReady)
    }
}

impl RawSink for Option<TransportHandle> {
    fn is_ready(&self) -> bool {
        self.as_ref().is_some_and(|h| h.is_ready())
    }

    fn send_raw(&mut self, payload: String) -> Result<(), ClientError> {
        match self {
            Some(handle) => handle.send_raw(payload),
            None => Err(ClientError::NotReady),
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// tokio-tungstenite backed connector; one spawned task per socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &mut self,
        generation: u64,
        endpoint: &Url,
        subprotocol: &str,
        events: EventSender,
    ) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            generation,
            endpoint.clone(),
            subprotocol.to_string(),
            events,
            rx,
        ));
        TransportHandle::new(generation, tx, Some(task))
    }
}

async fn run_socket(
    generation: u64,
    endpoint: Url,
    subprotocol: String,
    events: EventSender,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send((generation, event));
    };

    let request = match build_request(&endpoint, &subprotocol) {
        Ok(r) => r,
        Err(e) => {
            emit(TransportEvent::Error(e.to_string()));
            emit(TransportEvent::Closed);
            return;
        }
    };

    let socket = match tokio_tungstenite::connect_async(request).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            emit(TransportEvent::Error(e.to_string()));
            emit(TransportEvent::Closed);
            return;
        }
    };
    emit(TransportEvent::Opened);

    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    let _ = write.close().await;
                    break;
                };
                if let Err(e) = write.send(Message::Text(payload.into())).await {
                    emit(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => emit(TransportEvent::Message(text.as_str().to_owned())),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    emit(TransportEvent::Closed);
}

fn build_request(endpoint: &Url, subprotocol: &str) -> Result<Request, ClientError> {
    let mut request = endpoint.as_str().into_client_request()?;
    if !subprotocol.is_empty() {
        let value = HeaderValue::from_str(subprotocol)
            .map_err(|e| ClientError::InvalidEndpoint(format!("subprotocol {subprotocol:?}: {e}")))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_offers_subprotocol() {
        let endpoint = Url::parse("ws://127.0.0.1:8080/ws").unwrap();
        let request = build_request(&endpoint, "soap").unwrap();
        assert_eq!(request.headers()["Sec-WebSocket-Protocol"], "soap");
        assert_eq!(request.uri().path(), "/ws");
    }

    #[tokio::test]
    async fn handle_rejects_sends_until_opened() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(1, tx, None);
        assert!(!handle.is_ready());
        assert!(matches!(handle.send_raw("x".into()), Err(ClientError::NotReady)));

        handle.mark_open();
        handle.send_raw("y".into()).unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("y"));

        drop(rx);
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_closed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let endpoint = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        let _handle = WsConnector.open(7, &endpoint, "soap", events_tx);

        let (generation, first) = events_rx.recv().await.unwrap();
        assert_eq!(generation, 7);
        assert!(matches!(first, TransportEvent::Error(_)));
        assert_eq!(events_rx.recv().await, Some((7, TransportEvent::Closed)));
    }
}
