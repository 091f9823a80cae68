use std::collections::HashMap;
use tracing::debug;
use webmpc_protocol::{decode_server_message, Decoded, MessageKind, ServerMessage, Status, Track};

pub type Handler = Box<dyn FnMut(&ServerMessage) + Send>;

/// A message body that subscribers can ask for by type.
pub trait Body: Sized {
    const KIND: MessageKind;

    fn extract(msg: &ServerMessage) -> Option<&Self>;
}

impl Body for Track {
    const KIND: MessageKind = MessageKind::CurrentSong;

    fn extract(msg: &ServerMessage) -> Option<&Self> {
        match msg {
            ServerMessage::CurrentSong(track) => Some(track),
            _ => None,
        }
    }
}

/// `Files`: the full library listing, one path per entry.
impl Body for Vec<String> {
    const KIND: MessageKind = MessageKind::Files;

    fn extract(msg: &ServerMessage) -> Option<&Self> {
        match msg {
            ServerMessage::Files(files) => Some(files),
            _ => None,
        }
    }
}

/// `Playlist`: the play queue.
impl Body for Vec<Track> {
    const KIND: MessageKind = MessageKind::Playlist;

    fn extract(msg: &ServerMessage) -> Option<&Self> {
        match msg {
            ServerMessage::Playlist(tracks) => Some(tracks),
            _ => None,
        }
    }
}

impl Body for Status {
    const KIND: MessageKind = MessageKind::Status;

    fn extract(msg: &ServerMessage) -> Option<&Self> {
        match msg {
            ServerMessage::Status(status) => Some(status),
            _ => None,
        }
    }
}

/// Wraps a body callback so it can sit in the per-kind handler list.
pub fn body_handler<T, F>(mut callback: F) -> Handler
where
    T: Body,
    F: FnMut(&T) + Send + 'static,
{
    Box::new(move |msg| {
        if let Some(body) = T::extract(msg) {
            callback(body);
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Delivered { kind: MessageKind, handlers: usize },
    NoSubscribers(MessageKind),
    UnknownType(String),
    Malformed,
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: MessageKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn subscribe<T, F>(&mut self, callback: F)
    where
        T: Body,
        F: FnMut(&T) + Send + 'static,
    {
        self.register(T::KIND, body_handler(callback));
    }

    /// Decodes one frame and runs every handler for its type in
    /// registration order. Bad frames are logged and dropped whole.
    pub fn dispatch(&mut self, raw: &str) -> Dispatch {
        match decode_server_message(raw) {
            Ok(Decoded::Message(msg)) => self.deliver(&msg),
            Ok(Decoded::UnknownType(kind)) => {
                debug!(kind = %kind, "dropping message of unknown type");
                Dispatch::UnknownType(kind)
            }
            Err(e) => {
                debug!(error = %e, "dropping undecodable message");
                Dispatch::Malformed
            }
        }
    }

    pub fn deliver(&mut self, msg: &ServerMessage) -> Dispatch {
        let kind = msg.kind();
        let Some(handlers) = self.handlers.get_mut(&kind).filter(|h| !h.is_empty()) else {
            debug!(%kind, "no subscribers for message");
            return Dispatch::NoSubscribers(kind);
        };
        for handler in handlers.iter_mut() {
            handler(msg);
        }
        Dispatch::Delivered {
            kind,
            handlers: handlers.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn subscribers_run_in_registration_order_with_body_only() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();

        let log = Arc::clone(&calls);
        dispatcher.subscribe(move |files: &Vec<String>| {
            log.lock().unwrap().push(format!("first:{}", files.join(",")));
        });
        let log = Arc::clone(&calls);
        dispatcher.subscribe(move |files: &Vec<String>| {
            log.lock().unwrap().push(format!("second:{}", files.len()));
        });

        let outcome = dispatcher.dispatch(r#"{"Type":"Files","Data":["a/1.mp3","b/2.mp3"]}"#);
        assert_eq!(
            outcome,
            Dispatch::Delivered {
                kind: MessageKind::Files,
                handlers: 2
            }
        );
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["first:a/1.mp3,b/2.mp3".to_string(), "second:2".to_string()]
        );
    }

    #[test]
    fn unknown_and_unsubscribed_types_do_not_block_later_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let log = Arc::clone(&seen);
        dispatcher.subscribe(move |status: &Status| {
            log.lock().unwrap().push(status.songid);
        });

        assert_eq!(
            dispatcher.dispatch(r#"{"Type":"Outputs","Data":[]}"#),
            Dispatch::UnknownType("Outputs".into())
        );
        assert_eq!(
            dispatcher.dispatch(r#"{"Type":"Playlist","Data":[]}"#),
            Dispatch::NoSubscribers(MessageKind::Playlist)
        );
        assert_eq!(dispatcher.dispatch("{broken"), Dispatch::Malformed);
        assert_eq!(
            dispatcher.dispatch(r#"{"Type":"Status","Data":{"volume":"many"}}"#),
            Dispatch::Malformed
        );

        dispatcher.dispatch(r#"{"Type":"Status","Data":{"state":"play","songid":"3"}}"#);
        assert_eq!(*seen.lock().unwrap(), vec![Some(3)]);
    }

    #[test]
    fn handlers_only_see_their_own_type() {
        let tracks = Arc::new(Mutex::new(0));
        let mut dispatcher = Dispatcher::new();
        let count = Arc::clone(&tracks);
        dispatcher.subscribe(move |_: &Track| *count.lock().unwrap() += 1);

        dispatcher.dispatch(r#"{"Type":"Files","Data":[]}"#);
        dispatcher.dispatch(r#"{"Type":"CurrentSong","Data":{"file":"x.ogg","Id":"4"}}"#);
        assert_eq!(*tracks.lock().unwrap(), 1);
    }
}
