use serde::{Deserialize, Serialize};

mod lenient;

/// Commands sent from the browser-side controller to the player daemon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "Cmd", rename_all_fields = "PascalCase")]
pub enum ClientCommand {
    GetFiles,
    PlaylistInfo,
    Status,
    CurrentSong,
    Add { uri: String },
    AddMulti { uris: Vec<String>, pos: i32 },
    MoveId { id: u32, pos: i32 },
    PlayId { id: u32 },
    Clear,
    Previous,
    Next,
    Play { pos: i32 },
    Pause { pause: bool },
    Random { random: bool },
    Repeat { repeat: bool },
    SetVolume { volume: i32 },
    SeekId { id: u32, time: u32 },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::GetFiles => "GetFiles",
            ClientCommand::PlaylistInfo => "PlaylistInfo",
            ClientCommand::Status => "Status",
            ClientCommand::CurrentSong => "CurrentSong",
            ClientCommand::Add { .. } => "Add",
            ClientCommand::AddMulti { .. } => "AddMulti",
            ClientCommand::MoveId { .. } => "MoveId",
            ClientCommand::PlayId { .. } => "PlayId",
            ClientCommand::Clear => "Clear",
            ClientCommand::Previous => "Previous",
            ClientCommand::Next => "Next",
            ClientCommand::Play { .. } => "Play",
            ClientCommand::Pause { .. } => "Pause",
            ClientCommand::Random { .. } => "Random",
            ClientCommand::Repeat { .. } => "Repeat",
            ClientCommand::SetVolume { .. } => "SetVolume",
            ClientCommand::SeekId { .. } => "SeekId",
        }
    }
}

/// Messages pushed by the daemon. Always framed as `{"Type": ..., "Data": ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "Type", content = "Data")]
pub enum ServerMessage {
    CurrentSong(Track),
    Files(Vec<String>),
    Playlist(Vec<Track>),
    Status(Status),
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::CurrentSong(_) => MessageKind::CurrentSong,
            ServerMessage::Files(_) => MessageKind::Files,
            ServerMessage::Playlist(_) => MessageKind::Playlist,
            ServerMessage::Status(_) => MessageKind::Status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    CurrentSong,
    Files,
    Playlist,
    Status,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::CurrentSong,
        MessageKind::Files,
        MessageKind::Playlist,
        MessageKind::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::CurrentSong => "CurrentSong",
            MessageKind::Files => "Files",
            MessageKind::Playlist => "Playlist",
            MessageKind::Status => "Status",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outer frame, decoded before the body so an unknown `Type` can be told
/// apart from a malformed body.
#[derive(Deserialize, Debug, Clone)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

#[derive(Debug)]
pub enum Decoded {
    Message(ServerMessage),
    UnknownType(String),
}

pub fn decode_server_message(text: &str) -> Result<Decoded, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let Some(kind) = MessageKind::from_tag(&envelope.kind) else {
        return Ok(Decoded::UnknownType(envelope.kind));
    };

    let data = envelope.data;
    let msg = match kind {
        MessageKind::CurrentSong => ServerMessage::CurrentSong(serde_json::from_value(data)?),
        // The daemon encodes an empty list as null.
        MessageKind::Files => {
            ServerMessage::Files(serde_json::from_value::<Option<_>>(data)?.unwrap_or_default())
        }
        MessageKind::Playlist => {
            ServerMessage::Playlist(serde_json::from_value::<Option<_>>(data)?.unwrap_or_default())
        }
        MessageKind::Status => ServerMessage::Status(serde_json::from_value(data)?),
    };
    Ok(Decoded::Message(msg))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Play => "play",
            PlaybackState::Pause => "pause",
            PlaybackState::Stop => "stop",
        }
    }
}

/// Player status as forwarded from MPD. Numeric and flag fields may arrive
/// either as JSON numbers/bools or as MPD's string values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Status {
    #[serde(default)]
    pub state: PlaybackState,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub random: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub repeat: bool,
    #[serde(default, deserialize_with = "lenient::opt_num")]
    pub volume: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_num", skip_serializing_if = "Option::is_none")]
    pub songid: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_num", skip_serializing_if = "Option::is_none")]
    pub song: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl Status {
    /// Splits the `"elapsed:total"` field into seconds.
    pub fn progress(&self) -> Option<(u32, u32)> {
        let time = self.time.as_deref()?;
        let (elapsed, total) = time.split_once(':')?;
        Some((elapsed.trim().parse().ok()?, total.trim().parse().ok()?))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    #[serde(default)]
    pub file: String,
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "Album", default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(rename = "Artist", default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(rename = "Time", default, deserialize_with = "lenient::opt_num", skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
    #[serde(rename = "Id", default, deserialize_with = "lenient::opt_num", skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "Pos", default, deserialize_with = "lenient::opt_num", skip_serializing_if = "Option::is_none")]
    pub pos: Option<u32>,
}

impl Track {
    /// Title tag, or the file's basename when the tag is missing or empty.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => basename(&self.file),
        }
    }
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
