use crate::protocol::{ClientCommand, PlaybackState, ServerMessage, Status, Track};

const TRACK_SECONDS: u32 = 180;

/// In-memory stand-in for the media player: a library, a play queue and
/// the transport state, mutated by client commands.
pub struct FakeDaemon {
    library: Vec<String>,
    queue: Vec<Track>,
    next_id: u32,
    current: Option<u32>,
    state: PlaybackState,
    random: bool,
    repeat: bool,
    volume: i32,
    elapsed: u32,
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self::with_library(vec![
            "Ambient/Drift/01 Low Tide.flac".to_string(),
            "Ambient/Drift/02 Undertow.flac".to_string(),
            "Jazz/Live at Nine/01 Opening.mp3".to_string(),
            "Jazz/Live at Nine/02 Blue Hour.mp3".to_string(),
            "single.ogg".to_string(),
        ])
    }
}

impl FakeDaemon {
    pub fn with_library(library: Vec<String>) -> Self {
        Self {
            library,
            queue: Vec::new(),
            next_id: 1,
            current: None,
            state: PlaybackState::Stop,
            random: false,
            repeat: false,
            volume: 70,
            elapsed: 0,
        }
    }

    /// Applies one command and returns the replies to push back. Queue
    /// mutations answer with the new playlist; transport changes are left
    /// for the client's status polling to pick up.
    pub fn handle(&mut self, cmd: &ClientCommand) -> Vec<ServerMessage> {
        match cmd {
            ClientCommand::GetFiles => return vec![ServerMessage::Files(self.library.clone())],
            ClientCommand::PlaylistInfo => return vec![self.playlist()],
            ClientCommand::Status => return vec![ServerMessage::Status(self.status())],
            ClientCommand::CurrentSong => {
                let track = self.current_index().map(|i| self.queue[i].clone());
                return vec![ServerMessage::CurrentSong(track.unwrap_or_default())];
            }
            ClientCommand::Add { uri } => {
                self.insert(vec![uri.clone()], -1);
                return vec![self.playlist()];
            }
            ClientCommand::AddMulti { uris, pos } => {
                self.insert(uris.clone(), *pos);
                return vec![self.playlist()];
            }
            ClientCommand::MoveId { id, pos } => {
                if let Some(from) = self.queue.iter().position(|t| t.id == Some(*id)) {
                    let track = self.queue.remove(from);
                    let to = usize::try_from(*pos).unwrap_or(usize::MAX).min(self.queue.len());
                    self.queue.insert(to, track);
                }
                return vec![self.playlist()];
            }
            ClientCommand::Clear => {
                self.queue.clear();
                self.stop();
                return vec![self.playlist()];
            }
            ClientCommand::PlayId { id } => {
                if self.queue.iter().any(|t| t.id == Some(*id)) {
                    self.start(*id);
                }
            }
            ClientCommand::Play { pos } => {
                let index = match usize::try_from(*pos) {
                    Ok(i) => Some(i),
                    Err(_) => self.current_index().or(Some(0)),
                };
                if let Some(id) = index.and_then(|i| self.queue.get(i)).and_then(|t| t.id) {
                    self.start(id);
                }
            }
            ClientCommand::Pause { pause } => {
                if self.state != PlaybackState::Stop {
                    self.state = if *pause {
                        PlaybackState::Pause
                    } else {
                        PlaybackState::Play
                    };
                }
            }
            ClientCommand::Next => self.step(1),
            ClientCommand::Previous => self.step(-1),
            ClientCommand::Random { random } => self.random = *random,
            ClientCommand::Repeat { repeat } => self.repeat = *repeat,
            ClientCommand::SetVolume { volume } => self.volume = (*volume).clamp(0, 100),
            ClientCommand::SeekId { id, time } => {
                if self.current == Some(*id) {
                    self.elapsed = (*time).min(TRACK_SECONDS);
                }
            }
        }
        Vec::new()
    }

    pub fn status(&self) -> Status {
        let song = self.current_index();
        Status {
            state: self.state,
            random: self.random,
            repeat: self.repeat,
            volume: Some(self.volume),
            songid: self.current,
            song: song.and_then(|i| u32::try_from(i).ok()),
            time: song.map(|_| format!("{}:{TRACK_SECONDS}", self.elapsed)),
        }
    }

    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    fn playlist(&self) -> ServerMessage {
        let tracks = self
            .queue
            .iter()
            .enumerate()
            .map(|(i, t)| Track {
                pos: u32::try_from(i).ok(),
                ..t.clone()
            })
            .collect();
        ServerMessage::Playlist(tracks)
    }

    fn insert(&mut self, uris: Vec<String>, pos: i32) {
        let mut at = usize::try_from(pos).unwrap_or(usize::MAX).min(self.queue.len());
        for uri in uris {
            let track = self.track_for(uri);
            self.queue.insert(at, track);
            at += 1;
        }
    }

    fn track_for(&mut self, uri: String) -> Track {
        let id = self.next_id;
        self.next_id += 1;
        let name = webmpc_protocol::basename(&uri);
        let title = name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string();
        Track {
            title: Some(title),
            time: Some(TRACK_SECONDS),
            id: Some(id),
            file: uri,
            ..Track::default()
        }
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current?;
        self.queue.iter().position(|t| t.id == Some(id))
    }

    fn start(&mut self, id: u32) {
        self.current = Some(id);
        self.state = PlaybackState::Play;
        self.elapsed = 0;
    }

    fn stop(&mut self) {
        self.current = None;
        self.state = PlaybackState::Stop;
        self.elapsed = 0;
    }

    fn step(&mut self, delta: isize) {
        let Some(index) = self.current_index() else { return };
        let len = self.queue.len() as isize;
        let mut next = index as isize + delta;
        if self.repeat {
            next = next.rem_euclid(len);
        }
        match usize::try_from(next).ok().and_then(|i| self.queue.get(i)).and_then(|t| t.id) {
            Some(id) => self.start(id),
            None => self.stop(),
        }
    }
}
