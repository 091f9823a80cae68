use crate::connection::{Connection, Reopened};
use crate::duration::human_duration;
use crate::status_watcher::StatusSnapshot;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use webmpc_protocol::{ClientCommand, Track};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub file: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub time: String,
    pub active: bool,
}

impl Row {
    fn from_track(id: u32, track: &Track, current: Option<u32>) -> Self {
        let or_dash = |v: &Option<String>| match v.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => "-".to_string(),
        };
        Self {
            id,
            file: track.file.clone(),
            title: track.display_title().to_string(),
            album: or_dash(&track.album),
            artist: or_dash(&track.artist),
            time: human_duration(track.time.unwrap_or(0)),
            active: current == Some(id),
        }
    }
}

/// The play queue as rows keyed by queue entry id. The highlighted row
/// follows the status song id, so it stays put across reorders.
pub struct PlaylistView {
    connection: Connection,
    updates: mpsc::UnboundedReceiver<Vec<Track>>,
    reopened: Reopened,
    status: watch::Receiver<StatusSnapshot>,
    current: Option<u32>,
    rows: Vec<Row>,
}

impl PlaylistView {
    pub fn new(connection: &Connection, status: watch::Receiver<StatusSnapshot>) -> Self {
        let updates = connection.stream::<Vec<Track>>();
        let reopened = connection.reopened();
        connection.send(ClientCommand::PlaylistInfo);
        let current = status.borrow().song_id;
        Self {
            connection: connection.clone(),
            updates,
            reopened,
            status,
            current,
            rows: Vec::new(),
        }
    }

    /// Waits for a new queue listing or a change of current song. The
    /// queue is fetched again whenever the socket is reopened. Returns false
    /// once both sources are gone.
    pub async fn recv(&mut self) -> bool {
        loop {
            tokio::select! {
                Some(tracks) = self.updates.recv() => {
                    self.update(&tracks);
                    return true;
                }
                Ok(()) = self.status.changed() => {
                    let song_id = self.status.borrow_and_update().song_id;
                    self.set_current(song_id);
                    return true;
                }
                Some(session) = self.reopened.next() => {
                    debug!(session, "socket reopened; refreshing queue");
                    self.connection.send(ClientCommand::PlaylistInfo);
                }
                else => return false,
            }
        }
    }

    pub fn update(&mut self, tracks: &[Track]) {
        self.rows = tracks
            .iter()
            .filter_map(|track| match track.id {
                Some(id) => Some(Row::from_track(id, track, self.current)),
                None => {
                    debug!(file = %track.file, "queue entry without id skipped");
                    None
                }
            })
            .collect();
    }

    pub fn set_current(&mut self, song_id: Option<u32>) {
        if self.current == song_id {
            return;
        }
        self.current = song_id;
        for row in &mut self.rows {
            row.active = song_id == Some(row.id);
        }
    }

    pub fn play(&self, id: u32) {
        self.connection.send(ClientCommand::PlayId { id });
    }

    pub fn clear(&self) {
        self.connection.send(ClientCommand::Clear);
    }

    /// Inserts library files at `pos`; a negative position appends.
    pub fn insert_uris(&self, uris: Vec<String>, pos: i32) {
        if uris.is_empty() {
            return;
        }
        self.connection.send(ClientCommand::AddMulti { uris, pos });
    }

    /// Moves a queue entry; a negative position means the last row.
    pub fn move_entry(&self, id: u32, pos: i32) {
        let pos = if pos < 0 {
            i32::try_from(self.rows.len().saturating_sub(1)).unwrap_or(i32::MAX)
        } else {
            pos
        };
        self.connection.send(ClientCommand::MoveId { id, pos });
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn active(&self) -> Option<&Row> {
        self.rows.iter().find(|r| r.active)
    }
}
