//! Receipt-driven status polling.
//!
//! One `Status` request goes out at start-up. Every status reply re-arms a
//! single-shot timer that asks again after `status_interval`, so a stalled
//! server never accumulates outstanding requests. A request left
//! unanswered is repeated after `STALL_INTERVALS` intervals, and a request
//! lost with a dropped socket is repeated as soon as a new one opens. The
//! heavier `CurrentSong` request is only made when the reported song id
//! differs from the last one requested.

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState, Reopened};
use crate::timer::{arm, fire, Timer};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;
use webmpc_protocol::{ClientCommand, PlaybackState, Status, Track};

/// Unanswered polls are repeated after this many status intervals.
pub const STALL_INTERVALS: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    pub random: bool,
    pub repeat: bool,
    pub volume: Option<i32>,
    pub song_id: Option<u32>,
    pub song_pos: Option<u32>,
    pub elapsed: u32,
    pub total: u32,
}

impl From<&Status> for StatusSnapshot {
    fn from(status: &Status) -> Self {
        let (elapsed, total) = status.progress().unwrap_or_default();
        Self {
            state: status.state,
            random: status.random,
            repeat: status.repeat,
            volume: status.volume,
            song_id: status.songid,
            song_pos: status.song,
            elapsed,
            total,
        }
    }
}

/// What the marker last asked the server about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveTrack {
    #[default]
    Unknown,
    Idle,
    Song(u32),
}

impl From<Option<u32>> for ActiveTrack {
    fn from(id: Option<u32>) -> Self {
        id.map_or(ActiveTrack::Idle, ActiveTrack::Song)
    }
}

/// Marker bookkeeping, kept free of I/O.
#[derive(Debug)]
pub struct SyncState {
    marker: ActiveTrack,
    detail_requested_at: Option<Instant>,
    detail_timeout: Duration,
    snapshot: StatusSnapshot,
}

impl SyncState {
    pub fn new(detail_timeout: Duration) -> Self {
        Self {
            marker: ActiveTrack::Unknown,
            detail_requested_at: None,
            detail_timeout,
            snapshot: StatusSnapshot::default(),
        }
    }

    /// Applies a status reply; returns true when track details should be
    /// requested. The marker moves as soon as the request is decided, not
    /// when the detail arrives.
    pub fn on_status(&mut self, status: &Status, now: Instant) -> bool {
        self.snapshot = StatusSnapshot::from(status);

        let seen = ActiveTrack::from(status.songid);
        if seen != self.marker {
            self.marker = seen;
            self.detail_requested_at = Some(now);
            return true;
        }

        match self.detail_requested_at {
            Some(at) if now.duration_since(at) >= self.detail_timeout => {
                debug!(marker = ?self.marker, "track detail never arrived; asking again");
                self.detail_requested_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn on_track(&mut self) {
        self.detail_requested_at = None;
    }

    pub fn marker(&self) -> ActiveTrack {
        self.marker
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }
}

/// Handle to the running watcher. Views read the published snapshot and
/// current track; nothing else writes them.
pub struct StatusWatcher {
    snapshot: watch::Receiver<StatusSnapshot>,
    current: watch::Receiver<Option<Track>>,
}

impl StatusWatcher {
    pub fn spawn(connection: &Connection, config: &ClientConfig) -> Self {
        let status_rx = connection.stream::<Status>();
        let track_rx = connection.stream::<Track>();
        let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());
        let (current_tx, current_rx) = watch::channel(None);
        let reopened = connection.reopened();
        connection.send(ClientCommand::Status);

        tokio::spawn(run(
            connection.clone(),
            config.status_interval,
            SyncState::new(config.detail_timeout),
            Feeds {
                status_rx,
                track_rx,
                reopened,
            },
            snapshot_tx,
            current_tx,
        ));

        Self {
            snapshot: snapshot_rx,
            current: current_rx,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    pub fn current_track(&self) -> watch::Receiver<Option<Track>> {
        self.current.clone()
    }
}

struct Feeds {
    status_rx: mpsc::UnboundedReceiver<Status>,
    track_rx: mpsc::UnboundedReceiver<Track>,
    reopened: Reopened,
}

async fn run(
    connection: Connection,
    interval: Duration,
    mut sync: SyncState,
    feeds: Feeds,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    current_tx: watch::Sender<Option<Track>>,
) {
    let Feeds {
        mut status_rx,
        mut track_rx,
        mut reopened,
    } = feeds;
    let stall_after = interval * STALL_INTERVALS;
    let connected = || connection.state() == ConnectionState::Connected;

    // `refresh` runs between a reply and the next poll; `stalled` runs while
    // a poll is outstanding.
    let mut refresh: Timer = None;
    let mut stalled: Timer = arm(stall_after);

    loop {
        tokio::select! {
            status = status_rx.recv() => {
                let Some(status) = status else { return };
                if sync.on_status(&status, Instant::now()) {
                    connection.send(ClientCommand::CurrentSong);
                }
                snapshot_tx.send_if_modified(|current| {
                    if current == sync.snapshot() {
                        return false;
                    }
                    *current = sync.snapshot().clone();
                    true
                });
                refresh = arm(interval);
                stalled = None;
            }
            track = track_rx.recv() => {
                let Some(track) = track else { return };
                sync.on_track();
                current_tx.send_replace(Some(track));
            }
            () = fire(&mut refresh), if refresh.is_some() => {
                refresh = None;
                stalled = arm(stall_after);
                // While down, the reopen below asks instead.
                if connected() {
                    connection.send(ClientCommand::Status);
                }
            }
            () = fire(&mut stalled), if stalled.is_some() => {
                stalled = arm(stall_after);
                if connected() {
                    debug!("status reply overdue; polling again");
                    connection.send(ClientCommand::Status);
                }
            }
            Some(session) = reopened.next() => {
                if refresh.is_none() {
                    debug!(session, "socket reopened; polling status");
                    connection.send(ClientCommand::Status);
                    stalled = arm(stall_after);
                }
            }
        }
    }
}
