use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::debounce::Debouncer;
use crate::duration::{human_duration, remaining};
use crate::status_watcher::{StatusSnapshot, StatusWatcher};
use tokio::sync::watch;
use tracing::debug;
use webmpc_protocol::{ClientCommand, PlaybackState, Track};

/// Transport controls. Each intent reads the latest status snapshot and
/// turns into one command; volume and seek are debounced.
pub struct Player {
    connection: Connection,
    status: watch::Receiver<StatusSnapshot>,
    volume: Debouncer<i32>,
    seek: Debouncer<u32>,
}

impl Player {
    pub fn new(connection: &Connection, watcher: &StatusWatcher, config: &ClientConfig) -> Self {
        let conn = connection.clone();
        let volume = Debouncer::spawn(config.debounce, move |volume: i32| {
            conn.send(ClientCommand::SetVolume { volume });
        });

        let conn = connection.clone();
        let status = watcher.subscribe();
        let seek = Debouncer::spawn(config.debounce, move |time: u32| {
            let song_id = status.borrow().song_id;
            match song_id {
                Some(id) => conn.send(ClientCommand::SeekId { id, time }),
                None => debug!(time, "nothing playing; seek dropped"),
            }
        });

        Self {
            connection: connection.clone(),
            status: watcher.subscribe(),
            volume,
            seek,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn toggle_pause(&self) {
        let cmd = match self.status.borrow().state {
            PlaybackState::Stop => ClientCommand::Play { pos: -1 },
            state => ClientCommand::Pause {
                pause: state == PlaybackState::Play,
            },
        };
        self.connection.send(cmd);
    }

    pub fn next(&self) {
        self.connection.send(ClientCommand::Next);
    }

    pub fn previous(&self) {
        self.connection.send(ClientCommand::Previous);
    }

    pub fn toggle_random(&self) {
        let random = !self.status.borrow().random;
        self.connection.send(ClientCommand::Random { random });
    }

    pub fn toggle_repeat(&self) {
        let repeat = !self.status.borrow().repeat;
        self.connection.send(ClientCommand::Repeat { repeat });
    }

    pub fn set_volume(&self, volume: i32) {
        self.volume.push(volume.clamp(0, 100));
    }

    /// Seeks within whatever is playing when the debounce window closes.
    pub fn seek(&self, seconds: u32) {
        self.seek.push(seconds);
    }
}

/// `Title - Album - Artist`, skipping empty parts.
pub fn now_playing_title(track: &Track) -> String {
    [
        Some(track.display_title()),
        track.album.as_deref(),
        track.artist.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" - ")
}

/// Elapsed and remaining labels for the progress bar.
pub fn progress_labels(snapshot: &StatusSnapshot) -> (String, String) {
    (
        human_duration(snapshot.elapsed),
        remaining(snapshot.elapsed, snapshot.total),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, FakeConnector};
    use crate::transport::TransportEvent;
    use std::time::Duration;

    struct Rig {
        fake: FakeConnector,
        player: Player,
        _watcher: StatusWatcher,
    }

    async fn rig(status: &str) -> Rig {
        let config = ClientConfig::for_origin("http://player.local")
            .unwrap()
            .with_debounce(Duration::from_millis(100));
        let fake = FakeConnector::default();
        let conn = Connection::spawn_with(&config, fake.clone());
        let watcher = StatusWatcher::spawn(&conn, &config);
        let player = Player::new(&conn, &watcher, &config);
        settle().await;
        fake.emit(1, TransportEvent::Opened);
        fake.emit(
            1,
            TransportEvent::Message(format!(r#"{{"Type":"Status","Data":{status}}}"#)),
        );
        settle().await;
        Rig {
            fake,
            player,
            _watcher: watcher,
        }
    }

    fn sent_after_sync(fake: &FakeConnector) -> Vec<ClientCommand> {
        fake.sent(1)
            .into_iter()
            .filter(|c| !matches!(c, ClientCommand::Status | ClientCommand::CurrentSong))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_pause_follows_playback_state() {
        let stopped = rig(r#"{"state":"stop"}"#).await;
        stopped.player.toggle_pause();
        settle().await;
        assert_eq!(sent_after_sync(&stopped.fake), vec![ClientCommand::Play { pos: -1 }]);

        let playing = rig(r#"{"state":"play","songid":"3"}"#).await;
        playing.player.toggle_pause();
        settle().await;
        assert_eq!(sent_after_sync(&playing.fake), vec![ClientCommand::Pause { pause: true }]);

        let paused = rig(r#"{"state":"pause","songid":"3"}"#).await;
        paused.player.toggle_pause();
        settle().await;
        assert_eq!(sent_after_sync(&paused.fake), vec![ClientCommand::Pause { pause: false }]);
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_send_negated_flags() {
        let rig = rig(r#"{"state":"play","random":"1","repeat":"0"}"#).await;
        rig.player.toggle_random();
        rig.player.toggle_repeat();
        rig.player.next();
        rig.player.previous();
        settle().await;
        assert_eq!(
            sent_after_sync(&rig.fake),
            vec![
                ClientCommand::Random { random: false },
                ClientCommand::Repeat { repeat: true },
                ClientCommand::Next,
                ClientCommand::Previous,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn volume_drag_sends_one_command_with_last_value() {
        let rig = rig(r#"{"state":"play","volume":"50"}"#).await;
        for v in 41..=50 {
            rig.player.set_volume(v);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(sent_after_sync(&rig.fake).is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            sent_after_sync(&rig.fake),
            vec![ClientCommand::SetVolume { volume: 50 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn seek_targets_current_song() {
        let rig = rig(r#"{"state":"play","songid":"12","time":"5:300"}"#).await;
        rig.player.seek(90);
        rig.player.seek(120);
        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(
            sent_after_sync(&rig.fake),
            vec![ClientCommand::SeekId { id: 12, time: 120 }]
        );
    }

    #[test]
    fn title_skips_missing_parts() {
        let track = Track {
            file: "music/Band/01 Intro.flac".into(),
            album: Some("Debut".into()),
            artist: Some(String::new()),
            ..Track::default()
        };
        assert_eq!(now_playing_title(&track), "01 Intro.flac - Debut");

        let track = Track {
            file: "x.mp3".into(),
            title: Some("Song".into()),
            album: Some("Album".into()),
            artist: Some("Artist".into()),
            ..Track::default()
        };
        assert_eq!(now_playing_title(&track), "Song - Album - Artist");
    }

    #[test]
    fn progress_labels_show_elapsed_and_remaining() {
        let snapshot = StatusSnapshot {
            elapsed: 65,
            total: 200,
            ..StatusSnapshot::default()
        };
        assert_eq!(progress_labels(&snapshot), ("1:05".to_string(), "-2:15".to_string()));
    }
}
