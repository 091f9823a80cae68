mod intent;

use crate::intent::{parse_intent, Intent, HELP};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webmpc_core::config::{endpoint_for_origin, parse_ws_url, ClientConfig};
use webmpc_core::connection::Connection;
use webmpc_core::db::{DbView, NodeKind};
use webmpc_core::duration::human_duration;
use webmpc_core::player::{now_playing_title, progress_labels, Player};
use webmpc_core::playlist::PlaylistView;
use webmpc_core::status_watcher::StatusWatcher;
use webmpc_core::store::{JsonFileBackend, Store, StoreBackend};

#[derive(Parser, Debug)]
#[command(name = "webmpc_cli")]
struct Args {
    /// Full websocket url, e.g. ws://127.0.0.1:8080/ws.
    #[arg(long, conflicts_with = "origin")]
    url: Option<String>,

    /// Page origin the endpoint is derived from (https -> wss, http -> ws).
    #[arg(long)]
    origin: Option<String>,

    #[arg(long, value_name = "MS")]
    reconnect_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    status_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// How long a track-detail request may go unanswered before it is repeated.
    #[arg(long, value_name = "MS")]
    detail_ms: Option<u64>,

    /// Where expanded library folders are remembered.
    #[arg(long, value_name = "PATH", default_value = "webmpc-state.json")]
    state_file: PathBuf,
}

impl Args {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;
        if let Some(url) = self.url.as_deref() {
            config.endpoint = parse_ws_url(url.trim())?;
        } else if let Some(origin) = self.origin.as_deref() {
            config.endpoint = endpoint_for_origin(origin.trim())?;
        }
        if let Some(ms) = self.reconnect_ms {
            config = config.with_reconnect_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.status_ms {
            config = config.with_status_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.debounce_ms {
            config = config.with_debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = self.detail_ms {
            config = config.with_detail_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

struct Ui<B> {
    player: Player,
    db: DbView<B>,
    playlist: PlaylistView,
}

impl<B: StoreBackend> Ui<B> {
    fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::TogglePause => self.player.toggle_pause(),
            Intent::Next => self.player.next(),
            Intent::Previous => self.player.previous(),
            Intent::Random => self.player.toggle_random(),
            Intent::Repeat => self.player.toggle_repeat(),
            Intent::Volume(v) => self.player.set_volume(v),
            Intent::Seek(s) => self.player.seek(s),
            Intent::Library => self.print_library(),
            Intent::Open(key) => match self.db.toggle(&key) {
                Some(open) => {
                    println!("{key} {}", if open { "expanded" } else { "collapsed" });
                    self.print_library();
                }
                None => eprintln!("no folder {key:?}"),
            },
            Intent::Add(key) => self.enqueue(&key, -1),
            Intent::Insert { key, pos } => self.enqueue(&key, pos),
            Intent::Queue => self.print_queue(),
            Intent::Jump(id) => self.playlist.play(id),
            Intent::Move { id, pos } => self.playlist.move_entry(id, pos),
            Intent::Clear => self.playlist.clear(),
            Intent::Status => self.print_status(),
            Intent::Help => println!("{HELP}"),
            // Handled by the caller.
            Intent::Quit => {}
        }
    }

    fn enqueue(&self, key: &str, pos: i32) {
        if pos < 0 && self.db.activate(key) {
            return;
        }
        let uris = self.db.uris_under(key);
        if uris.is_empty() {
            eprintln!("nothing in the library under {key:?}");
            return;
        }
        println!("queueing {} file(s)", uris.len());
        self.playlist.insert_uris(uris, pos);
    }

    fn print_library(&self) {
        for (depth, node) in self.db.visible() {
            let marker = match (node.kind, node.expanded) {
                (NodeKind::Dir, true) => "v ",
                (NodeKind::Dir, false) => "> ",
                (NodeKind::File, _) => "  ",
            };
            println!("{}{marker}{}", "  ".repeat(depth), node.label);
        }
    }

    fn print_queue(&self) {
        if self.playlist.rows().is_empty() {
            println!("(queue is empty)");
        }
        for row in self.playlist.rows() {
            let marker = if row.active { '*' } else { ' ' };
            println!(
                "{marker} {:>4}  {:<32} {:<20} {:<20} {:>6}",
                row.id, row.title, row.album, row.artist, row.time
            );
        }
    }

    fn print_status(&self) {
        let snapshot = self.player.snapshot();
        let (elapsed, remaining) = progress_labels(&snapshot);
        println!(
            "{} {elapsed} / {} ({remaining})  volume {}  random {}  repeat {}",
            snapshot.state.as_str(),
            human_duration(snapshot.total),
            snapshot.volume.map_or_else(|| "-".to_string(), |v| v.to_string()),
            on_off(snapshot.random),
            on_off(snapshot.repeat),
        );
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = args.client_config()?;
    info!(endpoint = %config.endpoint, "starting");

    let connection = Connection::spawn(&config);
    let watcher = StatusWatcher::spawn(&connection, &config);
    let mut ui = Ui {
        player: Player::new(&connection, &watcher, &config),
        db: DbView::new(&connection, Store::new(JsonFileBackend::new(&args.state_file))),
        playlist: PlaylistView::new(&connection, watcher.subscribe()),
    };

    let mut now_playing = watcher.current_track();
    let mut state = connection.watch_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("type `help` for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_intent(&line) {
                    Ok(Some(Intent::Quit)) => break,
                    Ok(Some(intent)) => ui.apply(intent),
                    Ok(None) => {}
                    Err(e) => eprintln!("{e:#}"),
                }
            }
            alive = ui.db.recv() => {
                if !alive {
                    warn!("library stream closed");
                    break;
                }
                info!(files = ui.db.files().len(), "library updated");
            }
            alive = ui.playlist.recv() => {
                if !alive {
                    warn!("queue stream closed");
                    break;
                }
            }
            Ok(()) = now_playing.changed() => {
                if let Some(track) = now_playing.borrow_and_update().as_ref() {
                    info!(title = %now_playing_title(track), "now playing");
                }
            }
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                info!(state = current.as_str(), "connection");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_flags_override_config() {
        let args = Args::try_parse_from([
            "webmpc_cli",
            "--url",
            "ws://127.0.0.1:9000/ws",
            "--status-ms",
            "250",
            "--detail-ms",
            "1500",
        ])
        .unwrap();
        let config = args.client_config().unwrap();

        assert_eq!(config.endpoint.as_str(), "ws://127.0.0.1:9000/ws");
        assert_eq!(config.status_interval, Duration::from_millis(250));
        assert_eq!(config.detail_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn url_and_origin_conflict() {
        let parsed = Args::try_parse_from([
            "webmpc_cli",
            "--url",
            "ws://a/ws",
            "--origin",
            "http://a",
        ]);
        assert!(parsed.is_err());
    }
}
