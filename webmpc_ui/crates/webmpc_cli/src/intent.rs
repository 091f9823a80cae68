use anyhow::{anyhow, bail, Context};

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    TogglePause,
    Next,
    Previous,
    Random,
    Repeat,
    Volume(i32),
    Seek(u32),
    Library,
    Open(String),
    Add(String),
    Insert { key: String, pos: i32 },
    Queue,
    Jump(u32),
    Move { id: u32, pos: i32 },
    Clear,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  p | pause | play       toggle play/pause (starts playback when stopped)
  n | next, b | prev     skip
  random, repeat         toggle modes
  vol N, seek SECONDS    debounced volume / seek
  ls                     show the library tree
  open PATH              expand or collapse a folder
  add PATH               append a file or a whole folder to the queue
  insert PATH POS        insert a file or folder at a queue position
  q | queue              show the queue
  jump ID                play a queue entry
  move ID POS            move a queue entry (POS -1 = last)
  clear                  empty the queue
  status                 show the current status
  quit";

pub fn parse_intent(line: &str) -> anyhow::Result<Option<Intent>> {
    let line = line.trim();
    let Some((word, rest)) = split_word(line) else {
        return Ok(None);
    };

    let intent = match word {
        "p" | "pause" | "play" => Intent::TogglePause,
        "n" | "next" => Intent::Next,
        "b" | "prev" | "previous" => Intent::Previous,
        "random" => Intent::Random,
        "repeat" => Intent::Repeat,
        "vol" | "volume" => Intent::Volume(number(rest, "volume")?),
        "seek" => Intent::Seek(number(rest, "seconds")?),
        "ls" => Intent::Library,
        "open" => Intent::Open(path(rest)?),
        "add" => Intent::Add(path(rest)?),
        "insert" => {
            let (key, pos) = rest
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: insert PATH POS"))?;
            Intent::Insert {
                key: path(key)?,
                pos: number(pos, "position")?,
            }
        }
        "q" | "queue" => Intent::Queue,
        "jump" => Intent::Jump(number(rest, "id")?),
        "move" => {
            let (id, pos) = split_word(rest).ok_or_else(|| anyhow!("usage: move ID POS"))?;
            Intent::Move {
                id: number(id, "id")?,
                pos: number(pos, "position")?,
            }
        }
        "clear" => Intent::Clear,
        "status" => Intent::Status,
        "help" | "?" => Intent::Help,
        "quit" | "exit" => Intent::Quit,
        other => bail!("unknown command {other:?} (try `help`)"),
    };
    Ok(Some(intent))
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Some(match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    })
}

fn number<T: std::str::FromStr>(raw: &str, what: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("expected a {what}, got {raw:?}"))
}

fn path(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() {
        bail!("missing path");
    }
    Ok(raw.to_string())
}
