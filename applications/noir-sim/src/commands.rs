//! Console command parsing

use noir_transport::{RepeatMode, ShuffleMode, TrackId, TransportCommand};

/// What a console line asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Transport(TransportCommand),
    ListTracks,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play <track> [secs]     play a track (optionally from an offset)
  toggle | pause | resume | stop
  next | prev
  seek <secs>             seek immediately
  drag <secs>             start or move a seek-bar drag
  commit                  release the drag
  shuffle off|album|library
  repeat off|all|one
  enqueue <track>         add to the end of the queue
  upnext <track>          add to the front of the queue
  dequeue <index>
  move <from> <to>        reorder the queue
  clear                   empty the queue
  volume <0..1>
  refresh                 re-read the backend state
  tracks | status | help | quit";

fn number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    let arg = arg.ok_or_else(|| format!("missing {what}"))?;
    arg.parse().map_err(|_| format!("invalid {what}: {arg}"))
}

fn track(arg: Option<&str>) -> Result<TrackId, String> {
    arg.map(TrackId::new).ok_or_else(|| "missing track id".to_string())
}

/// Parse one console line; `Ok(None)` for a blank line
///
/// `dragging` says whether a drag is already open, so `drag` either begins
/// one or moves it.
pub fn parse(line: &str, dragging: bool) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let arg2 = words.next();

    let command = match verb {
        "play" => {
            let track_id = track(arg)?;
            match arg2 {
                Some(_) => TransportCommand::PlayAt {
                    track_id,
                    position: number(arg2, "position")?,
                },
                None => TransportCommand::Play { track_id },
            }
        }
        "toggle" | "p" => TransportCommand::TogglePlayPause,
        "pause" => TransportCommand::Pause,
        "resume" => TransportCommand::Resume,
        "stop" => TransportCommand::Stop,
        "next" | "n" => TransportCommand::SkipNext,
        "prev" | "b" => TransportCommand::SkipPrevious,
        "seek" => TransportCommand::SeekTo {
            position: number(arg, "position")?,
        },
        "drag" => {
            let position = number(arg, "position")?;
            if dragging {
                TransportCommand::UpdateSeekDrag { position }
            } else {
                TransportCommand::BeginSeekDrag { position }
            }
        }
        "commit" => TransportCommand::CommitSeek,
        "shuffle" => TransportCommand::SetShuffle {
            mode: match arg {
                Some("off") => ShuffleMode::Off,
                Some("album") => ShuffleMode::Album,
                Some("library") => ShuffleMode::Library,
                _ => return Err("shuffle takes off, album or library".to_string()),
            },
        },
        "repeat" => TransportCommand::SetRepeat {
            mode: match arg {
                Some("off") => RepeatMode::Off,
                Some("all") => RepeatMode::All,
                Some("one") => RepeatMode::One,
                _ => return Err("repeat takes off, all or one".to_string()),
            },
        },
        "enqueue" | "q" => TransportCommand::Enqueue {
            track_id: track(arg)?,
        },
        "upnext" => TransportCommand::EnqueueNext {
            track_id: track(arg)?,
        },
        "dequeue" => TransportCommand::Dequeue {
            index: number(arg, "index")?,
        },
        "move" => TransportCommand::ReorderQueue {
            from: number(arg, "from index")?,
            to: number(arg2, "to index")?,
        },
        "clear" => TransportCommand::ClearQueue,
        "volume" | "vol" => TransportCommand::SetVolume {
            volume: number(arg, "volume")?,
        },
        "refresh" => TransportCommand::RefreshBackendState,
        "tracks" | "ls" => return Ok(Some(Input::ListTracks)),
        "status" | "s" => return Ok(Some(Input::Status)),
        "help" | "?" => return Ok(Some(Input::Help)),
        "quit" | "exit" => return Ok(Some(Input::Quit)),
        other => return Err(format!("unknown command: {other} (try help)")),
    };

    Ok(Some(Input::Transport(command)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(line: &str) -> TransportCommand {
        match parse(line, false) {
            Ok(Some(Input::Transport(command))) => command,
            other => panic!("{line}: {other:?}"),
        }
    }

    #[test]
    fn parses_playback_commands() {
        assert_eq!(
            transport("play a0t1"),
            TransportCommand::Play {
                track_id: TrackId::new("a0t1")
            }
        );
        assert_eq!(
            transport("play a0t1 42.5"),
            TransportCommand::PlayAt {
                track_id: TrackId::new("a0t1"),
                position: 42.5
            }
        );
        assert_eq!(transport("n"), TransportCommand::SkipNext);
        assert_eq!(
            transport("shuffle album"),
            TransportCommand::SetShuffle {
                mode: ShuffleMode::Album
            }
        );
        assert_eq!(transport("move 2 0"), TransportCommand::ReorderQueue { from: 2, to: 0 });
    }

    #[test]
    fn drag_begins_then_updates() {
        assert_eq!(
            parse("drag 30", false),
            Ok(Some(Input::Transport(TransportCommand::BeginSeekDrag {
                position: 30.0
            })))
        );
        assert_eq!(
            parse("drag 31", true),
            Ok(Some(Input::Transport(TransportCommand::UpdateSeekDrag {
                position: 31.0
            })))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("   ", false), Ok(None));
        assert!(parse("seek", false).is_err());
        assert!(parse("seek soon", false).is_err());
        assert!(parse("repeat twice", false).is_err());
        assert!(parse("dance", false).is_err());
    }
}
