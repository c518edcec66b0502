//! Line commands read from stdin

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use groovebox_core::Parameter;
use groovebox_core::limits::PLAYER_COUNT;

pub const HELP: &str = "\
play | stop | pause | continue | status | panic | quit
tempo <bpm>            metro on|off          clock on|off
swing|energy|humanize <player> <0..1>
pattern <player> <slot> [bars]    fill <player>
load <player> <slot> <file.mid>
scene save|load|trigger|clear <index> [name]    scene queue <index> <bars>
rec start|overdub|stop         export <file.mid>
learn <param>          set <param> <value>   (param e.g. player.0.swing)
settings save|load <file.toml>";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Play,
    Stop,
    Pause,
    Continue,
    Status,
    Panic,
    Quit,
    Help,
    Tempo(f64),
    Metronome(bool),
    SendClock(bool),
    Swing(usize, f32),
    Energy(usize, f32),
    Humanize(usize, f32),
    Pattern { player: usize, slot: usize, bars: Option<u32> },
    Fill(usize),
    Load { player: usize, slot: usize, path: PathBuf },
    SceneSave(usize, String),
    SceneLoad(usize),
    SceneTrigger(usize),
    SceneQueue(usize, u32),
    SceneClear(usize),
    Record { overdub: bool },
    RecordStop,
    Export(PathBuf),
    Learn(Parameter),
    Set(Parameter, f32),
    SaveSettings(PathBuf),
    LoadSettings(PathBuf),
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T> {
    let word = word.ok_or_else(|| anyhow!("missing {what}"))?;
    word.parse().map_err(|_| anyhow!("invalid {what}: {word}"))
}

fn player(word: Option<&str>) -> Result<usize> {
    let index: usize = number(word, "player")?;
    if index >= PLAYER_COUNT {
        bail!("player must be below {PLAYER_COUNT}");
    }
    Ok(index)
}

fn toggle(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => bail!("expected on or off"),
    }
}

fn path(word: Option<&str>) -> Result<PathBuf> {
    word.map(PathBuf::from).ok_or_else(|| anyhow!("missing file path"))
}

fn parameter(word: Option<&str>) -> Result<Parameter> {
    let word = word.ok_or_else(|| anyhow!("missing parameter"))?;
    word.parse().with_context(|| format!("parsing {word}"))
}

/// Parse one line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Action>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let action = match verb {
        "play" => Action::Play,
        "stop" => Action::Stop,
        "pause" => Action::Pause,
        "continue" => Action::Continue,
        "status" => Action::Status,
        "panic" => Action::Panic,
        "quit" | "exit" => Action::Quit,
        "help" | "?" => Action::Help,
        "tempo" => Action::Tempo(number(words.next(), "tempo")?),
        "metro" => Action::Metronome(toggle(words.next())?),
        "clock" => Action::SendClock(toggle(words.next())?),
        "swing" => Action::Swing(player(words.next())?, number(words.next(), "amount")?),
        "energy" => Action::Energy(player(words.next())?, number(words.next(), "amount")?),
        "humanize" => Action::Humanize(player(words.next())?, number(words.next(), "amount")?),
        "pattern" => Action::Pattern {
            player: player(words.next())?,
            slot: number(words.next(), "slot")?,
            bars: words.next().map(|w| number(Some(w), "bars")).transpose()?,
        },
        "fill" => Action::Fill(player(words.next())?),
        "load" => Action::Load {
            player: player(words.next())?,
            slot: number(words.next(), "slot")?,
            path: path(words.next())?,
        },
        "scene" => {
            let sub = words.next().unwrap_or_default();
            let index = number(words.next(), "scene")?;
            match sub {
                "save" => Action::SceneSave(index, words.collect::<Vec<_>>().join(" ")),
                "load" => Action::SceneLoad(index),
                "trigger" => Action::SceneTrigger(index),
                "queue" => Action::SceneQueue(index, number(words.next(), "bars")?),
                "clear" => Action::SceneClear(index),
                other => bail!("unknown scene command: {other}"),
            }
        }
        "rec" => match words.next() {
            Some("start") => Action::Record { overdub: false },
            Some("overdub") => Action::Record { overdub: true },
            Some("stop") => Action::RecordStop,
            _ => bail!("expected rec start, overdub or stop"),
        },
        "export" => Action::Export(path(words.next())?),
        "learn" => Action::Learn(parameter(words.next())?),
        "set" => Action::Set(parameter(words.next())?, number(words.next(), "value")?),
        "settings" => match words.next() {
            Some("save") => Action::SaveSettings(path(words.next())?),
            Some("load") => Action::LoadSettings(path(words.next())?),
            _ => bail!("expected settings save or load"),
        },
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(action))
}
