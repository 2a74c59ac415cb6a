//! Command-line input parsing for the headless client

use crate::error::CommandError;
use shared::{Face, Upgrade};

/// One line typed by the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Break a block: a random present one, or the given cell
    Click(Option<(Face, usize, usize)>),
    Buy(Upgrade),
    Nuke,
    Leaderboard,
    Rename(String),
    /// Turn the auto-clicker on or off
    Auto(bool),
    Status,
    Shop,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  click [face row col]   break a random block, or a specific one
  buy <upgrade>          purchase an upgrade (see 'shop')
  nuke                   clear the active layer (needs nuker)
  top                    show the leaderboard
  name <username>        change your display name
  auto on|off            toggle the auto-clicker
  status                 show layer, points and upgrades
  shop                   list upgrades and costs
  quit                   disconnect";

fn parse_face(word: &str) -> Result<Face, CommandError> {
    Face::ALL
        .into_iter()
        .find(|face| face.as_str().eq_ignore_ascii_case(word))
        .ok_or_else(|| CommandError::Face(word.to_string()))
}

fn parse_index(word: &str) -> Result<usize, CommandError> {
    word.parse()
        .map_err(|_| CommandError::Index(word.to_string()))
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("click" | "c", []) => Command::Click(None),
        ("click" | "c", [face, row, col]) => Command::Click(Some((
            parse_face(face)?,
            parse_index(row)?,
            parse_index(col)?,
        ))),
        ("click" | "c", _) => return Err(CommandError::Usage("click [face row col]")),

        ("buy", [upgrade]) => Command::Buy(upgrade.parse()?),
        ("buy", _) => return Err(CommandError::Usage("buy <upgrade>")),

        ("nuke", []) => Command::Nuke,
        ("top" | "leaderboard", []) => Command::Leaderboard,

        ("name", []) => return Err(CommandError::Usage("name <username>")),
        ("name", _) => Command::Rename(args.join(" ")),

        ("auto", ["on"]) => Command::Auto(true),
        ("auto", ["off"]) => Command::Auto(false),
        ("auto", _) => return Err(CommandError::Usage("auto on|off")),

        ("status", []) => Command::Status,
        ("shop", []) => Command::Shop,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,

        _ => return Err(CommandError::Unknown(verb.to_string())),
    };

    Ok(Some(command))
}
