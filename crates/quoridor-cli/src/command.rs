//! Line commands typed at the prompt.

use quoridor_core::protocol::{Coord, Orientation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `move <row> <col>`
    Move(Coord),
    /// `wall <row> <col> <h|v>`
    Wall(Coord, Orientation),
    Refresh,
    Abort,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  move <row> <col>        move your pawn to a cell (even row and column)
  wall <row> <col> <h|v>  place a wall on a track (row or column odd)
  refresh                 fetch the session now
  abort                   abort the game for both players
  quit                    leave without aborting";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["move" | "m", row, col] => Ok(Command::Move(coord(row, col)?)),
        ["wall" | "w", row, col, orientation] => {
            Ok(Command::Wall(coord(row, col)?, parse_orientation(orientation)?))
        }
        ["refresh" | "r"] => Ok(Command::Refresh),
        ["abort"] => Ok(Command::Abort),
        ["help" | "?"] => Ok(Command::Help),
        ["quit" | "q" | "exit"] => Ok(Command::Quit),
        [] => Err("empty command".to_string()),
        [other, ..] => Err(format!("unknown command '{other}', try 'help'")),
    }
}

fn coord(row: &str, col: &str) -> Result<Coord, String> {
    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| format!("'{s}' is not a grid index"))
    };
    Ok(Coord::new(parse(row)?, parse(col)?))
}

fn parse_orientation(s: &str) -> Result<Orientation, String> {
    match s.to_ascii_lowercase().as_str() {
        "h" | "horizontal" => Ok(Orientation::Horizontal),
        "v" | "vertical" => Ok(Orientation::Vertical),
        _ => Err(format!("'{s}' is not an orientation, use h or v")),
    }
}
