//! Operator input parsing.

use iotdash_model::{Command, Relay};

/// One line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Publish a device command.
    Send(Command),
    /// Print the current dashboard state.
    Status,
    /// Print the command summary.
    Help,
    /// Stop and exit.
    Quit,
}

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  light <1|2|3> <on|off>   switch a lighting relay
  garden <on|off>          switch the irrigation relay
  status                   show the latest device readings
  help                     show this summary
  quit                     disconnect and exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        [] => return Ok(None),
        ["light", relay, state] => Input::Send(Command::Lighting {
            relay: relay.parse::<Relay>()?,
            on: parse_switch(state)?,
        }),
        ["garden", state] => Input::Send(Command::Garden {
            on: parse_switch(state)?,
        }),
        ["status"] => Input::Status,
        ["help" | "?"] => Input::Help,
        ["quit" | "exit"] => Input::Quit,
        _ => return Err(format!("unrecognized input: {}", line.trim())),
    };
    Ok(Some(input))
}

fn parse_switch(word: &str) -> Result<bool, String> {
    match word {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}
