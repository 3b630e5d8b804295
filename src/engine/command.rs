use std::str::FromStr;

use tokio::sync::mpsc;

use crate::error::LoopError;
use crate::models::Side;

/// Operator instruction, consumed exactly once by the trading loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ManualTrade { side: Side },
    RefreshData,
    UpdateSetting { name: String, value: String },
    ClosePosition,
}

/// Bounded many-producer command queue
pub fn channel(capacity: usize) -> (mpsc::Sender<Command>, mpsc::Receiver<Command>) {
    mpsc::channel(capacity.max(1))
}

impl FromStr for Command {
    type Err = LoopError;

    /// Parse an operator line: `long`, `short`, `close`, `refresh` or
    /// `set <name> <value>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| LoopError::InvalidCommand("empty command".to_string()))?
            .to_ascii_lowercase();

        let command = match verb.as_str() {
            "long" | "buy" => Command::ManualTrade { side: Side::Long },
            "short" | "sell" => Command::ManualTrade { side: Side::Short },
            "close" => Command::ClosePosition,
            "refresh" => Command::RefreshData,
            "set" => {
                let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                    return Err(LoopError::InvalidCommand(
                        "usage: set <name> <value>".to_string(),
                    ));
                };
                Command::UpdateSetting {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            }
            other => return Err(LoopError::InvalidCommand(format!("unknown command '{}'", other))),
        };

        if parts.next().is_some() {
            return Err(LoopError::InvalidCommand(format!(
                "unexpected arguments in '{}'",
                s.trim()
            )));
        }

        Ok(command)
    }
}
