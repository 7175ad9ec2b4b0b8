//! Commands sent from the driving side (GUI) to an engine.

/// Search limit for the `go` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoLimit {
    /// Search to this depth in plies.
    Depth(u32),
    /// Search for exactly this wall-clock time in milliseconds.
    MoveTime(u64),
    /// Search exactly this many nodes.
    Nodes(u64),
}

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Reset state for a new game.
    NewGame,
    /// Set an engine option.
    SetOption { name: String, value: String },
    /// Set up a position, optionally followed by moves to apply.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoLimit),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
}

impl GuiCommand {
    /// Format the command as a UCI protocol line (without trailing newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::NewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(fen) => format!("position fen {}", fen),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(limit) => match limit {
                GoLimit::Depth(d) => format!("go depth {}", d),
                GoLimit::MoveTime(ms) => format!("go movetime {}", ms),
                GoLimit::Nodes(n) => format!("go nodes {}", n),
            },
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
        }
    }
}
