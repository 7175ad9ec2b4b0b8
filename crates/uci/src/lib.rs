//! UCI (Universal Chess Interface) protocol library.
//!
//! This crate provides types for driving a UCI chess engine: command
//! formatting on the way in and line parsing on the way out. It does no I/O
//! and owns no processes, so the protocol handling is testable on its own.
//!
//! # Standard UCI commands
//!
//! - `uci` / `uciok` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `setoption name <name> value <value>` - Configure the engine
//! - `position [fen <fen> | startpos] [moves <move>...]` - Set position
//! - `go [movetime <ms> | depth <d> | nodes <n>]` - Start search
//! - `info ...` - Streaming search progress
//! - `bestmove <move> [ponder <move>]` - Final search result

mod command;
mod info;

pub use command::{GoLimit, GuiCommand};
pub use info::{BestMove, Score, SearchInfo};

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(SearchInfo),
    /// Best move found.
    BestMove(BestMove),
    /// Anything else the engine printed (option lists, banners, ...).
    Unknown(String),
}

impl EngineMessage {
    /// Parse a single line of engine output.
    ///
    /// Never fails: lines that match no known prefix come back as
    /// [`EngineMessage::Unknown`] so the read loop can skip them.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "uciok" => return EngineMessage::UciOk,
            "readyok" => return EngineMessage::ReadyOk,
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("id name ") {
            return EngineMessage::Id {
                name: Some(rest.to_string()),
                author: None,
            };
        }
        if let Some(rest) = line.strip_prefix("id author ") {
            return EngineMessage::Id {
                name: None,
                author: Some(rest.to_string()),
            };
        }
        if let Some(info) = SearchInfo::parse(line) {
            return EngineMessage::Info(info);
        }
        if let Some(best) = BestMove::parse(line) {
            return EngineMessage::BestMove(best);
        }
        EngineMessage::Unknown(line.to_string())
    }
}
