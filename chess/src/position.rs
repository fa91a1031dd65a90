//! Game position wrapper around the cozy-chess board.

use cozy_chess::{Board, GameStatus, Move};

use crate::uci::{convert_castling, parse_uci_move};
use crate::Color;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),
    #[error("malformed move: {0}")]
    MalformedMove(String),
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// Terminal result of a game, as reported by the rules library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameOutcome {
    /// Conventional score string: `1-0`, `0-1`, or `1/2-1/2`.
    pub fn score(self) -> &'static str {
        match self {
            GameOutcome::WhiteWins => "1-0",
            GameOutcome::BlackWins => "0-1",
            GameOutcome::Draw => "1/2-1/2",
        }
    }
}

/// Board state plus the UCI move list that produced it.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    moves: Vec<String>,
}

impl Position {
    /// Builds a position from an initial FEN. An empty string or
    /// `"startpos"` yields the standard opening position.
    pub fn new(initial_fen: &str) -> Result<Self, PositionError> {
        let board = match initial_fen {
            "" | "startpos" => Board::default(),
            fen => fen
                .parse()
                .map_err(|_| PositionError::InvalidFen(fen.to_string()))?,
        };
        Ok(Self {
            board,
            moves: Vec::new(),
        })
    }

    pub fn fen(&self) -> String {
        self.board.to_string()
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move().into()
    }

    /// Moves played so far, in UCI text, oldest first.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Number of half-moves played so far.
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.board.generate_moves(|mvs| {
            moves.extend(mvs);
            false
        });
        moves
    }

    /// Validates and plays a move given in UCI long algebraic text
    /// (`e2e4`, `e7e8q`). A rejected move leaves the position untouched.
    pub fn push_uci(&mut self, text: &str) -> Result<(), PositionError> {
        let mv = parse_uci_move(text)
            .ok_or_else(|| PositionError::MalformedMove(text.to_string()))?;
        let legal = self.legal_moves();
        let mv = convert_castling(mv, &legal);
        if !legal.contains(&mv) {
            return Err(PositionError::IllegalMove(text.to_string()));
        }
        self.board.play(mv);
        self.moves.push(text.to_ascii_lowercase());
        Ok(())
    }

    pub fn status(&self) -> GameStatus {
        self.board.status()
    }

    /// `Some` when the rules library reports the game over: the side to
    /// move has been mated, or the position is drawn.
    pub fn outcome(&self) -> Option<GameOutcome> {
        match self.board.status() {
            GameStatus::Ongoing => None,
            GameStatus::Won => Some(match self.side_to_move() {
                Color::White => GameOutcome::BlackWins,
                Color::Black => GameOutcome::WhiteWins,
            }),
            GameStatus::Drawn => Some(GameOutcome::Draw),
        }
    }
}
