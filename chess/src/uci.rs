//! UCI move-text helpers.

use cozy_chess::{File, Move, Piece, Rank, Square};

/// Parses UCI long algebraic text (`e2e4`, `e7e8q`) into a move.
/// Returns `None` on anything that is not four or five valid characters.
pub fn parse_uci_move(text: &str) -> Option<Move> {
    if text.len() < 4 || text.len() > 5 {
        return None;
    }
    let mut chars = text.chars();
    let from = parse_square(chars.next()?, chars.next()?)?;
    let to = parse_square(chars.next()?, chars.next()?)?;
    let promotion = match chars.next() {
        Some(c) => Some(parse_promotion(c)?),
        None => None,
    };
    Some(Move {
        from,
        to,
        promotion,
    })
}

/// Formats a move as UCI text (`e2e4`, `e7e8q`).
pub fn format_uci_move(mv: Move) -> String {
    let mut out = format!("{}{}", mv.from, mv.to);
    if let Some(piece) = mv.promotion {
        out.push(promotion_char(piece));
    }
    out
}

/// Converts UCI castling notation to the rules library's convention.
///
/// UCI writes the king's destination (`e1g1`, `e1c1`); cozy-chess encodes
/// castling as king-to-rook (`e1h1`, `e1a1`). A candidate that matches the
/// UCI castling shape is rewritten when the rewritten move is legal;
/// anything else passes through unchanged.
pub fn convert_castling(mv: Move, legal_moves: &[Move]) -> Move {
    let on_home_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let from_e_file = mv.from.file() == File::E;
    let to_castle_file = matches!(mv.to.file(), File::G | File::C);

    if on_home_rank && from_e_file && to_castle_file && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };
        if legal_moves.contains(&converted) {
            return converted;
        }
    }

    mv
}

fn parse_square(file: char, rank: char) -> Option<Square> {
    let file = File::try_index((file as u32).checked_sub('a' as u32)? as usize)?;
    let rank = Rank::try_index((rank as u32).checked_sub('1' as u32)? as usize)?;
    Some(Square::new(file, rank))
}

fn parse_promotion(c: char) -> Option<Piece> {
    match c.to_ascii_lowercase() {
        'q' => Some(Piece::Queen),
        'r' => Some(Piece::Rook),
        'b' => Some(Piece::Bishop),
        'n' => Some(Piece::Knight),
        _ => None,
    }
}

fn promotion_char(piece: Piece) -> char {
    match piece {
        Piece::Queen => 'q',
        Piece::Rook => 'r',
        Piece::Bishop => 'b',
        Piece::Knight => 'n',
        Piece::Pawn => 'p',
        Piece::King => 'k',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_move() {
        let mv = parse_uci_move("e2e4").unwrap();
        assert_eq!(mv.from, Square::new(File::E, Rank::Second));
        assert_eq!(mv.to, Square::new(File::E, Rank::Fourth));
        assert_eq!(mv.promotion, None);
    }

    #[test]
    fn test_parse_promotion_move() {
        let mv = parse_uci_move("e7e8q").unwrap();
        assert_eq!(mv.promotion, Some(Piece::Queen));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "e2", "e2e9", "i2i4", "e2e4qq", "bestmove"] {
            assert!(parse_uci_move(text).is_none(), "accepted {text:?}");
        }
    }

    #[test]
    fn test_format_round_trips() {
        for text in ["e2e4", "g8f6", "e7e8q", "a7a8n"] {
            let mv = parse_uci_move(text).unwrap();
            assert_eq!(format_uci_move(mv), text);
        }
    }

    #[test]
    fn test_convert_castling_kingside() {
        let mv = parse_uci_move("e1g1").unwrap();
        let cozy = parse_uci_move("e1h1").unwrap();
        assert_eq!(convert_castling(mv, &[cozy]), cozy);
    }

    #[test]
    fn test_convert_castling_leaves_ordinary_moves_alone() {
        // King stepping e1 to g1 without castling rights: the king-to-rook
        // rewrite is not in the legal list, so the text passes through.
        let mv = parse_uci_move("e1g1").unwrap();
        assert_eq!(convert_castling(mv, &[mv]), mv);

        let quiet = parse_uci_move("d2d4").unwrap();
        assert_eq!(convert_castling(quiet, &[quiet]), quiet);
    }
}
