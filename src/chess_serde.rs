//! Serde adapters for shakmaty types, which do not implement serde themselves.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{Error, Visitor};

/// Visits a string and parses it with `parse`, naming `expecting` on failure.
struct ParseVisitor<T, F> {
    expecting: &'static str,
    parse: F,
    _out: PhantomData<T>,
}

impl<'de, T, F> Visitor<'de> for ParseVisitor<T, F>
where
    F: FnOnce(&str) -> Result<T, String>,
{
    type Value = T;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.expecting)
    }

    fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        (self.parse)(v).map_err(E::custom)
    }
}

pub mod position_serde {
    use super::*;

    use serde::{Deserializer, Serializer};
    use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode};

    pub fn serialize<S: Serializer>(b: &Chess, ser: S) -> Result<S::Ok, S::Error> {
        let fen = Fen::from_position(b.clone(), EnPassantMode::Legal);
        ser.serialize_str(&fen.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Chess, D::Error> {
        d.deserialize_str(ParseVisitor {
            expecting: "a position in the FEN format",
            parse: |v: &str| -> Result<Chess, String> {
                Fen::from_str(v)
                    .map_err(|e| format!("error in parsing FEN: {e}"))?
                    .into_position(CastlingMode::Standard)
                    .map_err(|e| format!("error in parsing FEN into a position: {e}"))
            },
            _out: PhantomData,
        })
    }
}

pub mod uci_serde {
    use super::*;

    use serde::{Deserializer, Serializer};
    use shakmaty::uci::Uci;

    pub fn serialize<S: Serializer>(u: &Uci, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&u.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Uci, D::Error> {
        d.deserialize_str(ParseVisitor {
            expecting: "a move in the UCI format",
            parse: |v: &str| -> Result<Uci, String> {
                Uci::from_str(v).map_err(|_| format!("invalid UCI move: {v}"))
            },
            _out: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use shakmaty::{uci::Uci, Chess, Position};

    #[derive(Serialize, Deserialize)]
    struct Snapshot {
        #[serde(with = "super::position_serde")]
        position: Chess,
        #[serde(with = "super::uci_serde")]
        last: Uci,
    }

    #[test]
    fn reads_fen_and_uci_from_json() {
        let json = r#"{
            "position": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "last": "e2e4"
        }"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.position.turn(), shakmaty::Color::Black);
        assert_eq!(snap.last.to_string(), "e2e4");

        let back = serde_json::to_string(&snap).unwrap();
        assert!(back.contains("\"last\":\"e2e4\""));
    }

    #[test]
    fn rejects_garbage_fen() {
        let json = r#"{ "position": "not a fen", "last": "e2e4" }"#;
        assert!(serde_json::from_str::<Snapshot>(json).is_err());
    }
}
