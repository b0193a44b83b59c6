//! Tokenized source lines.
//!
//! Emitters write statements as templates. Symbol-scoped references are
//! written with sigils and parsed once into [`Piece`]s:
//!
//! | template        | piece                 | single-symbol rendering |
//! |-----------------|-----------------------|-------------------------|
//! | `$SYMBOL`       | [`Piece::Symbol`]     | `_Symbol`               |
//! | `$POINT`        | [`Piece::Point`]      | `_Point`                |
//! | `$DIGITS`       | [`Piece::Digits`]     | `_Digits`               |
//! | `$PIP`          | [`Piece::PipFactor`]  | `pipFactor`             |
//! | `$EXIT`         | [`Piece::Exit`]       | `return`                |
//! | `@name`         | [`Piece::Handle`]     | `name`                  |
//! | `~name`         | [`Piece::State`]      | `name`                  |
//!
//! Later passes rewrite pieces, never text, so a transform cannot miss a
//! reference hidden inside a longer identifier or string.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Piece {
    Text(String),
    Symbol,
    Point,
    Digits,
    PipFactor,
    Handle(String),
    State(String),
    Exit,
}

impl Piece {
    /// Whether the piece still refers to the chart symbol's scope.
    pub fn is_symbol_scoped(&self) -> bool {
        !matches!(self, Piece::Text(_))
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Piece::Text(t) => out.push_str(t),
            Piece::Symbol => out.push_str("_Symbol"),
            Piece::Point => out.push_str("_Point"),
            Piece::Digits => out.push_str("_Digits"),
            Piece::PipFactor => out.push_str("pipFactor"),
            Piece::Handle(name) | Piece::State(name) => out.push_str(name),
            Piece::Exit => out.push_str("return"),
        }
    }
}

const KEYWORDS: [(&str, Piece); 5] = [
    ("SYMBOL", Piece::Symbol),
    ("POINT", Piece::Point),
    ("DIGITS", Piece::Digits),
    ("PIP", Piece::PipFactor),
    ("EXIT", Piece::Exit),
];

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Line {
    pieces: Vec<Piece>,
}

impl Line {
    /// Parse a template, recognising the sigils listed in the module docs.
    pub fn parse(template: &str) -> Self {
        let mut line = Line::default();
        let mut rest = template;
        while let Some(c) = rest.chars().next() {
            let after = &rest[c.len_utf8()..];
            let token = match c {
                '$' => KEYWORDS.iter().find_map(|(kw, piece)| {
                    let tail = after.strip_prefix(kw)?;
                    if tail.chars().next().is_some_and(is_ident_char) {
                        None
                    } else {
                        Some((piece.clone(), tail))
                    }
                }),
                '@' | '~' => {
                    let len = after.find(|ch: char| !is_ident_char(ch)).unwrap_or(after.len());
                    let starts_ident = after
                        .chars()
                        .next()
                        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
                    if len > 0 && starts_ident {
                        let name = after[..len].to_string();
                        let piece = if c == '@' {
                            Piece::Handle(name)
                        } else {
                            Piece::State(name)
                        };
                        Some((piece, &after[len..]))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            match token {
                Some((piece, tail)) => {
                    line.push(piece);
                    rest = tail;
                }
                None => {
                    line.push_text(&rest[..c.len_utf8()]);
                    rest = after;
                }
            }
        }
        line
    }

    /// A literal line; sigil characters are kept as text.
    pub fn text(text: impl Into<String>) -> Self {
        let mut line = Line::default();
        line.push_text(&text.into());
        line
    }

    pub fn from_pieces(pieces: Vec<Piece>) -> Self {
        let mut line = Line::default();
        for piece in pieces {
            line.push(piece);
        }
        line
    }

    fn push(&mut self, piece: Piece) {
        match piece {
            Piece::Text(t) => self.push_text(&t),
            other => self.pieces.push(other),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Text(last)) = self.pieces.last_mut() {
            last.push_str(text);
        } else {
            self.pieces.push(Piece::Text(text.to_string()));
        }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Rewrite every piece. Returned text pieces are merged.
    pub fn map(&self, mut f: impl FnMut(&Piece) -> Piece) -> Line {
        Line::from_pieces(self.pieces.iter().map(&mut f).collect())
    }

    pub fn any(&self, pred: impl Fn(&Piece) -> bool) -> bool {
        self.pieces.iter().any(pred)
    }

    pub fn has_symbol_scope(&self) -> bool {
        self.any(Piece::is_symbol_scoped)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            piece.render_into(&mut out);
        }
        out
    }
}
