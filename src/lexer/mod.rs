use logos::Logos;

/// Tokens of a single gcode line
/// A line is a run of address words (`G1`, `X80.515`, `E-0.76`) optionally
/// followed by a `;` comment.

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r\n]+")] // Skip whitespace and the line terminator
#[logos(error = LexerError)]
pub enum Token {
    // Address letter plus optional signed number
    #[regex(r"[A-Za-z][+-]?[0-9]*\.?[0-9]*", word)]
    Word(Word),

    // Parenthesised comments may sit between words
    #[regex(r"\([^)\n]*\)")]
    InlineComment,

    // Everything after ';' is a comment
    #[regex(r";[^\n]*")]
    Comment,
}

/// One address word, e.g. `E0.80000`
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: Option<f64>,
}

impl Word {
    pub fn is(&self, letter: char) -> bool {
        self.letter == letter
    }

    /// `G1` / `G01`, the linear move that carries extrusion
    pub fn is_linear_move(&self) -> bool {
        self.letter == 'G' && self.value == Some(1.0)
    }
}

fn word(lex: &mut logos::Lexer<Token>) -> Word {
    let slice = lex.slice();
    let mut chars = slice.chars();
    let letter = chars.next().unwrap_or_default().to_ascii_uppercase();
    Word {
        letter,
        value: chars.as_str().parse::<f64>().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexerError;

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lexer error")
    }
}

impl std::error::Error for LexerError {}

/// Lex one line into tokens
pub fn lex(line: &str) -> Vec<(Token, logos::Span)> {
    Token::lexer(line)
        .spanned()
        .filter_map(|(result, span)| match result {
            Ok(token) => Some((token, span)),
            Err(_) => None, // Checksums and stray symbols carry no words
        })
        .collect()
}

/// The operative words of a line, stopping at the first `;` comment
pub fn words(line: &str) -> Vec<Word> {
    let mut out = Vec::new();
    for (token, _) in lex(line) {
        match token {
            Token::Word(w) => out.push(w),
            Token::InlineComment => continue,
            Token::Comment => break,
        }
    }
    out
}
