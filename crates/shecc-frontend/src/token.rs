//! The token stream's element type (spec.md §3's `Token`/`TokenKind`).

use shecc_codegen::SourceLoc;

/// Every keyword spec.md §4.1 lists, plus `goto`/labels recovered from
/// `original_source/parser.c` (SPEC_FULL.md §4.3.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    While,
    For,
    Do,
    Break,
    Continue,
    Return,
    Switch,
    Case,
    Default,
    Goto,
    Sizeof,
    Struct,
    Union,
    Enum,
    Typedef,
    Void,
    Char,
    Int,
    Bool,
}

impl Keyword {
    /// Recognize a keyword by its spelling, `None` for an ordinary
    /// identifier.
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "do" => Keyword::Do,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "return" => Keyword::Return,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "goto" => Keyword::Goto,
            "sizeof" => Keyword::Sizeof,
            "struct" => Keyword::Struct,
            "union" => Keyword::Union,
            "enum" => Keyword::Enum,
            "typedef" => Keyword::Typedef,
            "void" => Keyword::Void,
            "char" => Keyword::Char,
            "int" => Keyword::Int,
            "_Bool" => Keyword::Bool,
            _ => return None,
        })
    }
}

/// Punctuation and operators. Multi-character operators are tokenized whole
/// (`Arrow` for `->`, `IncOp` for `++`, ...) so the parser never has to
/// lookahead-glue two single-char tokens back together.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Question,
    Colon,
    Shl,
    Shr,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    AmpAmp,
    PipePipe,
    IncOp,
    DecOp,
    Ellipsis,
}

/// One lexical token.
#[derive(Clone, Debug)]
pub enum TokenKind {
    Ident(String),
    IntLit(i64),
    CharLit(u8),
    StrLit(Vec<u8>),
    Keyword(Keyword),
    Punct(Punct),
    /// A `#`-directive line, kept whole for the preprocessor; the lexer
    /// never interprets directives itself (spec.md §4.1/§4.2's split: the
    /// lexer only tokenizes, the preprocessor decides what a line beginning
    /// with `#` means).
    Hash,
    /// End of the token stream for one file.
    Eof,
}

/// A single token plus the source span it came from.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLoc,
    /// Is this the first token on its physical line (column 0 apart from
    /// leading whitespace)? The preprocessor needs this to recognize
    /// directive lines (spec.md §4.2: "a `#` not in the first column is
    /// punctuation, not a directive").
    pub bol: bool,
    /// True if at least one whitespace/comment byte separates this token
    /// from the previous one — needed for correct macro-argument
    /// re-stringification and to keep `#define A(B` from merging tokens.
    pub space_before: bool,
    /// Macro-expansion hide-set: names of the object/function-like macros
    /// whose expansion produced this token, so a macro body can't expand
    /// itself recursively (spec.md §4.2's "painted blue" hide-set rule).
    /// A `SmallVec` since most tokens have an empty or single-entry
    /// hide-set; only deeply nested macro expansions grow it further.
    pub hide_set: smallvec::SmallVec<[std::rc::Rc<str>; 2]>,
}

impl Token {
    /// Build a token with an empty hide-set (the common case: every token
    /// straight out of the lexer).
    pub fn new(kind: TokenKind, loc: SourceLoc, bol: bool, space_before: bool) -> Self {
        Self {
            kind,
            loc,
            bol,
            space_before,
            hide_set: smallvec::SmallVec::new(),
        }
    }

    /// Is this token hidden from expanding `name` again?
    pub fn hides(&self, name: &str) -> bool {
        self.hide_set.iter().any(|n| &**n == name)
    }
}
