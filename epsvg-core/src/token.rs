//! Token types for the EPS lexer.
//!
//! The lexer classifies raw text into typed tokens carrying a borrowed slice
//! of the source plus line/column for diagnostics. A bare word is compared
//! case-sensitively against the reserved-word table and becomes a [`Keyword`]
//! token on match; meaning is still resolved through the dictionary scope
//! chain at execution time, so reserved words can be shadowed by `def`.

use std::sync::LazyLock;

use crate::dict::SymbolDict;

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

macro_rules! keywords {
    ($($name:literal => $variant:ident,)*) => {
        /// Reserved-word codes. The system operator table is keyed by these.
        ///
        /// Not every keyword has an operator behind it; a recognized word
        /// with no system entry and no user definition is an undefined-name
        /// error at execution time, same as an arbitrary identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Every keyword with its source spelling.
            pub const ALL: &'static [(&'static str, Keyword)] =
                &[$(($name, Keyword::$variant),)*];

            /// The source spelling of this keyword.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

keywords! {
    // -- stack --
    "pop" => Pop,
    "dup" => Dup,
    "exch" => Exch,
    "copy" => Copy,
    "index" => Index,
    "roll" => Roll,
    "mark" => Mark,
    "clear" => Clear,
    "count" => Count,
    "counttomark" => CountToMark,
    "cleartomark" => ClearToMark,

    // -- arithmetic, comparison, logic --
    "add" => Add,
    "sub" => Sub,
    "mul" => Mul,
    "div" => Div,
    "idiv" => Idiv,
    "mod" => Mod,
    "abs" => Abs,
    "neg" => Neg,
    "sqrt" => Sqrt,
    "round" => Round,
    "truncate" => Truncate,
    "floor" => Floor,
    "ceiling" => Ceiling,
    "sin" => Sin,
    "cos" => Cos,
    "atan" => Atan,
    "exp" => Exp,
    "ln" => Ln,
    "log" => Log,
    "cvi" => Cvi,
    "cvr" => Cvr,
    "eq" => Eq,
    "ne" => Ne,
    "lt" => Lt,
    "gt" => Gt,
    "le" => Le,
    "ge" => Ge,
    "and" => And,
    "or" => Or,
    "not" => Not,
    "xor" => Xor,
    "bitshift" => Bitshift,

    // -- containers --
    "array" => Array,
    "string" => Str,
    "length" => Length,
    "get" => Get,
    "put" => Put,
    "getinterval" => GetInterval,
    "putinterval" => PutInterval,
    "astore" => AStore,
    "aload" => ALoad,
    "anchorsearch" => AnchorSearch,
    "forall" => ForAll,

    // -- type checks and conversion --
    "type" => Type,
    "xcheck" => XCheck,
    "rcheck" => RCheck,
    "wcheck" => WCheck,

    // -- dictionaries --
    "dict" => Dict,
    "begin" => Begin,
    "end" => End,
    "def" => Def,
    "store" => Store,
    "load" => Load,
    "where" => Where,
    "known" => Known,
    "userdict" => UserDict,
    "systemdict" => SystemDict,
    "globaldict" => GlobalDict,
    "statusdict" => StatusDict,

    // -- control flow --
    "if" => If,
    "ifelse" => IfElse,
    "exec" => Exec,
    "loop" => Loop,
    "exit" => Exit,
    "stop" => Stop,
    "stopped" => Stopped,
    "bind" => Bind,

    // -- save/restore --
    "save" => Save,
    "restore" => Restore,

    // -- path construction --
    "newpath" => NewPath,
    "moveto" => MoveTo,
    "rmoveto" => RMoveTo,
    "lineto" => LineTo,
    "rlineto" => RLineTo,
    "curveto" => CurveTo,
    "rcurveto" => RCurveTo,
    "arc" => Arc,
    "arcn" => ArcN,
    "closepath" => ClosePath,

    // -- painting --
    "fill" => Fill,
    "eofill" => EoFill,
    "stroke" => Stroke,
    "clip" => Clip,
    "eoclip" => EoClip,
    "clippath" => ClipPath,

    // -- graphics state --
    "gsave" => GSave,
    "grestore" => GRestore,
    "setgray" => SetGray,
    "setrgbcolor" => SetRgbColor,
    "sethsbcolor" => SetHsbColor,
    "setcmykcolor" => SetCmykColor,
    "currentgray" => CurrentGray,
    "setlinewidth" => SetLineWidth,
    "setlinecap" => SetLineCap,
    "setlinejoin" => SetLineJoin,
    "setmiterlimit" => SetMiterLimit,
    "setdash" => SetDash,
    "setflat" => SetFlat,
    "currentflat" => CurrentFlat,
    "settransfer" => SetTransfer,
    "currenttransfer" => CurrentTransfer,

    // -- matrices --
    "matrix" => Matrix,
    "setmatrix" => SetMatrix,
    "currentmatrix" => CurrentMatrix,
    "defaultmatrix" => DefaultMatrix,
    "invertmatrix" => InvertMatrix,
    "transform" => Transform,
    "itransform" => ITransform,
    "dtransform" => DTransform,
    "translate" => Translate,
    "rotate" => Rotate,
    "scale" => Scale,
    "concat" => Concat,

    // -- misc --
    "findfont" => FindFont,
    "null" => Null,
    "version" => Version,
}

static KEYWORD_MAP: LazyLock<SymbolDict<Keyword>> = LazyLock::new(|| {
    Keyword::ALL
        .iter()
        .map(|&(name, kw)| (name.to_owned(), kw))
        .collect()
});

impl Keyword {
    /// Borrowed-span lookup in the reserved-word table.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        KEYWORD_MAP.get(name).copied()
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A lexical token borrowing its content from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The token's text. For strings/names/comments this excludes the
    /// surrounding delimiters.
    pub content: &'src str,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    /// Numeric literal without a `.`.
    Integer(i64),
    /// Numeric literal containing a `.`.
    Real(f64),
    /// `true` / `false`.
    Boolean(bool),
    /// `(`-delimited string; content is the raw text between the parens.
    Str,
    /// `<`-delimited hex string; content is the raw text between `<` `>`.
    HexStr,
    /// `/name`; content is the name without the slash.
    LiteralName,
    /// A bare word that is not a reserved word.
    Name,
    /// A bare word found in the reserved-word table.
    Keyword(Keyword),
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    /// `%` comment; inert.
    Comment,
    /// `%!` page tag; inert.
    PageTag,
    /// End of input, produced forever after exhaustion.
    Eof,
}

impl TokenKind {
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Comments and page tags are skipped by the interpreter.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        matches!(self, Self::Comment | Self::PageTag)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_is_case_sensitive() {
        assert_eq!(Keyword::lookup("moveto"), Some(Keyword::MoveTo));
        assert_eq!(Keyword::lookup("Moveto"), None);
        assert_eq!(Keyword::lookup("frobnicate"), None);
    }

    #[test]
    fn keyword_names_round_trip() {
        for &(name, kw) in Keyword::ALL {
            assert_eq!(kw.name(), name);
            assert_eq!(Keyword::lookup(name), Some(kw));
        }
    }

    #[test]
    fn token_kind_predicates() {
        assert!(TokenKind::Eof.is_eof());
        assert!(TokenKind::Comment.is_inert());
        assert!(TokenKind::PageTag.is_inert());
        assert!(!TokenKind::Integer(1).is_inert());
    }
}
