//! Token definitions for the specification notation, using logos

use crate::common::Span;
use logos::Logos;
use std::fmt;

/// A token with its kind and source location
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Token kinds
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r"--[^\n]*")]
pub enum TokenKind {
    // Keywords - module structure
    #[token("DEFINITIONS")]
    Definitions,
    #[token("BEGIN")]
    Begin,
    #[token("END")]
    End,
    #[token("IMPORTS")]
    Imports,
    #[token("EXPORTS")]
    Exports,
    #[token("FROM")]
    From,
    #[token("ALL")]
    All,

    // Keywords - tagging
    #[token("AUTOMATIC")]
    Automatic,
    #[token("EXPLICIT")]
    Explicit,
    #[token("IMPLICIT")]
    Implicit,
    #[token("TAGS")]
    Tags,
    #[token("UNIVERSAL")]
    Universal,
    #[token("APPLICATION")]
    Application,
    #[token("PRIVATE")]
    Private,

    // Keywords - types
    #[token("BOOLEAN")]
    Boolean,
    #[token("INTEGER")]
    Integer,
    #[token("ENUMERATED")]
    Enumerated,
    #[token("REAL")]
    Real,
    #[token("BIT")]
    Bit,
    #[token("OCTET")]
    Octet,
    #[token("STRING")]
    StringKw,
    #[token("NULL")]
    Null,
    #[token("SEQUENCE")]
    Sequence,
    #[token("SET")]
    Set,
    #[token("CHOICE")]
    Choice,
    #[token("OF")]
    Of,
    #[token("OBJECT")]
    Object,
    #[token("IDENTIFIER")]
    IdentifierKw,
    #[token("RELATIVE-OID")]
    RelativeOid,
    #[token("EXTERNAL")]
    External,
    #[token("EMBEDDED")]
    Embedded,
    #[token("PDV")]
    Pdv,
    #[token("ANY")]
    Any,
    #[token("DEFINED")]
    Defined,
    #[token("BY")]
    By,
    #[token("INSTANCE")]
    Instance,

    // Keywords - character string families
    #[token("UTF8String")]
    Utf8String,
    #[token("IA5String")]
    Ia5String,
    #[token("NumericString")]
    NumericString,
    #[token("PrintableString")]
    PrintableString,
    #[token("VisibleString")]
    VisibleString,
    #[token("BMPString")]
    BmpString,
    #[token("UniversalString")]
    UniversalString,
    #[token("GeneralString")]
    GeneralString,
    #[token("GraphicString")]
    GraphicString,
    #[token("TeletexString")]
    TeletexString,
    #[token("VideotexString")]
    VideotexString,

    // Keywords - components and constraints
    #[token("COMPONENTS")]
    Components,
    #[token("OPTIONAL")]
    Optional,
    #[token("DEFAULT")]
    Default,
    #[token("SIZE")]
    Size,
    #[token("CONTAINING")]
    Containing,
    #[token("INTERSECTION")]
    Intersection,
    #[token("UNION")]
    Union,
    #[token("MIN")]
    Min,
    #[token("MAX")]
    Max,
    #[token("TRUE")]
    True,
    #[token("FALSE")]
    False,

    // Keywords - information object classes
    #[token("CLASS")]
    Class,
    #[token("UNIQUE")]
    Unique,
    #[token("WITH")]
    With,
    #[token("SYNTAX")]
    Syntax,

    // Identifiers and literals
    #[regex("[A-Z][A-Za-z0-9]*(-[A-Za-z0-9]+)*", |lex| lex.slice().to_string())]
    UpperIdent(String),
    #[regex("[a-z][A-Za-z0-9]*(-[A-Za-z0-9]+)*", |lex| lex.slice().to_string())]
    LowerIdent(String),
    #[regex("&[A-Za-z][A-Za-z0-9-]*", |lex| lex.slice()[1..].to_string())]
    FieldRef(String),
    #[regex("[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Number(i64),
    #[regex("\"[^\"]*\"", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    CString(String),
    #[regex("'[01]*'B", |lex| lex.slice().to_string())]
    BString(String),
    #[regex("'[0-9A-Fa-f]*'H", |lex| lex.slice().to_string())]
    HString(String),

    // Punctuation
    #[token("::=")]
    Assign,
    #[token("...")]
    Ellipsis,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<")]
    Less,
    #[token("-")]
    Minus,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::UpperIdent(name) | TokenKind::LowerIdent(name) => {
                write!(f, "'{}'", name)
            }
            TokenKind::FieldRef(name) => write!(f, "'&{}'", name),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}
