// src/version.rs

//! Version comparison and dependency operators
//!
//! Version grammar: `digit{.digit}...{letter}{_suffix{#}}...{~hash}{-r#}`.
//! Comparison walks both strings token by token. Numeric components compare
//! numerically unless either side has a leading zero, in which case they
//! compare as strings. Pre-release suffixes (`_alpha`, `_beta`, `_pre`, `_rc`)
//! sort below the bare version, the others (`_cvs`, `_svn`, `_git`, `_hg`, `_p`)
//! above it.

use std::cmp::Ordering;
use std::fmt;
use std::ops::BitOr;

/// Bit mask of comparison results a dependency accepts
///
/// The same type is used for the result of a comparison (exactly one of
/// `LESS`, `EQUAL`, `GREATER`, or all three when a side is missing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionOp(u8);

impl VersionOp {
    pub const UNKNOWN: Self = Self(0);
    pub const EQUAL: Self = Self(1);
    pub const LESS: Self = Self(2);
    pub const GREATER: Self = Self(4);
    pub const FUZZY: Self = Self(8);
    pub const CONFLICT: Self = Self(16);

    /// Matches any version
    pub const ANY: Self = Self(1 | 2 | 4);
    /// Pins an exact package build by checksum (`><`)
    pub const CHECKSUM: Self = Self(2 | 4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_conflict(self) -> bool {
        self.intersects(Self::CONFLICT)
    }

    /// The operator with the conflict flag stripped
    pub fn without_conflict(self) -> Self {
        Self(self.0 & !Self::CONFLICT.0)
    }

    /// Parse an operator such as `>=` or `~`
    pub fn parse(op: &str) -> Option<Self> {
        let mut mask = 0;
        for ch in op.chars() {
            mask |= match ch {
                '<' => Self::LESS.0,
                '>' => Self::GREATER.0,
                '=' => Self::EQUAL.0,
                '~' => Self::FUZZY.0 | Self::EQUAL.0,
                _ => return None,
            };
        }
        if mask == 0 { None } else { Some(Self(mask)) }
    }

    /// Textual form of the operator, ignoring the conflict flag
    pub fn as_str(self) -> &'static str {
        const EQ: u8 = VersionOp::EQUAL.0;
        const LT: u8 = VersionOp::LESS.0;
        const GT: u8 = VersionOp::GREATER.0;
        const FZ: u8 = VersionOp::FUZZY.0;
        match self.without_conflict().0 {
            LT => "<",
            x if x == LT | EQ => "<=",
            x if x == LT | EQ | FZ => "<~",
            x if x == EQ | FZ || x == FZ => "~",
            EQ => "=",
            x if x == GT | EQ => ">=",
            x if x == GT | EQ | FZ => ">~",
            GT => ">",
            x if x == LT | GT => "><",
            x if x == LT | GT | EQ => "",
            _ => "?",
        }
    }

    /// Convert a total ordering into a single-bit result mask
    pub fn from_ordering(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => Self::LESS,
            Ordering::Equal => Self::EQUAL,
            Ordering::Greater => Self::GREATER,
        }
    }
}

impl BitOr for VersionOp {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for VersionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Token {
    InitialDigit,
    Digit,
    Letter,
    Suffix,
    SuffixNo,
    CommitHash,
    RevisionNo,
    End,
    Invalid,
}

/// Suffix ranks; everything below `None` is a pre-release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Suffix {
    Invalid,
    Alpha,
    Beta,
    Pre,
    Rc,
    None,
    Cvs,
    Svn,
    Git,
    Hg,
    P,
}

impl Suffix {
    fn parse(s: &str) -> Self {
        match s {
            "alpha" => Suffix::Alpha,
            "beta" => Suffix::Beta,
            "pre" => Suffix::Pre,
            "rc" => Suffix::Rc,
            "cvs" => Suffix::Cvs,
            "svn" => Suffix::Svn,
            "git" => Suffix::Git,
            "hg" => Suffix::Hg,
            "p" => Suffix::P,
            _ => Suffix::Invalid,
        }
    }
}

struct Tokenizer<'a> {
    token: Token,
    suffix: Suffix,
    number: u64,
    value: &'a str,
    rest: &'a str,
}

fn span(s: &str, accept: impl Fn(u8) -> bool) -> usize {
    s.bytes().position(|b| !accept(b)).unwrap_or(s.len())
}

impl<'a> Tokenizer<'a> {
    fn new(version: &'a str) -> Self {
        let mut t = Self {
            token: Token::InitialDigit,
            suffix: Suffix::None,
            number: 0,
            value: "",
            rest: version,
        };
        t.parse_digits();
        t
    }

    fn parse_digits(&mut self) {
        let n = span(self.rest, |b| b.is_ascii_digit());
        self.value = &self.rest[..n];
        self.rest = &self.rest[n..];
        self.number = self.value.bytes().fold(0u64, |acc, b| {
            acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
        });
        if self.value.is_empty() {
            self.token = Token::Invalid;
        }
    }

    fn advance(&mut self, n: usize) {
        self.rest = &self.rest[n..];
    }

    fn next(&mut self) {
        let Some(&first) = self.rest.as_bytes().first() else {
            self.token = Token::End;
            return;
        };
        match first {
            b'a'..=b'z' => {
                if self.token > Token::Digit {
                    self.token = Token::Invalid;
                    return;
                }
                self.value = &self.rest[..1];
                self.token = Token::Letter;
                self.advance(1);
            }
            b'.' | b'0'..=b'9' => {
                if first == b'.' {
                    if self.token > Token::Digit {
                        self.token = Token::Invalid;
                        return;
                    }
                    self.advance(1);
                }
                self.token = match self.token {
                    Token::InitialDigit | Token::Digit => Token::Digit,
                    Token::Suffix => Token::SuffixNo,
                    _ => {
                        self.token = Token::Invalid;
                        return;
                    }
                };
                self.parse_digits();
            }
            b'_' => {
                if self.token > Token::SuffixNo {
                    self.token = Token::Invalid;
                    return;
                }
                self.advance(1);
                let n = span(self.rest, |b| b.is_ascii_lowercase());
                self.value = &self.rest[..n];
                self.advance(n);
                self.suffix = Suffix::parse(self.value);
                self.token = if self.suffix == Suffix::Invalid {
                    Token::Invalid
                } else {
                    Token::Suffix
                };
            }
            b'~' => {
                if self.token >= Token::CommitHash {
                    self.token = Token::Invalid;
                    return;
                }
                self.advance(1);
                let n = span(self.rest, |b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
                self.value = &self.rest[..n];
                self.advance(n);
                self.token = if n == 0 {
                    Token::Invalid
                } else {
                    Token::CommitHash
                };
            }
            b'-' => {
                if self.token >= Token::RevisionNo || !self.rest.starts_with("-r") {
                    self.token = Token::Invalid;
                    return;
                }
                self.advance(2);
                self.token = Token::RevisionNo;
                self.parse_digits();
            }
            _ => self.token = Token::Invalid,
        }
    }
}

fn token_cmp(a: &Tokenizer<'_>, b: &Tokenizer<'_>) -> Ordering {
    match a.token {
        Token::Digit if a.value.starts_with('0') || b.value.starts_with('0') => {
            a.value.as_bytes().cmp(b.value.as_bytes())
        }
        Token::Digit | Token::InitialDigit | Token::SuffixNo | Token::RevisionNo => {
            a.number.cmp(&b.number)
        }
        Token::Letter => a.value.as_bytes()[0].cmp(&b.value.as_bytes()[0]),
        Token::Suffix => a.suffix.cmp(&b.suffix),
        _ => a.value.as_bytes().cmp(b.value.as_bytes()),
    }
}

fn compare_tokens(a: &str, b: &str, fuzzy: bool) -> Ordering {
    let mut ta = Tokenizer::new(a);
    let mut tb = Tokenizer::new(b);

    while ta.token == tb.token && ta.token < Token::End {
        let r = token_cmp(&ta, &tb);
        if r != Ordering::Equal {
            return r;
        }
        ta.next();
        tb.next();
    }

    if ta.token == tb.token {
        return Ordering::Equal;
    }
    if tb.token == Token::End && fuzzy {
        return Ordering::Equal;
    }

    // Leading components are equal; the longer version wins unless what
    // follows is a pre-release suffix.
    if ta.token == Token::Suffix && ta.suffix < Suffix::None {
        return Ordering::Less;
    }
    if tb.token == Token::Suffix && tb.suffix < Suffix::None {
        return Ordering::Greater;
    }
    tb.token.cmp(&ta.token)
}

/// Compare two versions
///
/// This is a total order over all strings, including invalid ones.
pub fn compare(a: &str, b: &str) -> Ordering {
    compare_tokens(a, b, false)
}

/// Compare with optional missing sides and fuzzy prefix matching
///
/// When exactly one side is missing the result accepts every operator.
pub fn compare_fuzzy(a: Option<&str>, b: Option<&str>, fuzzy: bool) -> VersionOp {
    match (a, b) {
        (None, None) => VersionOp::EQUAL,
        (Some(a), Some(b)) => VersionOp::from_ordering(compare_tokens(a, b, fuzzy)),
        _ => VersionOp::ANY,
    }
}

/// Does version `a` satisfy `op b`?
pub fn matches(a: Option<&str>, op: VersionOp, b: Option<&str>) -> bool {
    let ok = op.contains(VersionOp::ANY)
        || compare_fuzzy(a, b, op.intersects(VersionOp::FUZZY)).intersects(op);
    ok != op.is_conflict()
}

/// Check that a version string follows the version grammar
pub fn validate(version: &str) -> bool {
    let mut t = Tokenizer::new(version);
    while t.token < Token::End {
        t.next();
    }
    t.token == Token::End
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_components() {
        assert_eq!(compare("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare("2.0", "1.99"), Ordering::Greater);
        assert_eq!(compare("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_leading_zero_compares_as_string() {
        assert_eq!(compare("1.01", "1.1"), Ordering::Less);
        assert_eq!(compare("1.001", "1.01"), Ordering::Less);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(compare("1.0_alpha1", "1.0"), Ordering::Less);
        assert_eq!(compare("1.0_rc1", "1.0_beta2"), Ordering::Greater);
        assert_eq!(compare("1.0_p1", "1.0"), Ordering::Greater);
        assert_eq!(compare("1.0_git20240101", "1.0_p1"), Ordering::Less);
    }

    #[test]
    fn test_letters_and_revisions() {
        assert_eq!(compare("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(compare("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(compare("1.0-r1", "1.0-r0"), Ordering::Greater);
        assert_eq!(compare("1.0-r1", "1.0"), Ordering::Greater);
        assert_eq!(compare("1.0~abc-r0", "1.0-r0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_is_antisymmetric_and_transitive() {
        let versions = [
            "0.9", "1.0", "1.0-r1", "1.0_rc1", "1.0_p2", "1.0a", "1.01", "1.1", "1.10",
            "2", "2.0_alpha", "junk", "1..2",
        ];
        for a in versions {
            for b in versions {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{} vs {}", a, b);
                for c in versions {
                    if compare(a, b) == Ordering::Less && compare(b, c) == Ordering::Less {
                        assert_eq!(compare(a, c), Ordering::Less, "{} < {} < {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate("1.2.3"));
        assert!(validate("1.2.3_rc1-r4"));
        assert!(validate("1.0a_p2~deadbeef-r0"));
        assert!(!validate(""));
        assert!(!validate("1.0-1"));
        assert!(!validate("1.0_bogus"));
        assert!(!validate("v1.0"));
    }

    #[test]
    fn test_operator_round_trip() {
        for op in ["<", "<=", "<~", "~", "=", ">=", ">~", ">"] {
            assert_eq!(VersionOp::parse(op).unwrap().as_str(), op);
        }
        assert!(VersionOp::parse("!").is_none());
        assert_eq!(VersionOp::CHECKSUM.as_str(), "><");
        assert_eq!(VersionOp::ANY.as_str(), "");
    }

    #[test]
    fn test_matches() {
        let ge = VersionOp::parse(">=").unwrap();
        assert!(matches(Some("1.2"), ge, Some("1.0")));
        assert!(!matches(Some("0.9"), ge, Some("1.0")));

        let fuzzy = VersionOp::parse("~").unwrap();
        assert!(matches(Some("1.2.5"), fuzzy, Some("1.2")));
        assert!(!matches(Some("1.3"), fuzzy, Some("1.2")));

        let conflict = ge | VersionOp::CONFLICT;
        assert!(matches(Some("0.9"), conflict, Some("1.0")));
        assert!(matches(Some("1.0"), VersionOp::ANY, None));
    }
}
