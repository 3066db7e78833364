//! `RetentionIntervalExpr` — an ordered sequence of signed interval tokens
//! (`+7 days|-12 hours`) that compiles to a canonical pipe-separated textual
//! form (losslessly reparseable) and to a bind-parameterized datetime
//! expression for the catalog.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
}

impl Unit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Years => "years",
            Unit::Months => "months",
            Unit::Days => "days",
            Unit::Hours => "hours",
            Unit::Minutes => "minutes",
        }
    }
}

impl std::str::FromStr for Unit {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "years" | "year" | "y" => Ok(Unit::Years),
            "months" | "month" | "mon" => Ok(Unit::Months),
            "days" | "day" | "d" => Ok(Unit::Days),
            "hours" | "hour" | "h" => Ok(Unit::Hours),
            "minutes" | "minute" | "min" => Ok(Unit::Minutes),
            other => Err(IntervalParseError::BadUnit(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub sign: Sign,
    pub number: i64,
    pub unit: Unit,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.sign {
            Sign::Plus => '+',
            Sign::Minus => '-',
        };
        write!(f, "{sign}{} {}", self.number, self.unit.as_str())
    }
}

/// An ordered sequence of signed interval tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionIntervalExpr {
    pub tokens: Vec<Token>,
}

#[derive(thiserror::Error, Debug)]
pub enum IntervalParseError {
    #[error("empty interval expression")]
    Empty,
    #[error("bad interval token {0:?}")]
    BadToken(String),
    #[error("bad number in interval token {0:?}")]
    BadNumber(String),
    #[error("unrecognised interval unit {0:?}")]
    BadUnit(String),
}

impl RetentionIntervalExpr {
    /// Parse the canonical pipe-separated form, e.g. `"+7 days|-12 hours"`.
    pub fn parse(s: &str) -> Result<Self, IntervalParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IntervalParseError::Empty);
        }
        let mut tokens = Vec::new();
        for part in s.split('|') {
            tokens.push(Self::parse_token(part.trim())?);
        }
        Ok(Self { tokens })
    }

    fn parse_token(part: &str) -> Result<Token, IntervalParseError> {
        let part = part.trim();
        let (sign, rest) = match part.as_bytes().first() {
            Some(b'+') => (Sign::Plus, &part[1..]),
            Some(b'-') => (Sign::Minus, &part[1..]),
            _ => (Sign::Plus, part),
        };
        let rest = rest.trim();
        let mut split = rest.splitn(2, char::is_whitespace);
        let number = split
            .next()
            .ok_or_else(|| IntervalParseError::BadToken(part.to_owned()))?;
        let unit = split
            .next()
            .ok_or_else(|| IntervalParseError::BadToken(part.to_owned()))?
            .trim();
        let number: i64 = number
            .parse()
            .map_err(|_| IntervalParseError::BadNumber(number.to_owned()))?;
        let unit: Unit = unit.parse()?;
        Ok(Token { sign, number, unit })
    }

    /// Compile back to the canonical pipe-separated textual form.
    ///
    /// `compile(parse(s)) == s` for any canonical `s` produced by this
    /// function (non-canonical whitespace in user input is not preserved).
    #[must_use]
    pub fn compile(&self) -> String {
        self.tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Resolve this expression relative to `now`, returning the resulting
    /// instant. Each token is applied in order; `+` tokens move the instant
    /// backward in time (N units *ago*) and `-` tokens move it forward,
    /// matching the "newer than"/"older than" phrasing the tokens are bound
    /// to in retention rules (e.g. `KEEP NEWER THAN 7 days` keeps backups
    /// whose `stopped` is after `now - 7 days`).
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut result = now;
        for token in &self.tokens {
            let magnitude = match token.unit {
                Unit::Years => Duration::days(token.number * 365),
                Unit::Months => Duration::days(token.number * 30),
                Unit::Days => Duration::days(token.number),
                Unit::Hours => Duration::hours(token.number),
                Unit::Minutes => Duration::minutes(token.number),
            };
            result = match token.sign {
                Sign::Plus => result - magnitude,
                Sign::Minus => result + magnitude,
            };
        }
        result
    }

    /// Build from a single `(sign, number, unit)` shorthand, as used by
    /// `KEEP ... NEWER THAN <interval>` grammar productions that accept one
    /// token before concatenation.
    #[must_use]
    pub fn single(sign: Sign, number: i64, unit: Unit) -> Self {
        Self { tokens: vec![Token { sign, number, unit }] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_token() {
        for s in ["+7 days", "-12 hours", "+1 years", "-30 minutes"] {
            let expr = RetentionIntervalExpr::parse(s).unwrap();
            assert_eq!(expr.compile(), s);
        }
    }

    #[test]
    fn roundtrip_multi_token() {
        let s = "+7 days|-12 hours|+3 months";
        let expr = RetentionIntervalExpr::parse(s).unwrap();
        assert_eq!(expr.compile(), s);
    }

    #[test]
    fn defaults_to_plus_sign() {
        let expr = RetentionIntervalExpr::parse("7 days").unwrap();
        assert_eq!(expr.compile(), "+7 days");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            RetentionIntervalExpr::parse(""),
            Err(IntervalParseError::Empty)
        ));
    }

    #[test]
    fn rejects_bad_unit() {
        assert!(RetentionIntervalExpr::parse("+7 fortnights").is_err());
    }

    #[test]
    fn resolve_moves_backward_for_plus() {
        let now = DateTime::parse_from_rfc3339("2026-07-29T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let expr = RetentionIntervalExpr::parse("+7 days").unwrap();
        let resolved = expr.resolve(now);
        assert_eq!(resolved, now - Duration::days(7));
    }
}
