//! Lexicographic rank keys for ordering tasks inside a column.
//!
//! A rank is a plain string compared by code point. [`key_between`] produces
//! a key strictly between two neighbours so a drop only ever rewrites the
//! rank of the task that moved. Generated keys use the base-62 alphabet
//! `0-9A-Za-z`; keys coming from the server may contain anything.

use thiserror::Error;

/// Digits in ascending code-point order.
const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const MIN_DIGIT: char = '0';
const MID_DIGIT: char = 'V';

/// Key handed out for the first task of an empty column.
pub const DEFAULT_KEY: &str = "V";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("invalid rank range: lower {lower:?} must sort strictly before upper {upper:?}")]
    InvalidRange { lower: String, upper: String },
}

/// Produce a key that sorts strictly after `lower` and strictly before
/// `upper`. A missing bound is open on that side.
///
/// Never returns a key ending in `'0'`, so there is always room to insert
/// before any key this function produced.
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> Result<String, RankError> {
    let lo = lower.unwrap_or("");
    let invalid = || RankError::InvalidRange {
        lower: lo.to_string(),
        upper: upper.unwrap_or("").to_string(),
    };

    if let Some(hi) = upper
        && lo >= hi
    {
        return Err(invalid());
    }

    let lower: Vec<char> = lo.chars().collect();
    let upper: Option<Vec<char>> = upper.map(|hi| hi.chars().collect());
    midpoint(&lower, upper.as_deref()).ok_or_else(invalid)
}

/// Walks both bounds in lock step. Requires `lower < upper`.
fn midpoint(mut lower: &[char], mut upper: Option<&[char]>) -> Option<String> {
    let mut key = String::new();

    loop {
        let lo = lower.first().copied();
        let hi = match upper {
            Some(u) => Some(*u.first()?),
            None => None,
        };

        if let (Some(l), Some(h)) = (lo, hi)
            && l == h
        {
            key.push(l);
            lower = &lower[1..];
            upper = upper.map(|u| &u[1..]);
            continue;
        }

        let candidates: Vec<char> = DIGITS
            .iter()
            .map(|&d| d as char)
            .filter(|&d| lo.is_none_or(|l| d > l) && hi.is_none_or(|h| d < h))
            .collect();

        if !candidates.is_empty() {
            let digit = candidates[candidates.len() / 2];
            key.push(digit);
            if digit == MIN_DIGIT {
                key.push(MID_DIGIT);
            }
            return Some(key);
        }

        match (lo, hi) {
            // Already below `upper` at this position; only `lower` still binds.
            (Some(l), _) => {
                key.push(l);
                lower = &lower[1..];
                upper = None;
            }
            (None, Some(h)) => {
                let rest = &upper?[1..];
                if rest.is_empty() {
                    // `upper` ends in a character at or below '0'.
                    let pred = (0..h as u32).rev().find_map(char::from_u32)?;
                    key.push(pred);
                    return Some(key);
                }
                key.push(h);
                lower = &[];
                upper = Some(rest);
            }
            // Both sides open always has candidates.
            (None, None) => return None,
        }
    }
}
