//! Block-range parser: `"start-end"`, both integers ≥ 0, `start ≤ end`,
//! span ≤ 100,000 blocks.
//!
//! New pure logic; follows the general "parse, validate, return typed
//! `Result`" idiom used throughout `config/loader.rs`.

use thiserror::Error;

pub const MAX_SPAN: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn span(&self) -> u64 {
        self.end - self.start
    }

    pub fn count(&self) -> u64 {
        self.span() + 1
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockRangeError {
    #[error("block range must be formatted as \"start-end\": {0}")]
    Malformed(String),
    #[error("start and end must be valid non-negative integers: {0}")]
    NotAnInteger(String),
    #[error("start must be ≤ end")]
    StartAfterEnd,
    #[error("span {span} exceeds the maximum of {max}")]
    SpanTooLarge { span: u64, max: u64 },
}

/// Parses `"start-end"` into a validated [`BlockRange`].
pub fn parse_block_range(input: &str) -> Result<BlockRange, BlockRangeError> {
    let (start_str, end_str) = input
        .split_once('-')
        .ok_or_else(|| BlockRangeError::Malformed(input.to_string()))?;

    let start: u64 = start_str
        .parse()
        .map_err(|_| BlockRangeError::NotAnInteger(start_str.to_string()))?;
    let end: u64 = end_str
        .parse()
        .map_err(|_| BlockRangeError::NotAnInteger(end_str.to_string()))?;

    if start > end {
        return Err(BlockRangeError::StartAfterEnd);
    }

    let span = end - start;
    if span > MAX_SPAN {
        return Err(BlockRangeError::SpanTooLarge { span, max: MAX_SPAN });
    }

    Ok(BlockRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_range() {
        let range = parse_block_range("38393176-38395221").unwrap();
        assert_eq!(range.start, 38_393_176);
        assert_eq!(range.end, 38_395_221);
        assert_eq!(range.span(), 2_045);
        assert_eq!(range.count(), 2_046);
    }

    #[test]
    fn rejects_start_after_end() {
        let err = parse_block_range("100-99").unwrap_err();
        assert_eq!(err, BlockRangeError::StartAfterEnd);
    }

    #[test]
    fn rejects_non_integer_input() {
        let err = parse_block_range("abc-def").unwrap_err();
        assert!(matches!(err, BlockRangeError::NotAnInteger(_)));
    }

    #[test]
    fn rejects_span_over_max() {
        let err = parse_block_range("0-200000").unwrap_err();
        assert_eq!(
            err,
            BlockRangeError::SpanTooLarge {
                span: 200_000,
                max: MAX_SPAN
            }
        );
    }

    #[test]
    fn accepts_span_at_max() {
        assert!(parse_block_range("0-100000").is_ok());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_block_range("notarange"), Err(BlockRangeError::Malformed(_))));
    }
}
