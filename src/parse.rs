//! `Range` request header parsing.
//!
//! Only a single `bytes` range is ever honoured. Anything else, including
//! a malformed header, means "serve the whole resource". The one exception
//! is a `-N` suffix longer than the resource, which cannot be served.

use axum::http::HeaderValue;
use axum_extra::headers::{Header, Range};

use crate::ByteRange;

/// Outcome of parsing a `Range` header against a resource length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// No usable range: absent, malformed, not `bytes`, or not exactly one range.
    NoRange,
    /// One range was given but it falls outside the resource.
    Unsatisfiable,
    /// A `-N` suffix asked for more bytes than the resource holds. There is
    /// no valid start offset for it, so it cannot be served.
    SuffixTooLong { suffix: u64 },
    /// One range inside the resource.
    Range(ByteRange),
}

/// One `first-last` item of a byte range set, either side optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeItem {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl RangeItem {
    pub fn new(from: Option<u64>, to: Option<u64>) -> Self {
        RangeItem { from, to }
    }

    /// Turn this item into a window over a resource of `total_length` bytes.
    ///
    /// `N-` runs to the last byte, `-N` is the last `N` bytes. Both offsets
    /// must be below `total_length`; `start <= end` is not checked here.
    /// A suffix longer than the resource has no start offset at all and
    /// comes back as [`RangeDecision::SuffixTooLong`].
    pub fn resolve(&self, total_length: u64) -> RangeDecision {
        let Some(last) = total_length.checked_sub(1) else {
            return RangeDecision::Unsatisfiable;
        };

        let (start, end) = match (self.from, self.to) {
            (Some(from), to) => (from, to.unwrap_or(last)),
            (None, Some(suffix)) => match total_length.checked_sub(suffix) {
                Some(start) => (start, last),
                None => return RangeDecision::SuffixTooLong { suffix },
            },
            (None, None) => (0, last),
        };

        if start < total_length && end < total_length {
            RangeDecision::Range(ByteRange::new(start, end))
        } else {
            RangeDecision::Unsatisfiable
        }
    }
}

impl RangeDecision {
    /// Parse a raw `Range` header value for a resource of `total_length` bytes.
    pub fn parse(header: Option<&str>, total_length: u64) -> RangeDecision {
        let Some(header) = header else {
            return RangeDecision::NoRange;
        };

        match parse_range_items(header).as_deref() {
            Some([item]) => item.resolve(total_length),
            _ => RangeDecision::NoRange,
        }
    }

    /// Same as [`RangeDecision::parse`], for a raw header value.
    ///
    /// The value must decode as a typed [`Range`] header (text starting with
    /// `bytes=`). `Range` only exposes the items it can satisfy, silently
    /// dropping the rest, so the byte range set is still read here.
    pub fn from_header(header: Option<&HeaderValue>, total_length: u64) -> RangeDecision {
        let Some(value) = header else {
            return RangeDecision::NoRange;
        };
        if Range::decode(&mut std::iter::once(value)).is_err() {
            return RangeDecision::NoRange;
        }
        Self::parse(value.to_str().ok(), total_length)
    }
}

/// Split `bytes=a-b, c-d, -e` into items. `None` when the unit is not
/// `bytes` or any item is malformed.
pub fn parse_range_items(header: &str) -> Option<Vec<RangeItem>> {
    let set = header.trim().strip_prefix("bytes=")?;

    let mut items = Vec::new();
    for spec in set.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        items.push(parse_item(spec)?);
    }
    Some(items)
}

fn parse_item(spec: &str) -> Option<RangeItem> {
    let (from, to) = spec.split_once('-')?;
    let from = parse_position(from.trim())?;
    let to = parse_position(to.trim())?;

    match (from, to) {
        (None, None) => None,
        (Some(from), Some(to)) if from > to => None,
        _ => Some(RangeItem::new(from, to)),
    }
}

/// `Some(None)` for an empty position, `None` for anything but digits.
fn parse_position(text: &str) -> Option<Option<u64>> {
    if text.is_empty() {
        return Some(None);
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u64>().ok().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(header: &str, total_length: u64) -> RangeDecision {
        RangeDecision::parse(Some(header), total_length)
    }

    fn range(start: u64, end: u64) -> RangeDecision {
        RangeDecision::Range(ByteRange::new(start, end))
    }

    #[test]
    fn test_open_ended() {
        assert_eq!(range(0, 999), parse("bytes=0-", 1000));
        assert_eq!(range(200, 999), parse("bytes=200-", 1000));
    }

    #[test]
    fn test_suffix() {
        assert_eq!(range(900, 999), parse("bytes=-100", 1000));
        assert_eq!(range(0, 999), parse("bytes=-1000", 1000));
        assert_eq!(RangeDecision::SuffixTooLong { suffix: 1001 }, parse("bytes=-1001", 1000));
        assert_eq!(RangeDecision::SuffixTooLong { suffix: 2000 }, parse("bytes=-2000", 54));
    }

    #[test]
    fn test_valid_windows_unchanged() {
        for (start, end, length) in [(0, 0, 1), (0, 29, 54), (30, 53, 54), (53, 53, 54), (10, 10, 11)] {
            let header = format!("bytes={start}-{end}");
            assert_eq!(range(start, end), parse(&header, length), "{header} of {length}");
        }
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(range(5, 9), parse(" bytes=5 - 9 ", 10));
        assert_eq!(range(0, 9), parse("bytes= 0-9 ,", 10));
    }

    #[test]
    fn test_out_of_bounds() {
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=1000-", 1000));
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=0-1000", 1000));
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=5000-6000", 1000));
        // zero-length suffix starts at the length itself
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=-0", 1000));
    }

    #[test]
    fn test_empty_resource() {
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=0-", 0));
        assert_eq!(RangeDecision::Unsatisfiable, parse("bytes=-1", 0));
    }

    #[test]
    fn test_no_range() {
        assert_eq!(RangeDecision::NoRange, RangeDecision::parse(None, 1000));
        assert_eq!(RangeDecision::NoRange, parse("items=0-10", 1000));
        assert_eq!(RangeDecision::NoRange, parse("Bytes=0-10", 1000));
        assert_eq!(RangeDecision::NoRange, parse("bytes=0-0,-1", 1000));
        assert_eq!(RangeDecision::NoRange, parse("bytes=500-600,601-999", 1000));
        assert_eq!(RangeDecision::NoRange, parse("bytes=", 1000));
        assert_eq!(RangeDecision::NoRange, parse("bytes= , ", 1000));
    }

    #[test]
    fn test_malformed_is_no_range() {
        for header in ["bytes", "bytes =0-10", "bytes=-", "bytes=abc", "bytes=1-2-3", "bytes=+1-2", "bytes=30-29", "0-10"] {
            assert_eq!(RangeDecision::NoRange, parse(header, 1000), "{header}");
        }
        // overflows u64
        assert_eq!(RangeDecision::NoRange, parse("bytes=99999999999999999999-", 1000));
    }

    #[test]
    fn test_empty_list_elements_are_skipped() {
        assert_eq!(range(0, 9), parse("bytes=0-9,", 1000));
    }

    #[test]
    fn test_resolve_keeps_inverted_window() {
        // the header grammar rejects this, resolve alone does not
        let decision = RangeItem::new(Some(30), Some(29)).resolve(54);
        assert_matches!(decision, RangeDecision::Range(ByteRange { start: 30, end: 29 }));
    }

    #[test]
    fn test_resolve_without_bounds_is_whole_resource() {
        assert_eq!(range(0, 53), RangeItem::new(None, None).resolve(54));
    }

    #[test]
    fn test_from_header() {
        let value = HeaderValue::from_static("bytes=-20");
        assert_eq!(range(34, 53), RangeDecision::from_header(Some(&value), 54));

        let opaque = HeaderValue::from_bytes(b"bytes=\xff-").unwrap();
        assert_eq!(RangeDecision::NoRange, RangeDecision::from_header(Some(&opaque), 54));

        for other in ["items=0-10", "bytes =0-10", "0-10"] {
            let value = HeaderValue::from_static(other);
            assert_eq!(RangeDecision::NoRange, RangeDecision::from_header(Some(&value), 54), "{other}");
        }
        assert_eq!(RangeDecision::NoRange, RangeDecision::from_header(None, 54));
    }

    #[test]
    fn test_parse_range_items() {
        let items = parse_range_items("bytes=0-0, -1, 5-").unwrap();
        assert_eq!(
            vec![
                RangeItem::new(Some(0), Some(0)),
                RangeItem::new(None, Some(1)),
                RangeItem::new(Some(5), None),
            ],
            items
        );
    }
}
