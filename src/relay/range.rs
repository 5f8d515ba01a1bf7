//! HTTP `Range` header parsing.
//!
//! Only the `bytes` unit is understood. Multi-range requests are honored by
//! their first range only; everything unparseable falls back to whole-object
//! mode rather than failing the request.

/// Result of evaluating a `Range` header against a (possibly unknown) size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No header, or one we could not parse: serve the whole object.
    Full,
    /// A single satisfiable byte range.
    Partial(ByteRange),
    /// Start lies beyond the last byte of a known-size object.
    Unsatisfiable { total: u64 },
}

/// A normalized byte interval. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// `None` when the total size is unknown and the client asked for an
    /// open-ended range; the stream then runs until the source closes.
    pub end: Option<u64>,
    pub total: Option<u64>,
}

impl ByteRange {
    /// Number of bytes covered, when both bounds are known.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    /// `Content-Range` value for a 206 response, when the end is known.
    pub fn content_range(&self) -> Option<String> {
        let end = self.end?;
        Some(match self.total {
            Some(total) => format!("bytes {}-{}/{}", self.start, end, total),
            None => format!("bytes {}-{}/*", self.start, end),
        })
    }

    /// Value to forward upstream as a `Range` request header.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Evaluate an optional `Range` header against the object size.
pub fn parse(header: Option<&str>, size: Option<u64>) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };

    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };

    // First range only; the rest of a multi-range request is ignored.
    let first = match spec.split(',').next() {
        Some(s) => s.trim(),
        None => return RangeOutcome::Full,
    };

    let Some((start_raw, end_raw)) = first.split_once('-') else {
        return RangeOutcome::Full;
    };

    if start_raw.is_empty() {
        return suffix_range(end_raw, size);
    }

    let Ok(start) = start_raw.parse::<u64>() else {
        return RangeOutcome::Full;
    };

    let end = if end_raw.is_empty() {
        None
    } else {
        match end_raw.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            // Inverted or garbage bounds: permissive fallback.
            _ => return RangeOutcome::Full,
        }
    };

    match size {
        Some(total) => {
            if start >= total {
                return RangeOutcome::Unsatisfiable { total };
            }
            let end = end.map_or(total - 1, |e| e.min(total - 1));
            RangeOutcome::Partial(ByteRange {
                start,
                end: Some(end),
                total: Some(total),
            })
        }
        // Size unknown: stream from the offset; length open unless the
        // client bounded it explicitly.
        None => RangeOutcome::Partial(ByteRange {
            start,
            end,
            total: None,
        }),
    }
}

/// `bytes=-N`: the final N bytes. Only meaningful against a known size.
fn suffix_range(suffix_raw: &str, size: Option<u64>) -> RangeOutcome {
    let (Ok(suffix), Some(total)) = (suffix_raw.parse::<u64>(), size) else {
        return RangeOutcome::Full;
    };
    if suffix == 0 || total == 0 {
        return RangeOutcome::Full;
    }
    let start = total.saturating_sub(suffix);
    RangeOutcome::Partial(ByteRange {
        start,
        end: Some(total - 1),
        total: Some(total),
    })
}
