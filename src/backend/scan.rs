//! Scan Engine
//!
//! Turns [`ScanOptions`] into a traversal over a backend [`Cursor`].
//!
//! ## Traversal Rules
//! 1. No filter, or a zero `limit`: return before a cursor is even opened.
//! 2. Range: keys starting with `prefix`, or the whole keyspace.
//! 3. Start:
//!    - ascending + offset: first key >= max(offset, prefix)
//!    - descending + offset: last key <= offset, clamped to the range end
//!    - otherwise: first key of the range (ascending) or last (descending)
//! 4. `include_offset == false` skips a record whose key equals the offset.
//! 5. Visit records in order until the cursor is exhausted, errors, leaves
//!    the range, `limit` records were delivered, or the filter returns
//!    `false`.
//!
//! The cursor is owned by [`run`] and dropped on every exit path.

use crate::error::Result;

/// Per-record callback. Receives owned copies of key and value; returning
/// `false` stops the scan.
pub type ScanFilter<'a> = Box<dyn FnMut(Vec<u8>, Vec<u8>) -> bool + 'a>;

/// Description of one traversal
#[derive(Default)]
pub struct ScanOptions<'a> {
    /// Only keys starting with this prefix participate
    pub prefix: Option<Vec<u8>>,

    /// Starting boundary key
    pub offset: Option<Vec<u8>>,

    /// Whether a record whose key equals `offset` is yielded
    pub include_offset: bool,

    /// Descending key order
    pub reverse: bool,

    /// Most records delivered to the filter. Backends may use it to bound
    /// how much they materialize.
    pub limit: Option<usize>,

    /// Record consumer; `None` makes the scan a no-op
    pub filter: Option<ScanFilter<'a>>,
}

impl<'a> ScanOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn offset(mut self, offset: impl Into<Vec<u8>>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn include_offset(mut self, include: bool) -> Self {
        self.include_offset = include;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(Vec<u8>, Vec<u8>) -> bool + 'a,
    {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl std::fmt::Debug for ScanOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOptions")
            .field("prefix", &self.prefix)
            .field("offset", &self.offset)
            .field("include_offset", &self.include_offset)
            .field("reverse", &self.reverse)
            .field("limit", &self.limit)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Low-level positioning primitives a backend provides over a snapshot.
///
/// A fresh cursor is unpositioned (`valid() == false`). `key`/`value` are
/// only meaningful while `valid()`.
pub trait Cursor {
    /// Position at the first key >= `key`
    fn seek(&mut self, key: &[u8]);

    /// Position at the last key <= `key`
    fn seek_for_prev(&mut self, key: &[u8]);

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    fn next(&mut self);

    fn prev(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    /// Deferred I/O error, if the cursor hit one
    fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// Execute one traversal. `open` is only called when a filter is present.
pub fn run<'c, F>(options: ScanOptions<'_>, open: F)
where
    F: FnOnce() -> Result<Box<dyn Cursor + 'c>>,
{
    let ScanOptions {
        prefix,
        offset,
        include_offset,
        reverse,
        limit,
        filter,
    } = options;

    let Some(mut filter) = filter else {
        return;
    };
    if limit == Some(0) {
        return;
    }

    let mut cursor = match open() {
        Ok(cursor) => cursor,
        Err(e) => {
            tracing::warn!(error = %e, "scan aborted: cursor unavailable");
            return;
        }
    };

    let range = KeyRange::new(prefix);
    position(cursor.as_mut(), &range, offset.as_deref(), reverse);

    if let Some(offset) = offset.as_deref() {
        if !include_offset && cursor.valid() && cursor.key() == offset {
            advance(cursor.as_mut(), reverse);
        }
    }

    let mut delivered = 0;
    loop {
        if let Err(e) = cursor.status() {
            tracing::warn!(error = %e, "scan stopped on cursor error");
            break;
        }
        if !cursor.valid() || !range.contains(cursor.key()) {
            break;
        }
        if !filter(cursor.key().to_vec(), cursor.value().to_vec()) {
            break;
        }
        delivered += 1;
        if limit.is_some_and(|limit| delivered >= limit) {
            break;
        }
        advance(cursor.as_mut(), reverse);
    }
}

fn advance(cursor: &mut dyn Cursor, reverse: bool) {
    if reverse {
        cursor.prev();
    } else {
        cursor.next();
    }
}

fn position(cursor: &mut dyn Cursor, range: &KeyRange, offset: Option<&[u8]>, reverse: bool) {
    match (offset, reverse) {
        (Some(offset), false) => match range.prefix() {
            Some(prefix) if offset < prefix => cursor.seek(prefix),
            _ => cursor.seek(offset),
        },
        (Some(offset), true) => match range.upper() {
            Some(upper) if offset >= upper => seek_before(cursor, upper),
            _ => cursor.seek_for_prev(offset),
        },
        (None, false) => match range.prefix() {
            Some(prefix) => cursor.seek(prefix),
            None => cursor.seek_to_first(),
        },
        (None, true) => match range.upper() {
            Some(upper) => seek_before(cursor, upper),
            None => cursor.seek_to_last(),
        },
    }
}

/// Position at the last key strictly below `bound`
fn seek_before(cursor: &mut dyn Cursor, bound: &[u8]) {
    cursor.seek_for_prev(bound);
    if cursor.valid() && cursor.key() == bound {
        cursor.prev();
    }
}

/// The keys sharing a prefix form the half-open range [prefix, upper)
struct KeyRange {
    prefix: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
}

impl KeyRange {
    fn new(prefix: Option<Vec<u8>>) -> Self {
        let upper = prefix.as_deref().and_then(prefix_successor);
        Self { prefix, upper }
    }

    fn prefix(&self) -> Option<&[u8]> {
        self.prefix.as_deref()
    }

    /// Exclusive upper bound; `None` when the range runs to the keyspace end
    fn upper(&self) -> Option<&[u8]> {
        self.upper.as_deref()
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.prefix.as_deref().map_or(true, |p| key.starts_with(p))
    }
}

/// Smallest key greater than every key starting with `prefix`
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

// =============================================================================
// Snapshot Cursor
// =============================================================================

/// Cursor over a sorted, materialized snapshot
///
/// Backends that cannot hold a live iterator across calls (the LSM engine
/// merges several sources) materialize the visible records once and hand
/// them to this cursor.
pub struct SnapshotCursor {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl SnapshotCursor {
    /// `entries` must be sorted by key with no duplicates
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries, pos: None }
    }

    fn at(&self, idx: usize) -> Option<usize> {
        (idx < self.entries.len()).then_some(idx)
    }
}

impl Cursor for SnapshotCursor {
    fn seek(&mut self, key: &[u8]) {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() < key);
        self.pos = self.at(idx);
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() <= key);
        self.pos = idx.checked_sub(1);
    }

    fn seek_to_first(&mut self) {
        self.pos = self.at(0);
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().checked_sub(1);
    }

    fn next(&mut self) {
        self.pos = self.pos.and_then(|p| self.at(p + 1));
    }

    fn prev(&mut self) {
        self.pos = self.pos.and_then(|p| p.checked_sub(1));
    }

    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn key(&self) -> &[u8] {
        self.pos.map(|p| self.entries[p].0.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.pos.map(|p| self.entries[p].1.as_slice()).unwrap_or(&[])
    }
}
