//! Result post-processing: distinct, ordering, offset and limit.
//!
//! The stages compose in a fixed order: duplicate rows are dropped first,
//! then rows are ordered (skipped when the chosen index already delivers the
//! requested order), then the offset is skipped and the limit applied. An
//! in-memory sort has to materialize every matching row, which is also the
//! only case where the result size is known up front.

use std::collections::HashSet;

use serde_json::Value;

use crate::ast::OrderSpec;
use crate::query::result::ResultRow;
use crate::query::rows::RowIterator;

/// Read statistics of a finished or running execution.
#[derive(Debug, Clone, Default)]
pub struct ReadCounts {
    /// Rows examined by the scan, matched or not.
    pub read: u64,
    /// Per-selector (name, rows scanned), declaration order.
    pub scans: Vec<(String, u64)>,
}

impl ReadCounts {
    fn merge(mut self, other: ReadCounts) -> ReadCounts {
        self.read = self.read.saturating_add(other.read);
        for (name, count) in other.scans {
            match self.scans.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => *existing = existing.saturating_add(count),
                None => self.scans.push((name, count)),
            }
        }
        self
    }
}

enum RowsInner<'a> {
    /// Materialized rows: explain output, measure output, or a sorted result.
    Prefetched(std::vec::IntoIter<ResultRow>, ReadCounts),
    Stream {
        iter: RowIterator<'a>,
        seen: Option<HashSet<String>>,
        distinct_counts: Vec<bool>,
        to_skip: u64,
        remaining: Option<u64>,
    },
    Union {
        left: Box<Rows<'a>>,
        right: Box<Rows<'a>>,
        seen: Option<HashSet<String>>,
    },
}

/// The rows of one query execution.
pub struct Rows<'a> {
    columns: Vec<String>,
    known_size: Option<u64>,
    inner: RowsInner<'a>,
}

impl<'a> Rows<'a> {
    pub(crate) fn prefetched(
        rows: Vec<ResultRow>,
        columns: Vec<String>,
        known_size: Option<u64>,
        counts: ReadCounts,
    ) -> Self {
        Self {
            columns,
            known_size,
            inner: RowsInner::Prefetched(rows.into_iter(), counts),
        }
    }

    pub(crate) fn union(left: Rows<'a>, right: Rows<'a>, union_all: bool) -> Self {
        let columns = left.columns.clone();
        Self {
            columns,
            known_size: None,
            inner: RowsInner::Union {
                left: Box::new(left),
                right: Box::new(right),
                seen: (!union_all).then(HashSet::new),
            },
        }
    }

    /// Result column names, in declaration order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// The number of rows this result will produce, when an in-memory sort
    /// already materialized them. None when the result streams.
    pub fn known_size(&self) -> Option<u64> {
        self.known_size
    }

    /// Read statistics so far. Exact once the rows are drained.
    pub fn counts(&self) -> ReadCounts {
        match &self.inner {
            RowsInner::Prefetched(_, counts) => counts.clone(),
            RowsInner::Stream { iter, .. } => ReadCounts {
                read: iter.read_count(),
                scans: iter.scan_counts(),
            },
            RowsInner::Union { left, right, .. } => left.counts().merge(right.counts()),
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = ResultRow;

    fn next(&mut self) -> Option<ResultRow> {
        match &mut self.inner {
            RowsInner::Prefetched(rows, _) => rows.next(),
            RowsInner::Stream {
                iter,
                seen,
                distinct_counts,
                to_skip,
                remaining,
            } => loop {
                if *remaining == Some(0) {
                    return None;
                }
                let row = iter.next()?;
                if let Some(seen) = seen {
                    if !seen.insert(row.distinct_key(distinct_counts)) {
                        continue;
                    }
                }
                if *to_skip > 0 {
                    *to_skip -= 1;
                    continue;
                }
                if let Some(remaining) = remaining {
                    *remaining -= 1;
                }
                return Some(row);
            },
            RowsInner::Union { left, right, seen } => loop {
                let row = match left.next() {
                    Some(row) => row,
                    None => right.next()?,
                };
                if let Some(seen) = seen {
                    if !seen.insert(row.dedupe_key()) {
                        continue;
                    }
                }
                return Some(row);
            },
        }
    }
}

/// The synthetic result of a measure-mode execution: one row with the total
/// read count, then one row per selector with its scan count.
pub(crate) fn measure_result<'a>(counts: &ReadCounts) -> Rows<'a> {
    let mut rows = vec![ResultRow::synthetic(vec![
        Value::String("query".to_string()),
        Value::from(counts.read),
    ])];
    for (name, scanned) in &counts.scans {
        rows.push(ResultRow::synthetic(vec![
            Value::String(name.clone()),
            Value::from(*scanned),
        ]));
    }
    let size = rows.len() as u64;
    Rows::prefetched(
        rows,
        vec!["selector".to_string(), "scanCount".to_string()],
        Some(size),
        counts.clone(),
    )
}

/// Applies distinct, ordering, offset and limit to already-merged rows, for
/// the union level where the input is a row stream instead of a scan. With
/// none of them set the stream passes through untouched; otherwise the rows
/// are materialized and the result size becomes known.
pub(crate) fn combined_result<'a>(
    merged: Rows<'a>,
    distinct: bool,
    distinct_counts: &[bool],
    orderings: &[OrderSpec],
    offset: i64,
    limit: i64,
) -> Rows<'a> {
    let to_skip = offset.max(0) as u64;
    let remaining = (limit != i64::MAX).then(|| limit.max(0) as u64);
    if !distinct && orderings.is_empty() && to_skip == 0 && remaining.is_none() {
        return merged;
    }

    let mut merged = merged;
    let mut seen = distinct.then(HashSet::new);
    let mut buffer: Vec<ResultRow> = Vec::new();
    for row in merged.by_ref() {
        if let Some(seen) = &mut seen {
            if !seen.insert(row.distinct_key(distinct_counts)) {
                continue;
            }
        }
        buffer.push(row);
    }
    let counts = merged.counts();
    let columns = merged.column_names().to_vec();
    if !orderings.is_empty() {
        buffer.sort_by(|a, b| a.compare_order(b, orderings));
    }

    let total = buffer.len() as u64;
    let capped = match remaining {
        Some(limit) => total.min(to_skip.saturating_add(limit)),
        None => total,
    };
    let size = capped.saturating_sub(to_skip);

    let rows: Vec<ResultRow> = buffer
        .into_iter()
        .skip(to_skip as usize)
        .take(size as usize)
        .collect();
    Rows::prefetched(rows, columns, Some(size), counts)
}

/// Assembles the post-processing pipeline over a row scan.
#[allow(clippy::too_many_arguments)]
pub(crate) fn pipeline<'a>(
    iter: RowIterator<'a>,
    distinct: bool,
    distinct_counts: Vec<bool>,
    orderings: &[OrderSpec],
    sorted_by_index: bool,
    offset: i64,
    limit: i64,
    columns: Vec<String>,
) -> Rows<'a> {
    let to_skip = offset.max(0) as u64;
    let remaining = (limit != i64::MAX).then(|| limit.max(0) as u64);

    if !orderings.is_empty() && !sorted_by_index {
        return sorted_pipeline(
            iter,
            distinct,
            &distinct_counts,
            orderings,
            to_skip,
            remaining,
            columns,
        );
    }
    Rows {
        columns,
        known_size: None,
        inner: RowsInner::Stream {
            iter,
            seen: distinct.then(HashSet::new),
            distinct_counts,
            to_skip,
            remaining,
        },
    }
}

fn sorted_pipeline<'a>(
    iter: RowIterator<'a>,
    distinct: bool,
    distinct_counts: &[bool],
    orderings: &[OrderSpec],
    to_skip: u64,
    remaining: Option<u64>,
    columns: Vec<String>,
) -> Rows<'a> {
    let mut iter = iter;
    let mut seen = distinct.then(HashSet::new);
    let mut buffer: Vec<ResultRow> = Vec::new();
    for row in iter.by_ref() {
        if let Some(seen) = &mut seen {
            if !seen.insert(row.distinct_key(distinct_counts)) {
                continue;
            }
        }
        buffer.push(row);
    }
    let counts = ReadCounts {
        read: iter.read_count(),
        scans: iter.scan_counts(),
    };
    buffer.sort_by(|a, b| a.compare_order(b, orderings));

    let total = buffer.len() as u64;
    let capped = match remaining {
        Some(limit) => total.min(to_skip.saturating_add(limit)),
        None => total,
    };
    let size = capped.saturating_sub(to_skip);

    let rows: Vec<ResultRow> = buffer
        .into_iter()
        .skip(to_skip as usize)
        .take(size as usize)
        .collect();
    Rows::prefetched(rows, columns, Some(size), counts)
}
