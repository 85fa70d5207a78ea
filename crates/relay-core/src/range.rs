//! The Range overlay: a connection's paginated, filterable edge list.
//!
//! Edges are partitioned into segments by the canonical serialization of
//! the connection's core calls, so `friends(orderby: "name")` and
//! `friends(orderby: "recent")` paginate independently. Each segment keeps
//! its edges in display order together with page info.
//!
//! Optimistic operations never touch a `Range`. They live on the queued
//! tier's connection record as [`QueuedRangeOperation`]s and are merged into
//! a copy of the confirmed edge list by [`Range::retrieve_range_info`] on
//! every read.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::call::{filter_calls, is_connection_call, serialize_calls, Call};
use crate::error::CoreError;
use crate::id::{ClientMutationId, DataId};
use crate::interface::connection;

/// How an edge is inserted into or removed from a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeOperation {
    Append,
    Prepend,
    Remove,
}

impl fmt::Display for RangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeOperation::Append => write!(f, "append"),
            RangeOperation::Prepend => write!(f, "prepend"),
            RangeOperation::Remove => write!(f, "remove"),
        }
    }
}

impl FromStr for RangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(RangeOperation::Append),
            "prepend" => Ok(RangeOperation::Prepend),
            "remove" => Ok(RangeOperation::Remove),
            other => Err(format!("unknown range operation `{}`", other)),
        }
    }
}

/// An optimistic range operation waiting on its mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRangeOperation {
    pub client_mutation_id: ClientMutationId,
    pub edge_id: DataId,
    pub operation: RangeOperation,
}

/// Pagination state of one segment or one requested window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_previous_page: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

/// One edge of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeEdge {
    pub edge_id: DataId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub force_index: i64,
}

impl RangeEdge {
    pub fn new(edge_id: impl Into<DataId>, cursor: Option<String>, force_index: i64) -> Self {
        RangeEdge {
            edge_id: edge_id.into(),
            cursor,
            force_index,
        }
    }
}

/// The edges and page info for one core-call signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSegment {
    pub edges: Vec<RangeEdge>,
    pub page_info: PageInfo,
}

impl RangeSegment {
    fn position_of_cursor(&self, cursor: &str) -> Option<usize> {
        position_of_cursor(&self.edges, cursor)
    }

    fn refresh_cursors(&mut self) {
        self.page_info.start_cursor = self.edges.first().and_then(|e| e.cursor.clone());
        self.page_info.end_cursor = self.edges.last().and_then(|e| e.cursor.clone());
    }
}

fn position_of_cursor(edges: &[RangeEdge], cursor: &str) -> Option<usize> {
    edges.iter().position(|e| e.cursor.as_deref() == Some(cursor))
}

/// What a read of a window of the range produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeInfo {
    /// Edge ids in the requested window, with queued operations applied.
    pub requested_edge_ids: Vec<DataId>,
    /// Pagination calls still needed from the server to fill the window.
    pub diff_calls: Vec<Call>,
    pub page_info: PageInfo,
}

/// The pagination part of a set of calls.
#[derive(Debug, Default)]
struct Window {
    first: Option<usize>,
    last: Option<usize>,
    after: Option<String>,
    before: Option<String>,
}

impl Window {
    fn parse(calls: &[Call]) -> Result<Self, CoreError> {
        let mut window = Window::default();
        for call in calls {
            match call.name.as_str() {
                connection::FIRST => window.first = Some(count(call)?),
                connection::LAST => window.last = Some(count(call)?),
                connection::AFTER => window.after = cursor(call)?,
                connection::BEFORE => window.before = cursor(call)?,
                _ => {}
            }
        }
        Ok(window)
    }
}

fn count(call: &Call) -> Result<usize, CoreError> {
    call.as_count().ok_or_else(|| CoreError::InvalidRangeCall {
        call: call.name.clone(),
        reason: format!("expected a non-negative count, got {}", call.value),
    })
}

fn cursor(call: &Call) -> Result<Option<String>, CoreError> {
    match &call.value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(CoreError::InvalidRangeCall {
            call: call.name.clone(),
            reason: format!("expected a cursor string, got {}", other),
        }),
    }
}

/// A connection's confirmed edges, partitioned by core-call signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    segments: IndexMap<String, RangeSegment>,
}

impl Range {
    pub fn new() -> Self {
        Range::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.values().all(|s| s.edges.is_empty())
    }

    /// The segment that `calls` reads from, if any page was ever added.
    pub fn segment(&self, calls: &[Call]) -> Option<&RangeSegment> {
        self.segments.get(&segment_key(calls))
    }

    pub fn segments(&self) -> impl Iterator<Item = (&str, &RangeSegment)> {
        self.segments.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every edge id in any segment, first occurrence order.
    pub fn edge_ids(&self) -> Vec<DataId> {
        let mut ids: Vec<DataId> = Vec::new();
        for segment in self.segments.values() {
            for edge in &segment.edges {
                if !ids.contains(&edge.edge_id) {
                    ids.push(edge.edge_id.clone());
                }
            }
        }
        ids
    }

    pub fn contains_edge(&self, edge_id: &DataId) -> bool {
        self.segments
            .values()
            .any(|s| s.edges.iter().any(|e| &e.edge_id == edge_id))
    }

    /// Merges a fetched page into the segment selected by `calls`.
    ///
    /// `after`/`before` pages are spliced next to the edge carrying that
    /// cursor. A `first` page without `after` becomes the head of the
    /// segment and a `last` page without `before` its tail. A page that
    /// reports no further edges in its direction truncates stale edges
    /// beyond it. Without pagination calls the segment is replaced.
    pub fn add_items(
        &mut self,
        calls: &[Call],
        edges: Vec<RangeEdge>,
        page_info: PageInfo,
    ) -> Result<(), CoreError> {
        let window = Window::parse(calls)?;
        let segment = self.segments.entry(segment_key(calls)).or_default();
        let was_empty = segment.edges.is_empty();
        segment
            .edges
            .retain(|existing| !edges.iter().any(|e| e.edge_id == existing.edge_id));

        if let Some(after) = &window.after {
            let index = match segment.position_of_cursor(after) {
                Some(index) => index + 1,
                None => {
                    warn!(cursor = %after, "`after` cursor not found in range; appending page");
                    segment.edges.len()
                }
            };
            let tail = segment.edges.split_off(index);
            segment.edges.extend(edges);
            if page_info.has_next_page {
                segment.edges.extend(tail);
            }
            segment.page_info.has_next_page = page_info.has_next_page;
        } else if let Some(before) = &window.before {
            let index = match segment.position_of_cursor(before) {
                Some(index) => index,
                None => {
                    warn!(cursor = %before, "`before` cursor not found in range; prepending page");
                    0
                }
            };
            let tail = segment.edges.split_off(index);
            let head = std::mem::replace(&mut segment.edges, edges);
            if page_info.has_previous_page {
                let page = std::mem::replace(&mut segment.edges, head);
                segment.edges.extend(page);
            }
            segment.edges.extend(tail);
            segment.page_info.has_previous_page = page_info.has_previous_page;
        } else if window.first.is_some() {
            let rest = std::mem::replace(&mut segment.edges, edges);
            if page_info.has_next_page && !was_empty {
                segment.edges.extend(rest);
            } else {
                segment.page_info.has_next_page = page_info.has_next_page;
            }
            segment.page_info.has_previous_page = false;
        } else if window.last.is_some() {
            if page_info.has_previous_page && !was_empty {
                segment.edges.extend(edges);
            } else {
                segment.edges = edges;
                segment.page_info.has_previous_page = page_info.has_previous_page;
            }
            segment.page_info.has_next_page = false;
        } else {
            segment.edges = edges;
            segment.page_info.has_next_page = page_info.has_next_page;
            segment.page_info.has_previous_page = page_info.has_previous_page;
        }
        segment.refresh_cursors();
        Ok(())
    }

    /// Inserts an edge at the head of every segment, behind any edge with a
    /// higher force index.
    pub fn prepend_edge(&mut self, edge: RangeEdge) {
        self.insert_everywhere(edge, true);
    }

    /// Inserts an edge at the tail of every segment, ahead of any edge with
    /// a higher force index.
    pub fn append_edge(&mut self, edge: RangeEdge) {
        self.insert_everywhere(edge, false);
    }

    fn insert_everywhere(&mut self, edge: RangeEdge, prepend: bool) {
        if self.segments.is_empty() {
            self.segments.insert(String::new(), RangeSegment::default());
        }
        for segment in self.segments.values_mut() {
            segment.edges.retain(|e| e.edge_id != edge.edge_id);
            let force = edge.force_index;
            let index = if prepend {
                segment
                    .edges
                    .iter()
                    .position(|e| e.force_index <= force)
                    .unwrap_or(segment.edges.len())
            } else {
                segment
                    .edges
                    .iter()
                    .rposition(|e| e.force_index <= force)
                    .map_or(0, |i| i + 1)
            };
            segment.edges.insert(index, edge.clone());
            segment.refresh_cursors();
        }
    }

    /// Removes an edge from every segment. Returns whether it was present.
    pub fn remove_edge_with_id(&mut self, edge_id: &DataId) -> bool {
        let mut removed = false;
        for segment in self.segments.values_mut() {
            let before = segment.edges.len();
            segment.edges.retain(|e| &e.edge_id != edge_id);
            if segment.edges.len() != before {
                removed = true;
                segment.refresh_cursors();
            }
        }
        removed
    }

    /// Reads the window described by `calls`, merging `queued` operations
    /// into the confirmed edges first.
    pub fn retrieve_range_info(
        &self,
        calls: &[Call],
        queued: &[QueuedRangeOperation],
    ) -> Result<RangeInfo, CoreError> {
        let window = Window::parse(calls)?;
        let segment = self.segments.get(&segment_key(calls));
        let (edges, stored) = match segment {
            Some(segment) => (segment.edges.clone(), segment.page_info.clone()),
            None => (Vec::new(), PageInfo::default()),
        };
        let merged = merge_queued_operations(edges, queued);
        let mut info = read_window(&merged, &window, &stored);
        if segment.is_none() {
            info.diff_calls = calls.iter().filter(|c| is_connection_call(c)).cloned().collect();
        }
        Ok(info)
    }
}

fn segment_key(calls: &[Call]) -> String {
    serialize_calls(&filter_calls(calls))
}

/// Applies queued operations in submission order: prepends go to the front,
/// appends to the back, removals filter the edge out.
pub fn merge_queued_operations(
    mut edges: Vec<RangeEdge>,
    queued: &[QueuedRangeOperation],
) -> Vec<RangeEdge> {
    for op in queued {
        edges.retain(|e| e.edge_id != op.edge_id);
        match op.operation {
            RangeOperation::Prepend => edges.insert(0, RangeEdge::new(op.edge_id.clone(), None, 0)),
            RangeOperation::Append => edges.push(RangeEdge::new(op.edge_id.clone(), None, 0)),
            RangeOperation::Remove => {}
        }
    }
    edges
}

fn read_window(edges: &[RangeEdge], window: &Window, stored: &PageInfo) -> RangeInfo {
    let len = edges.len();
    let (start, end, diff_calls, has_next_page, has_previous_page) = if let Some(first) = window.first {
        let start = match &window.after {
            Some(after) => match position_of_cursor(edges, after) {
                Some(index) => index + 1,
                None => return unresolved(window),
            },
            None => 0,
        };
        let end = start.saturating_add(first).min(len);
        let got = end - start;
        let mut diff = Vec::new();
        if got < first && stored.has_next_page {
            diff.push(Call::new(connection::FIRST, first - got));
            let cursor = edges[..end]
                .iter()
                .rev()
                .find_map(|e| e.cursor.clone())
                .or_else(|| window.after.clone());
            if let Some(cursor) = cursor {
                diff.push(Call::new(connection::AFTER, cursor));
            }
        }
        (start, end, diff, end < len || stored.has_next_page, start > 0)
    } else if let Some(last) = window.last {
        let end = match &window.before {
            Some(before) => match position_of_cursor(edges, before) {
                Some(index) => index,
                None => return unresolved(window),
            },
            None => len,
        };
        let start = end.saturating_sub(last);
        let got = end - start;
        let mut diff = Vec::new();
        if got < last && stored.has_previous_page {
            diff.push(Call::new(connection::LAST, last - got));
            let cursor = edges[start..]
                .iter()
                .find_map(|e| e.cursor.clone())
                .or_else(|| window.before.clone());
            if let Some(cursor) = cursor {
                diff.push(Call::new(connection::BEFORE, cursor));
            }
        }
        (start, end, diff, end < len, start > 0 || stored.has_previous_page)
    } else {
        (0, len, Vec::new(), stored.has_next_page, stored.has_previous_page)
    };

    let slice = &edges[start..end];
    RangeInfo {
        requested_edge_ids: slice.iter().map(|e| e.edge_id.clone()).collect(),
        diff_calls,
        page_info: PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: slice.first().and_then(|e| e.cursor.clone()),
            end_cursor: slice.last().and_then(|e| e.cursor.clone()),
        },
    }
}

/// A window anchored at a cursor the range has never seen: nothing can be
/// served locally, so the whole request becomes the diff.
fn unresolved(window: &Window) -> RangeInfo {
    let mut diff_calls = Vec::new();
    if let Some(first) = window.first {
        diff_calls.push(Call::new(connection::FIRST, first));
    }
    if let Some(after) = &window.after {
        diff_calls.push(Call::new(connection::AFTER, after.clone()));
    }
    if let Some(last) = window.last {
        diff_calls.push(Call::new(connection::LAST, last));
    }
    if let Some(before) = &window.before {
        diff_calls.push(Call::new(connection::BEFORE, before.clone()));
    }
    RangeInfo {
        diff_calls,
        ..RangeInfo::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn edge(id: &str) -> RangeEdge {
        RangeEdge::new(id, Some(format!("cursor:{}", id)), 0)
    }

    fn page(has_next: bool) -> PageInfo {
        PageInfo {
            has_next_page: has_next,
            ..PageInfo::default()
        }
    }

    fn ids(info: &RangeInfo) -> Vec<&str> {
        info.requested_edge_ids.iter().map(|id| id.as_str()).collect()
    }

    fn first(n: usize) -> Vec<Call> {
        vec![Call::new("first", n)]
    }

    #[test]
    fn pages_merge_by_cursor() {
        let mut range = Range::new();
        range
            .add_items(&first(2), vec![edge("e1"), edge("e2")], page(true))
            .unwrap();
        range
            .add_items(
                &[Call::new("first", 2), Call::new("after", "cursor:e2")],
                vec![edge("e3"), edge("e4")],
                page(false),
            )
            .unwrap();

        let info = range.retrieve_range_info(&first(10), &[]).unwrap();
        assert_eq!(ids(&info), vec!["e1", "e2", "e3", "e4"]);
        assert!(info.diff_calls.is_empty());
        assert!(!info.page_info.has_next_page);
        assert_eq!(info.page_info.end_cursor.as_deref(), Some("cursor:e4"));
    }

    #[test]
    fn short_window_requests_the_difference() {
        let mut range = Range::new();
        range
            .add_items(&first(2), vec![edge("e1"), edge("e2")], page(true))
            .unwrap();

        let info = range.retrieve_range_info(&first(5), &[]).unwrap();
        assert_eq!(ids(&info), vec!["e1", "e2"]);
        assert_eq!(
            info.diff_calls,
            vec![Call::new("first", 3), Call::new("after", "cursor:e2")]
        );
    }

    #[test]
    fn unknown_segment_diffs_the_whole_request() {
        let range = Range::new();
        let calls = vec![Call::new("orderby", "name"), Call::new("first", 3)];
        let info = range.retrieve_range_info(&calls, &[]).unwrap();
        assert!(info.requested_edge_ids.is_empty());
        assert_eq!(info.diff_calls, vec![Call::new("first", 3)]);
    }

    #[test]
    fn segments_are_independent() {
        let mut range = Range::new();
        let by_name = vec![Call::new("orderby", "name"), Call::new("first", 1)];
        let by_date = vec![Call::new("orderby", "date"), Call::new("first", 1)];
        range.add_items(&by_name, vec![edge("a")], page(false)).unwrap();
        range.add_items(&by_date, vec![edge("b")], page(false)).unwrap();

        assert_eq!(ids(&range.retrieve_range_info(&by_name, &[]).unwrap()), vec!["a"]);
        assert_eq!(ids(&range.retrieve_range_info(&by_date, &[]).unwrap()), vec!["b"]);
    }

    #[test]
    fn removal_applies_to_every_segment() {
        let mut range = Range::new();
        range
            .add_items(&[Call::new("orderby", "name")], vec![edge("a"), edge("b")], page(false))
            .unwrap();
        range
            .add_items(&[Call::new("orderby", "date")], vec![edge("b"), edge("c")], page(false))
            .unwrap();

        assert!(range.remove_edge_with_id(&DataId::from("b")));
        assert!(!range.contains_edge(&DataId::from("b")));
        assert_eq!(range.edge_ids(), vec![DataId::from("a"), DataId::from("c")]);
        assert!(!range.remove_edge_with_id(&DataId::from("b")));
    }

    #[test]
    fn queued_operations_merge_on_read() {
        let mut range = Range::new();
        range
            .add_items(&[], vec![edge("e1"), edge("e2")], page(false))
            .unwrap();
        let queued = vec![
            QueuedRangeOperation {
                client_mutation_id: "m1".into(),
                edge_id: "e0".into(),
                operation: RangeOperation::Prepend,
            },
            QueuedRangeOperation {
                client_mutation_id: "m1".into(),
                edge_id: "e2".into(),
                operation: RangeOperation::Remove,
            },
            QueuedRangeOperation {
                client_mutation_id: "m2".into(),
                edge_id: "e3".into(),
                operation: RangeOperation::Append,
            },
        ];
        let info = range.retrieve_range_info(&[], &queued).unwrap();
        assert_eq!(ids(&info), vec!["e0", "e1", "e3"]);
        // The confirmed range is untouched.
        let info = range.retrieve_range_info(&[], &[]).unwrap();
        assert_eq!(ids(&info), vec!["e1", "e2"]);
    }

    #[test]
    fn equal_force_index_keeps_submission_order() {
        let mut range = Range::new();
        range.add_items(&[], vec![edge("e1")], page(false)).unwrap();
        range.prepend_edge(RangeEdge::new("p1", None, 0));
        range.prepend_edge(RangeEdge::new("p2", None, 0));
        range.append_edge(RangeEdge::new("a1", None, 0));
        range.append_edge(RangeEdge::new("a2", None, 0));

        let info = range.retrieve_range_info(&[], &[]).unwrap();
        assert_eq!(ids(&info), vec!["p2", "p1", "e1", "a1", "a2"]);
    }

    #[test]
    fn higher_force_index_keeps_its_position() {
        let mut range = Range::new();
        range.prepend_edge(RangeEdge::new("pinned", None, 5));
        range.prepend_edge(RangeEdge::new("late", None, 1));
        range.append_edge(RangeEdge::new("anchor", None, 9));
        range.append_edge(RangeEdge::new("tail", None, 1));

        let info = range.retrieve_range_info(&[], &[]).unwrap();
        assert_eq!(ids(&info), vec!["pinned", "late", "tail", "anchor"]);
    }

    #[test]
    fn prepend_without_segments_creates_default_segment() {
        let mut range = Range::new();
        range.prepend_edge(RangeEdge::new("x", None, 0));
        assert_eq!(range.segments().count(), 1);
        assert!(range.segment(&[]).is_some());
    }

    #[test]
    fn last_window_reads_from_the_tail() {
        let mut range = Range::new();
        range
            .add_items(
                &[Call::new("last", 2)],
                vec![edge("e3"), edge("e4")],
                PageInfo {
                    has_previous_page: true,
                    ..PageInfo::default()
                },
            )
            .unwrap();
        let info = range
            .retrieve_range_info(&[Call::new("last", 3)], &[])
            .unwrap();
        assert_eq!(ids(&info), vec!["e3", "e4"]);
        assert_eq!(
            info.diff_calls,
            vec![Call::new("last", 1), Call::new("before", "cursor:e3")]
        );
    }

    #[test]
    fn invalid_count_is_rejected() {
        let range = Range::new();
        let err = range
            .retrieve_range_info(&[Call::new("first", "many")], &[])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRangeCall { .. }));
    }

    #[test]
    fn range_serializes_as_plain_json() {
        let mut range = Range::new();
        range.add_items(&first(1), vec![edge("e1")], page(true)).unwrap();
        let json = serde_json::to_value(&range).unwrap();
        let back: Range = serde_json::from_value(json).unwrap();
        assert_eq!(back, range);
    }

    proptest! {
        #[test]
        fn removing_an_edge_preserves_the_rest(count in 1usize..12, victim in 0usize..12) {
            let victim = victim % count;
            let names: Vec<String> = (0..count).map(|i| format!("e{}", i)).collect();
            let mut range = Range::new();
            range
                .add_items(&[], names.iter().map(|n| edge(n)).collect(), page(false))
                .unwrap();

            prop_assert!(range.remove_edge_with_id(&DataId::from(names[victim].as_str())));

            let info = range.retrieve_range_info(&[], &[]).unwrap();
            let expected: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != victim)
                .map(|(_, n)| n.as_str())
                .collect();
            prop_assert_eq!(ids(&info), expected);
        }
    }
}
