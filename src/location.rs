//! Source locations and ranges used to pin vulnerabilities and mutations to
//! positions in a contract's source text.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A position in source text. Lines are 1-based; columns, when known, are
/// 0-based (analyzers report 1-based columns, converted on ingestion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
  /// 1-based line number.
  pub line: u32,
  /// 0-based column number, if the analyzer that produced it reports one.
  pub column: Option<u32>,
}

impl Location {
  /// Creates a new location.
  pub fn new(line: u32, column: Option<u32>) -> Self {
    Self { line, column }
  }
}

impl PartialOrd for Location {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Location {
  fn cmp(&self, other: &Self) -> Ordering {
    self.line.cmp(&other.line).then_with(|| self.column.cmp(&other.column))
  }
}

/// A closed range `[start, end]` of source text, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRange {
  /// Start of the range, inclusive.
  pub start: Location,
  /// End of the range, inclusive.
  pub end: Location,
}

impl CodeRange {
  /// Creates a new code range. Panics if `start > end`, since a range that
  /// doesn't respect source order can't be reasoned about by anything
  /// downstream (fault localization, targeting, mutation bounds).
  pub fn new(start: Location, end: Location) -> Self {
    assert!(start <= end, "CodeRange start must not be after end");
    Self { start, end }
  }

  /// Whether this range overlaps `other`, treating both as closed intervals.
  /// Symmetric; a range always intersects itself; ranges that only touch at
  /// an endpoint still intersect.
  pub fn intersects(&self, other: &CodeRange) -> bool {
    self.start <= other.end && other.start <= self.end
  }
}

impl PartialOrd for CodeRange {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for CodeRange {
  fn cmp(&self, other: &Self) -> Ordering {
    self.start.cmp(&other.start).then_with(|| self.end.cmp(&other.end))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn loc(line: u32, col: Option<u32>) -> Location {
    Location::new(line, col)
  }

  fn range(sl: u32, sc: Option<u32>, el: u32, ec: Option<u32>) -> CodeRange {
    CodeRange::new(loc(sl, sc), loc(el, ec))
  }

  #[test]
  fn test_location_ordering() {
    assert!(loc(1, Some(0)) < loc(1, Some(1)));
    assert!(loc(1, None) < loc(1, Some(0)));
    assert!(loc(1, Some(5)) < loc(2, Some(0)));
  }

  #[test]
  fn test_intersects_symmetric() {
    let a = range(1, Some(0), 3, Some(0));
    let b = range(2, Some(0), 4, Some(0));
    assert_eq!(a.intersects(&b), b.intersects(&a));
    assert!(a.intersects(&b));
  }

  #[test]
  fn test_intersects_self() {
    let a = range(5, Some(2), 5, Some(9));
    assert!(a.intersects(&a));
  }

  #[test]
  fn test_intersects_touching_endpoint() {
    let a = range(1, Some(0), 2, Some(0));
    let b = range(2, Some(0), 3, Some(0));
    assert!(a.intersects(&b));
  }

  #[test]
  fn test_not_intersecting() {
    let a = range(1, Some(0), 1, Some(5));
    let b = range(2, Some(0), 2, Some(5));
    assert!(!a.intersects(&b));
  }

  #[test]
  #[should_panic(expected = "start must not be after end")]
  fn test_invalid_range_panics() {
    range(5, None, 1, None);
  }
}
