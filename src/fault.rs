//! Fault elements and localizations: the vocabulary analyzers use to point at
//! the parts of a contract a vulnerability came from, and that the mutation
//! engine is fed back as a search hint.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::location::CodeRange;

/// One element of a fault localization: either a concrete source range, or a
/// syntactic node-type specifier naming a contract/function/node kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultElement {
  /// A concrete source range, optionally weighted.
  Location { range: CodeRange, weight: Option<u32> },
  /// A node-type specifier, optionally scoped to a contract and/or function,
  /// optionally weighted. `function` is only meaningful when `contract` is
  /// set.
  NodeType {
    node_type: String,
    contract: Option<String>,
    function: Option<String>,
    weight: Option<u32>,
  },
}

impl FaultElement {
  /// Creates a code-range fault element.
  pub fn location(range: CodeRange, weight: Option<u32>) -> Self {
    Self::Location { range, weight }
  }

  /// Creates a node-type fault element. Panics if `function` is given
  /// without `contract`, mirroring the invariant in the data model.
  pub fn node_type(
    node_type: impl Into<String>,
    contract: Option<String>,
    function: Option<String>,
    weight: Option<u32>,
  ) -> Self {
    assert!(
      function.is_none() || contract.is_some(),
      "functionName requires contractName"
    );
    Self::NodeType { node_type: node_type.into(), contract, function, weight }
  }

  /// The code range carried by this element, if it is a `Location` variant.
  pub fn code_range(&self) -> Option<&CodeRange> {
    match self {
      Self::Location { range, .. } => Some(range),
      Self::NodeType { .. } => None,
    }
  }

  /// The tag used to order variants against each other when canonically
  /// sorting a `FaultLocalization` (`Location` sorts before `NodeType`,
  /// matching the upstream tool's type-name ordering).
  fn variant_tag(&self) -> u8 {
    match self {
      Self::Location { .. } => 0,
      Self::NodeType { .. } => 1,
    }
  }

  /// The specifier token for this element, per the wire format in the
  /// external interface spec.
  pub fn to_specifier(&self) -> String {
    match self {
      Self::Location { range, weight } => {
        let start_col =
          range.start.column.map(|c| format!(",{c}")).unwrap_or_default();
        let end_col =
          range.end.column.map(|c| format!(",{c}")).unwrap_or_default();
        let w = weight.map(|w| format!("(({w}))")).unwrap_or_default();
        format!(
          "LOC:{}{}-{}{}{}",
          range.start.line, start_col, range.end.line, end_col, w
        )
      }
      Self::NodeType { node_type, contract, function, weight } => {
        let w = weight.map(|w| format!("(({w}))")).unwrap_or_default();
        let body = match (contract, function) {
          (Some(c), Some(f)) => format!("{c}.{f}-{node_type}"),
          (Some(c), None) => format!("{c}-{node_type}"),
          (None, _) => node_type.clone(),
        };
        format!("TYPE:{body}{w}")
      }
    }
  }
}

impl FaultElement {
  /// Strips an optional trailing `((N))` weight suffix, returning the
  /// remaining body and the parsed weight, if any.
  fn split_weight(s: &str) -> (&str, Option<u32>) {
    if let Some(body) = s.strip_suffix(')').and_then(|s| s.strip_suffix(')')) {
      if let Some(open) = body.rfind("((") {
        if let Ok(w) = body[open + 2..].parse::<u32>() {
          return (&body[..open], Some(w));
        }
      }
    }
    (s, None)
  }

  /// Parses one specifier token (the form `to_specifier` produces) back
  /// into a `FaultElement`. Returns `None` on anything malformed rather
  /// than erroring, since a caller feeds this only `;`-split tokens of a
  /// string this crate itself produced.
  pub fn from_specifier(s: &str) -> Option<Self> {
    if let Some(rest) = s.strip_prefix("LOC:") {
      let (body, weight) = Self::split_weight(rest);
      let (start, end) = body.split_once('-')?;
      let parse_point = |p: &str| -> Option<(u32, Option<u32>)> {
        match p.split_once(',') {
          Some((l, c)) => Some((l.parse().ok()?, Some(c.parse().ok()?))),
          None => Some((p.parse().ok()?, None)),
        }
      };
      let (sl, sc) = parse_point(start)?;
      let (el, ec) = parse_point(end)?;
      let range = CodeRange::new(
        crate::location::Location::new(sl, sc),
        crate::location::Location::new(el, ec),
      );
      return Some(Self::Location { range, weight });
    }
    if let Some(rest) = s.strip_prefix("TYPE:") {
      let (body, weight) = Self::split_weight(rest);
      // `nodeType` never contains a `-` (the only node type ever emitted is
      // `Block`), so the *last* `-` is the contract/function separator.
      let (contract, function, node_type) = match body.rfind('-') {
        Some(idx) => {
          let prefix = &body[..idx];
          let node_type = &body[idx + 1..];
          match prefix.split_once('.') {
            Some((c, f)) => (Some(c.to_string()), Some(f.to_string()), node_type),
            None => (Some(prefix.to_string()), None, node_type),
          }
        }
        None => (None, None, body),
      };
      return Some(Self::NodeType {
        node_type: node_type.to_string(),
        contract,
        function,
        weight,
      });
    }
    None
  }
}

impl PartialOrd for FaultElement {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for FaultElement {
  /// Orders by `(variantTag, canonicalFields)`, i.e. by the specifier string
  /// once the variant tag matches, since that string already encodes every
  /// field that distinguishes two elements of the same variant.
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .variant_tag()
      .cmp(&other.variant_tag())
      .then_with(|| self.to_specifier().cmp(&other.to_specifier()))
  }
}

impl fmt::Display for FaultElement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_specifier())
  }
}

/// An unordered, deduplicated set of `FaultElement`s, rendered to the mutation
/// engine as a single `;`-joined specifier string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultLocalization {
  elements: BTreeSet<FaultElement>,
}

impl FaultLocalization {
  /// Builds a fault localization from an iterator of elements, deduplicating
  /// and canonically sorting them.
  pub fn new(elements: impl IntoIterator<Item = FaultElement>) -> Self {
    Self { elements: elements.into_iter().collect() }
  }

  /// Whether this localization carries no elements.
  pub fn is_empty(&self) -> bool {
    self.elements.is_empty()
  }

  /// Renders the canonical specifier string: deduplicated, sorted by
  /// `(variantTag, canonicalFields)`, `;`-joined. Empty input yields `""`.
  pub fn to_specifier_string(&self) -> String {
    self.elements.iter().map(FaultElement::to_specifier).collect::<Vec<_>>().join(";")
  }

  /// Parses a `;`-joined specifier string back into a `FaultLocalization`,
  /// silently dropping any token that doesn't parse. The empty string
  /// yields an empty localization.
  pub fn from_specifier_string(s: &str) -> Self {
    if s.is_empty() {
      return Self::default();
    }
    Self::new(s.split(';').filter_map(FaultElement::from_specifier))
  }
}

impl fmt::Display for FaultLocalization {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_specifier_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::location::Location;

  fn range(sl: u32, sc: Option<u32>, el: u32, ec: Option<u32>) -> CodeRange {
    CodeRange::new(Location::new(sl, sc), Location::new(el, ec))
  }

  #[test]
  fn test_location_specifier_with_columns() {
    let e = FaultElement::location(range(1, Some(2), 3, Some(4)), None);
    assert_eq!(e.to_specifier(), "LOC:1,2-3,4");
  }

  #[test]
  fn test_location_specifier_without_columns() {
    let e = FaultElement::location(range(1, None, 3, None), Some(5));
    assert_eq!(e.to_specifier(), "LOC:1-3((5))");
  }

  #[test]
  fn test_node_type_specifier_forms() {
    let bare = FaultElement::node_type("Block", None, None, None);
    assert_eq!(bare.to_specifier(), "TYPE:Block");

    let contract = FaultElement::node_type(
      "Block",
      Some("Wallet".into()),
      None,
      None,
    );
    assert_eq!(contract.to_specifier(), "TYPE:Wallet-Block");

    let full = FaultElement::node_type(
      "Block",
      Some("Wallet".into()),
      Some("withdraw".into()),
      Some(3),
    );
    assert_eq!(full.to_specifier(), "TYPE:Wallet.withdraw-Block((3))");
  }

  #[test]
  #[should_panic(expected = "functionName requires contractName")]
  fn test_function_without_contract_panics() {
    FaultElement::node_type("Block", None, Some("withdraw".into()), None);
  }

  #[test]
  fn test_empty_localization_yields_empty_string() {
    assert_eq!(FaultLocalization::default().to_specifier_string(), "");
  }

  #[test]
  fn test_dedup_and_canonical_sort() {
    let a = FaultElement::location(range(2, None, 2, None), None);
    let b = FaultElement::node_type("Block", None, None, None);
    let loc = FaultLocalization::new([b.clone(), a.clone(), a.clone(), b]);
    // LOC sorts before TYPE (lower variant tag), and duplicates collapse.
    assert_eq!(loc.to_specifier_string(), "LOC:2-2;TYPE:Block");
  }

  #[test]
  fn test_specifier_round_trip_idempotent() {
    let a = FaultElement::location(range(1, Some(0), 1, Some(1)), None);
    let b = FaultElement::node_type("Block", Some("A".into()), None, None);
    let loc = FaultLocalization::new([a, b]);
    let once = loc.to_specifier_string();
    let twice = FaultLocalization::from_specifier_string(&once).to_specifier_string();
    assert_eq!(once, twice);
  }

  #[test]
  fn test_from_specifier_loc_with_columns() {
    let e = FaultElement::from_specifier("LOC:1,2-3,4").unwrap();
    assert_eq!(e, FaultElement::location(range(1, Some(2), 3, Some(4)), None));
  }

  #[test]
  fn test_from_specifier_loc_without_columns_with_weight() {
    let e = FaultElement::from_specifier("LOC:1-3((5))").unwrap();
    assert_eq!(e, FaultElement::location(range(1, None, 3, None), Some(5)));
  }

  #[test]
  fn test_from_specifier_type_bare() {
    let e = FaultElement::from_specifier("TYPE:Block").unwrap();
    assert_eq!(e, FaultElement::node_type("Block", None, None, None));
  }

  #[test]
  fn test_from_specifier_type_contract_only() {
    let e = FaultElement::from_specifier("TYPE:Wallet-Block").unwrap();
    assert_eq!(e, FaultElement::node_type("Block", Some("Wallet".into()), None, None));
  }

  #[test]
  fn test_from_specifier_type_contract_function_with_weight() {
    let e = FaultElement::from_specifier("TYPE:Wallet.withdraw-Block((3))").unwrap();
    assert_eq!(
      e,
      FaultElement::node_type("Block", Some("Wallet".into()), Some("withdraw".into()), Some(3))
    );
  }

  #[test]
  fn test_from_specifier_string_round_trips_mixed_set() {
    let s = "LOC:2-2;TYPE:Wallet.withdraw-Block((1))";
    let loc = FaultLocalization::from_specifier_string(s);
    assert_eq!(loc.to_specifier_string(), s);
  }
}
