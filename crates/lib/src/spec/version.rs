//! Versions and version constraints.
//!
//! A version is split into components at `.`, `-`, `_` and at every boundary
//! between digits and letters, so `2.0-rc1` is `[2, 0, rc, 1]`. Numeric
//! components compare numerically, alphabetic ones lexically, and an
//! alphabetic component orders before a numeric one. A version that is a
//! prefix of another orders before it.
//!
//! Constraints use the `@` syntax of spec strings:
//!
//! | syntax      | matches                                       |
//! |-------------|-----------------------------------------------|
//! | `1.0`       | `1.0` and anything starting with `1.0` (`1.0.3`) |
//! | `=1.0`      | exactly `1.0`                                 |
//! | `1.0:`      | `1.0` and newer                               |
//! | `:2.0`      | up to and including the `2.0` series          |
//! | `1.0:2.0`   | between the two, inclusive                    |
//! | `1.0,3:`    | union of the comma-separated pieces           |

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
  #[error("empty version")]
  Empty,

  #[error("invalid character '{ch}' in version '{input}'")]
  InvalidChar { input: String, ch: char },

  #[error("empty component in version '{0}'")]
  EmptyComponent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Component {
  Alpha(String),
  Num(u64),
}

impl Ord for Component {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Component::Num(a), Component::Num(b)) => a.cmp(b),
      (Component::Alpha(a), Component::Alpha(b)) => a.cmp(b),
      (Component::Alpha(_), Component::Num(_)) => Ordering::Less,
      (Component::Num(_), Component::Alpha(_)) => Ordering::Greater,
    }
  }
}

impl PartialOrd for Component {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// A concrete package version.
///
/// Equality and ordering look at components only, so `1.0` and `1_0` are the
/// same version. `Display` and serde keep the original spelling; anything that
/// identifies a version by its text uses [`Version::canonical`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
  raw: String,
  components: Vec<Component>,
}

impl Version {
  pub fn parse(input: &str) -> Result<Self, VersionError> {
    if input.is_empty() {
      return Err(VersionError::Empty);
    }

    let mut components = Vec::new();
    for piece in input.split(['.', '-', '_']) {
      if piece.is_empty() {
        return Err(VersionError::EmptyComponent(input.to_string()));
      }
      if let Some(ch) = piece.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(VersionError::InvalidChar {
          input: input.to_string(),
          ch,
        });
      }
      split_alnum(piece, &mut components);
    }

    Ok(Version {
      raw: input.to_string(),
      components,
    })
  }

  /// A purely numeric version such as `1.0`.
  pub fn from_numbers(parts: &[u64]) -> Self {
    let raw = parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
    Version {
      raw,
      components: parts.iter().copied().map(Component::Num).collect(),
    }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Spelling-independent form: components joined by `.`, numbers without
  /// leading zeros. Equal versions have equal canonical forms.
  pub fn canonical(&self) -> String {
    self
      .components
      .iter()
      .map(|c| match c {
        Component::Num(n) => n.to_string(),
        Component::Alpha(a) => a.clone(),
      })
      .collect::<Vec<_>>()
      .join(".")
  }

  /// True if every component of `self` matches the leading components of `other`.
  pub fn is_prefix_of(&self, other: &Version) -> bool {
    self.components.len() <= other.components.len() && other.components[..self.components.len()] == self.components[..]
  }
}

/// Splits `2rc1` into `[2, rc, 1]`.
fn split_alnum(piece: &str, out: &mut Vec<Component>) {
  let mut start = 0;
  let bytes = piece.as_bytes();
  for i in 1..=bytes.len() {
    let boundary = i == bytes.len() || bytes[i].is_ascii_digit() != bytes[i - 1].is_ascii_digit();
    if !boundary {
      continue;
    }
    let chunk = &piece[start..i];
    let component = if bytes[start].is_ascii_digit() {
      // Absurdly long numbers fall back to lexical comparison
      chunk
        .parse::<u64>()
        .map(Component::Num)
        .unwrap_or_else(|_| Component::Alpha(chunk.to_string()))
    } else {
      Component::Alpha(chunk.to_string())
    };
    out.push(component);
    start = i;
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool {
    self.components == other.components
  }
}

impl Eq for Version {}

impl Hash for Version {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.components.hash(state);
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    self.components.cmp(&other.components)
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl FromStr for Version {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Version::parse(s)
  }
}

impl TryFrom<String> for Version {
  type Error = VersionError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Version::parse(&value)
  }
}

impl From<Version> for String {
  fn from(value: Version) -> Self {
    value.raw
  }
}

/// One piece of a version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRange {
  /// `=1.0`
  Exact(Version),
  /// `1.0`, matching the whole `1.0` series
  Series(Version),
  /// `lo:hi`, either side optional
  Between { lo: Option<Version>, hi: Option<Version> },
}

impl VersionRange {
  pub fn contains(&self, version: &Version) -> bool {
    match self {
      VersionRange::Exact(v) => v == version,
      VersionRange::Series(v) => v.is_prefix_of(version),
      VersionRange::Between { lo, hi } => {
        let above = lo.as_ref().is_none_or(|lo| version >= lo);
        let below = hi.as_ref().is_none_or(|hi| version <= hi || hi.is_prefix_of(version));
        above && below
      }
    }
  }

  fn parse(input: &str) -> Result<Self, VersionError> {
    if let Some(exact) = input.strip_prefix('=') {
      return Ok(VersionRange::Exact(Version::parse(exact)?));
    }
    match input.split_once(':') {
      Some((lo, hi)) => {
        let bound = |s: &str| (!s.is_empty()).then(|| Version::parse(s)).transpose();
        Ok(VersionRange::Between {
          lo: bound(lo)?,
          hi: bound(hi)?,
        })
      }
      None => Ok(VersionRange::Series(Version::parse(input)?)),
    }
  }
}

impl fmt::Display for VersionRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VersionRange::Exact(v) => write!(f, "={}", v),
      VersionRange::Series(v) => write!(f, "{}", v),
      VersionRange::Between { lo, hi } => {
        if let Some(lo) = lo {
          write!(f, "{}", lo)?;
        }
        f.write_str(":")?;
        if let Some(hi) = hi {
          write!(f, "{}", hi)?;
        }
        Ok(())
      }
    }
  }
}

/// A union of version ranges. The empty constraint matches every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
  ranges: Vec<VersionRange>,
}

impl VersionConstraint {
  pub fn any() -> Self {
    Self::default()
  }

  pub fn exact(version: Version) -> Self {
    VersionConstraint {
      ranges: vec![VersionRange::Exact(version)],
    }
  }

  pub fn parse(input: &str) -> Result<Self, VersionError> {
    let input = input.trim();
    if input.is_empty() {
      return Ok(Self::any());
    }
    let ranges = input.split(',').map(VersionRange::parse).collect::<Result<Vec<_>, _>>()?;
    Ok(VersionConstraint { ranges })
  }

  pub fn is_any(&self) -> bool {
    self.ranges.is_empty() || self.ranges.iter().any(|r| matches!(r, VersionRange::Between { lo: None, hi: None }))
  }

  pub fn ranges(&self) -> &[VersionRange] {
    &self.ranges
  }

  pub fn satisfied_by(&self, version: &Version) -> bool {
    self.ranges.is_empty() || self.ranges.iter().any(|r| r.contains(version))
  }

  /// True if `version` is named literally, as `=1.0` or `1.0`.
  ///
  /// Deprecated versions are only selectable this way.
  pub fn names_exactly(&self, version: &Version) -> bool {
    self.ranges.iter().any(|r| match r {
      VersionRange::Exact(v) | VersionRange::Series(v) => v == version,
      VersionRange::Between { .. } => false,
    })
  }

  /// The single version pinned by `=x`, if that is all this constraint says.
  pub fn pinned(&self) -> Option<&Version> {
    match self.ranges.as_slice() {
      [VersionRange::Exact(v)] => Some(v),
      _ => None,
    }
  }
}

impl fmt::Display for VersionConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, range) in self.ranges.iter().enumerate() {
      if i > 0 {
        f.write_str(",")?;
      }
      write!(f, "{}", range)?;
    }
    Ok(())
  }
}

impl FromStr for VersionConstraint {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    VersionConstraint::parse(s)
  }
}

impl TryFrom<String> for VersionConstraint {
  type Error = VersionError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    VersionConstraint::parse(&value)
  }
}

impl From<VersionConstraint> for String {
  fn from(value: VersionConstraint) -> Self {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
  }

  fn c(s: &str) -> VersionConstraint {
    VersionConstraint::parse(s).unwrap()
  }

  #[test]
  fn numeric_components_compare_numerically() {
    assert!(v("1.10") > v("1.9"));
    assert!(v("1.2.10") > v("1.2.9"));
    assert!(v("2.0") > v("1.99.99"));
  }

  #[test]
  fn alpha_components_sort_before_numeric() {
    assert!(v("2.0-rc1") < v("2.0.1"));
    assert!(v("1.0a") < v("1.0.0"));
    assert!(v("1.0-alpha") < v("1.0-beta"));
  }

  #[test]
  fn prefix_orders_first() {
    assert!(v("1.0") < v("1.0.1"));
    assert!(v("1.0").is_prefix_of(&v("1.0.1")));
    assert!(!v("1.0").is_prefix_of(&v("1.01")));
  }

  #[test]
  fn separators_do_not_change_identity() {
    assert_eq!(v("1.2.3"), v("1-2_3"));
    assert_eq!(v("1_0").to_string(), "1_0");
    assert_eq!(v("1_0").canonical(), v("1.0").canonical());
    assert_eq!(v("2.0-rc01").canonical(), "2.0.rc.1");
  }

  #[test]
  fn rejects_malformed_versions() {
    assert_eq!(Version::parse(""), Err(VersionError::Empty));
    assert!(matches!(Version::parse("1..2"), Err(VersionError::EmptyComponent(_))));
    assert!(matches!(Version::parse("1.2+x"), Err(VersionError::InvalidChar { ch: '+', .. })));
  }

  #[test]
  fn series_matches_prefix() {
    let con = c("1.0");
    assert!(con.satisfied_by(&v("1.0")));
    assert!(con.satisfied_by(&v("1.0.3")));
    assert!(!con.satisfied_by(&v("1.1")));
    assert!(!con.satisfied_by(&v("10.0")));
  }

  #[test]
  fn exact_matches_only_itself() {
    let con = c("=1.0");
    assert!(con.satisfied_by(&v("1.0")));
    assert!(!con.satisfied_by(&v("1.0.3")));
    assert_eq!(con.pinned(), Some(&v("1.0")));
  }

  #[test]
  fn open_ranges() {
    assert!(c("2.0:").satisfied_by(&v("2.1")));
    assert!(c("2.0:").satisfied_by(&v("2.0")));
    assert!(!c("2.0:").satisfied_by(&v("1.9")));

    // upper bound includes the whole series
    assert!(c(":2.0").satisfied_by(&v("2.0.5")));
    assert!(!c(":2.0").satisfied_by(&v("2.1")));
  }

  #[test]
  fn closed_range_and_union() {
    let con = c("1.2:1.4,2.0");
    assert!(con.satisfied_by(&v("1.3.7")));
    assert!(con.satisfied_by(&v("1.4.1")));
    assert!(con.satisfied_by(&v("2.0.0")));
    assert!(!con.satisfied_by(&v("1.5")));
  }

  #[test]
  fn empty_constraint_is_any() {
    assert!(c("").is_any());
    assert!(c(":").is_any());
    assert!(c("").satisfied_by(&v("0.0.1")));
  }

  #[test]
  fn display_round_trips() {
    for s in ["1.0", "=1.0", "1.0:", ":2.0", "1.0:2.0", "1.2:1.4,2.0"] {
      assert_eq!(c(s).to_string(), s);
    }
  }

  #[test]
  fn literal_names() {
    assert!(c("1.0").names_exactly(&v("1.0")));
    assert!(c("=1.0").names_exactly(&v("1.0")));
    assert!(!c("1.0:").names_exactly(&v("1.0")));
  }
}
