//! Hierarchical state values and the path algebra over them.
//!
//! A [`StateValue`] names a complete position in a statechart: a leaf
//! string for an atomic state, or a mapping from region key to nested
//! value for compound and parallel states. The operations here are pure;
//! two values denote the same configuration iff they are structurally
//! equal.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Delimiter used when none is configured on the machine.
pub const DEFAULT_DELIMITER: char = '.';

/// A hierarchical state value.
///
/// # Example
///
/// ```rust
/// use statecraft::StateValue;
///
/// let flat = StateValue::from("green");
/// let nested = StateValue::from("red.walk");
///
/// assert_eq!(flat.to_paths(), vec![vec!["green".to_string()]]);
/// assert_eq!(
///     nested.to_paths(),
///     vec![vec!["red".to_string(), "walk".to_string()]]
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// An atomic (or final) leaf state, named by its key.
    Leaf(String),
    /// A compound or parallel state: one entry per active region.
    Branch(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Parse a delimited string into a nested value.
    ///
    /// `"red.walk"` with delimiter `.` becomes `{red: "walk"}`; a string
    /// without the delimiter stays a leaf.
    pub fn parse(input: &str, delimiter: char) -> Self {
        let mut segments = input.split(delimiter).rev();
        let mut value = match segments.next() {
            Some(leaf) => StateValue::Leaf(leaf.to_string()),
            None => StateValue::Leaf(String::new()),
        };
        for segment in segments {
            let mut branch = BTreeMap::new();
            branch.insert(segment.to_string(), value);
            value = StateValue::Branch(branch);
        }
        value
    }

    /// Enumerate every leaf path this value denotes, one per orthogonal
    /// region, in region-key order.
    pub fn to_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.collect_paths(&mut Vec::new(), &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        match self {
            StateValue::Leaf(key) => {
                let mut path = prefix.clone();
                path.push(key.clone());
                out.push(path);
            }
            StateValue::Branch(regions) => {
                for (key, child) in regions {
                    prefix.push(key.clone());
                    child.collect_paths(prefix, out);
                    prefix.pop();
                }
            }
        }
    }

    /// Rebuild a value from a set of leaf paths. Inverse of
    /// [`StateValue::to_paths`] on well-formed path sets.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = String>,
    {
        let paths: Vec<Vec<String>> = paths.into_iter().map(|p| p.into_iter().collect()).collect();

        // A single one-segment path collapses back to a leaf.
        if paths.len() == 1 && paths[0].len() == 1 {
            return StateValue::Leaf(paths[0][0].clone());
        }

        let mut root = BTreeMap::new();
        for path in paths {
            Self::insert_path(&mut root, &path);
        }
        StateValue::Branch(root)
    }

    fn insert_path(branch: &mut BTreeMap<String, StateValue>, path: &[String]) {
        match path {
            [] => {}
            [leaf] => {
                branch.insert(leaf.clone(), StateValue::Leaf(leaf.clone()));
            }
            [head, tail @ ..] => {
                if tail.len() == 1 {
                    branch.insert(head.clone(), StateValue::Leaf(tail[0].clone()));
                } else {
                    let entry = branch
                        .entry(head.clone())
                        .or_insert_with(|| StateValue::Branch(BTreeMap::new()));
                    if let StateValue::Leaf(_) = entry {
                        *entry = StateValue::Branch(BTreeMap::new());
                    }
                    if let StateValue::Branch(child) = entry {
                        Self::insert_path(child, tail);
                    }
                }
            }
        }
    }

    /// True iff `self` (the pattern) is a prefix of `value` in every
    /// region.
    ///
    /// ```rust
    /// use statecraft::StateValue;
    ///
    /// let value = StateValue::from("red.walk");
    /// assert!(StateValue::from("red").matches(&value));
    /// assert!(!value.matches(&StateValue::from("red")));
    /// ```
    pub fn matches(&self, value: &StateValue) -> bool {
        match (self, value) {
            (StateValue::Leaf(pattern), StateValue::Leaf(leaf)) => pattern == leaf,
            (StateValue::Leaf(pattern), StateValue::Branch(regions)) => {
                regions.contains_key(pattern)
            }
            // The pattern is more specific than the value.
            (StateValue::Branch(_), StateValue::Leaf(_)) => false,
            (StateValue::Branch(pattern), StateValue::Branch(regions)) => {
                pattern.iter().all(|(key, sub)| {
                    regions
                        .get(key)
                        .is_some_and(|candidate| sub.matches(candidate))
                })
            }
        }
    }

    /// Render as a delimited string when the value has no orthogonal
    /// regions; `None` otherwise.
    pub fn to_delimited(&self, delimiter: char) -> Option<String> {
        let paths = self.to_paths();
        match paths.as_slice() {
            [only] => Some(only.join(&delimiter.to_string())),
            _ => None,
        }
    }

    /// Convert from a JSON value: a string parses with the default
    /// delimiter, an object maps to a branch. Other JSON shapes are not
    /// state values.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(StateValue::parse(s, DEFAULT_DELIMITER)),
            JsonValue::Object(map) => {
                let mut branch = BTreeMap::new();
                for (key, sub) in map {
                    branch.insert(key.clone(), StateValue::from_json(sub)?);
                }
                Some(StateValue::Branch(branch))
            }
            _ => None,
        }
    }

    /// Convert to a JSON value (leaf string or nested object).
    pub fn to_json(&self) -> JsonValue {
        match self {
            StateValue::Leaf(key) => JsonValue::String(key.clone()),
            StateValue::Branch(regions) => JsonValue::Object(
                regions
                    .iter()
                    .map(|(key, sub)| (key.clone(), sub.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for StateValue {
    fn from(input: &str) -> Self {
        StateValue::parse(input, DEFAULT_DELIMITER)
    }
}

impl From<String> for StateValue {
    fn from(input: String) -> Self {
        StateValue::parse(&input, DEFAULT_DELIMITER)
    }
}

impl From<BTreeMap<String, StateValue>> for StateValue {
    fn from(regions: BTreeMap<String, StateValue>) -> Self {
        StateValue::Branch(regions)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_delimited(DEFAULT_DELIMITER) {
            Some(dotted) => write!(f, "{dotted}"),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn branch(entries: &[(&str, StateValue)]) -> StateValue {
        StateValue::Branch(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn leaf(key: &str) -> StateValue {
        StateValue::Leaf(key.to_string())
    }

    #[test]
    fn parse_without_delimiter_is_leaf() {
        assert_eq!(StateValue::parse("green", '.'), leaf("green"));
    }

    #[test]
    fn parse_nests_on_delimiter() {
        assert_eq!(
            StateValue::parse("red.walk", '.'),
            branch(&[("red", leaf("walk"))])
        );
        assert_eq!(
            StateValue::parse("a.b.c", '.'),
            branch(&[("a", branch(&[("b", leaf("c"))]))])
        );
    }

    #[test]
    fn parse_honors_custom_delimiter() {
        assert_eq!(
            StateValue::parse("red/walk", '/'),
            branch(&[("red", leaf("walk"))])
        );
        assert_eq!(StateValue::parse("red.walk", '/'), leaf("red.walk"));
    }

    #[test]
    fn paths_of_leaf() {
        assert_eq!(leaf("green").to_paths(), vec![vec!["green".to_string()]]);
    }

    #[test]
    fn paths_of_parallel_value() {
        let value = branch(&[("bold", leaf("on")), ("italics", leaf("off"))]);
        assert_eq!(
            value.to_paths(),
            vec![
                vec!["bold".to_string(), "on".to_string()],
                vec!["italics".to_string(), "off".to_string()],
            ]
        );
    }

    #[test]
    fn paths_round_trip() {
        let values = [
            leaf("green"),
            branch(&[("red", leaf("walk"))]),
            branch(&[("bold", leaf("on")), ("italics", leaf("off"))]),
            branch(&[("a", branch(&[("b", leaf("c")), ("d", leaf("e"))]))]),
        ];
        for value in values {
            assert_eq!(StateValue::from_paths(value.to_paths()), value);
        }
    }

    #[test]
    fn matches_prefix_in_every_region() {
        let value = branch(&[("red", leaf("walk"))]);
        assert!(StateValue::from("red").matches(&value));
        assert!(StateValue::from("red.walk").matches(&value));
        assert!(!value.matches(&StateValue::from("red")));
        assert!(!StateValue::from("green").matches(&value));
    }

    #[test]
    fn matches_parallel_regions_independently() {
        let value = branch(&[
            ("bold", leaf("on")),
            ("italics", leaf("off")),
            ("underline", leaf("off")),
        ]);
        assert!(StateValue::from("bold").matches(&value));
        assert!(StateValue::from("bold.on").matches(&value));
        assert!(branch(&[("bold", leaf("on")), ("italics", leaf("off"))]).matches(&value));
        assert!(!StateValue::from("bold.off").matches(&value));
    }

    #[test]
    fn matches_identical_values() {
        let value = branch(&[("red", leaf("wait"))]);
        assert!(value.matches(&value.clone()));
        assert!(leaf("green").matches(&leaf("green")));
        assert!(!leaf("green").matches(&leaf("yellow")));
    }

    #[test]
    fn delimited_rendering() {
        assert_eq!(leaf("green").to_delimited('.'), Some("green".to_string()));
        assert_eq!(
            branch(&[("red", leaf("walk"))]).to_delimited('.'),
            Some("red.walk".to_string())
        );
        assert_eq!(
            branch(&[("bold", leaf("on")), ("italics", leaf("off"))]).to_delimited('.'),
            None
        );
    }

    #[test]
    fn json_conversions() {
        let value = StateValue::from_json(&json!({"red": "walk"})).unwrap();
        assert_eq!(value, branch(&[("red", leaf("walk"))]));
        assert_eq!(value.to_json(), json!({"red": "walk"}));

        assert_eq!(
            StateValue::from_json(&json!("red.walk")).unwrap(),
            branch(&[("red", leaf("walk"))])
        );
        assert!(StateValue::from_json(&json!(42)).is_none());
    }

    #[test]
    fn serde_round_trip() {
        let value = branch(&[("bold", leaf("on")), ("list", leaf("none"))]);
        let encoded = serde_json::to_string(&value).unwrap();
        let decoded: StateValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn display_uses_dotted_form_when_linear() {
        assert_eq!(leaf("green").to_string(), "green");
        assert_eq!(branch(&[("red", leaf("walk"))]).to_string(), "red.walk");
    }
}
