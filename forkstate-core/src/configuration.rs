//! Active configuration of a running machine.

use crate::definition::StateId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The set of currently active leaf states.
///
/// Holds a single state while a top-level state is active, and one state per
/// region (in region declaration order) while a composite is active. Empty
/// before the machine starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Vec<StateId>);

impl Configuration {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(state: StateId) -> Self {
        Self(vec![state])
    }

    pub fn from_states(states: Vec<StateId>) -> Self {
        Self(states)
    }

    pub fn states(&self) -> &[StateId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, state: &str) -> bool {
        self.0.iter().any(|s| s.as_str() == state)
    }

    /// Returns the state when exactly one is active.
    pub fn as_single(&self) -> Option<&StateId> {
        match self.0.as_slice() {
            [state] => Some(state),
            _ => None,
        }
    }

    /// State names, convenient for assertions and logging.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("{}"),
            [state] => write!(f, "{}", state),
            states => {
                f.write_str("{")?;
                for (i, state) in states.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", state)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl<'a> IntoIterator for &'a Configuration {
    type Item = &'a StateId;
    type IntoIter = std::slice::Iter<'a, StateId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Configuration::empty().to_string(), "{}");
        assert_eq!(
            Configuration::single(StateId::from("INITIAL_STATE")).to_string(),
            "INITIAL_STATE"
        );

        let parallel = Configuration::from_states(vec![
            StateId::from("UI_ACTIVATED"),
            StateId::from("SPAT_ACTIVATED"),
        ]);
        assert_eq!(parallel.to_string(), "{UI_ACTIVATED, SPAT_ACTIVATED}");
        assert!(parallel.as_single().is_none());
        assert!(parallel.contains("SPAT_ACTIVATED"));
    }

    #[test]
    fn test_serializes_as_list() {
        let cfg = Configuration::from_states(vec![StateId::from("a"), StateId::from("b")]);
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json, serde_json::json!(["a", "b"]));
    }
}
