//! Three-state desired attribute
//!
//! A desired field is either left alone (`Unset`), managed and required to be
//! empty (`Cleared`), or managed with a concrete value (`Set`). Only managed
//! fields can ever appear in a change set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field<T> {
    /// Not managed: never compared, never written
    #[default]
    Unset,
    /// Managed and must be empty
    Cleared,
    /// Managed with a concrete value
    Set(T),
}

impl<T> Field<T> {
    /// Wrap a value observed from a provider, where `None` means the
    /// provider reported no value
    pub fn observed(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Cleared,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Whether the engine manages this field (`Cleared` or `Set`)
    pub fn is_managed(&self) -> bool {
        !self.is_unset()
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Set(v) => Some(v),
            Self::Unset | Self::Cleared => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Unset => Field::Unset,
            Self::Cleared => Field::Cleared,
            Self::Set(v) => Field::Set(f(v)),
        }
    }

    /// Use `other` when this field is unset
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Unset => other,
            managed => managed,
        }
    }
}

impl<T: Default> Field<T> {
    /// Value to write for a managed field; `Cleared` writes the empty value
    pub fn managed_value(self) -> Option<T> {
        match self {
            Self::Unset => None,
            Self::Cleared => Some(T::default()),
            Self::Set(v) => Some(v),
        }
    }
}

impl<T: PartialEq + Default> Field<T> {
    /// Whether `actual` already satisfies this desired field
    ///
    /// An empty value (`T::default()`) and `Cleared` are interchangeable.
    pub fn matches(&self, actual: &Field<T>) -> bool {
        match (self, actual) {
            (Self::Unset, _) => true,
            (Self::Cleared, Self::Unset | Self::Cleared) => true,
            (Self::Cleared, Self::Set(a)) => *a == T::default(),
            (Self::Set(d), Self::Set(a)) => d == a,
            (Self::Set(d), Self::Unset | Self::Cleared) => *d == T::default(),
        }
    }
}

impl<T: PartialEq + Default + Clone> Field<T> {
    /// The desired field when it differs from `actual`, otherwise `Unset`
    pub fn delta(actual: &Field<T>, desired: &Field<T>) -> Field<T> {
        if desired.matches(actual) {
            Field::Unset
        } else {
            desired.clone()
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    /// Desired-side conversion: `None` means "don't manage"
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Unset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unset_never_differs() {
        let desired: Field<u32> = Field::Unset;
        assert!(desired.matches(&Field::Set(100)));
        assert!(desired.matches(&Field::Cleared));
        assert_eq!(Field::delta(&Field::Set(100), &desired), Field::Unset);
    }

    #[test]
    fn test_set_value_differs() {
        let delta = Field::delta(&Field::Set(100u32), &Field::Set(200));
        assert_eq!(delta, Field::Set(200));
        assert_eq!(Field::delta(&Field::Set(100u32), &Field::Set(100)), Field::Unset);
    }

    #[test]
    fn test_cleared_against_populated_value() {
        let actual = Field::Set(BTreeMap::from([("team".to_string(), "core".to_string())]));
        let desired: Field<BTreeMap<String, String>> = Field::Cleared;
        assert_eq!(Field::delta(&actual, &desired), Field::Cleared);
    }

    #[test]
    fn test_empty_value_equals_cleared() {
        let desired: Field<BTreeMap<String, String>> = Field::Set(BTreeMap::new());
        assert!(desired.matches(&Field::Cleared));
        assert!(Field::<String>::Cleared.matches(&Field::Set(String::new())));
    }

    #[test]
    fn test_set_against_unobserved_value() {
        let desired = Field::Set("westeurope".to_string());
        assert!(!desired.matches(&Field::Unset));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Field::from(None::<u32>), Field::Unset);
        assert_eq!(Field::observed(None::<u32>), Field::Cleared);
        assert_eq!(Field::from(Some(3u32)).get(), Some(&3));
        assert_eq!(Field::<u32>::Cleared.managed_value(), Some(0));
        assert_eq!(Field::<u32>::Unset.or(Field::Set(1)), Field::Set(1));
    }
}
