//! `single` vs `multiple` JSON values.
//!
//! ActivityStreams lets almost every property hold either one value or an
//! array of values. [`ComplexType`] keeps whichever shape was received so a
//! document re-serializes the way it arrived.

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A property holding one value or an array of values.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexType<T> {
    /// A bare value.
    Single(T),
    /// An array of values.
    Multiple(Vec<T>),
}

impl<T> ComplexType<T> {
    /// Iterate over the contained values regardless of shape.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::Single(value) => std::slice::from_ref(value).iter(),
            Self::Multiple(values) => values.iter(),
        }
    }

    /// First contained value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }

    /// Number of contained values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(values) => values.len(),
        }
    }

    /// True for an empty array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for ComplexType<T> {
    fn from(value: T) -> Self {
        Self::Single(value)
    }
}

impl<T> From<Vec<T>> for ComplexType<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Multiple(values)
    }
}

impl<'a, T> IntoIterator for &'a ComplexType<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Serialize> Serialize for ComplexType<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(value) => value.serialize(serializer),
            Self::Multiple(values) => values.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ComplexType<T> {
    /// Array decoding is attempted first; anything that does not decode as
    /// `Vec<T>` is retried as a single `T`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;

        if value.is_array() {
            if let Ok(values) = serde_json::from_value::<Vec<T>>(value.clone()) {
                return Ok(Self::Multiple(values));
            }
        }

        serde_json::from_value::<T>(value)
            .map(Self::Single)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_multiple_shapes() {
        let single: ComplexType<String> = serde_json::from_str(r#""a""#).unwrap();
        let multiple: ComplexType<String> = serde_json::from_str(r#"["a","b"]"#).unwrap();

        assert_eq!(single, ComplexType::Single("a".to_string()));
        assert_eq!(multiple.len(), 2);
        assert_eq!(serde_json::to_string(&single).unwrap(), r#""a""#);
        assert_eq!(serde_json::to_string(&multiple).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn test_array_decoding_wins_over_scalar() {
        let decoded: ComplexType<Value> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(decoded, ComplexType::Multiple(vec![Value::from(1), Value::from(2)]));

        let result: Result<ComplexType<String>, _> = serde_json::from_str("[1,2]");
        assert!(result.is_err());
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Pair(u8, u8);

    #[test]
    fn test_array_falls_back_to_scalar() {
        // [1,2] is not a list of pairs, but it is one pair.
        let decoded: ComplexType<Pair> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(decoded, ComplexType::Single(Pair(1, 2)));
    }

    #[test]
    fn test_empty_array() {
        let decoded: ComplexType<String> = serde_json::from_str("[]").unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.first().is_none());
    }
}
