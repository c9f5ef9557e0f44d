// EdgeKey - unordered pair of vertex indices
//
// Cloth edges and collision edges are looked up by the two vertices they
// join, regardless of the direction they were stored in. Serialized as the
// string "low,high" so it can be a JSON object key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    low: u32,
    high: u32,
}

impl EdgeKey {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            EdgeKey { low: a, high: b }
        } else {
            EdgeKey { low: b, high: a }
        }
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    pub fn contains(&self, vertex: u32) -> bool {
        self.low == vertex || self.high == vertex
    }

    /// The endpoint that is not `vertex`, if `vertex` is on this edge
    pub fn other(&self, vertex: u32) -> Option<u32> {
        if self.low == vertex {
            Some(self.high)
        } else if self.high == vertex {
            Some(self.low)
        } else {
            None
        }
    }
}

impl From<(u32, u32)> for EdgeKey {
    fn from((a, b): (u32, u32)) -> Self {
        EdgeKey::new(a, b)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.low, self.high)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid edge key {0:?}, expected \"a,b\"")]
pub struct ParseEdgeKeyError(String);

impl FromStr for EdgeKey {
    type Err = ParseEdgeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(',')
            .ok_or_else(|| ParseEdgeKeyError(s.to_string()))?;
        let a = a.trim().parse().map_err(|_| ParseEdgeKeyError(s.to_string()))?;
        let b = b.trim().parse().map_err(|_| ParseEdgeKeyError(s.to_string()))?;
        Ok(EdgeKey::new(a, b))
    }
}

impl Serialize for EdgeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EdgeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    #[test]
    fn test_symmetric() {
        for a in 0..20u32 {
            for b in 0..20u32 {
                assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
            }
        }
    }

    #[test]
    fn test_distinct_pairs_never_collide() {
        let mut seen = HashSet::new();
        for a in 0..40u32 {
            for b in a..40u32 {
                assert!(seen.insert(EdgeKey::new(b, a)), "collision for {},{}", a, b);
            }
        }
        assert_eq!(seen.len(), 40 * 41 / 2);
    }

    #[test]
    fn test_other_endpoint() {
        let key = EdgeKey::new(7, 3);
        assert_eq!(key.low(), 3);
        assert_eq!(key.other(3), Some(7));
        assert_eq!(key.other(7), Some(3));
        assert_eq!(key.other(5), None);
    }

    #[test]
    fn test_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(EdgeKey::new(9, 2), 1.5f32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2,9":1.5}"#);
        let back: BTreeMap<EdgeKey, f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        assert!("x".parse::<EdgeKey>().is_err());
    }
}
