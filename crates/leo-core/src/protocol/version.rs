use crate::error::{LeoError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Dotted numeric protocol version, `MAJOR.MINOR[.PATCH]`.
///
/// Missing components compare as zero, so `4.2` equals `4.2.0`.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    parts: Vec<u32>,
}

impl Version {
    fn part(&self, i: usize) -> u32 {
        self.parts.get(i).copied().unwrap_or(0)
    }

    /// Next patch release, always three components.
    pub fn next_patch(&self) -> Version {
        Version {
            parts: vec![self.part(0), self.part(1), self.part(2) + 1],
        }
    }
}

impl FromStr for Version {
    type Err = LeoError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches(['v', 'V']);
        let parts: Vec<u32> = s
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| LeoError::InvalidVersion(s.to_string()))?;
        if !(2..=3).contains(&parts.len()) {
            return Err(LeoError::InvalidVersion(s.to_string()));
        }
        Ok(Version { parts })
    }
}

impl TryFrom<String> for Version {
    type Error = LeoError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: Vec<String> = self.parts.iter().map(u32::to_string).collect();
        f.write_str(&s.join("."))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (0..3)
            .map(|i| self.part(i).cmp(&other.part(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// True when `new` is strictly greater than `old`. Equal is not newer.
pub fn is_newer_version(old: &str, new: &str) -> Result<bool> {
    Ok(new.parse::<Version>()? > old.parse::<Version>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn patch_bump_is_newer_equal_is_not() {
        assert!(is_newer_version("4.1.2", "4.1.3").unwrap());
        assert!(!is_newer_version("4.1.2", "4.1.2").unwrap());
        assert!(!is_newer_version("4.1.3", "4.1.2").unwrap());
    }

    #[test]
    fn numeric_not_lexical() {
        assert!(v("4.10.0") > v("4.9.9"));
        assert!(is_newer_version("4.2", "4.2.1").unwrap());
        assert_eq!(v("4.2"), v("4.2.0"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!("4".parse::<Version>(), Err(LeoError::InvalidVersion(_))));
        assert!("4.x.1".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!(is_newer_version("4.1", "latest").is_err());
    }

    #[test]
    fn display_and_next_patch() {
        assert_eq!(v("v4.2").to_string(), "4.2");
        assert_eq!(v("4.2").next_patch().to_string(), "4.2.1");
        assert_eq!(serde_json::to_string(&v("5.0.1")).unwrap(), "\"5.0.1\"");
    }
}
