//! Severity levels on a shared 0..=100 scale
//!
//! Levels are plain values, not a closed enum: the nine built-in checkpoints
//! cover the usual range and applications can define their own anywhere on
//! the scale. The two ends of the scale (0 and 100) exist so that filters can
//! express "everything" and "nothing"; events can never be constructed at
//! them.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A named severity with a numeric value on the 0..=100 scale.
///
/// A level can carry constructor tags; every event logged at that level
/// inherits them during dispatch. Comparison and filtering use the numeric
/// value only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    name: Cow<'static, str>,
    value: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Level {
    /// Filter boundary: matches everything, never loggable.
    pub const ALL: Level = Level::builtin("ALL", 0);
    pub const DEBUG: Level = Level::builtin("DEBUG", 10);
    pub const INFO: Level = Level::builtin("INFO", 20);
    pub const NOTE: Level = Level::builtin("NOTE", 30);
    pub const SUCCESS: Level = Level::builtin("SUCCESS", 40);
    pub const WARNING: Level = Level::builtin("WARNING", 60);
    pub const ERROR: Level = Level::builtin("ERROR", 80);
    pub const CRITICAL: Level = Level::builtin("CRITICAL", 90);
    /// Filter boundary: matches nothing, never loggable.
    pub const OFF: Level = Level::builtin("OFF", 100);

    const fn builtin(name: &'static str, value: u8) -> Self {
        Level {
            name: Cow::Borrowed(name),
            value,
            tags: Vec::new(),
        }
    }

    /// Define a custom level anywhere on the 0..=100 scale.
    ///
    /// Values 0 and 100 are accepted (they are valid filter bounds) but
    /// events cannot be constructed at them.
    pub fn custom(name: impl Into<String>, value: u16) -> Result<Self> {
        let name = name.into();
        if value > 100 {
            return Err(Error::InvalidLevel { name, value });
        }
        Ok(Level {
            name: Cow::Owned(name),
            value: value as u8,
            tags: Vec::new(),
        })
    }

    /// Attach constructor tags; events logged at this level inherit them.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// True for the two filter-only scale ends (0 and 100).
    pub fn is_boundary(&self) -> bool {
        self.value == 0 || self.value == 100
    }

    /// The nine built-in checkpoints, in ascending order.
    pub fn builtins() -> [Level; 9] {
        [
            Level::ALL,
            Level::DEBUG,
            Level::INFO,
            Level::NOTE,
            Level::SUCCESS,
            Level::WARNING,
            Level::ERROR,
            Level::CRITICAL,
            Level::OFF,
        ]
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::INFO
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_uppercase();
        Level::builtins()
            .into_iter()
            .find(|level| level.name == upper)
            .ok_or_else(|| Error::config("Level", format!("unknown level name '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_values_sit_on_the_scale() {
        assert_eq!(Level::ALL.value(), 0);
        assert_eq!(Level::DEBUG.value(), 10);
        assert_eq!(Level::INFO.value(), 20);
        assert_eq!(Level::NOTE.value(), 30);
        assert_eq!(Level::SUCCESS.value(), 40);
        assert_eq!(Level::WARNING.value(), 60);
        assert_eq!(Level::ERROR.value(), 80);
        assert_eq!(Level::CRITICAL.value(), 90);
        assert_eq!(Level::OFF.value(), 100);
    }

    #[test]
    fn only_scale_ends_are_boundaries() {
        assert!(Level::ALL.is_boundary());
        assert!(Level::OFF.is_boundary());
        assert!(!Level::DEBUG.is_boundary());
        assert!(!Level::CRITICAL.is_boundary());
    }

    #[test]
    fn custom_levels_validate_range() {
        let audit = Level::custom("AUDIT", 55).unwrap();
        assert_eq!(audit.name(), "AUDIT");
        assert_eq!(audit.value(), 55);

        let err = Level::custom("HUGE", 101).unwrap_err();
        assert!(matches!(err, Error::InvalidLevel { value: 101, .. }));
    }

    #[test]
    fn custom_boundary_levels_are_constructible() {
        // Valid as filter bounds even though events cannot use them.
        assert!(Level::custom("FLOOR", 0).unwrap().is_boundary());
        assert!(Level::custom("CEILING", 100).unwrap().is_boundary());
    }

    #[test]
    fn constructor_tags_accumulate() {
        let lvl = Level::custom("AUDIT", 55)
            .unwrap()
            .with_tags(["audit"])
            .with_tags(["compliance"]);
        assert_eq!(lvl.tags(), ["audit", "compliance"]);
    }

    #[test]
    fn parse_builtin_names() {
        assert_eq!("warning".parse::<Level>().unwrap(), Level::WARNING);
        assert_eq!("NOTE".parse::<Level>().unwrap(), Level::NOTE);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn display_prints_the_name() {
        assert_eq!(Level::SUCCESS.to_string(), "SUCCESS");
    }
}
