//! Structural content-quality heuristics
//!
//! All thresholds are configuration. The defaults are tuned for Korean web
//! text (Hangul syllables, Korean legal/commerce boilerplate phrases).

use serde::{Deserialize, Serialize};

/// Phrases counted together against one limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerGroup {
    pub phrases: Vec<String>,
    /// Reject when the group's total occurrences exceed this
    pub max_count: usize,
}

impl MarkerGroup {
    pub fn new(phrases: &[&str], max_count: usize) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            max_count,
        }
    }
}

/// Inclusive range of characters counted as "in script"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRange {
    pub start: char,
    pub end: char,
}

impl ScriptRange {
    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&c)
    }
}

/// Why a text failed the policy
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TooShort { chars: usize },
    TooManyNewlines { ratio: f64 },
    MarkerLimit { group: usize, count: usize },
    LowScriptDensity { ratio: f64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { chars } => write!(f, "too short ({chars} chars)"),
            Self::TooManyNewlines { ratio } => write!(f, "newline ratio {ratio:.4}"),
            Self::MarkerLimit { group, count } => {
                write!(f, "marker group {group} seen {count} times")
            }
            Self::LowScriptDensity { ratio } => write!(f, "script ratio {ratio:.4}"),
        }
    }
}

/// Character counts gathered in one pass over a text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextProfile {
    /// Unicode scalar values, the unit of every ratio
    pub chars: usize,
    pub newlines: usize,
    /// In-script chars outside marker phrases
    pub script_chars: usize,
    /// Chars covered by marker phrases
    pub marker_chars: usize,
    /// Occurrences per marker group
    pub group_counts: Vec<usize>,
}

/// Content-quality policy applied to decoded record text.
///
/// Boundaries: a text of exactly `min_chars` passes, one char less fails; a
/// newline ratio equal to `max_newline_ratio` passes; a group count equal to
/// `max_count` passes; a script ratio equal to `min_script_ratio` passes.
/// Lengths are decoded character counts, never the declared `Content-Length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub min_chars: usize,
    pub max_newline_ratio: f64,
    pub marker_groups: Vec<MarkerGroup>,
    pub script_ranges: Vec<ScriptRange>,
    pub min_script_ratio: f64,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::korean()
    }
}

impl QualityPolicy {
    /// Thresholds tuned on Korean Common Crawl text
    pub fn korean() -> Self {
        Self {
            min_chars: 256,
            max_newline_ratio: 0.0625,
            marker_groups: vec![
                MarkerGroup::new(&["약관", "개인정보"], 8),
                MarkerGroup::new(&["출장"], 8),
                MarkerGroup::new(&["상품", "고객님"], 8),
            ],
            script_ranges: vec![ScriptRange {
                start: '가',
                end: '힣',
            }],
            min_script_ratio: 0.25,
        }
    }

    fn in_script(&self, c: char) -> bool {
        self.script_ranges.iter().any(|r| r.contains(c))
    }

    /// First marker phrase `rest` starts with, in configuration order
    fn marker_at<'p>(&'p self, rest: &str) -> Option<(usize, &'p str)> {
        self.marker_groups.iter().enumerate().find_map(|(g, group)| {
            group
                .phrases
                .iter()
                .find(|p| !p.is_empty() && rest.starts_with(p.as_str()))
                .map(|p| (g, p.as_str()))
        })
    }

    /// Left-to-right, non-overlapping scan. Marker phrases win over the
    /// newline and script classes at the same position.
    pub fn profile(&self, text: &str) -> TextProfile {
        let mut profile = TextProfile {
            chars: text.chars().count(),
            group_counts: vec![0; self.marker_groups.len()],
            ..TextProfile::default()
        };
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            if let Some((group, phrase)) = self.marker_at(rest) {
                profile.group_counts[group] += 1;
                profile.marker_chars += phrase.chars().count();
                rest = &rest[phrase.len()..];
                continue;
            }
            if c == '\n' {
                profile.newlines += 1;
            } else if self.in_script(c) {
                profile.script_chars += 1;
            }
            rest = &rest[c.len_utf8()..];
        }
        profile
    }

    /// Accept or explain the first failed check
    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        let profile = self.profile(text);
        let chars = profile.chars;
        if chars < self.min_chars {
            return Err(Rejection::TooShort { chars });
        }
        let ratio = |n: usize| if chars == 0 { 0.0 } else { n as f64 / chars as f64 };

        let newline_ratio = ratio(profile.newlines);
        if newline_ratio > self.max_newline_ratio {
            return Err(Rejection::TooManyNewlines {
                ratio: newline_ratio,
            });
        }
        for (group, (&count, limit)) in profile
            .group_counts
            .iter()
            .zip(&self.marker_groups)
            .enumerate()
        {
            if count > limit.max_count {
                return Err(Rejection::MarkerLimit { group, count });
            }
        }
        let script_ratio = ratio(profile.script_chars + profile.marker_chars);
        if script_ratio < self.min_script_ratio {
            return Err(Rejection::LowScriptDensity {
                ratio: script_ratio,
            });
        }
        Ok(())
    }

    pub fn accepts(&self, text: &str) -> bool {
        self.check(text).is_ok()
    }
}
