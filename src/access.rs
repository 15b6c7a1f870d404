//! Access rules attached to a classpath entry.
//!
//! Patterns are internal type paths (`java/lang/*`, `sun/**`) matched against
//! the qualified name of a found type without its `.class` suffix. The first
//! rule whose pattern matches decides.

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessRuleKind {
    Accessible,
    Discouraged,
    NonAccessible,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRule {
    pub pattern: String,
    pub kind: AccessRuleKind,
}

impl AccessRule {
    pub fn new(pattern: impl Into<String>, kind: AccessRuleKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }

    pub fn matches(&self, type_path: &str) -> bool {
        path_match(&self.pattern, type_path)
    }
}

/// Restriction resolved for a found type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRestriction {
    pub rule: AccessRule,
    pub classpath_entry_name: String,
}

impl AccessRestriction {
    pub fn is_forbidden(&self) -> bool {
        self.rule.kind == AccessRuleKind::NonAccessible
    }
}

impl fmt::Display for AccessRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.rule.kind {
            AccessRuleKind::Accessible => "allowed",
            AccessRuleKind::Discouraged => "discouraged",
            AccessRuleKind::NonAccessible => "not accessible",
        };
        write!(
            f,
            "access to '{}' is {} by {}",
            self.rule.pattern, verb, self.classpath_entry_name
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRuleSet {
    rules: Vec<AccessRule>,
    classpath_entry_name: String,
}

impl AccessRuleSet {
    pub fn new(rules: Vec<AccessRule>, classpath_entry_name: impl Into<String>) -> Self {
        Self {
            rules,
            classpath_entry_name: classpath_entry_name.into(),
        }
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolves the restriction for `type_path`, e.g. `sun/misc/Unsafe`.
    pub fn violated_restriction(&self, type_path: &str) -> Option<AccessRestriction> {
        let rule = self.rules.iter().find(|rule| rule.matches(type_path))?;
        if rule.kind == AccessRuleKind::Accessible {
            return None;
        }
        Some(AccessRestriction {
            rule: rule.clone(),
            classpath_entry_name: self.classpath_entry_name.clone(),
        })
    }
}

/// Segment-wise match of `/` separated paths. `*` and `?` stay inside one
/// segment, `**` spans any number of segments, and a trailing `/` on the
/// pattern stands for `/**`.
pub fn path_match(pattern: &str, path: &str) -> bool {
    let mut pattern_segments: Vec<&str> = pattern.split('/').collect();
    if pattern.ends_with('/') {
        if let Some(last) = pattern_segments.last_mut() {
            *last = "**";
        }
    }
    let path_segments: Vec<&str> = path.split('/').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    // Backtracking point for the most recent `**`.
    let (mut p, mut s) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while s < path.len() {
        if p < pattern.len() && pattern[p] == "**" {
            star = Some((p, s));
            p += 1;
        } else if p < pattern.len() && segment_match(pattern[p], path[s]) {
            p += 1;
            s += 1;
        } else if let Some((star_p, star_s)) = star {
            p = star_p + 1;
            s = star_s + 1;
            star = Some((star_p, star_s + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|segment| *segment == "**")
}

fn segment_match(pattern: &str, segment: &str) -> bool {
    let pattern = pattern.as_bytes();
    let segment = segment.as_bytes();
    let (mut p, mut s) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while s < segment.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == segment[s]) {
            p += 1;
            s += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, s));
            p += 1;
        } else if let Some((star_p, star_s)) = star {
            p = star_p + 1;
            s = star_s + 1;
            star = Some((star_p, star_s + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_star_stays_in_segment() {
        assert!(path_match("java/lang/*", "java/lang/String"));
        assert!(!path_match("java/lang/*", "java/lang/reflect/Method"));
        assert!(path_match("java/lang/Str?ng", "java/lang/String"));
    }

    #[test]
    fn double_star_spans_segments() {
        assert!(path_match("sun/**", "sun/misc/Unsafe"));
        assert!(path_match("**/internal/**", "jdk/internal/misc/VM"));
        assert!(!path_match("**/internal/**", "jdk/internals/VM"));
        assert!(path_match("com/sun/", "com/sun/net/httpserver/HttpServer"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = AccessRuleSet::new(
            vec![
                AccessRule::new("sun/misc/Signal", AccessRuleKind::Accessible),
                AccessRule::new("sun/**", AccessRuleKind::NonAccessible),
                AccessRule::new("jdk/**", AccessRuleKind::Discouraged),
            ],
            "jrt-fs",
        );

        assert!(rules.violated_restriction("sun/misc/Signal").is_none());
        let forbidden = rules
            .violated_restriction("sun/misc/Unsafe")
            .expect("restriction");
        assert!(forbidden.is_forbidden());
        assert_eq!(forbidden.classpath_entry_name, "jrt-fs");

        let discouraged = rules
            .violated_restriction("jdk/net/Sockets")
            .expect("restriction");
        assert_eq!(discouraged.rule.kind, AccessRuleKind::Discouraged);
        assert!(rules.violated_restriction("java/lang/Object").is_none());
    }
}
