//! Minimal robots.txt interpreter.
//!
//! Understands `User-agent`, `Allow` and `Disallow` lines. Patterns are
//! prefix matches unless they contain `*`, in which case they are turned
//! into an anchored regex (`$` at the end of a pattern anchors the end of
//! the path).

use std::collections::BTreeMap;

use regex::Regex;

/// Wildcard user-agent group name.
pub const WILDCARD_AGENT: &str = "*";

/// Allow and disallow patterns for a single user-agent group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleGroup {
    /// `Allow:` patterns in file order.
    pub allow: Vec<String>,
    /// `Disallow:` patterns in file order.
    pub disallow: Vec<String>,
}

/// Parsed robots.txt, keyed by lower-cased user-agent name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRules {
    groups: BTreeMap<String, RuleGroup>,
}

impl RobotsRules {
    /// Parses the body of a robots.txt file.
    ///
    /// Consecutive `User-agent` lines share the rules that follow them.
    /// Directives before any `User-agent` line apply to `*`.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut groups: BTreeMap<String, RuleGroup> = BTreeMap::new();
        groups.insert(WILDCARD_AGENT.to_owned(), RuleGroup::default());

        let mut current_agents: Vec<String> = vec![WILDCARD_AGENT.to_owned()];
        let mut in_agent_block = false;

        for raw_line in body.lines() {
            // Strip trailing comments.
            let line = raw_line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_ascii_lowercase();
                    if !in_agent_block {
                        current_agents.clear();
                    }
                    groups.entry(agent.clone()).or_default();
                    current_agents.push(agent);
                    in_agent_block = true;
                }
                "allow" | "disallow" => {
                    in_agent_block = false;
                    for agent in &current_agents {
                        let group = groups.entry(agent.clone()).or_default();
                        if directive == "allow" {
                            group.allow.push(value.to_owned());
                        } else {
                            group.disallow.push(value.to_owned());
                        }
                    }
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }

        Self { groups }
    }

    /// Returns the rule group applying to `user_agent`, falling back to `*`.
    ///
    /// A group applies when its name equals, or is a prefix of, the
    /// lowercased product token of the user agent (`DataFetchBot/1.0`
    /// matches `datafetchbot` and `datafetch`, not `bot`). The longest
    /// matching name wins.
    #[must_use]
    pub fn group_for(&self, user_agent: &str) -> Option<&RuleGroup> {
        let product = user_agent
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        self.groups
            .iter()
            .filter(|(name, _)| {
                name.as_str() != WILDCARD_AGENT
                    && !name.is_empty()
                    && product.starts_with(name.as_str())
            })
            .max_by_key(|(name, _)| name.len())
            .map(|(_, group)| group)
            .or_else(|| self.groups.get(WILDCARD_AGENT))
    }

    /// Returns whether `path` may be fetched by `user_agent`.
    ///
    /// Allow rules are checked before disallow rules, so an allow entry for
    /// a sub-path wins over a broader disallow. Anything unmatched is
    /// allowed.
    #[must_use]
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        if group.allow.iter().any(|p| path_matches(path, p)) {
            return true;
        }
        if group.disallow.iter().any(|p| path_matches(path, p)) {
            return false;
        }
        true
    }

    /// Number of user-agent groups, including the implicit `*` group.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Checks a path against one robots.txt pattern.
///
/// An empty pattern never matches (an empty `Disallow:` allows everything).
#[must_use]
pub fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    if pattern.contains('*') {
        let anchored = pattern.ends_with('$');
        let body = pattern.trim_end_matches('$');
        let mut regex_src = String::from("^");
        regex_src.push_str(&regex::escape(body).replace(r"\*", ".*"));
        if anchored {
            regex_src.push('$');
        }
        return Regex::new(&regex_src).is_ok_and(|re| re.is_match(path));
    }

    path.starts_with(pattern)
}
