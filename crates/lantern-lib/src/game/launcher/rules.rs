/// Eligibility rules for conditional libraries and argument tokens
use crate::game::installer::types::{Arch, OsType};
use crate::game::launcher::version_parser::{Rule, RuleAction};
use regex::Regex;
use std::collections::HashMap;

/// Features this launcher never offers. A rule that mentions any of them
/// rejects the entry outright, whatever came before it.
pub const UNSUPPORTED_FEATURES: &[&str] = &[
    "has_quick_plays_support",
    "is_quick_play_singleplayer",
    "is_quick_play_multiplayer",
    "is_quick_play_realms",
];

/// Platform and feature state that rules are evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub os: OsType,
    pub arch: Arch,
    /// Host OS version string matched by `os.version` regexes.
    pub os_version: String,
    pub features: HashMap<String, bool>,
}

impl RuleContext {
    pub fn new(os: OsType, arch: Arch) -> Self {
        Self {
            os,
            arch,
            os_version: String::new(),
            features: HashMap::new(),
        }
    }

    /// Context for the running host with no optional features enabled.
    pub fn current() -> Self {
        Self {
            os_version: sysinfo::System::os_version().unwrap_or_default(),
            ..Self::new(OsType::current(), Arch::current())
        }
    }

    pub fn with_feature(mut self, name: &str, enabled: bool) -> Self {
        self.features.insert(name.to_string(), enabled);
        self
    }
}

/// Decide whether a rule-guarded entry applies.
///
/// An empty list always applies. Otherwise the last matching rule decides,
/// starting from "does not apply".
pub fn evaluate_rules(rules: &[Rule], ctx: &RuleContext) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;

    for rule in rules {
        if let Some(features) = &rule.features {
            if features
                .keys()
                .any(|k| UNSUPPORTED_FEATURES.contains(&k.as_str()))
            {
                return false;
            }
        }

        if rule_matches(rule, ctx) {
            allowed = rule.action == RuleAction::Allow;
        }
    }

    allowed
}

/// Convenience for optional rule lists on libraries.
pub fn applies(rules: Option<&Vec<Rule>>, ctx: &RuleContext) -> bool {
    rules.map(|r| evaluate_rules(r, ctx)).unwrap_or(true)
}

fn rule_matches(rule: &Rule, ctx: &RuleContext) -> bool {
    if let Some(os_rule) = &rule.os {
        if let Some(name) = &os_rule.name {
            if name != ctx.os.as_str() {
                return false;
            }
        }

        if let Some(arch) = &os_rule.arch {
            let wanted = if arch == "x86" { "32" } else { "64" };
            if wanted != ctx.arch.bits() {
                return false;
            }
        }

        if let Some(version_expr) = &os_rule.version {
            match Regex::new(version_expr) {
                Ok(re) if re.is_match(&ctx.os_version) => {}
                _ => return false,
            }
        }
    }

    if let Some(features) = &rule.features {
        for (name, wanted) in features {
            let actual = ctx.features.get(name).copied().unwrap_or(false);
            if actual != *wanted {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::launcher::version_parser::OsRule;

    fn os_rule(action: RuleAction, name: &str) -> Rule {
        Rule {
            action,
            os: Some(OsRule {
                name: Some(name.to_string()),
                version: None,
                arch: None,
            }),
            features: None,
        }
    }

    fn feature_rule(name: &str) -> Rule {
        let mut features = HashMap::new();
        features.insert(name.to_string(), true);
        Rule {
            action: RuleAction::Allow,
            os: None,
            features: Some(features),
        }
    }

    #[test]
    fn empty_rules_always_apply() {
        for os in [OsType::Windows, OsType::Linux, OsType::MacOSArm64] {
            assert!(evaluate_rules(&[], &RuleContext::new(os, Arch::X64)));
        }
    }

    #[test]
    fn last_match_wins() {
        let ctx = RuleContext::new(OsType::MacOS, Arch::X64);
        let rules = vec![
            Rule {
                action: RuleAction::Allow,
                os: None,
                features: None,
            },
            os_rule(RuleAction::Disallow, "osx"),
        ];
        assert!(!evaluate_rules(&rules, &ctx));

        let linux = RuleContext::new(OsType::Linux, Arch::X64);
        assert!(evaluate_rules(&rules, &linux));
    }

    #[test]
    fn unmatched_allow_rejects() {
        let ctx = RuleContext::new(OsType::Linux, Arch::X64);
        assert!(!evaluate_rules(&[os_rule(RuleAction::Allow, "windows")], &ctx));
    }

    #[test]
    fn unsupported_feature_overrides_os_allow() {
        let ctx = RuleContext::new(OsType::Windows, Arch::X64)
            .with_feature("is_quick_play_multiplayer", true);
        let rules = vec![
            os_rule(RuleAction::Allow, "windows"),
            feature_rule("is_quick_play_multiplayer"),
        ];
        assert!(!evaluate_rules(&rules, &ctx));

        // order does not matter either
        let reversed: Vec<Rule> = rules.into_iter().rev().collect();
        assert!(!evaluate_rules(&reversed, &ctx));
    }

    #[test]
    fn known_features_follow_context() {
        let rule = feature_rule("has_custom_resolution");
        let plain = RuleContext::new(OsType::Linux, Arch::X64);
        assert!(!evaluate_rules(std::slice::from_ref(&rule), &plain));

        let custom = plain.with_feature("has_custom_resolution", true);
        assert!(evaluate_rules(&[rule], &custom));
    }

    #[test]
    fn arch_and_version_constraints() {
        let rule = Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: None,
                version: Some("^10\\.".to_string()),
                arch: Some("x86".to_string()),
            }),
            features: None,
        };

        let mut ctx = RuleContext::new(OsType::Windows, Arch::X86);
        ctx.os_version = "10.0.19045".to_string();
        assert!(evaluate_rules(std::slice::from_ref(&rule), &ctx));

        ctx.arch = Arch::X64;
        assert!(!evaluate_rules(std::slice::from_ref(&rule), &ctx));

        ctx.arch = Arch::X86;
        ctx.os_version = "6.1".to_string();
        assert!(!evaluate_rules(&[rule], &ctx));
    }
}
