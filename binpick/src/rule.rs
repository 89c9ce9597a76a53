//! Filename heuristics.
//!
//! When a release carries no structured metadata, the platform an asset was
//! built for has to be read out of its filename. Every label in the
//! [platform catalog](crate::platform::catalog) is turned into a handful of
//! ranked regular expressions; the highest-ranked tier that matches a
//! filename decides both the extracted binary name and the platform.
//!
//! The classification is approximate by nature: `qjs-darwin` really does
//! describe two platforms, and `rcedit-x64.exe` is only assumed to be 64-bit
//! Windows. Ties are resolved by rank first and by rule order second.

use regex::Regex;

use crate::archive::ArchiveFormat;
use crate::error::Result;
use crate::platform::{catalog, Arch, Os, Target};

const SEP: &str = r"[_\s-]+";
const VERSION: &str = r"v?\d+\.\d+\.\d+";
const ANY_NAME: &str = r"(?P<name>[^/]+)";
// keeps `win` from matching inside `windows`
const BOUNDARY: &str = r"(?:[_\s.-]|$)";

const VERSIONED_BONUS: u32 = 10;
const PLAIN_BONUS: u32 = 5;
const EXTENSION_BONUS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub target: Target,
    pub rank: u32,
}

impl Rule {
    fn new(pattern: &str, target: Target, rank: u32) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&format!("(?i){pattern}"))?,
            target,
            rank,
        })
    }

    /// The binary name this rule extracts from `filename`, if it matches.
    pub fn capture(&self, filename: &str) -> Option<String> {
        self.pattern
            .captures(filename)
            .and_then(|c| c.name("name"))
            .map(|m| m.as_str().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub name: String,
    pub rule: Rule,
}

impl MatchResult {
    pub fn target(&self) -> &Target {
        &self.rule.target
    }
}

/// Every rule for one binary-name hint, sorted by rank, highest first.
#[derive(Debug, Clone)]
pub struct RuleSet {
    hint: Option<String>,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn build(hint: Option<&str>) -> Result<Self> {
        let name = match hint {
            Some(h) => format!("(?P<name>{})", regex::escape(h)),
            None => ANY_NAME.to_string(),
        };

        let mut rules = Vec::new();
        for target in catalog() {
            rules.extend(target_rules(&name, target)?);
        }
        rules.extend(windows_exe_rules(&name)?);

        // stable: equal ranks keep catalog order
        rules.sort_by(|a, b| b.rank.cmp(&a.rank));

        tracing::trace!("built {} rules (hint: {:?})", rules.len(), hint);
        Ok(Self {
            hint: hint.map(str::to_string),
            rules,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Match `filename` against the rules.
    ///
    /// Only the highest rank tier that matches at all is considered. With a
    /// hint the first match in that tier is returned alone; without one every
    /// match in the tier is returned, since a single filename can spell
    /// several platforms at once.
    pub fn matches(&self, filename: &str) -> Vec<MatchResult> {
        let mut found = self.top_tier(filename);
        if self.hint.is_some() {
            found.truncate(1);
        }
        found
    }

    /// Pick the match that the machine described by `local` can run.
    ///
    /// Candidates from the winning tier are filtered by platform and the one
    /// whose platform the machine prefers most is returned.
    pub fn guess(&self, filename: &str, local: &[Target]) -> Option<MatchResult> {
        let candidates = self.top_tier(filename);
        if candidates.len() > 1 {
            tracing::trace!(
                "{} matches {} rules at rank {}",
                filename,
                candidates.len(),
                candidates[0].rule.rank
            );
        }

        candidates
            .into_iter()
            .filter_map(|m| preference(m.target(), local).map(|p| (p, m)))
            .min_by_key(|(p, _)| std::cmp::Reverse(*p))
            .map(|(_, m)| m)
    }

    fn top_tier(&self, filename: &str) -> Vec<MatchResult> {
        let mut found: Vec<MatchResult> = Vec::new();
        for rule in &self.rules {
            if let Some(first) = found.first() {
                if first.rule.rank != rule.rank {
                    break;
                }
            }
            if let Some(name) = rule.capture(filename) {
                found.push(MatchResult {
                    name,
                    rule: rule.clone(),
                });
            }
        }
        found
    }
}

/// Rank of the local target compatible with `target`, if any.
pub fn preference(target: &Target, local: &[Target]) -> Option<u32> {
    local
        .iter()
        .filter(|l| l.same_platform(target))
        .map(|l| l.rank)
        .max()
}

/// `x86_64-unknown-linux-gnu` -> `x86[_\s-]+64[_\s-]+unknown[_\s-]+linux[_\s-]+gnu`
fn label_pattern(label: &str) -> String {
    label
        .split(['-', '_'])
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(SEP)
}

fn extension_pattern() -> String {
    let exts: Vec<String> = ArchiveFormat::ALL
        .iter()
        .flat_map(|f| f.extensions())
        .map(|e| regex::escape(e))
        .collect();
    format!("(?:{})", exts.join("|"))
}

fn target_rules(name: &str, target: Target) -> Result<Vec<Rule>> {
    let label = label_pattern(&target.label);
    let templates = [
        (
            format!("^{name}{SEP}{VERSION}{SEP}{label}"),
            VERSIONED_BONUS,
        ),
        (
            format!("^{name}{SEP}{label}{SEP}{VERSION}"),
            VERSIONED_BONUS,
        ),
        (format!("^{name}{SEP}{label}"), PLAIN_BONUS),
    ];

    let ext = extension_pattern();
    let mut rules = Vec::with_capacity(templates.len() * 2);
    for (pattern, bonus) in templates {
        let rank = target.rank + bonus;
        rules.push(Rule::new(
            &format!("{pattern}{ext}$"),
            target.clone(),
            rank + EXTENSION_BONUS,
        )?);
        rules.push(Rule::new(&format!("{pattern}{BOUNDARY}"), target.clone(), rank)?);
    }
    Ok(rules)
}

/// A bare `.exe` is assumed to be 64-bit Windows.
fn windows_exe_rules(name: &str) -> Result<Vec<Rule>> {
    let exe_target = |label: &str| Target::new(label, Os::Windows, Arch::X64, None, 20);

    let mut rules = Vec::new();
    for (alias, _) in crate::platform::aliases(Os::Windows, Arch::X64, None) {
        let pattern = format!(r"^{name}{SEP}{}\.exe$", label_pattern(alias));
        rules.push(Rule::new(&pattern, exe_target(alias), 30)?);
    }
    for (pattern, rank) in [
        (format!(r"^{name}{SEP}{VERSION}\.exe$"), 25),
        (format!(r"^{name}{SEP}(?:x86|x64)\.exe$"), 25),
        (format!(r"^{name}\.exe$"), 21),
    ] {
        rules.push(Rule::new(&pattern, exe_target("windows-exe"), rank)?);
    }
    Ok(rules)
}
