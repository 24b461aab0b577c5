//! Classification rules mapping documentation units to entry kinds.
//!
//! Rules are tried in priority order: built-ins first, then rules from
//! `[[extract.rules]]`. A unit no rule claims is a [`EntryKind::Section`].

use docsetgen_shared::{DocsetError, EntryKind, Result, RuleConfig, UnitShape};
use scraper::{ElementRef, Selector};

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A contextual signal that classifies a unit.
#[derive(Debug, Clone)]
pub enum Signal {
    /// The anchor's identifier starts with this prefix.
    IdPrefix(String),
    /// This selector matches an element inside the unit.
    Marker(Selector),
    /// The page's file stem starts with this prefix.
    Page(String),
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: EntryKind,
    pub shape: UnitShape,
    /// The rule applies when any signal fires.
    pub signals: Vec<Signal>,
    /// Structured label preferred over the unit's visible text.
    pub label: Option<Selector>,
}

/// Where an anchor was found, as seen by the rules.
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub unit: ElementRef<'a>,
    pub shape: UnitShape,
    pub id: &'a str,
    pub page_stem: &'a str,
}

impl Rule {
    /// Build a rule from its `[[extract.rules]]` form.
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let mut signals: Vec<Signal> = config
            .id_prefixes
            .iter()
            .map(|p| Signal::IdPrefix(p.clone()))
            .collect();
        for marker in &config.markers {
            signals.push(Signal::Marker(parse_selector(marker)?));
        }
        signals.extend(config.pages.iter().map(|p| Signal::Page(p.clone())));

        if signals.is_empty() {
            return Err(DocsetError::config(format!(
                "rule for {} has no id_prefixes, markers, or pages",
                config.kind
            )));
        }

        Ok(Self {
            kind: config.kind,
            shape: config.shape,
            signals,
            label: config.label.as_deref().map(parse_selector).transpose()?,
        })
    }

    /// Whether this rule claims the unit.
    pub fn matches(&self, ctx: &UnitContext<'_>) -> bool {
        let shape_ok = match self.shape {
            UnitShape::Any => true,
            shape => shape == ctx.shape,
        };
        shape_ok
            && self.signals.iter().any(|signal| match signal {
                Signal::IdPrefix(prefix) => ctx.id.starts_with(prefix.as_str()),
                Signal::Marker(sel) => ctx.unit.select(sel).next().is_some(),
                Signal::Page(prefix) => ctx.page_stem.starts_with(prefix.as_str()),
            })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| DocsetError::config(format!("invalid selector {css:?}: {e}")))
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Holds rules in priority order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// Built-in table for the NixOS and nixpkgs manuals:
/// `(kind, shape, id prefixes, markers, pages, label)`.
const BUILTIN: &[(
    EntryKind,
    UnitShape,
    &[&str],
    &[&str],
    &[&str],
    Option<&str>,
)] = &[
    (
        EntryKind::Option,
        UnitShape::Term,
        &["opt-"],
        &["code.option"],
        &["options"],
        Some("code.option"),
    ),
    (
        EntryKind::Function,
        UnitShape::Any,
        &["function-library-"],
        &["code.function"],
        &[],
        Some("code.function"),
    ),
    (
        EntryKind::Environment,
        UnitShape::Heading,
        &["sec-functions-library-"],
        &[],
        &[],
        Some("code.literal"),
    ),
    (
        EntryKind::Package,
        UnitShape::Term,
        &["pkg-"],
        &["code.package"],
        &[],
        Some("code.package"),
    ),
    (
        EntryKind::Variable,
        UnitShape::Term,
        &["var-"],
        &["code.varname", "code.envar"],
        &[],
        Some("code.varname, code.envar"),
    ),
    (
        EntryKind::Command,
        UnitShape::Term,
        &["cmd-"],
        &["code.command"],
        &[],
        Some("code.command"),
    ),
];

impl RuleSet {
    /// The built-in rules only.
    pub fn builtin() -> Self {
        let rules = BUILTIN
            .iter()
            .map(|(kind, shape, ids, markers, pages, label)| {
                let config = RuleConfig {
                    kind: *kind,
                    shape: *shape,
                    id_prefixes: ids.iter().map(|s| s.to_string()).collect(),
                    markers: markers.iter().map(|s| s.to_string()).collect(),
                    pages: pages.iter().map(|s| s.to_string()).collect(),
                    label: label.map(String::from),
                };
                Rule::from_config(&config).expect("built-in rule is valid")
            })
            .collect();
        Self { rules }
    }

    /// Built-ins followed by configured rules.
    pub fn with_extra(extra: &[RuleConfig]) -> Result<Self> {
        let mut set = Self::builtin();
        for config in extra {
            set.rules.push(Rule::from_config(config)?);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule claiming the unit, if any.
    pub fn classify(&self, ctx: &UnitContext<'_>) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(ctx))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        let sel = Selector::parse(css).unwrap();
        doc.select(&sel).next().unwrap()
    }

    #[test]
    fn builtin_loads() {
        let rules = RuleSet::builtin();
        assert_eq!(rules.len(), BUILTIN.len());
    }

    #[test]
    fn option_by_id_prefix() {
        let doc = Html::parse_document(r#"<dl><dt><a id="opt-foo"></a>foo</dt></dl>"#);
        let ctx = UnitContext {
            unit: first(&doc, "dt"),
            shape: UnitShape::Term,
            id: "opt-foo",
            page_stem: "index",
        };
        let rules = RuleSet::builtin();
        let rule = rules.classify(&ctx).expect("classified");
        assert_eq!(rule.kind, EntryKind::Option);
    }

    #[test]
    fn shape_restricts_rules() {
        // An option-like id on a heading is not an option.
        let doc = Html::parse_document(r#"<h2 id="opt-intro">Options intro</h2>"#);
        let ctx = UnitContext {
            unit: first(&doc, "h2"),
            shape: UnitShape::Heading,
            id: "opt-intro",
            page_stem: "options",
        };
        assert!(RuleSet::builtin().classify(&ctx).is_none());
    }

    #[test]
    fn marker_signal() {
        let doc = Html::parse_document(
            r#"<h3 id="x"><code class="function">lib.lists.map</code></h3>"#,
        );
        let ctx = UnitContext {
            unit: first(&doc, "h3"),
            shape: UnitShape::Heading,
            id: "x",
            page_stem: "index",
        };
        let rules = RuleSet::builtin();
        let rule = rules.classify(&ctx).expect("classified");
        assert_eq!(rule.kind, EntryKind::Function);
    }

    #[test]
    fn extra_rules_follow_builtins() {
        let extra = RuleConfig {
            kind: EntryKind::Package,
            shape: UnitShape::Any,
            id_prefixes: vec!["package-".into()],
            markers: vec![],
            pages: vec![],
            label: None,
        };
        let rules = RuleSet::with_extra(&[extra]).unwrap();
        assert_eq!(rules.len(), BUILTIN.len() + 1);

        let doc = Html::parse_document(r#"<h2 id="package-hello">hello</h2>"#);
        let ctx = UnitContext {
            unit: first(&doc, "h2"),
            shape: UnitShape::Heading,
            id: "package-hello",
            page_stem: "index",
        };
        assert_eq!(rules.classify(&ctx).unwrap().kind, EntryKind::Package);
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let bad = RuleConfig {
            kind: EntryKind::Command,
            shape: UnitShape::Term,
            id_prefixes: vec![],
            markers: vec!["code[".into()],
            pages: vec![],
            label: None,
        };
        let err = RuleSet::with_extra(&[bad]).unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
    }

    #[test]
    fn rule_without_signals_is_rejected() {
        let empty = RuleConfig {
            kind: EntryKind::Command,
            shape: UnitShape::Term,
            id_prefixes: vec![],
            markers: vec![],
            pages: vec![],
            label: Some("code".into()),
        };
        assert!(Rule::from_config(&empty).is_err());
    }
}
