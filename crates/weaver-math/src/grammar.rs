//! Delimiter grammar: raw authored math ↔ [`Expression`].
//!
//! Rules are scanned in list order and the first rule whose opening and
//! closing delimiters both fit the trimmed input wins. Ordering, not
//! delimiter length, decides between overlapping rules such as `$$` and `$`.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{MathError, Result};

/// A parsed math expression without its delimiters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    /// Trimmed TeX source.
    pub text: String,
    /// Block (`true`) or inline (`false`) typesetting.
    pub display_mode: bool,
}

impl Expression {
    pub fn new(text: impl Into<String>, display_mode: bool) -> Self {
        Self {
            text: text.into(),
            display_mode,
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    pub fn display(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    /// No expression was authored.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One recognized authored syntax for math.
///
/// Serialized as an `[open, close, display_mode]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(SmolStr, SmolStr, bool)",
    into = "(SmolStr, SmolStr, bool)"
)]
pub struct DelimiterRule {
    pub open: SmolStr,
    pub close: SmolStr,
    pub display_mode: bool,
}

impl DelimiterRule {
    pub fn new(open: impl Into<SmolStr>, close: impl Into<SmolStr>, display_mode: bool) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            display_mode,
        }
    }

    /// Does this rule wrap the (already trimmed) input?
    fn wraps(&self, trimmed: &str) -> bool {
        trimmed.starts_with(self.open.as_str()) && trimmed.ends_with(self.close.as_str())
    }

    /// Text between the delimiters of an input this rule [wraps](Self::wraps).
    ///
    /// When the delimiters overlap (`$$` under `$$…$$`) the bounds are
    /// swapped, so the overlapping region itself is the content.
    fn inner<'a>(&self, trimmed: &'a str) -> &'a str {
        let start = self.open.len();
        let end = trimmed.len() - self.close.len();
        // Both offsets are char boundaries: the prefix and suffix matched.
        &trimmed[start.min(end)..start.max(end)]
    }

    /// Wrap `text` in this rule's delimiters.
    pub fn wrap(&self, text: &str) -> String {
        let text = text.trim();
        let mut out = String::with_capacity(self.open.len() + text.len() + self.close.len());
        out.push_str(&self.open);
        out.push_str(text);
        out.push_str(&self.close);
        out
    }
}

impl From<(SmolStr, SmolStr, bool)> for DelimiterRule {
    fn from((open, close, display_mode): (SmolStr, SmolStr, bool)) -> Self {
        Self {
            open,
            close,
            display_mode,
        }
    }
}

impl From<DelimiterRule> for (SmolStr, SmolStr, bool) {
    fn from(rule: DelimiterRule) -> Self {
        (rule.open, rule.close, rule.display_mode)
    }
}

/// Default delimiters: `\(…\)`, `\[…\]`, `$$…$$`, `$…$`.
pub fn default_delimiters() -> Vec<DelimiterRule> {
    vec![
        DelimiterRule::new(r"\(", r"\)", false),
        DelimiterRule::new(r"\[", r"\]", true),
        DelimiterRule::new("$$", "$$", true),
        DelimiterRule::new("$", "$", false),
    ]
}

/// Result of [`parse_with_rule`]: the expression and the rule that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMath<'r> {
    pub expression: Expression,
    /// `None` for bare (undelimited) input.
    pub rule: Option<&'r DelimiterRule>,
}

/// Parse raw authored math into an [`Expression`].
///
/// Undelimited input is returned as-is (trimmed) in inline mode.
pub fn parse(raw: &str, rules: &[DelimiterRule]) -> Expression {
    parse_with_rule(raw, rules).expression
}

/// Like [`parse`], but also reports which delimiter rule matched.
pub fn parse_with_rule<'r>(raw: &str, rules: &'r [DelimiterRule]) -> ParsedMath<'r> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedMath {
            expression: Expression::default(),
            rule: None,
        };
    }

    match rules.iter().find(|rule| rule.wraps(trimmed)) {
        Some(rule) => {
            ParsedMath {
                expression: Expression::new(rule.inner(trimmed).trim(), rule.display_mode),
                rule: Some(rule),
            }
        }
        None => ParsedMath {
            expression: Expression::inline(trimmed),
            rule: None,
        },
    }
}

/// Generate raw authored math for `expr` using the first rule of its mode.
pub fn generate(expr: &Expression, rules: &[DelimiterRule]) -> Result<String> {
    let rule = rule_for_mode(rules, expr.display_mode).ok_or(MathError::GrammarMismatch {
        display_mode: expr.display_mode,
    })?;
    Ok(rule.wrap(&expr.text))
}

/// First rule producing the given display mode.
pub fn rule_for_mode(rules: &[DelimiterRule], display_mode: bool) -> Option<&DelimiterRule> {
    rules.iter().find(|rule| rule.display_mode == display_mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_inline_parens() {
        let rules = default_delimiters();
        let expr = parse(r"\(x^2\)", &rules);
        assert_eq!(expr, Expression::inline("x^2"));
        assert_eq!(generate(&expr, &rules).unwrap(), r"\(x^2\)");
    }

    #[test]
    fn parses_display_dollars_and_trims() {
        let rules = default_delimiters();
        assert_eq!(parse("$$ a+b $$", &rules), Expression::display("a+b"));
        assert_eq!(parse("  \\[ \\int f \\]\n", &rules), Expression::display(r"\int f"));
    }

    #[test]
    fn empty_input() {
        let rules = default_delimiters();
        assert_eq!(parse("", &rules), Expression::default());
        assert_eq!(parse("   \t", &rules), Expression::default());
    }

    #[test]
    fn bare_pair_yields_empty_text() {
        let rules = default_delimiters();
        let parsed = parse_with_rule(r"\(\)", &rules);
        assert!(parsed.expression.is_empty());
        assert_eq!(parsed.rule, Some(&rules[0]));

        assert_eq!(parse("$$  $$", &rules), Expression::display(""));
    }

    #[test]
    fn undelimited_is_inline() {
        let rules = default_delimiters();
        let parsed = parse_with_rule("  a + b ", &rules);
        assert_eq!(parsed.expression, Expression::inline("a + b"));
        assert!(parsed.rule.is_none());
    }

    #[test]
    fn overlapping_delimiters_keep_their_text() {
        let rules = default_delimiters();
        let parsed = parse_with_rule("$$", &rules);
        assert_eq!(parsed.expression, Expression::display("$$"));
        assert_eq!(parsed.rule, Some(&rules[2]));

        assert_eq!(parse("$$$", &rules), Expression::display("$"));
        assert_eq!(parse("$", &rules), Expression::inline("$"));
    }

    #[test]
    fn first_match_wins_over_longest_match() {
        let double_first = vec![
            DelimiterRule::new("$$", "$$", true),
            DelimiterRule::new("$", "$", false),
        ];
        let single_first = vec![
            DelimiterRule::new("$", "$", false),
            DelimiterRule::new("$$", "$$", true),
        ];

        assert_eq!(parse("$$x$$", &double_first), Expression::display("x"));
        assert_eq!(parse("$$x$$", &single_first), Expression::inline("$x$"));
    }

    #[test]
    fn generate_uses_first_rule_of_mode() {
        let rules = default_delimiters();
        assert_eq!(
            generate(&Expression::display(" y "), &rules).unwrap(),
            r"\[y\]"
        );
    }

    #[test]
    fn generate_without_rule_for_mode_fails() {
        let rules = vec![DelimiterRule::new("$", "$", false)];
        let err = generate(&Expression::display("y"), &rules).unwrap_err();
        assert!(matches!(
            err,
            MathError::GrammarMismatch { display_mode: true }
        ));
    }

    #[test]
    fn rules_deserialize_from_triples() {
        let rules: Vec<DelimiterRule> =
            serde_json::from_str(r#"[["\\(", "\\)", false], ["$$", "$$", true]]"#).unwrap();
        assert_eq!(rules[0], DelimiterRule::new(r"\(", r"\)", false));
        assert_eq!(rules[1], DelimiterRule::new("$$", "$$", true));
    }

    fn arb_rules() -> impl Strategy<Value = Vec<DelimiterRule>> {
        let pool = vec![
            DelimiterRule::new(r"\(", r"\)", false),
            DelimiterRule::new(r"\[", r"\]", true),
            DelimiterRule::new("$$", "$$", true),
            DelimiterRule::new("[math]", "[/math]", false),
            DelimiterRule::new("<<", ">>", true),
        ];
        Just(pool)
            .prop_shuffle()
            .prop_filter("both modes covered", |rules| {
                rule_for_mode(rules, true).is_some() && rule_for_mode(rules, false).is_some()
            })
    }

    proptest! {
        /// Generated math parses back to the same expression.
        ///
        /// The rule pool has no delimiter that is a prefix of another, so no
        /// earlier rule can capture a later rule's output.
        #[test]
        fn prop_generate_parse_roundtrip(
            rules in arb_rules(),
            text in "[a-z0-9^_+=(){} ]{0,24}",
            display_mode in any::<bool>(),
        ) {
            let expr = Expression::new(text.trim(), display_mode);
            let raw = generate(&expr, &rules).unwrap();
            prop_assert_eq!(parse(&raw, &rules), expr);
        }
    }
}
