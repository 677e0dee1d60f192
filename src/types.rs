use anyhow::{Result, anyhow};

/// How a locator chooses among several matching controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchRule {
    /// Exactly one control must match. This is the default.
    #[default]
    Unique,
    /// Take the first match in document order.
    First,
    /// Take the last match in document order.
    Last,
}

/// Addresses a `<select>` control on the page.
///
/// A locator pairs a CSS selector derived from the control's `name`
/// attribute or accessible label with a [`MatchRule`]. Pages commonly reuse
/// the same name across forms, so an unqualified locator refuses to guess
/// when more than one control matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLocator {
    css: String,
    rule: MatchRule,
}

impl ControlLocator {
    /// Locate a control by its `name` attribute.
    pub fn named(name: &str) -> Self {
        Self {
            css: format!("select[name=\"{}\"]", escape_attr(name)),
            rule: MatchRule::Unique,
        }
    }

    /// Locate a control by its accessible label (`aria-label`).
    pub fn labelled(label: &str) -> Self {
        Self {
            css: format!("select[aria-label=\"{}\"]", escape_attr(label)),
            rule: MatchRule::Unique,
        }
    }

    /// Accept the first match when the selector is ambiguous.
    pub fn first(mut self) -> Self {
        self.rule = MatchRule::First;
        self
    }

    /// Accept the last match when the selector is ambiguous.
    pub fn last(mut self) -> Self {
        self.rule = MatchRule::Last;
        self
    }

    /// The CSS selector this locator queries.
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Pick the index to take out of `count` matches.
    pub(crate) fn resolve_index(&self, count: usize) -> Result<usize> {
        match (self.rule, count) {
            (_, 0) => Err(anyhow!("No control matches {}", self.css)),
            (MatchRule::First, _) => Ok(0),
            (MatchRule::Last, n) => Ok(n - 1),
            (MatchRule::Unique, 1) => Ok(0),
            (MatchRule::Unique, n) => Err(anyhow!(
                "{n} controls match {}; qualify the locator with first() or last()",
                self.css
            )),
        }
    }
}

/// Escapes a raw value for use inside a double-quoted CSS attribute selector.
fn escape_attr(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_locators_query_the_name_attribute() {
        assert_eq!(
            ControlLocator::named("type").css(),
            r#"select[name="type"]"#
        );
    }

    #[test]
    fn labelled_locators_query_the_accessible_label() {
        assert_eq!(
            ControlLocator::labelled("kind").css(),
            r#"select[aria-label="kind"]"#
        );
    }

    #[test]
    fn attribute_values_are_escaped() {
        assert_eq!(
            ControlLocator::named(r#"a"b\c"#).css(),
            r#"select[name="a\"b\\c"]"#
        );
    }

    #[test]
    fn a_lone_match_resolves_without_qualifiers() {
        assert_eq!(ControlLocator::named("type").resolve_index(1).unwrap(), 0);
    }

    #[test]
    fn zero_matches_is_an_error() {
        let err = ControlLocator::named("missing").resolve_index(0).unwrap_err();
        assert!(err.to_string().contains(r#"select[name="missing"]"#));
    }

    #[test]
    fn ambiguous_matches_demand_a_qualifier() {
        let err = ControlLocator::labelled("type").resolve_index(3).unwrap_err();
        assert!(err.to_string().contains("first()"));
    }

    #[test]
    fn first_and_last_pick_the_ends() {
        assert_eq!(ControlLocator::named("type").first().resolve_index(5).unwrap(), 0);
        assert_eq!(ControlLocator::labelled("type").last().resolve_index(5).unwrap(), 4);
    }
}
