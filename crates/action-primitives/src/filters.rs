//! Element-collection filters.
//!
//! A rule reads `"<sub-selector>[,<attr>]=<pattern>"` or the negated `"...!=<pattern>"`.
//! The sub-element is looked up inside each collected element; its property `attr` (or
//! its text when no attribute is given) is matched against the pattern, a
//! case-insensitive wildcard where `*` spans any run and `?` a single character.

use cdp_adapter::{ElementHandle, PageDriver, Scope};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::errors::ActionError;

#[derive(Debug, Clone)]
pub struct ElementFilter {
    pub selector: String,
    pub attribute: Option<String>,
    pub pattern: String,
    pub negate: bool,
    matcher: Regex,
}

impl ElementFilter {
    /// Parses one rule; malformed rules yield `None`. The operator is the first `=` or
    /// `!=` outside `[...]`, so attribute predicates stay part of the sub-selector.
    pub fn parse(rule: &str) -> Option<Self> {
        let at = outside_brackets(rule, '=').next()?;
        let (lhs, negate) = match rule[..at].strip_suffix('!') {
            Some(lhs) => (lhs, true),
            None => (&rule[..at], false),
        };
        let pattern = rule[at + 1..].trim().to_string();
        let (selector, attribute) = match outside_brackets(lhs, ',').last() {
            Some(comma) => (lhs[..comma].trim(), Some(lhs[comma + 1..].trim().to_string())),
            None => (lhs.trim(), None),
        };
        let attribute = attribute.filter(|attr| !attr.is_empty());
        let matcher = wildcard(&pattern)?;
        Some(Self {
            selector: selector.to_string(),
            attribute,
            pattern,
            negate,
            matcher,
        })
    }

    pub fn parse_all<S: AsRef<str>>(rules: &[S]) -> Vec<Self> {
        rules
            .iter()
            .filter_map(|rule| Self::parse(rule.as_ref()))
            .collect()
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate) != self.negate
    }

    /// Evaluates the rule against one collected element. A missing sub-element rejects.
    pub async fn accepts(
        &self,
        driver: &dyn PageDriver,
        element: &ElementHandle,
    ) -> Result<bool, ActionError> {
        let target = if self.selector.is_empty() {
            Some(element.clone())
        } else {
            driver.locate(Scope::Element(element), &self.selector).await?
        };
        let Some(target) = target else {
            return Ok(false);
        };
        let candidate = match &self.attribute {
            Some(attribute) => property_text(driver.property(&target, attribute).await?),
            None => driver.text(&target).await?,
        };
        Ok(self.is_match(&candidate))
    }
}

/// Applies the rule list to one element. The first rule decides; no rules accept.
pub async fn passes(
    filters: &[ElementFilter],
    driver: &dyn PageDriver,
    element: &ElementHandle,
) -> Result<bool, ActionError> {
    match filters.first() {
        Some(rule) => rule.accepts(driver, element).await,
        None => Ok(true),
    }
}

/// Byte offsets of every `target` that sits outside brackets and quoted values.
fn outside_brackets(text: &str, target: char) -> impl Iterator<Item = usize> + '_ {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    text.char_indices().filter_map(move |(offset, ch)| {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if depth > 0 => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == target && depth == 0 => return Some(offset),
            _ => {}
        }
        None
    })
}

fn property_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn wildcard(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::stub::{StubDriver, StubNode, StubPage};

    #[test]
    fn rules_split_selector_attribute_and_operator() {
        let rules = ElementFilter::parse_all(&["a,href=xxx.com", "a h2 != xxx.com "]);
        assert_eq!(rules.len(), 2);

        assert_eq!(rules[0].selector, "a");
        assert_eq!(rules[0].attribute.as_deref(), Some("href"));
        assert!(!rules[0].negate);
        assert_eq!(rules[0].pattern, "xxx.com");

        assert_eq!(rules[1].selector, "a h2");
        assert_eq!(rules[1].attribute, None);
        assert!(rules[1].negate);
        assert_eq!(rules[1].pattern, "xxx.com");
    }

    #[test]
    fn attribute_predicates_stay_in_the_sub_selector() {
        let rule = ElementFilter::parse("a[href=x],title=*sale*").unwrap();
        assert_eq!(rule.selector, "a[href=x]");
        assert_eq!(rule.attribute.as_deref(), Some("title"));
        assert_eq!(rule.pattern, "*sale*");
        assert!(!rule.negate);

        let rule = ElementFilter::parse("img[alt='a=b, c'] != logo").unwrap();
        assert_eq!(rule.selector, "img[alt='a=b, c']");
        assert_eq!(rule.attribute, None);
        assert!(rule.negate);
        assert_eq!(rule.pattern, "logo");

        assert!(ElementFilter::parse("a[href=x]").is_none());

        let rule = ElementFilter::parse("a,href=*?page=2").unwrap();
        assert_eq!(rule.attribute.as_deref(), Some("href"));
        assert!(rule.is_match("https://shop.test/list?page=2"));
    }

    #[test]
    fn malformed_rules_are_skipped() {
        assert!(ElementFilter::parse("no operator here").is_none());
        assert_eq!(ElementFilter::parse_all(&["bad", "a=ok"]).len(), 1);
    }

    #[test]
    fn wildcard_is_anchored_and_case_insensitive() {
        let rule = ElementFilter::parse("a,href=*Example.com/*").unwrap();
        assert!(rule.is_match("https://example.COM/path"));
        assert!(!rule.is_match("https://example.org/path"));

        let rule = ElementFilter::parse("span!=sold?out").unwrap();
        assert!(!rule.is_match("SOLD OUT"));
        assert!(rule.is_match("in stock"));
    }

    #[tokio::test]
    async fn first_rule_decides_against_sub_elements() {
        let stub = StubDriver::new();
        let page = stub.add_page(
            StubPage::new("stub://shop")
                .node(
                    StubNode::new(".item")
                        .child(StubNode::new("a").prop("href", "https://shop.test/a")),
                )
                .node(StubNode::new(".item").child(StubNode::new("span").text("ad"))),
        );
        let items = stub.locate_all(Scope::Page(&page), ".item").await.unwrap();
        let rules = ElementFilter::parse_all(&["a,href=*shop.test*", "span=never"]);

        assert!(passes(&rules, &stub, &items[0]).await.unwrap());
        // no <a> inside the second item
        assert!(!passes(&rules, &stub, &items[1]).await.unwrap());
        assert!(passes(&[], &stub, &items[1]).await.unwrap());
    }
}
