//! Style computation and cascade

use super::css::{Combinator, Compound, Declaration, Selector, Stylesheet};
use super::dom::Element;
use std::collections::HashMap;

/// Properties a child takes from its parent when it declares none
const INHERITED: &[&str] = &[
    "color",
    "cursor",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "line-height",
    "list-style-type",
    "text-align",
    "text-transform",
    "visibility",
    "white-space",
];

/// Where a block of declarations came from, lowest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    Master,
    Author,
    Inline,
}

/// Declarations of one rule that matched an element
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedDeclarations {
    pub origin: Origin,
    pub specificity: (u32, u32, u32),
    pub order: usize,
    pub declarations: Vec<Declaration>,
}

/// Computed styles for an element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedStyle {
    properties: HashMap<String, String>,
}

impl ComputedStyle {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties.get(property).map(String::as_str)
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(property.into(), value.into());
    }

    /// `display`, defaulting to `inline`
    pub fn display(&self) -> &str {
        self.get("display").unwrap_or("inline")
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Collect the rules of `sheet` whose selectors match `element`
pub fn match_rules(sheet: &Stylesheet, origin: Origin, element: &Element) -> Vec<MatchedDeclarations> {
    sheet
        .rules
        .iter()
        .enumerate()
        .filter_map(|(order, rule)| {
            let specificity = rule
                .selectors
                .iter()
                .filter(|selector| selector_matches(selector, element))
                .map(Selector::specificity)
                .max()?;
            Some(MatchedDeclarations {
                origin,
                specificity,
                order,
                declarations: rule.declarations.clone(),
            })
        })
        .collect()
}

/// Check if a selector matches an element, walking ancestors right to left
pub fn selector_matches(selector: &Selector, element: &Element) -> bool {
    let parts = selector.parts();
    !parts.is_empty() && matches_from(parts, parts.len() - 1, element)
}

fn matches_from(parts: &[(Combinator, Compound)], index: usize, element: &Element) -> bool {
    let (combinator, compound) = &parts[index];
    if !compound_matches(compound, element) {
        return false;
    }
    if index == 0 {
        return true;
    }

    match combinator {
        Combinator::Child => element
            .parent()
            .is_some_and(|parent| matches_from(parts, index - 1, &parent)),
        Combinator::Descendant => {
            let mut ancestor = element.parent();
            while let Some(current) = ancestor {
                if matches_from(parts, index - 1, &current) {
                    return true;
                }
                ancestor = current.parent();
            }
            false
        }
    }
}

fn compound_matches(compound: &Compound, element: &Element) -> bool {
    if element.is_text() {
        return false;
    }
    if let Some(tag) = &compound.tag_name {
        if !element.tag_name().eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if element.id().as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    let classes = element.classes();
    compound.classes.iter().all(|class| classes.contains(class))
}

/// Resolve matched declarations into a computed style.
///
/// Blocks apply in (origin, specificity, source order); later wins.
/// Inherited properties start from `parent`, and `inherit` copies any
/// property from it.
pub fn cascade(matched: &[MatchedDeclarations], parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    if let Some(parent) = parent {
        for property in INHERITED {
            if let Some(value) = parent.get(property) {
                style.set(*property, value);
            }
        }
    }

    let mut ordered: Vec<&MatchedDeclarations> = matched.iter().collect();
    ordered.sort_by_key(|m| (m.origin, m.specificity, m.order));

    for block in ordered {
        for declaration in &block.declarations {
            match declaration.value.as_str() {
                "inherit" => match parent.and_then(|p| p.get(&declaration.property)) {
                    Some(value) => style.set(declaration.property.clone(), value),
                    None => {
                        style.properties.remove(&declaration.property);
                    }
                },
                value => style.set(declaration.property.clone(), value),
            }
        }
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn tree() -> (Rc<Element>, Rc<Element>, Rc<Element>) {
        let body = Element::new("body", [("class", "page")]);
        let section = Element::new("section", [("id", "main")]);
        let item = Element::new("p", [("class", "item note")]);
        body.append_child(&section);
        section.append_child(&item);
        (body, section, item)
    }

    fn matches(selector: &str, element: &Element) -> bool {
        selector_matches(&Selector::parse(selector).unwrap(), element)
    }

    #[test]
    fn test_compound_matching() {
        let (_, _, item) = tree();
        assert!(matches("p", &item));
        assert!(matches("P.item.note", &item));
        assert!(matches("*", &item));
        assert!(!matches("p.other", &item));
        assert!(!matches("div", &item));
    }

    #[test]
    fn test_combinators() {
        let (_, section, item) = tree();
        assert!(matches(".page p", &item));
        assert!(matches("#main > .item", &item));
        assert!(!matches(".page > p", &item));
        assert!(matches("body section", &section));
        assert!(!matches("section section", &section));
    }

    #[test]
    fn test_cascade_order() {
        let block = |origin, specificity, order, value: &str| MatchedDeclarations {
            origin,
            specificity,
            order,
            declarations: vec![Declaration::new("color", value)],
        };
        let matched = vec![
            block(Origin::Inline, (0, 0, 0), 0, "inline"),
            block(Origin::Author, (1, 0, 0), 0, "id"),
            block(Origin::Author, (0, 1, 0), 5, "class"),
            block(Origin::Master, (9, 9, 9), 9, "master"),
        ];
        assert_eq!(cascade(&matched[1..], None).get("color"), Some("id"));
        assert_eq!(cascade(&matched, None).get("color"), Some("inline"));
    }

    #[test]
    fn test_inheritance() {
        let mut parent = ComputedStyle::default();
        parent.set("color", "red");
        parent.set("display", "block");
        parent.set("margin", "4px");

        let matched = vec![MatchedDeclarations {
            origin: Origin::Author,
            specificity: (0, 0, 1),
            order: 0,
            declarations: vec![Declaration::new("margin", "inherit")],
        }];
        let style = cascade(&matched, Some(&parent));
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(style.get("margin"), Some("4px"));
        assert_eq!(style.display(), "inline");
    }
}
