//! Stylesheet parsing using cssparser
//!
//! Supports the subset the document pipeline needs: rules with type, id,
//! class and universal compound selectors joined by descendant or child
//! combinators. Declaration values are kept as normalized source text. At
//! rules and selectors outside that subset are skipped.

use cssparser::{BasicParseErrorKind, Delimiter, ParseError, Parser, ParserInput, ToCss, Token};

/// How a compound relates to the compound before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

/// Tag, id and classes that must all match one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    pub tag_name: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl Compound {
    /// Parse `tag#id.class` style text; `*` matches any tag
    fn parse(text: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let mut chars = text.chars().peekable();

        match chars.peek() {
            Some('*') => {
                chars.next();
            }
            Some(c) if is_ident_char(*c) => {
                compound.tag_name = Some(read_ident(&mut chars)?.to_ascii_lowercase());
            }
            _ => {}
        }

        while let Some(marker) = chars.next() {
            let ident = read_ident(&mut chars)?;
            match marker {
                '#' => compound.id = Some(ident),
                '.' => compound.classes.push(ident),
                _ => return None,
            }
        }
        Some(compound)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(c) = chars.peek().copied().filter(|c| is_ident_char(*c)) {
        ident.push(c);
        chars.next();
    }
    (!ident.is_empty()).then_some(ident)
}

/// A complex selector, leftmost compound first
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parse one complex selector (no commas)
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = Vec::new();
        let mut pending = Combinator::Descendant;
        let spaced = text.replace('>', " > ");

        for token in spaced.split_whitespace() {
            if token == ">" {
                if parts.is_empty() || pending == Combinator::Child {
                    return None;
                }
                pending = Combinator::Child;
                continue;
            }
            parts.push((pending, Compound::parse(token)?));
            pending = Combinator::Descendant;
        }

        if parts.is_empty() || pending == Combinator::Child {
            return None;
        }
        Some(Self { parts })
    }

    /// Compounds with the combinator linking each to its predecessor. The
    /// first combinator is meaningless.
    pub fn parts(&self) -> &[(Combinator, Compound)] {
        &self.parts
    }

    /// Specificity (ids, classes, tags)
    pub fn specificity(&self) -> (u32, u32, u32) {
        self.parts
            .iter()
            .fold((0, 0, 0), |(a, b, c), (_, compound)| {
                (
                    a + u32::from(compound.id.is_some()),
                    b + compound.classes.len() as u32,
                    c + u32::from(compound.tag_name.is_some()),
                )
            })
    }
}

/// CSS declaration (property: value)
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// CSS rule (selector list + declarations)
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

/// CSS stylesheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn parse(content: &str) -> Self {
        CssParser::new().parse(content)
    }

    /// Append the rules of another sheet, keeping source order
    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// CSS parser using cssparser crate
#[derive(Debug, Default)]
pub struct CssParser;

type ParseResult<'i, T> = Result<T, ParseError<'i, ()>>;

impl CssParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a stylesheet. Malformed rules are dropped.
    pub fn parse(&self, content: &str) -> Stylesheet {
        let mut input = ParserInput::new(content);
        let mut parser = Parser::new(&mut input);
        let mut rules = Vec::new();

        loop {
            parser.skip_whitespace();
            if parser.is_exhausted() {
                break;
            }
            match self.parse_rule(&mut parser) {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => {}
                Err(_) => break,
            }
        }

        Stylesheet { rules }
    }

    /// Parse the content of a `style` attribute
    pub fn parse_inline(&self, content: &str) -> Vec<Declaration> {
        let mut input = ParserInput::new(content);
        let mut parser = Parser::new(&mut input);
        self.parse_declarations(&mut parser)
    }

    /// Parse one rule. `Ok(None)` for skipped rules (at-rules, unsupported
    /// selectors), `Err` only at end of input.
    fn parse_rule<'i>(&self, parser: &mut Parser<'i, '_>) -> ParseResult<'i, Option<Rule>> {
        let mut prelude = String::new();
        let mut at_rule = false;

        loop {
            let token = match parser.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) if prelude.trim().is_empty() => {
                    return Err(parser.new_error(BasicParseErrorKind::EndOfInput));
                }
                Err(_) => return Ok(None),
            };

            match token {
                Token::CurlyBracketBlock => {
                    let declarations =
                        parser.parse_nested_block(|p| Ok::<_, ParseError<'i, ()>>(self.parse_declarations(p)))?;
                    if at_rule {
                        return Ok(None);
                    }
                    let selectors: Option<Vec<Selector>> =
                        prelude.split(',').map(|s| Selector::parse(s.trim())).collect();
                    return Ok(selectors.map(|selectors| Rule {
                        selectors,
                        declarations,
                    }));
                }
                Token::Semicolon if at_rule => return Ok(None),
                Token::AtKeyword(_) if prelude.trim().is_empty() => at_rule = true,
                Token::Function(_)
                | Token::ParenthesisBlock
                | Token::SquareBracketBlock => {
                    // Attribute and functional pseudo selectors are unsupported.
                    let _ = parser.parse_nested_block(|p| {
                        while p.next().is_ok() {}
                        Ok::<_, ParseError<'i, ()>>(())
                    });
                    prelude.push('\u{1}');
                }
                other => prelude.push_str(&other.to_css_string()),
            }
        }
    }

    fn parse_declarations<'i>(&self, parser: &mut Parser<'i, '_>) -> Vec<Declaration> {
        let mut declarations = Vec::new();

        loop {
            parser.skip_whitespace();
            if parser.is_exhausted() {
                break;
            }

            let result: ParseResult<'i, Declaration> = parser.parse_until_after(Delimiter::Semicolon, |p| {
                p.skip_whitespace();
                let property = p.expect_ident()?.to_ascii_lowercase();
                p.expect_colon()?;
                let mut value = String::new();
                collect_value(p, &mut value)?;
                let value = normalize_whitespace(&value);
                // Priority is not part of the cascade.
                let value = match value.strip_suffix("!important") {
                    Some(stripped) => stripped.trim_end().to_string(),
                    None => value,
                };
                Ok(Declaration { property, value })
            });

            if let Ok(declaration) = result {
                if !declaration.value.is_empty() {
                    declarations.push(declaration);
                }
            }
        }

        declarations
    }
}

/// Serialize the remaining tokens, descending into blocks
fn collect_value<'i>(parser: &mut Parser<'i, '_>, out: &mut String) -> ParseResult<'i, ()> {
    while let Ok(token) = parser.next_including_whitespace() {
        let closing = match token {
            Token::Function(_) | Token::ParenthesisBlock => Some(')'),
            Token::SquareBracketBlock => Some(']'),
            Token::CurlyBracketBlock => Some('}'),
            _ => None,
        };
        out.push_str(&token.to_css_string());
        if let Some(closing) = closing {
            parser.parse_nested_block(|p| collect_value(p, out))?;
            out.push(closing);
        }
    }
    Ok(())
}

fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple_rule() {
        let sheet = Stylesheet::parse("div { display: block; color: red }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(
            sheet.rules[0].declarations,
            vec![Declaration::new("display", "block"), Declaration::new("color", "red")]
        );
    }

    #[test]
    fn test_selector_list_and_specificity() {
        let sheet = Stylesheet::parse("h1, #main .item > p { margin: 0 }");
        let selectors = &sheet.rules[0].selectors;
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[0].specificity(), (0, 0, 1));
        assert_eq!(selectors[1].specificity(), (1, 1, 1));
        assert_eq!(selectors[1].parts()[2].0, Combinator::Child);
    }

    #[test]
    fn test_function_values_are_kept_whole() {
        let decls = CssParser::new().parse_inline("color: rgb(1, 2, 3); width: calc(100% - 4px)");
        assert_eq!(decls[0].value, "rgb(1, 2, 3)");
        assert_eq!(decls[1].value, "calc(100% - 4px)");
    }

    #[test]
    fn test_at_rules_and_unsupported_selectors_are_skipped() {
        let sheet = Stylesheet::parse(
            "@import url(x.css); @media screen { p { color: red } } a[href] { color: blue } p { color: green }",
        );
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].declarations[0].value, "green");
    }

    #[test]
    fn test_malformed_declarations_are_dropped() {
        let decls = CssParser::new().parse_inline("color red; ; display: none; 12: x");
        assert_eq!(decls, vec![Declaration::new("display", "none")]);

        let decls = CssParser::new().parse_inline("color: red !important");
        assert_eq!(decls, vec![Declaration::new("color", "red")]);
    }

    #[test]
    fn test_compound_parsing() {
        let selector = Selector::parse("DIV#top.a.b").unwrap();
        let compound = &selector.parts()[0].1;
        assert_eq!(compound.tag_name.as_deref(), Some("div"));
        assert_eq!(compound.id.as_deref(), Some("top"));
        assert_eq!(compound.classes, vec!["a", "b"]);
        assert!(Selector::parse("> p").is_none());
        assert!(Selector::parse("p >").is_none());
        assert!(Selector::parse("a:hover").is_none());
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in "\\PC*") {
            let _ = Stylesheet::parse(&input);
            let _ = CssParser::new().parse_inline(&input);
        }

        #[test]
        fn simple_rules_round_trip(tag in "[a-z]{1,8}", prop in "[a-z]{1,10}", value in "[a-z]{1,10}") {
            let sheet = Stylesheet::parse(&format!("{tag} {{ {prop}: {value}; }}"));
            prop_assert_eq!(sheet.rules.len(), 1);
            prop_assert_eq!(&sheet.rules[0].declarations[0], &Declaration::new(prop, value));
        }
    }
}
