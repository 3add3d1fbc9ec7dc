//! Document model for hosted pages
//!
//! Parses HTML into a tree of styled elements. Styles are resolved per
//! element by a fixed pipeline; there is no layout or painting.

pub mod css;
pub mod dom;
pub mod html;
pub mod style;

pub use css::{CssParser, Declaration, Rule, Selector, Stylesheet};
pub use dom::{
    Document, DocumentContainer, Element, ElementBehavior, ElementFactory, ElementPtr,
    PipelineStage,
};
pub use html::{HtmlParser, ParsedNode};
pub use style::ComputedStyle;

/// Built-in stylesheet applied before any author styles
pub const MASTER_CSS: &str = include_str!("master.css");

/// Parse [`MASTER_CSS`]
pub fn master_stylesheet() -> Stylesheet {
    Stylesheet::parse(MASTER_CSS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_stylesheet_parses() {
        let sheet = master_stylesheet();
        assert!(sheet.rules.len() > 10);
        assert!(sheet.rules.iter().all(|rule| !rule.declarations.is_empty()));
    }
}
