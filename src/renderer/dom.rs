//! DOM (Document Object Model) implementation
//!
//! Elements are reference counted: a parent holds its children strongly and
//! each child points back weakly. Every element goes through a fixed style
//! pipeline before it is considered initialized; see [`PipelineStage`].

use super::css::{CssParser, Declaration, Stylesheet};
use super::html::{HtmlParser, ParsedNode};
use super::style::{self, ComputedStyle, MatchedDeclarations, Origin};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub type ElementPtr = Rc<Element>;

/// Steps of the element pipeline, in the order they must run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Created,
    MasterApplied,
    StylesheetApplied,
    AttributesParsed,
    StylesParsed,
    Initialized,
}

/// Custom behavior attached to elements built by an [`ElementFactory`]
pub trait ElementBehavior {
    /// Called during attribute parsing, after inline styles are read
    fn parse_attributes(&self, _element: &Element, _document: &Document) {}

    /// Raw text content of the element, delivered once after parsing
    fn set_data(&self, _data: &str) {}

    fn as_any(&self) -> &dyn Any;
}

/// Callbacks from the document into its host
#[cfg_attr(test, mockall::automock)]
pub trait DocumentContainer {
    fn set_base_url(&self, base_url: &str);

    /// Fetch a stylesheet; `None` leaves it unapplied
    fn import_css(&self, url: &str) -> Option<String>;

    /// Fetch a script; `None` leaves the referencing element inert
    fn import_script(&self, url: &str) -> Option<String>;

    fn set_caption(&self, caption: &str);
}

/// Creates custom elements by tag name
pub trait ElementFactory {
    /// `None` for tags without a custom element
    fn create_element(&self, tag_name: &str, attributes: &HashMap<String, String>) -> Option<ElementPtr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Element,
    Text,
}

/// A node in the DOM tree: an element or a run of text
pub struct Element {
    kind: NodeKind,
    tag_name: String,
    text: RefCell<String>,
    attributes: RefCell<HashMap<String, String>>,
    parent: RefCell<Weak<Element>>,
    children: RefCell<Vec<ElementPtr>>,
    matched: RefCell<Vec<MatchedDeclarations>>,
    inline: RefCell<Vec<Declaration>>,
    style: RefCell<ComputedStyle>,
    stage: Cell<PipelineStage>,
    behavior: Option<Box<dyn ElementBehavior>>,
}

impl Element {
    fn build(kind: NodeKind, tag_name: String, behavior: Option<Box<dyn ElementBehavior>>) -> ElementPtr {
        Rc::new(Self {
            kind,
            tag_name,
            text: RefCell::new(String::new()),
            attributes: RefCell::new(HashMap::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            matched: RefCell::new(Vec::new()),
            inline: RefCell::new(Vec::new()),
            style: RefCell::new(ComputedStyle::default()),
            stage: Cell::new(PipelineStage::Created),
            behavior,
        })
    }

    /// Create a detached element. Tag names are stored lowercase.
    pub fn new<K, V>(tag_name: &str, attributes: impl IntoIterator<Item = (K, V)>) -> ElementPtr
    where
        K: Into<String>,
        V: Into<String>,
    {
        let element = Self::build(NodeKind::Element, tag_name.to_ascii_lowercase(), None);
        element.set_attributes(attributes);
        element
    }

    /// Create a detached element driven by `behavior`
    pub fn with_behavior<K, V>(
        tag_name: &str,
        attributes: impl IntoIterator<Item = (K, V)>,
        behavior: Box<dyn ElementBehavior>,
    ) -> ElementPtr
    where
        K: Into<String>,
        V: Into<String>,
    {
        let element = Self::build(NodeKind::Element, tag_name.to_ascii_lowercase(), Some(behavior));
        element.set_attributes(attributes);
        element
    }

    pub fn text(content: impl Into<String>) -> ElementPtr {
        let node = Self::build(NodeKind::Text, String::new(), None);
        *node.text.borrow_mut() = content.into();
        node
    }

    fn set_attributes<K: Into<String>, V: Into<String>>(&self, attributes: impl IntoIterator<Item = (K, V)>) {
        let mut map = self.attributes.borrow_mut();
        for (name, value) in attributes {
            map.insert(name.into().to_ascii_lowercase(), value.into());
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Lowercase tag name; empty for text nodes
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: impl Into<String>) {
        self.attributes
            .borrow_mut()
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn attributes(&self) -> HashMap<String, String> {
        self.attributes.borrow().clone()
    }

    pub fn id(&self) -> Option<String> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self) -> Option<ElementPtr> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<ElementPtr> {
        self.children.borrow().clone()
    }

    /// Element children only, text skipped
    pub fn child_elements(&self) -> Vec<ElementPtr> {
        self.children
            .borrow()
            .iter()
            .filter(|c| !c.is_text())
            .cloned()
            .collect()
    }

    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        if self.is_text() {
            return self.text.borrow().clone();
        }
        self.children.borrow().iter().map(|c| c.text_content()).collect()
    }

    pub fn behavior<T: 'static>(&self) -> Option<&T> {
        self.behavior.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Whether `self` is `other` or one of its ancestors
    pub fn contains(self: &Rc<Self>, other: &ElementPtr) -> bool {
        let mut current = Some(Rc::clone(other));
        while let Some(node) = current {
            if Rc::ptr_eq(&node, self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Attach `child` as the last child, detaching it from its old parent.
    ///
    /// Refused (returns `false`) for text parents, for `self` and for any
    /// ancestor of `self`.
    pub fn append_child(self: &Rc<Self>, child: &ElementPtr) -> bool {
        if self.is_text() || child.contains(self) {
            return false;
        }
        child.detach();
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(Rc::clone(child));
        true
    }

    /// Remove from the parent's child list
    pub fn detach(self: &Rc<Self>) {
        let parent = self.parent.replace(Weak::new()).upgrade();
        if let Some(parent) = parent {
            parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, self));
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage.get()
    }

    pub fn style(&self) -> Ref<'_, ComputedStyle> {
        self.style.borrow()
    }

    /// Computed value of `property`, empty when unset
    pub fn style_value(&self, property: &str) -> String {
        self.style
            .borrow()
            .get(property)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Record that `stage` ran. Out of order steps are reported, not refused.
    fn advance(&self, stage: PipelineStage) {
        let previous = self.stage.get();
        if previous as u8 + 1 != stage as u8 {
            log::warn!(
                "<{}> ran {stage:?} after {previous:?}",
                self.tag_name
            );
        }
        self.stage.set(stage);
    }

    /// Forget all style state so the pipeline can run again
    fn reset_styles(&self) {
        self.matched.borrow_mut().clear();
        self.inline.borrow_mut().clear();
        *self.style.borrow_mut() = ComputedStyle::default();
        self.stage.set(PipelineStage::Created);
    }

    pub fn apply_master_stylesheet(&self, document: &Document) {
        let matched = style::match_rules(document.master_stylesheet(), Origin::Master, self);
        self.matched.borrow_mut().extend(matched);
        self.advance(PipelineStage::MasterApplied);
    }

    pub fn apply_stylesheet(&self, document: &Document) {
        let matched = style::match_rules(&document.stylesheet(), Origin::Author, self);
        self.matched.borrow_mut().extend(matched);
        self.advance(PipelineStage::StylesheetApplied);
    }

    pub fn parse_attributes(&self, document: &Document) {
        if let Some(inline) = self.attr("style") {
            *self.inline.borrow_mut() = CssParser::new().parse_inline(&inline);
        }
        if let Some(behavior) = &self.behavior {
            behavior.parse_attributes(self, document);
        }
        self.advance(PipelineStage::AttributesParsed);
    }

    pub fn parse_styles(&self) {
        let mut matched = self.matched.borrow().clone();
        let inline = self.inline.borrow().clone();
        if !inline.is_empty() {
            matched.push(MatchedDeclarations {
                origin: Origin::Inline,
                specificity: (0, 0, 0),
                order: 0,
                declarations: inline,
            });
        }

        let parent = self.parent();
        let parent_style = parent.as_ref().map(|p| p.style.borrow().clone());
        *self.style.borrow_mut() = style::cascade(&matched, parent_style.as_ref());
        self.advance(PipelineStage::StylesParsed);
    }

    pub fn init(&self) {
        self.advance(PipelineStage::Initialized);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_text() {
            return f.debug_tuple("Text").field(&self.text.borrow()).finish();
        }
        f.debug_struct("Element")
            .field("tag_name", &self.tag_name)
            .field("attributes", &self.attributes.borrow())
            .field("stage", &self.stage.get())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

/// DOM document
pub struct Document {
    root: ElementPtr,
    master: Rc<Stylesheet>,
    stylesheet: RefCell<Stylesheet>,
    container: Rc<dyn DocumentContainer>,
    factory: Option<Rc<dyn ElementFactory>>,
}

impl Document {
    /// Parse `html` and run every element through the style pipeline.
    ///
    /// `<base>`, `<style>`, `<link rel="stylesheet">` and `<title>` are
    /// reported to `container` before any element is styled.
    pub fn from_html(
        html: &str,
        container: Rc<dyn DocumentContainer>,
        factory: Option<Rc<dyn ElementFactory>>,
        master: Rc<Stylesheet>,
    ) -> Rc<Document> {
        let parsed = HtmlParser::new().parse(html);
        let root = parsed
            .iter()
            .find(|node| node.tag_name() == Some("html"))
            .map(|node| build_tree(node, factory.as_deref()))
            .unwrap_or_else(|| Element::new("html", Vec::<(String, String)>::new()));

        let document = Rc::new(Document {
            root,
            master,
            stylesheet: RefCell::new(Stylesheet::default()),
            container,
            factory,
        });
        document.read_head();
        document.deliver_data(&document.root);
        document.run_pipeline(&document.root);
        log::debug!(
            "document built with {} author rules",
            document.stylesheet.borrow().rules.len()
        );
        document
    }

    fn read_head(&self) {
        if let Some(base) = self
            .elements_by_tag("base")
            .iter()
            .find_map(|b| b.attr("href"))
        {
            self.container.set_base_url(&base);
        }

        for element in self.descendants(&self.root) {
            match element.tag_name() {
                "style" => self.add_stylesheet(&element.text_content()),
                "link" if is_stylesheet_link(&element) => {
                    let Some(href) = element.attr("href") else {
                        continue;
                    };
                    match self.container.import_css(&href) {
                        Some(css) => self.add_stylesheet(&css),
                        None => log::warn!("stylesheet {href} could not be imported"),
                    }
                }
                _ => {}
            }
        }

        if let Some(title) = self.elements_by_tag("title").first() {
            self.container.set_caption(title.text_content().trim());
        }
    }

    fn deliver_data(&self, element: &ElementPtr) {
        for node in self.descendants(element) {
            if let Some(behavior) = &node.behavior {
                behavior.set_data(&node.text_content());
            }
        }
    }

    /// Preorder list of `element` and its element descendants
    fn descendants(&self, element: &ElementPtr) -> Vec<ElementPtr> {
        let mut out = Vec::new();
        let mut stack = vec![Rc::clone(element)];
        while let Some(node) = stack.pop() {
            if node.is_text() {
                continue;
            }
            stack.extend(node.children.borrow().iter().rev().cloned());
            out.push(node);
        }
        out
    }

    /// Run the full pipeline on `element`, then on its descendants
    fn run_pipeline(&self, element: &ElementPtr) {
        for node in self.descendants(element) {
            node.apply_master_stylesheet(self);
            node.apply_stylesheet(self);
            node.parse_attributes(self);
            node.parse_styles();
            node.init();
        }
    }

    /// Create a detached element, preferring the custom element factory
    pub fn create_element(&self, tag_name: &str) -> ElementPtr {
        let attributes = HashMap::new();
        self.factory
            .as_ref()
            .and_then(|f| f.create_element(&tag_name.to_ascii_lowercase(), &attributes))
            .unwrap_or_else(|| Element::new(tag_name, attributes))
    }

    /// Style a newly attached subtree from scratch
    pub fn finish_element(&self, element: &ElementPtr) {
        for node in self.descendants(element) {
            node.reset_styles();
        }
        self.run_pipeline(element);
    }

    pub fn root(&self) -> &ElementPtr {
        &self.root
    }

    pub fn body(&self) -> Option<ElementPtr> {
        self.root
            .child_elements()
            .into_iter()
            .find(|e| e.tag_name() == "body")
    }

    pub fn find_by_id(&self, id: &str) -> Option<ElementPtr> {
        self.descendants(&self.root)
            .into_iter()
            .find(|e| e.id().as_deref() == Some(id))
    }

    pub fn elements_by_tag(&self, tag_name: &str) -> Vec<ElementPtr> {
        self.descendants(&self.root)
            .into_iter()
            .filter(|e| e.tag_name().eq_ignore_ascii_case(tag_name))
            .collect()
    }

    pub fn container(&self) -> &Rc<dyn DocumentContainer> {
        &self.container
    }

    pub fn master_stylesheet(&self) -> &Stylesheet {
        &self.master
    }

    pub fn stylesheet(&self) -> Ref<'_, Stylesheet> {
        self.stylesheet.borrow()
    }

    /// Append author rules; only elements styled afterwards see them
    pub fn add_stylesheet(&self, css: &str) {
        self.stylesheet.borrow_mut().extend(Stylesheet::parse(css));
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("author_rules", &self.stylesheet.borrow().rules.len())
            .finish()
    }
}

fn is_stylesheet_link(element: &Element) -> bool {
    element
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
}

fn build_tree(node: &ParsedNode, factory: Option<&dyn ElementFactory>) -> ElementPtr {
    match node {
        ParsedNode::Text(text) => Element::text(text.clone()),
        ParsedNode::Element {
            tag_name,
            attributes,
            children,
        } => {
            let element = factory
                .and_then(|f| f.create_element(tag_name, attributes))
                .unwrap_or_else(|| Element::new(tag_name, attributes.clone()));
            for child in children {
                element.append_child(&build_tree(child, factory));
            }
            element
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MASTER: &str = "html, body, div, p { display: block } head, style, script { display: none }";

    fn quiet_container() -> Rc<dyn DocumentContainer> {
        let mut container = MockDocumentContainer::new();
        container.expect_set_base_url().return_const(());
        container.expect_set_caption().return_const(());
        container.expect_import_css().return_const(None);
        container.expect_import_script().return_const(None);
        Rc::new(container)
    }

    fn document(html: &str) -> Rc<Document> {
        Document::from_html(html, quiet_container(), None, Rc::new(Stylesheet::parse(MASTER)))
    }

    #[test]
    fn test_tree_shape() {
        let doc = document("<body><div id='a'><p>one</p><p>two</p></div></body>");
        let div = doc.find_by_id("a").unwrap();
        assert_eq!(div.child_elements().len(), 2);
        assert_eq!(div.text_content(), "onetwo");
        assert!(Rc::ptr_eq(&div.parent().unwrap(), &doc.body().unwrap()));
        assert_eq!(doc.elements_by_tag("p").len(), 2);
    }

    #[test]
    fn test_pipeline_completes_for_every_element() {
        let doc = document("<body><div><span>x</span></div></body>");
        for tag in ["html", "head", "body", "div", "span"] {
            let element = &doc.elements_by_tag(tag)[0];
            assert_eq!(element.stage(), PipelineStage::Initialized, "{tag}");
        }
        assert_eq!(doc.elements_by_tag("div")[0].style().display(), "block");
        assert_eq!(doc.elements_by_tag("span")[0].style().display(), "inline");
    }

    #[test]
    fn test_author_and_inline_styles() {
        let doc = document(
            "<head><style>#x { color: red } div { color: blue; margin: 1px }</style></head>\
             <body><div id='x' style='margin: 2px'><span>t</span></div></body>",
        );
        let div = doc.find_by_id("x").unwrap();
        assert_eq!(div.style_value("color"), "red");
        assert_eq!(div.style_value("margin"), "2px");
        let span = &doc.elements_by_tag("span")[0];
        assert_eq!(span.style_value("color"), "red");
        assert_eq!(span.style_value("margin"), "");
    }

    #[test]
    fn test_head_elements_reach_container() {
        let mut container = MockDocumentContainer::new();
        container
            .expect_set_base_url()
            .withf(|url| url == "http://example.com/")
            .times(1)
            .return_const(());
        container
            .expect_set_caption()
            .withf(|caption| caption == "Hello")
            .times(1)
            .return_const(());
        container
            .expect_import_css()
            .withf(|url| url == "site.css")
            .times(1)
            .return_const(Some("p { color: green }".to_string()));

        let doc = Document::from_html(
            "<head><base href='http://example.com/'><title> Hello </title>\
             <link rel='stylesheet' href='site.css'></head><body><p>x</p></body>",
            Rc::new(container),
            None,
            Rc::new(Stylesheet::default()),
        );
        assert_eq!(doc.elements_by_tag("p")[0].style_value("color"), "green");
    }

    #[test]
    fn test_append_child_rules() {
        let doc = document("<body><div id='outer'><div id='inner'></div></div></body>");
        let outer = doc.find_by_id("outer").unwrap();
        let inner = doc.find_by_id("inner").unwrap();

        assert!(!outer.append_child(&outer));
        assert!(!inner.append_child(&outer));
        assert!(!Element::text("t").append_child(&inner));

        let body = doc.body().unwrap();
        assert!(body.append_child(&inner));
        assert!(Rc::ptr_eq(&inner.parent().unwrap(), &body));
        assert!(outer.child_elements().is_empty());
    }

    #[test]
    fn test_finish_element_styles_new_subtree() {
        let doc = document("<body></body>");
        let div = doc.create_element("DIV");
        assert_eq!(div.tag_name(), "div");
        assert_eq!(div.stage(), PipelineStage::Created);

        doc.body().unwrap().append_child(&div);
        doc.finish_element(&div);
        assert_eq!(div.stage(), PipelineStage::Initialized);
        assert_eq!(div.style_value("display"), "block");
    }

    #[test]
    fn test_out_of_order_step_still_runs() {
        let doc = document("<body></body>");
        let p = Element::new("p", [("style", "color: red")]);
        p.parse_attributes(&doc);
        p.parse_styles();
        assert_eq!(p.stage(), PipelineStage::StylesParsed);
        assert_eq!(p.style_value("color"), "red");
    }
}
