//! HTML5 parser implementation using html5ever
//!
//! The sink builds a throwaway tree of reference-counted nodes; the result is
//! flattened into [`ParsedNode`] values that the document turns into
//! elements.

use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, QuirksMode, TreeBuilderOpts};
use html5ever::{ParseOpts, QualName};
use markup5ever::Attribute;
use markup5ever::interface::tree_builder::{NodeOrText, TreeSink};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Parsed markup, before element construction
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNode {
    Element {
        tag_name: String,
        attributes: HashMap<String, String>,
        children: Vec<ParsedNode>,
    },
    Text(String),
}

impl ParsedNode {
    pub fn tag_name(&self) -> Option<&str> {
        match self {
            ParsedNode::Element { tag_name, .. } => Some(tag_name),
            ParsedNode::Text(_) => None,
        }
    }
}

enum SinkData {
    Document,
    Element(RefCell<HashMap<String, String>>),
    Text(RefCell<String>),
    Other,
}

struct SinkNode {
    name: Option<QualName>,
    data: SinkData,
    parent: RefCell<Weak<SinkNode>>,
    children: RefCell<Vec<Handle>>,
}

type Handle = Rc<SinkNode>;

impl SinkNode {
    fn new(name: Option<QualName>, data: SinkData) -> Handle {
        Rc::new(Self {
            name,
            data,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    fn detach(node: &Handle) {
        let parent = node.parent.replace(Weak::new()).upgrade();
        if let Some(parent) = parent {
            parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, node));
        }
    }

    fn to_parsed(&self) -> Option<ParsedNode> {
        match &self.data {
            SinkData::Element(attributes) => Some(ParsedNode::Element {
                tag_name: self
                    .name
                    .as_ref()
                    .map(|n| n.local.to_string())
                    .unwrap_or_default(),
                attributes: attributes.borrow().clone(),
                children: self
                    .children
                    .borrow()
                    .iter()
                    .filter_map(|c| c.to_parsed())
                    .collect(),
            }),
            SinkData::Text(text) => Some(ParsedNode::Text(text.borrow().clone())),
            SinkData::Document | SinkData::Other => None,
        }
    }
}

/// Tree sink producing [`SinkNode`] trees
struct DomSink {
    document: Handle,
    placeholder: QualName,
}

impl DomSink {
    fn new() -> Self {
        Self {
            document: SinkNode::new(None, SinkData::Document),
            placeholder: QualName::new(None, Default::default(), Default::default()),
        }
    }

    fn text_or_node(&self, child: NodeOrText<Handle>) -> Handle {
        match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => {
                SinkNode::new(None, SinkData::Text(RefCell::new(text.to_string())))
            }
        }
    }

    /// Append `text` to `last` when it is a text node
    fn merge_text(last: Option<&Handle>, child: &NodeOrText<Handle>) -> bool {
        let (Some(last), NodeOrText::AppendText(text)) = (last, child) else {
            return false;
        };
        match &last.data {
            SinkData::Text(existing) => {
                existing.borrow_mut().push_str(text);
                true
            }
            _ => false,
        }
    }
}

impl TreeSink for DomSink {
    type Handle = Handle;
    type Output = Vec<ParsedNode>;
    type ElemName<'a> = &'a QualName where Self: 'a;

    fn finish(self) -> Self::Output {
        self.document
            .children
            .borrow()
            .iter()
            .filter_map(|c| c.to_parsed())
            .collect()
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        log::trace!("html parse error: {msg}");
    }

    fn get_document(&self) -> Handle {
        Rc::clone(&self.document)
    }

    fn elem_name<'a>(&'a self, target: &'a Handle) -> Self::ElemName<'a> {
        target.name.as_ref().unwrap_or(&self.placeholder)
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, _flags: ElementFlags) -> Handle {
        let attributes = attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect();
        SinkNode::new(Some(name), SinkData::Element(RefCell::new(attributes)))
    }

    fn create_comment(&self, _text: StrTendril) -> Handle {
        SinkNode::new(None, SinkData::Other)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Handle {
        SinkNode::new(None, SinkData::Other)
    }

    fn append(&self, parent: &Handle, child: NodeOrText<Handle>) {
        if Self::merge_text(parent.children.borrow().last(), &child) {
            return;
        }
        let child = self.text_or_node(child);
        SinkNode::detach(&child);
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        parent.children.borrow_mut().push(child);
    }

    fn append_based_on_parent_node(&self, element: &Handle, prev: &Handle, child: NodeOrText<Handle>) {
        if element.parent.borrow().upgrade().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev, child);
        }
    }

    fn append_doctype_to_document(&self, _name: StrTendril, _public: StrTendril, _system: StrTendril) {}

    fn get_template_contents(&self, target: &Handle) -> Handle {
        Rc::clone(target)
    }

    fn same_node(&self, x: &Handle, y: &Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Handle, new_node: NodeOrText<Handle>) {
        let Some(parent) = sibling.parent.borrow().upgrade() else {
            return;
        };
        let child = self.text_or_node(new_node);
        SinkNode::detach(&child);
        let mut children = parent.children.borrow_mut();
        let position = children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(children.len());
        *child.parent.borrow_mut() = Rc::downgrade(&parent);
        children.insert(position, child);
    }

    fn add_attrs_if_missing(&self, target: &Handle, attrs: Vec<Attribute>) {
        if let SinkData::Element(existing) = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                existing
                    .entry(attr.name.local.to_string())
                    .or_insert_with(|| attr.value.to_string());
            }
        }
    }

    fn remove_from_parent(&self, target: &Handle) {
        SinkNode::detach(target);
    }

    fn reparent_children(&self, node: &Handle, new_parent: &Handle) {
        let children: Vec<Handle> = node.children.borrow_mut().drain(..).collect();
        for child in &children {
            *child.parent.borrow_mut() = Rc::downgrade(new_parent);
        }
        new_parent.children.borrow_mut().extend(children);
    }
}

/// HTML5 parser using html5ever
pub struct HtmlParser {
    opts: ParseOpts,
}

impl HtmlParser {
    pub fn new() -> Self {
        Self {
            opts: ParseOpts {
                tree_builder: TreeBuilderOpts {
                    drop_doctype: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Parse a full document. The result always holds the `html` element
    /// html5ever synthesizes, even for empty input.
    pub fn parse(&self, content: &str) -> Vec<ParsedNode> {
        parse_document(DomSink::new(), self.opts.clone()).one(content)
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(nodes: &'a [ParsedNode], tag: &str) -> Option<&'a ParsedNode> {
        nodes.iter().find_map(|node| match node {
            ParsedNode::Element { tag_name, children, .. } => {
                if tag_name == tag {
                    Some(node)
                } else {
                    find(children, tag)
                }
            }
            ParsedNode::Text(_) => None,
        })
    }

    #[test]
    fn test_parse_empty_html() {
        let nodes = HtmlParser::new().parse("");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].tag_name(), Some("html"));
        assert!(find(&nodes, "body").is_some());
    }

    #[test]
    fn test_parse_with_attributes() {
        let nodes = HtmlParser::new().parse(r#"<div id="main" class="container">Content</div>"#);
        let Some(ParsedNode::Element { attributes, children, .. }) = find(&nodes, "div") else {
            panic!("div missing");
        };
        assert_eq!(attributes.get("id").map(String::as_str), Some("main"));
        assert_eq!(children, &vec![ParsedNode::Text("Content".into())]);
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let nodes = HtmlParser::new().parse("<p>a &amp; b</p>");
        let Some(ParsedNode::Element { children, .. }) = find(&nodes, "p") else {
            panic!("p missing");
        };
        assert_eq!(children, &vec![ParsedNode::Text("a & b".into())]);
    }

    #[test]
    fn test_parse_malformed_html() {
        let nodes = HtmlParser::new().parse("<p>Unclosed paragraph<div>Another");
        assert!(find(&nodes, "p").is_some());
        assert!(find(&nodes, "div").is_some());
    }

    #[test]
    fn test_script_text_is_kept_raw() {
        let nodes = HtmlParser::new().parse("<script>if (a < b) { x(); }</script>");
        let Some(ParsedNode::Element { children, .. }) = find(&nodes, "script") else {
            panic!("script missing");
        };
        assert_eq!(children, &vec![ParsedNode::Text("if (a < b) { x(); }".into())]);
    }
}
