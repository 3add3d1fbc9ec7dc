//! DOM bindings for JavaScript
//!
//! `Document` and `Element` script classes over the native document tree.
//! Wrappers are views: each lookup builds a new one, so compare elements on
//! the native side, never by wrapper identity.

use super::class::{ClassBuilder, Scriptable};
use super::context::ScriptContext;
use super::object::Object;
use crate::renderer::{Document, ElementPtr};
use crate::utils::error::{Result, ScriptError};
use boa_engine::{Context, JsArgs, JsResult, JsValue, JsString};
use std::rc::{Rc, Weak};

/// Global name of the document wrapper
pub const DOCUMENT_GLOBAL: &str = "document";

/// Script view of a document. Holds it weakly; a dropped document turns
/// every method into a no-op returning `null`.
#[derive(Debug)]
pub struct WebDom {
    document: Weak<Document>,
}

impl WebDom {
    pub fn new(document: &Rc<Document>) -> Self {
        Self {
            document: Rc::downgrade(document),
        }
    }

    pub fn document(&self) -> Option<Rc<Document>> {
        self.document.upgrade()
    }

    /// Register both DOM classes and expose `document` as a global.
    ///
    /// The returned object is native owned: dropping it invalidates the
    /// global wrapper.
    pub fn install(document: &Rc<Document>, script: &mut ScriptContext) -> Result<Object<WebDom>> {
        script.register_class::<WebDom>()?;
        script.register_class::<DomElement>()?;

        let dom = Object::new(WebDom::new(document));
        let wrapper = dom
            .to_js_value(script.js_context())
            .map_err(|err| ScriptError::Execution(err.to_string()))?;
        script.set_global(DOCUMENT_GLOBAL, wrapper)?;
        Ok(dom)
    }
}

impl Scriptable for WebDom {
    const NAME: &'static str = "Document";

    fn declare(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        class
            .method("createElement", 1, create_element)?
            .method("getElementById", 1, get_element_by_id)?
            .property("body", body, None)?;
        Ok(())
    }
}

/// Script view of one element plus a weak link to its document
#[derive(Debug)]
pub struct DomElement {
    element: ElementPtr,
    document: Weak<Document>,
}

impl DomElement {
    pub fn new(element: ElementPtr, document: &Rc<Document>) -> Self {
        Self {
            element,
            document: Rc::downgrade(document),
        }
    }

    pub fn element(&self) -> &ElementPtr {
        &self.element
    }
}

impl Scriptable for DomElement {
    const NAME: &'static str = "Element";

    fn declare(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        class
            .method("appendChild", 1, append_child)?
            .property("tagName", tag_name, None)?
            .property("id", get_id, Some(set_id))?
            .property("parentElement", parent_element, None)?;
        Ok(())
    }
}

/// New script-owned wrapper for `element`
fn wrap(element: ElementPtr, document: &Rc<Document>, context: &mut Context) -> JsResult<JsValue> {
    Object::new(DomElement::new(element, document)).into_script(context)
}

fn document_of(this: &JsValue) -> Option<Rc<Document>> {
    Object::<WebDom>::get_native_object(this)?
        .with(WebDom::document)
        .flatten()
}

/// Element and live document behind an element wrapper
fn element_of(value: &JsValue) -> Option<(ElementPtr, Rc<Document>)> {
    Object::<DomElement>::get_native_object(value)?
        .with(|e| Some((e.element.clone(), e.document.upgrade()?)))
        .flatten()
}

fn create_element(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(document) = document_of(this) else {
        return Ok(JsValue::null());
    };
    let tag = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let element = document.create_element(&tag);
    log::trace!("createElement <{}>", element.tag_name());
    wrap(element, &document, context)
}

fn get_element_by_id(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(document) = document_of(this) else {
        return Ok(JsValue::null());
    };
    let id = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    match document.find_by_id(&id) {
        Some(element) => wrap(element, &document, context),
        None => Ok(JsValue::null()),
    }
}

fn body(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some(document) = document_of(this) else {
        return Ok(JsValue::null());
    };
    match document.body() {
        Some(element) => wrap(element, &document, context),
        None => Ok(JsValue::null()),
    }
}

/// `parent.appendChild(child)`: attach, then run the style pipeline on the
/// child's subtree. Returns the child wrapper, or `null` when nothing was
/// attached.
fn append_child(this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let child_value = args.get_or_undefined(0);
    let (Some((parent, document)), Some((child, _))) = (element_of(this), element_of(child_value)) else {
        return Ok(JsValue::null());
    };
    if !parent.append_child(&child) {
        log::debug!(
            "appendChild refused: <{}> into <{}>",
            child.tag_name(),
            parent.tag_name()
        );
        return Ok(JsValue::null());
    }
    document.finish_element(&child);
    Ok(child_value.clone())
}

fn tag_name(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    Ok(element_of(this)
        .map(|(element, _)| JsValue::from(JsString::from(element.tag_name())))
        .unwrap_or_else(JsValue::null))
}

fn get_id(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    Ok(element_of(this)
        .map(|(element, _)| JsValue::from(JsString::from(element.id().unwrap_or_default().as_str())))
        .unwrap_or_else(JsValue::null))
}

fn set_id(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    if let Some((element, _)) = element_of(this) {
        let id = args
            .get_or_undefined(0)
            .to_string(context)?
            .to_std_string_escaped();
        element.set_attr("id", id);
    }
    Ok(JsValue::undefined())
}

fn parent_element(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let Some((element, document)) = element_of(this) else {
        return Ok(JsValue::null());
    };
    match element.parent() {
        Some(parent) => wrap(parent, &document, context),
        None => Ok(JsValue::null()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::js_engine::Runtime;
    use crate::renderer::dom::{DocumentContainer, MockDocumentContainer};
    use crate::renderer::{PipelineStage, master_stylesheet};

    fn container() -> Rc<dyn DocumentContainer> {
        let mut container = MockDocumentContainer::new();
        container.expect_set_base_url().return_const(());
        container.expect_set_caption().return_const(());
        container.expect_import_css().return_const(None);
        container.expect_import_script().return_const(None);
        Rc::new(container)
    }

    fn page(html: &str) -> (ScriptContext, Rc<Document>, Object<WebDom>) {
        let mut script = ScriptContext::new(Runtime::new(EngineConfig::without_cache())).unwrap();
        let document = Document::from_html(html, container(), None, Rc::new(master_stylesheet()));
        let dom = WebDom::install(&document, &mut script).unwrap();
        (script, document, dom)
    }

    #[test]
    fn test_create_and_append() {
        let (mut script, document, _dom) = page("<body><div id='host'></div></body>");
        let value = script.evaluate(
            "var el = document.createElement('p'); \
             document.getElementById('host').appendChild(el) === el",
            "append.js",
        );
        assert!(value.to_bool());

        let host = document.find_by_id("host").unwrap();
        let child = &host.child_elements()[0];
        assert!(Rc::ptr_eq(&child.parent().unwrap(), &host));
        assert_eq!(child.stage(), PipelineStage::Initialized);
        assert_eq!(child.style_value("display"), "block");
    }

    #[test]
    fn test_element_properties() {
        let (mut script, document, _dom) = page("<body></body>");
        let value = script.evaluate(
            "var el = document.createElement('SPAN'); \
             el.tagName = 'div'; el.id = 'named'; \
             document.body.appendChild(el); \
             el.tagName + ':' + el.id + ':' + el.parentElement.tagName",
            "props.js",
        );
        assert_eq!(value.to_string_lossy(), "span:named:body");
        assert_eq!(document.find_by_id("named").unwrap().tag_name(), "span");
    }

    #[test]
    fn test_wrappers_are_not_identities() {
        let (mut script, _document, _dom) = page("<body></body>");
        assert!(!script.evaluate("document.body === document.body", "id.js").to_bool());
        assert!(script.evaluate("document.body.tagName === 'body'", "id.js").to_bool());
        assert!(script.evaluate("document.getElementById('missing') === null", "id.js").to_bool());
    }

    #[test]
    fn test_refused_appends_return_null() {
        let (mut script, _document, _dom) = page("<body><div id='a'><div id='b'></div></div></body>");
        let value = script.evaluate(
            "var a = document.getElementById('a'); var b = document.getElementById('b'); \
             [b.appendChild(a), a.appendChild(a), a.appendChild({}), a.appendChild()]\
                 .every(function (r) { return r === null; })",
            "cycle.js",
        );
        assert!(value.to_bool());
    }

    #[test]
    fn test_dropped_document_object_goes_stale() {
        let (mut script, _document, dom) = page("<body></body>");
        drop(dom);
        let value = script.evaluate("document.createElement('div') === null && document.body === null", "stale.js");
        assert!(value.to_bool());
    }

    #[test]
    fn test_element_outlives_document() {
        let (mut script, document, _dom) = page("<body></body>");
        script.evaluate("var kept = document.body;", "keep.js");
        drop(document);
        let value = script.evaluate("kept.tagName === null && kept.parentElement === null", "gone.js");
        assert!(value.to_bool());
    }
}
