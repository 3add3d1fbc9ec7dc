//! Page orchestration
//!
//! [`WebContext`] holds what every page shares (the master stylesheet, the
//! loader and the custom element factory); [`WebPage`] ties one document to
//! one script context.

mod elements;
mod page;

pub use elements::{InputElement, ScriptElement};
pub use page::{PageClient, WebPage};

use crate::config::EngineConfig;
use crate::network::WebLoader;
use crate::renderer::{self, Element, ElementFactory, ElementPtr, Stylesheet};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

/// Master stylesheet, loader and element factory
pub struct WebContext {
    master: Rc<Stylesheet>,
    loader: RefCell<WebLoader>,
}

impl WebContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            master: Rc::new(renderer::master_stylesheet()),
            loader: RefCell::new(WebLoader::new(config)),
        }
    }

    pub fn master_stylesheet(&self) -> Rc<Stylesheet> {
        Rc::clone(&self.master)
    }

    pub fn loader(&self) -> Ref<'_, WebLoader> {
        self.loader.borrow()
    }

    pub fn loader_mut(&self) -> RefMut<'_, WebLoader> {
        self.loader.borrow_mut()
    }
}

impl ElementFactory for WebContext {
    fn create_element(&self, tag_name: &str, attributes: &HashMap<String, String>) -> Option<ElementPtr> {
        match tag_name.to_ascii_lowercase().as_str() {
            "script" => Some(Element::with_behavior(
                tag_name,
                attributes.clone(),
                Box::new(ScriptElement::default()),
            )),
            "input" => Some(Element::with_behavior(
                tag_name,
                attributes.clone(),
                Box::new(InputElement),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_tags() {
        let context = WebContext::new(&EngineConfig::without_cache());
        let attributes = HashMap::from([("src".to_string(), "a.js".to_string())]);

        let script = context.create_element("SCRIPT", &attributes).unwrap();
        assert_eq!(script.tag_name(), "script");
        assert!(script.behavior::<ScriptElement>().is_some());
        assert_eq!(script.attr("src").as_deref(), Some("a.js"));

        let input = context.create_element("input", &HashMap::new()).unwrap();
        assert!(input.behavior::<InputElement>().is_some());
        assert!(input.behavior::<ScriptElement>().is_none());

        assert!(context.create_element("div", &HashMap::new()).is_none());
    }
}
