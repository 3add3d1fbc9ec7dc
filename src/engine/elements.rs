//! Custom elements created by [`WebContext`](super::WebContext)

use crate::renderer::{Document, Element, ElementBehavior};
use std::any::Any;
use std::cell::RefCell;

/// `<script>`: captures inline text, or the resource named by `src`
#[derive(Debug, Default)]
pub struct ScriptElement {
    script: RefCell<String>,
}

impl ScriptElement {
    pub fn script(&self) -> String {
        self.script.borrow().clone()
    }

    pub fn set_script(&self, script: impl Into<String>) {
        *self.script.borrow_mut() = script.into();
    }
}

impl ElementBehavior for ScriptElement {
    fn parse_attributes(&self, element: &Element, document: &Document) {
        let Some(src) = element.attr("src") else {
            return;
        };
        match document.container().import_script(&src) {
            Some(script) if !script.is_empty() => self.set_script(script),
            _ => log::warn!("script {src} could not be imported"),
        }
    }

    fn set_data(&self, data: &str) {
        self.set_script(data);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `<input>`: no behavior yet beyond reporting its attributes
#[derive(Debug, Default)]
pub struct InputElement;

impl ElementBehavior for InputElement {
    fn parse_attributes(&self, element: &Element, _document: &Document) {
        let mut attributes: Vec<_> = element.attributes().into_iter().collect();
        attributes.sort();
        log::debug!("<input>");
        for (name, value) in attributes {
            log::debug!("    {name} = {value}");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
