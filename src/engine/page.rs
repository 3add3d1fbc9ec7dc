//! A single hosted page

use super::WebContext;
use super::elements::ScriptElement;
use crate::config::EngineConfig;
use crate::devtools::Console;
use crate::js_engine::{DynamicValue, Object, Runtime, ScriptContext, WebDom};
use crate::network::ResourceFetcher;
use crate::renderer::{Document, DocumentContainer, ElementFactory};
use crate::utils::error::Result;
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// Script types that are evaluated; anything else is left inert
const SCRIPT_TYPES: &[&str] = &["", "text/javascript", "application/javascript", "module"];

/// Hook into page navigation
pub trait PageClient {
    /// Called before following a link; `false` keeps the current document
    fn follow_link(&self, url: &Url) -> bool;
}

/// Document callbacks backed by the shared loader
struct PageContainer {
    context: Rc<WebContext>,
    caption: RefCell<String>,
}

impl PageContainer {
    fn import(&self, kind: &str, url: &str) -> Option<String> {
        self.context
            .loader()
            .load_text(url)
            .inspect_err(|err| log::warn!("cannot import {kind} {url}: {err}"))
            .ok()
    }
}

impl DocumentContainer for PageContainer {
    fn set_base_url(&self, base_url: &str) {
        let resolved = self.context.loader().resolve(base_url);
        match resolved {
            Ok(url) => self.context.loader_mut().set_base_url(Some(url)),
            Err(err) => log::warn!("ignoring base url {base_url}: {err}"),
        }
    }

    fn import_css(&self, url: &str) -> Option<String> {
        self.import("stylesheet", url)
    }

    fn import_script(&self, url: &str) -> Option<String> {
        self.import("script", url)
    }

    fn set_caption(&self, caption: &str) {
        *self.caption.borrow_mut() = caption.to_string();
    }
}

type Incoming = Rc<RefCell<Option<(Url, Result<String>)>>>;

/// One document and the script context running it.
///
/// Every load starts from a fresh script context: globals, timers and
/// wrappers from the previous document do not survive.
pub struct WebPage {
    script: ScriptContext,
    dom: Option<Object<WebDom>>,
    document: Option<Rc<Document>>,
    context: Rc<WebContext>,
    container: Rc<PageContainer>,
    fetcher: ResourceFetcher,
    incoming: Incoming,
    client: Option<Box<dyn PageClient>>,
    url: Option<Url>,
    html: String,
}

impl WebPage {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let context = Rc::new(WebContext::new(&config));
        let script = ScriptContext::new(Runtime::new(config))?;
        let fetcher = ResourceFetcher::new(context.loader().clone());
        let container = Rc::new(PageContainer {
            context: Rc::clone(&context),
            caption: RefCell::new(String::new()),
        });

        Ok(Self {
            script,
            dom: None,
            document: None,
            context,
            container,
            fetcher,
            incoming: Rc::new(RefCell::new(None)),
            client: None,
            url: None,
            html: String::new(),
        })
    }

    pub fn context(&self) -> &Rc<WebContext> {
        &self.context
    }

    pub fn set_client(&mut self, client: Option<Box<dyn PageClient>>) {
        self.client = client;
    }

    /// Replace the document with one parsed from `html`, then run its
    /// scripts in document order. A failing script is reported and the
    /// next one still runs.
    pub fn load_from_html(&mut self, html: &str) -> Result<()> {
        self.dom = None;
        self.document = None;
        self.script.reset()?;
        self.container.caption.borrow_mut().clear();

        let container: Rc<dyn DocumentContainer> = self.container.clone();
        let factory: Rc<dyn ElementFactory> = self.context.clone();
        let document = Document::from_html(html, container, Some(factory), self.context.master_stylesheet());

        self.dom = Some(WebDom::install(&document, &mut self.script)?);
        self.document = Some(Rc::clone(&document));
        self.html = html.to_string();
        self.run_scripts(&document);
        Ok(())
    }

    fn run_scripts(&mut self, document: &Document) {
        for (index, element) in document.elements_by_tag("script").iter().enumerate() {
            let Some(behavior) = element.behavior::<ScriptElement>() else {
                continue;
            };
            let kind = element.attr("type").unwrap_or_default().to_ascii_lowercase();
            if !SCRIPT_TYPES.contains(&kind.trim()) {
                log::debug!("skipping script of type {kind}");
                continue;
            }
            let source = behavior.script();
            if source.trim().is_empty() {
                continue;
            }

            let name = element
                .attr("src")
                .unwrap_or_else(|| format!("inline-script-{index}"));
            let result = self.script.evaluate(&source, &name);
            if result.is_exception() {
                self.script.dump_error();
            }
        }
    }

    /// Load `reference` synchronously, resolved against the current URL
    pub fn load_from_url(&mut self, reference: &str) -> Result<()> {
        let url = self.context.loader().resolve(reference)?;
        let html = self.context.loader().load_url(&url)?;
        self.commit(url, &html)
    }

    fn commit(&mut self, url: Url, html: &str) -> Result<()> {
        log::info!("loading page {url}");
        self.context.loader_mut().set_base_url(Some(url.clone()));
        self.url = Some(url);
        self.load_from_html(html)
    }

    /// Start loading `reference` in the background; finish with
    /// [`poll`](Self::poll)
    pub fn begin_load(&mut self, reference: &str) -> Result<u64> {
        let url = self.context.loader().resolve(reference)?;
        let incoming = Rc::clone(&self.incoming);
        let target = url.clone();
        Ok(self.fetcher.fetch(url.as_str(), move |result| {
            *incoming.borrow_mut() = Some((target, result));
        }))
    }

    /// Apply a finished background load. Returns whether a document was
    /// replaced.
    pub fn poll(&mut self) -> Result<bool> {
        self.fetcher.poll();
        let finished = self.incoming.borrow_mut().take();
        match finished {
            Some((url, result)) => {
                let html = result?;
                self.commit(url, &html)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.fetcher.pending() > 0
    }

    /// Load the current URL again, or re-parse the last HTML when the page
    /// has no URL
    pub fn reload(&mut self) -> Result<()> {
        match self.url.clone() {
            Some(url) => self.load_from_url(url.as_str()),
            None => {
                let html = self.html.clone();
                self.load_from_html(&html)
            }
        }
    }

    /// Navigate to `href`, asking the client first. Returns whether the
    /// link was followed.
    pub fn follow_link(&mut self, href: &str) -> Result<bool> {
        let url = self.context.loader().resolve(href)?;
        if let Some(client) = &self.client {
            if !client.follow_link(&url) {
                log::debug!("client refused link {url}");
                return Ok(false);
            }
        }
        self.load_from_url(url.as_str())?;
        Ok(true)
    }

    /// Evaluate `script` in the page and marshal the result
    pub fn evaluate(&mut self, script: &str) -> Result<DynamicValue> {
        self.script.execute(script)
    }

    pub fn run_timers(&mut self) -> usize {
        self.script.run_timers()
    }

    pub async fn run_until_idle(&mut self) {
        self.script.run_until_idle().await;
    }

    pub fn script_context(&mut self) -> &mut ScriptContext {
        &mut self.script
    }

    pub fn document(&self) -> Option<&Rc<Document>> {
        self.document.as_ref()
    }

    /// Native handle behind the `document` global
    pub fn dom(&self) -> Option<&Object<WebDom>> {
        self.dom.as_ref()
    }

    /// HTML of the current document
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Text of the document's `<title>`
    pub fn caption(&self) -> String {
        self.container.caption.borrow().clone()
    }

    pub fn console(&self) -> Rc<RefCell<Console>> {
        self.script.console()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn page() -> WebPage {
        WebPage::new(EngineConfig::without_cache()).unwrap()
    }

    fn lines(page: &WebPage) -> Vec<String> {
        page.console().borrow().lines()
    }

    #[test]
    fn test_scripts_run_in_order() {
        let mut page = page();
        page.load_from_html(
            "<head><title>Ordered</title></head><body>\
             <script>console.log('first')</script>\
             <script>throw new Error('second fails')</script>\
             <script type='text/template'>console.log('skipped')</script>\
             <script>console.log('third')</script></body>",
        )
        .unwrap();

        let lines = lines(&page);
        assert_eq!(lines.first().map(String::as_str), Some("first"));
        assert!(lines[1].contains("second fails"));
        assert_eq!(lines.last().map(String::as_str), Some("third"));
        assert_eq!(lines.len(), 3);
        assert_eq!(page.caption(), "Ordered");
    }

    #[test]
    fn test_scripts_reach_the_document() {
        let mut page = page();
        page.load_from_html(
            "<body><div id='host'></div><script>\
             var p = document.createElement('p'); p.id = 'added';\
             document.getElementById('host').appendChild(p);\
             </script></body>",
        )
        .unwrap();

        let document = page.document().unwrap();
        let added = document.find_by_id("added").unwrap();
        assert_eq!(added.parent().unwrap().id().as_deref(), Some("host"));
        assert_eq!(added.style_value("display"), "block");
    }

    #[test]
    fn test_resources_and_urls() {
        let mut page = page();
        {
            let loader = page.context().loader();
            loader.add_resource("index.html", "<link rel='stylesheet' href='res:site.css'>\
                <script src='res:app.js'></script><p id='x'>x</p>");
            loader.add_resource("site.css", "p { color: green }");
            loader.add_resource("app.js", "console.log('from resource')");
        }

        page.load_from_url("res:index.html").unwrap();
        assert_eq!(page.url().map(Url::scheme), Some("res"));
        assert_eq!(lines(&page), vec!["from resource".to_string()]);
        let paragraph = page.document().unwrap().find_by_id("x").unwrap();
        assert_eq!(paragraph.style_value("color"), "green");
    }

    #[test]
    fn test_reload_starts_fresh() {
        let mut page = page();
        page.load_from_html("<script>globalThis.count = (globalThis.count || 0) + 1;</script>")
            .unwrap();
        page.reload().unwrap();
        assert_eq!(page.evaluate("count").unwrap(), DynamicValue::Int(1));
    }

    #[test]
    fn test_reload_keeps_source() {
        let html = "<p id='kept'></p><script>console.log('loaded')</script>";
        let mut page = page();
        page.load_from_html(html).unwrap();

        page.reload().unwrap();
        page.reload().unwrap();
        assert_eq!(page.html(), html);
        assert!(page.document().unwrap().find_by_id("kept").is_some());
        assert_eq!(lines(&page).len(), 3);
    }

    struct Refuse;

    impl PageClient for Refuse {
        fn follow_link(&self, _url: &Url) -> bool {
            false
        }
    }

    #[test]
    fn test_client_can_refuse_links() {
        let mut page = page();
        page.context().loader().add_resource("next.html", "<p id='next'></p>");
        page.load_from_html("<p id='first'></p>").unwrap();

        page.set_client(Some(Box::new(Refuse)));
        assert!(!page.follow_link("res:next.html").unwrap());
        assert!(page.document().unwrap().find_by_id("first").is_some());

        page.set_client(None);
        assert!(page.follow_link("res:next.html").unwrap());
        assert!(page.document().unwrap().find_by_id("next").is_some());
    }

    #[test]
    fn test_background_load() {
        let mut page = page();
        page.context().loader().add_resource("bg.html", "<p id='bg'></p>");
        page.begin_load("res:bg.html").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = false;
        while !loaded && Instant::now() < deadline {
            loaded = page.poll().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(loaded);
        assert!(!page.is_loading());
        assert!(page.document().unwrap().find_by_id("bg").is_some());
    }

    #[tokio::test]
    async fn test_timers_run_until_idle() {
        let mut page = page();
        page.load_from_html("<script>setTimeout(function () { console.log('later'); }, 5);</script>")
            .unwrap();
        assert!(lines(&page).is_empty());
        page.run_until_idle().await;
        assert_eq!(lines(&page), vec!["later".to_string()]);
    }
}
