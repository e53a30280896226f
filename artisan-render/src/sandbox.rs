use anyhow::Result;
use artisan_core::{Document, Page, PreviewRenderer, ASSET_URL_PREFIX};
use tracing::instrument;

use crate::escape_html;

/// `sandbox` attribute for preview frames. Leaving out `allow-same-origin` keeps
/// the frame in its own opaque origin, away from host storage and cookies.
pub const SANDBOX_PERMISSIONS: &str = "allow-scripts allow-forms allow-popups";

/// Click listener injected into every preview. Internal links become a
/// `navigate` message to the parent; `_blank` links are left alone.
pub const NAVIGATION_LISTENER_JS: &str = r#"document.addEventListener('DOMContentLoaded', () => {
  document.addEventListener('click', (event) => {
    const anchor = event.target && event.target.closest ? event.target.closest('a') : null;
    if (anchor && anchor.href && anchor.target !== '_blank') {
      event.preventDefault();
      const page = (anchor.getAttribute('href') || '').replace(/^\//, '');
      window.parent.postMessage({ type: 'navigate', page: page }, '*');
    }
  });
});"#;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {0:?} is not part of the document")]
    PageNotInDocument(String),
}

/// Builds the standalone markup a preview frame runs.
#[derive(Debug, Clone, Default)]
pub struct SandboxRenderer {
    asset_origin: Option<String>,
}

impl SandboxRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages that mention `/assets/` get a `<base>` pointing at `origin`, so the
    /// opaque-origin frame can still reach the host's asset route.
    pub fn with_asset_origin(origin: impl Into<String>) -> Self {
        Self {
            asset_origin: Some(origin.into()),
        }
    }

    pub fn asset_origin(&self) -> Option<&str> {
        self.asset_origin.as_deref()
    }

    #[instrument(skip_all, fields(page = %page.filename))]
    pub fn render_page(&self, document: &Document, page: &Page) -> Result<String, RenderError> {
        if !document.contains(page) {
            return Err(RenderError::PageNotInDocument(page.filename.clone()));
        }

        let base_tag = match self.asset_origin.as_deref() {
            Some(origin) if page.html.contains(ASSET_URL_PREFIX) => {
                format!("<base href=\"{}\">\n", escape_html(origin))
            }
            _ => String::new(),
        };

        let mut html = String::with_capacity(
            page.html.len() + document.css().len() + document.js().len() + 1024,
        );
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"UTF-8\">\n");
        html.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        html.push_str(&base_tag);
        html.push_str("<style>");
        html.push_str(document.css());
        html.push_str("</style>\n<script>\n");
        html.push_str(NAVIGATION_LISTENER_JS);
        html.push_str("\n</script>\n</head>\n<body>\n");
        html.push_str(&page.html);
        html.push_str("\n<script>");
        html.push_str(document.js());
        html.push_str("</script>\n</body>\n</html>\n");
        Ok(html)
    }
}

impl PreviewRenderer for SandboxRenderer {
    fn render(&self, document: &Document, page: &Page) -> Result<String> {
        Ok(self.render_page(document, page)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use artisan_core::{intercept_click, Anchor, BridgeMessage, Workbench};

    fn two_page_site() -> Document {
        Document::new(
            vec![
                Page::new("index.html", r#"<a href="/about.html">About</a>"#),
                Page::new("about.html", "<h1>About</h1>"),
            ],
            "",
            "",
        )
        .unwrap()
    }

    #[test]
    fn markup_inlines_css_page_and_script_in_order() {
        let doc = Document::new(
            vec![Page::new("index.html", "<main>hello</main>")],
            "main { color: red; }",
            "console.log('hi');",
        )
        .unwrap();
        let html = SandboxRenderer::new()
            .render_page(&doc, &doc.pages()[0])
            .unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        let style = html.find("<style>main { color: red; }</style>").unwrap();
        let listener = html.find("postMessage({ type: 'navigate'").unwrap();
        let head_end = html.find("</head>").unwrap();
        let body = html.find("<main>hello</main>").unwrap();
        let script = html.find("<script>console.log('hi');</script>").unwrap();
        assert!(style < head_end && listener < head_end);
        assert!(head_end < body && body < script);
        assert!(!html.contains("<base"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let doc = two_page_site();
        let renderer = SandboxRenderer::with_asset_origin("http://127.0.0.1:9002");
        let page = &doc.pages()[0];
        assert_eq!(
            renderer.render_page(&doc, page).unwrap(),
            renderer.render_page(&doc, page).unwrap()
        );
    }

    #[test]
    fn base_tag_only_for_pages_that_reference_assets() {
        let doc = Document::new(
            vec![
                Page::new("index.html", r#"<img src="/assets/logo.png">"#),
                Page::new("plain.html", r#"<img src="/images/logo.png">"#),
            ],
            "",
            "",
        )
        .unwrap();
        let renderer = SandboxRenderer::with_asset_origin("http://localhost:9002");

        let with_assets = renderer.render_page(&doc, &doc.pages()[0]).unwrap();
        assert!(with_assets.contains("<base href=\"http://localhost:9002\">"));

        let without = renderer.render_page(&doc, &doc.pages()[1]).unwrap();
        assert!(!without.contains("<base"));

        let no_origin = SandboxRenderer::new()
            .render_page(&doc, &doc.pages()[0])
            .unwrap();
        assert!(!no_origin.contains("<base"));
    }

    #[test]
    fn foreign_pages_are_refused() {
        let doc = two_page_site();
        let stranger = Page::new("index.html", "<p>not the same body</p>");
        assert!(matches!(
            SandboxRenderer::new().render_page(&doc, &stranger),
            Err(RenderError::PageNotInDocument(name)) if name == "index.html"
        ));
    }

    #[test]
    fn clicking_about_link_switches_preview_to_about_page() {
        let doc = two_page_site();
        let mut bench = Workbench::new(doc.clone(), Arc::new(SandboxRenderer::new()));

        let first = bench.render().unwrap();
        assert!(first.contains(r#"<a href="/about.html">About</a>"#));

        let message = intercept_click(Some(&Anchor::new("/about.html"))).unwrap();
        assert_eq!(message, BridgeMessage::navigate("about.html"));
        assert!(bench.handle_message(message));
        assert_eq!(bench.active_page().filename, "about.html");
        assert_eq!(bench.document(), &doc);

        let second = bench.render().unwrap();
        assert!(second.contains("<h1>About</h1>"));
        assert!(!second.contains(r#"<a href="/about.html">About</a>"#));
    }
}
