use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

mod assets;
mod bridge;
mod generation;

pub use assets::{
    asset_url, validate_asset_name, AssetError, AssetStore, FileAssetStore, MemoryAssetStore,
    ASSET_URL_PREFIX,
};
pub use bridge::{
    intercept_click, navigation_bridge, Anchor, BridgeMessage, BridgeReceiver, BridgeSender,
};
pub use generation::{
    generate_website, Generation, GenerationError, SiteGenerator, GENERATION_FAILED_MESSAGE,
    MIN_PROMPT_CHARS,
};

/// Identifies one wholesale version of the document held by a [`Workbench`].
pub type Revision = Uuid;

pub const DEFAULT_ENTRY: &str = "index.html";
pub const STYLESHEET_FILENAME: &str = "style.css";
pub const SCRIPT_FILENAME: &str = "script.js";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub filename: String,
    pub html: String,
}

impl Page {
    pub fn new(filename: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            html: html.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("a document needs at least one page")]
    NoPages,
    #[error("page filename must not be empty")]
    EmptyFilename,
    #[error("invalid page filename {0:?}")]
    InvalidFilename(String),
    #[error("page filename {0:?} is reserved for the shared stylesheet or script")]
    ReservedFilename(String),
    #[error("duplicate page filename {0:?}")]
    DuplicateFilename(String),
    #[error("no page named {0:?}")]
    UnknownPage(String),
}

/// A generated website: ordered pages sharing one stylesheet and one script.
///
/// Always holds at least one page and never two pages with the same filename.
/// Instances are replaced wholesale; the `with_*` helpers build a new value
/// instead of editing in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDocument", into = "RawDocument")]
pub struct Document {
    pages: Vec<Page>,
    css: String,
    js: String,
}

#[derive(Serialize, Deserialize)]
struct RawDocument {
    pages: Vec<Page>,
    #[serde(default)]
    css: String,
    #[serde(default)]
    js: String,
}

impl TryFrom<RawDocument> for Document {
    type Error = DocumentError;

    fn try_from(raw: RawDocument) -> std::result::Result<Self, Self::Error> {
        Document::new(raw.pages, raw.css, raw.js)
    }
}

impl From<Document> for RawDocument {
    fn from(doc: Document) -> Self {
        Self {
            pages: doc.pages,
            css: doc.css,
            js: doc.js,
        }
    }
}

impl Document {
    pub fn new(
        pages: Vec<Page>,
        css: impl Into<String>,
        js: impl Into<String>,
    ) -> std::result::Result<Self, DocumentError> {
        if pages.is_empty() {
            return Err(DocumentError::NoPages);
        }
        let mut seen = HashSet::with_capacity(pages.len());
        for page in &pages {
            validate_page_filename(&page.filename)?;
            if !seen.insert(page.filename.as_str()) {
                return Err(DocumentError::DuplicateFilename(page.filename.clone()));
            }
        }
        Ok(Self {
            pages,
            css: css.into(),
            js: js.into(),
        })
    }

    /// The single-page welcome site shown before anything has been generated.
    pub fn placeholder() -> Self {
        Self {
            pages: vec![Page::new(DEFAULT_ENTRY, PLACEHOLDER_HTML)],
            css: PLACEHOLDER_CSS.to_owned(),
            js: PLACEHOLDER_JS.to_owned(),
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn js(&self) -> &str {
        &self.js
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, filename: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.filename == filename)
    }

    pub fn position(&self, filename: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.filename == filename)
    }

    /// Index of `index.html` when present, else of the first page.
    pub fn default_index(&self) -> usize {
        self.position(DEFAULT_ENTRY).unwrap_or(0)
    }

    pub fn default_page(&self) -> &Page {
        &self.pages[self.default_index()]
    }

    pub fn contains(&self, page: &Page) -> bool {
        self.pages.iter().any(|p| p == page)
    }

    pub fn with_page_html(
        &self,
        filename: &str,
        html: impl Into<String>,
    ) -> std::result::Result<Self, DocumentError> {
        let index = self
            .position(filename)
            .ok_or_else(|| DocumentError::UnknownPage(filename.to_owned()))?;
        let mut next = self.clone();
        next.pages[index].html = html.into();
        Ok(next)
    }

    pub fn with_css(&self, css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            ..self.clone()
        }
    }

    pub fn with_js(&self, js: impl Into<String>) -> Self {
        Self {
            js: js.into(),
            ..self.clone()
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::placeholder()
    }
}

fn validate_page_filename(filename: &str) -> std::result::Result<(), DocumentError> {
    if filename.is_empty() {
        return Err(DocumentError::EmptyFilename);
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(DocumentError::InvalidFilename(filename.to_owned()));
    }
    if filename == STYLESHEET_FILENAME || filename == SCRIPT_FILENAME {
        return Err(DocumentError::ReservedFilename(filename.to_owned()));
    }
    Ok(())
}

const PLACEHOLDER_HTML: &str = r#"
<div class="container">
  <h1>Welcome to Web Artisan</h1>
  <p>Describe a website in a prompt and it will be generated here.</p>
  <p>Try something like "a portfolio for a photographer with an about page" or "a landing page for a new SaaS product".</p>
</div>
"#;

const PLACEHOLDER_CSS: &str = r#"
body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Ubuntu, sans-serif;
  display: flex;
  align-items: center;
  justify-content: center;
  min-height: 100vh;
  text-align: center;
  background-color: #f0f2f5;
  color: #333;
}
.container {
  padding: 2rem;
  background: white;
  border-radius: 12px;
  box-shadow: 0 8px 32px rgba(0,0,0,0.1);
}
h1 {
  font-size: 2.5rem;
  color: #1a73e8;
}
"#;

const PLACEHOLDER_JS: &str = r#"console.log("Welcome to Web Artisan!");"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("unknown theme {other:?}")),
        }
    }
}

/// Size presets for the frame around the preview. They never change what gets
/// rendered, only the box it is shown in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
    #[default]
    Desktop,
    Tablet,
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConstraints {
    /// `None` fills the available space.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub border_px: u32,
    pub rounded: bool,
}

impl DevicePreset {
    pub const ALL: [DevicePreset; 3] = [
        DevicePreset::Desktop,
        DevicePreset::Tablet,
        DevicePreset::Mobile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreset::Desktop => "desktop",
            DevicePreset::Tablet => "tablet",
            DevicePreset::Mobile => "mobile",
        }
    }

    pub fn frame(&self) -> FrameConstraints {
        match self {
            DevicePreset::Desktop => FrameConstraints {
                width: None,
                height: None,
                border_px: 0,
                rounded: false,
            },
            DevicePreset::Tablet => FrameConstraints {
                width: Some(768),
                height: Some(1024),
                border_px: 4,
                rounded: true,
            },
            DevicePreset::Mobile => FrameConstraints {
                width: Some(375),
                height: Some(667),
                border_px: 4,
                rounded: true,
            },
        }
    }

    pub fn next(&self) -> Self {
        match self {
            DevicePreset::Desktop => DevicePreset::Tablet,
            DevicePreset::Tablet => DevicePreset::Mobile,
            DevicePreset::Mobile => DevicePreset::Desktop,
        }
    }
}

impl fmt::Display for DevicePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevicePreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        DevicePreset::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown device preset {s:?}"))
    }
}

/// Turns one page of a document into markup for an isolated frame.
pub trait PreviewRenderer: Send + Sync {
    fn render(&self, document: &Document, page: &Page) -> Result<String>;
}

#[derive(Debug, Clone)]
pub enum Command {
    Navigate { filename: String },
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { index: usize },
    GotoDefault,
    SetDevice { device: DevicePreset },
    CycleDevice,
    SetTheme { theme: Theme },
    ReplaceDocument { document: Document },
    EditFile { filename: String, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    DocumentReplaced(Revision),
    ActivePageChanged { revision: Revision, filename: String },
    DeviceChanged(DevicePreset),
    ThemeChanged(Theme),
}

/// Owns the document on display and which of its pages is active.
pub struct Workbench {
    document: Document,
    revision: Revision,
    active: usize,
    device: DevicePreset,
    theme: Theme,
    renderer: Arc<dyn PreviewRenderer>,
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl Workbench {
    pub fn new(document: Document, renderer: Arc<dyn PreviewRenderer>) -> Self {
        let active = document.default_index();
        Self {
            document,
            revision: Uuid::new_v4(),
            active,
            device: DevicePreset::default(),
            theme: Theme::default(),
            renderer,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn active_page(&self) -> &Page {
        &self.document.pages()[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn device(&self) -> DevicePreset {
        self.device
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Markup for the active page, rendered from scratch.
    pub fn render(&self) -> Result<String> {
        self.renderer.render(&self.document, self.active_page())
    }

    /// Swaps in a new document. The active page always goes back to the default
    /// entry, even when the previous filename still exists.
    #[instrument(skip(self, document), fields(pages = document.page_count()))]
    pub fn replace_document(&mut self, document: Document) {
        self.document = document;
        self.revision = Uuid::new_v4();
        self.active = self.document.default_index();
        let filename = self.active_page().filename.clone();
        let mut events = self.events.lock();
        events.push(ViewEvent::DocumentReplaced(self.revision));
        events.push(ViewEvent::ActivePageChanged {
            revision: self.revision,
            filename,
        });
    }

    /// Returns whether `filename` names a page of the current document. Unknown
    /// names leave everything as it was.
    pub fn navigate(&mut self, filename: &str) -> bool {
        match self.document.position(filename) {
            Some(index) => {
                self.set_active(index);
                true
            }
            None => {
                debug!(filename, "ignoring navigation to unknown page");
                false
            }
        }
    }

    pub fn handle_message(&mut self, message: BridgeMessage) -> bool {
        match message {
            BridgeMessage::Navigate { page } => self.navigate(&page),
        }
    }

    /// Applies every message already queued on the bridge, in delivery order.
    pub fn pump(&mut self, receiver: &mut BridgeReceiver) -> usize {
        let mut handled = 0;
        while let Some(message) = receiver.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        let last = self.document.page_count().saturating_sub(1);
        match command {
            Command::Navigate { filename } => {
                self.navigate(&filename);
            }
            Command::NextPage { count } => {
                self.set_active(self.active.saturating_add(count).min(last));
            }
            Command::PrevPage { count } => {
                self.set_active(self.active.saturating_sub(count));
            }
            Command::GotoPage { index } => {
                self.set_active(index.min(last));
            }
            Command::GotoDefault => {
                self.set_active(self.document.default_index());
            }
            Command::SetDevice { device } => self.set_device(device),
            Command::CycleDevice => self.set_device(self.device.next()),
            Command::SetTheme { theme } => {
                if theme != self.theme {
                    self.theme = theme;
                    self.events.lock().push(ViewEvent::ThemeChanged(theme));
                }
            }
            Command::ReplaceDocument { document } => self.replace_document(document),
            Command::EditFile { filename, content } => {
                let next = match filename.as_str() {
                    STYLESHEET_FILENAME => self.document.with_css(content),
                    SCRIPT_FILENAME => self.document.with_js(content),
                    page => self.document.with_page_html(page, content)?,
                };
                self.replace_document(next);
            }
        }
        Ok(())
    }

    fn set_active(&mut self, index: usize) {
        if index != self.active && index < self.document.page_count() {
            self.active = index;
            let filename = self.active_page().filename.clone();
            self.events.lock().push(ViewEvent::ActivePageChanged {
                revision: self.revision,
                filename,
            });
        }
    }

    fn set_device(&mut self, device: DevicePreset) {
        if device != self.device {
            self.device = device;
            self.events.lock().push(ViewEvent::DeviceChanged(device));
        }
    }
}
