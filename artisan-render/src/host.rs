use artisan_core::{DevicePreset, Theme};

use crate::escape_html;
use crate::sandbox::SANDBOX_PERMISSIONS;

/// Inputs for the page that hosts the preview frame.
#[derive(Debug, Clone)]
pub struct HostPage {
    pub title: String,
    pub device: DevicePreset,
    pub theme: Theme,
    pub version: u64,
}

impl Default for HostPage {
    fn default() -> Self {
        Self {
            title: "Web Artisan".to_owned(),
            device: DevicePreset::default(),
            theme: Theme::default(),
            version: 0,
        }
    }
}

/// Inline CSS for the box around the preview frame.
pub fn frame_style(device: DevicePreset) -> String {
    let frame = device.frame();
    let mut style = match (frame.width, frame.height) {
        (Some(w), Some(h)) => format!("width:{w}px;height:{h}px;"),
        _ => "width:100%;height:100%;".to_owned(),
    };
    if frame.border_px > 0 {
        let color = match device {
            DevicePreset::Mobile => "#1f2937",
            _ => "#374151",
        };
        style.push_str(&format!("border:{}px solid {color};", frame.border_px));
    }
    if frame.rounded {
        style.push_str("border-radius:16px;box-shadow:0 20px 25px -5px rgba(0,0,0,0.25);");
    }
    style.push_str("background:#fff;transition:all 0.3s ease-in-out;overflow:hidden;");
    style
}

/// The host shell: toolbar, the sandboxed frame, and the listener that relays
/// frame messages to the server-side bridge.
pub fn render_host_page(page: &HostPage) -> String {
    let devices: String = DevicePreset::ALL
        .iter()
        .map(|d| {
            format!(
                "<button type=\"button\" data-device=\"{0}\">{0}</button>",
                d.as_str()
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en" class="{theme}">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{HOST_CSS}</style>
</head>
<body>
<header>
  <strong>{title}</strong>
  <span id="active-page"></span>
  <nav id="devices">{devices}</nav>
  <a href="/export.zip" download>Export</a>
</header>
<form id="prompt-form">
  <textarea id="prompt" placeholder="e.g., A portfolio website for a software engineer with a contact page."></textarea>
  <button type="submit">Generate Website</button>
  <span id="status"></span>
</form>
<main>
  <div id="frame-box" style="{frame}">
    <iframe id="preview" title="Live Preview" sandbox="{SANDBOX_PERMISSIONS}"></iframe>
  </div>
</main>
<script>
const INITIAL_VERSION = {version};
{HOST_JS}
</script>
</body>
</html>
"#,
        theme = page.theme.as_str(),
        title = escape_html(&page.title),
        frame = frame_style(page.device),
        version = page.version,
    )
}

const HOST_CSS: &str = r#"
html, body { margin: 0; height: 100%; font-family: system-ui, sans-serif; }
html.dark body { background: #111827; color: #f3f4f6; }
body { display: flex; flex-direction: column; }
header { display: flex; gap: 1rem; align-items: center; padding: 0.5rem 1rem; border-bottom: 1px solid #d1d5db; }
#prompt-form { display: flex; gap: 0.5rem; padding: 0.5rem 1rem; }
#prompt { flex: 1; height: 3rem; resize: vertical; }
main { flex: 1; display: flex; align-items: center; justify-content: center; padding: 1rem; overflow: auto; background: #f3f4f6; }
html.dark main { background: #1f2937; }
#preview { width: 100%; height: 100%; border: 0; }
"#;

const HOST_JS: &str = r#"
const frame = document.getElementById('preview');
const frameBox = document.getElementById('frame-box');
const activeLabel = document.getElementById('active-page');
const statusLabel = document.getElementById('status');
let version = INITIAL_VERSION;
let shownRevision = null;
let shownPage = null;

async function refresh() {
  const state = await (await fetch('/api/state')).json();
  version = state.version;
  document.documentElement.className = state.theme;
  frameBox.setAttribute('style', state.frame_style);
  activeLabel.textContent = state.active + ' (' + (state.active_index + 1) + '/' + state.pages.length + ')';
  // Device and theme changes only restyle the box; the frame keeps running.
  if (state.revision !== shownRevision || state.active !== shownPage) {
    shownRevision = state.revision;
    shownPage = state.active;
    frame.srcdoc = await (await fetch('/preview')).text();
  }
}

window.addEventListener('message', (event) => {
  if (event.source !== frame.contentWindow) return;
  const data = event.data;
  if (!data || data.type !== 'navigate') return;
  fetch('/api/navigate', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify(data),
  });
});

document.querySelectorAll('#devices button').forEach((button) => {
  button.addEventListener('click', () => {
    fetch('/api/device/' + button.dataset.device, { method: 'POST' });
  });
});

document.getElementById('prompt-form').addEventListener('submit', async (event) => {
  event.preventDefault();
  const prompt = document.getElementById('prompt').value;
  statusLabel.textContent = 'Generating...';
  const response = await fetch('/api/generate', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify({ prompt }),
  });
  const body = await response.json();
  statusLabel.textContent = response.ok ? 'Your website has been generated.' : body.error;
});

async function watch() {
  for (;;) {
    try {
      const state = await (await fetch('/api/wait?since=' + version)).json();
      if (state.version !== version) await refresh();
    } catch (err) {
      await new Promise((resolve) => setTimeout(resolve, 1000));
    }
  }
}

refresh().then(watch);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_style_follows_device_presets() {
        assert!(frame_style(DevicePreset::Desktop).starts_with("width:100%;height:100%;"));
        assert!(!frame_style(DevicePreset::Desktop).contains("border:"));

        let tablet = frame_style(DevicePreset::Tablet);
        assert!(tablet.contains("width:768px;height:1024px;"));
        assert!(tablet.contains("border:4px solid #374151;"));

        let mobile = frame_style(DevicePreset::Mobile);
        assert!(mobile.contains("width:375px;height:667px;"));
        assert!(mobile.contains("border-radius:16px;"));
    }

    #[test]
    fn host_page_sandboxes_the_frame_and_listens_for_navigation() {
        let html = render_host_page(&HostPage {
            title: "Demo <site>".into(),
            device: DevicePreset::Mobile,
            theme: Theme::Dark,
            version: 7,
        });
        assert!(html.contains(r#"sandbox="allow-scripts allow-forms allow-popups""#));
        assert!(!html.contains("allow-same-origin"));
        assert!(html.contains("<html lang=\"en\" class=\"dark\">"));
        assert!(html.contains("Demo &lt;site&gt;"));
        assert!(html.contains("const INITIAL_VERSION = 7;"));
        assert!(html.contains("data.type !== 'navigate'"));
        assert!(html.contains("width:375px"));
        assert_eq!(html.matches("data-device=").count(), 3);
    }

    #[test]
    fn frame_reloads_only_when_page_or_revision_changes() {
        let html = render_host_page(&HostPage::default());
        let guard = html
            .find("state.revision !== shownRevision || state.active !== shownPage")
            .unwrap();
        let reload = html.find("frame.srcdoc = ").unwrap();
        let restyle = html.find("frameBox.setAttribute('style', state.frame_style)").unwrap();
        assert!(restyle < guard);
        assert!(guard < reload);
        assert_eq!(html.matches("frame.srcdoc = ").count(), 1);
    }
}
