mod export;
mod host;
mod sandbox;

pub use export::{
    export_files, export_zip_bytes, linked_page, write_site_dir, write_zip, ExportedFile,
    DEFAULT_ARCHIVE_NAME,
};
pub use host::{frame_style, render_host_page, HostPage};
pub use sandbox::{RenderError, SandboxRenderer, NAVIGATION_LISTENER_JS, SANDBOX_PERMISSIONS};

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
