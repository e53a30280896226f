use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use artisan_core::{Document, Page, SCRIPT_FILENAME, STYLESHEET_FILENAME};
use tracing::{info, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::escape_html;

pub const DEFAULT_ARCHIVE_NAME: &str = "ai-web-artisan-project.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: String,
    pub contents: String,
}

/// Wraps a page body into a standalone file that links the shared stylesheet
/// and script instead of inlining them.
pub fn linked_page(page: &Page) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Generated Website - {title}</title>
    <link rel="stylesheet" href="{STYLESHEET_FILENAME}">
</head>
<body>
{body}
<script src="{SCRIPT_FILENAME}"></script>
</body>
</html>"#,
        title = escape_html(&page.filename),
        body = page.html,
    )
}

/// Every file of the portable site: one per page, then the stylesheet and script.
pub fn export_files(document: &Document) -> Vec<ExportedFile> {
    let mut files: Vec<ExportedFile> = document
        .pages()
        .iter()
        .map(|page| ExportedFile {
            path: page.filename.clone(),
            contents: linked_page(page),
        })
        .collect();
    files.push(ExportedFile {
        path: STYLESHEET_FILENAME.to_owned(),
        contents: document.css().to_owned(),
    });
    files.push(ExportedFile {
        path: SCRIPT_FILENAME.to_owned(),
        contents: document.js().to_owned(),
    });
    files
}

#[instrument(skip_all, fields(pages = document.page_count()))]
pub fn write_zip<W: Write + Seek>(document: &Document, writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in export_files(document) {
        zip.start_file(file.path.as_str(), options)
            .with_context(|| format!("failed to add {} to archive", file.path))?;
        zip.write_all(file.contents.as_bytes())?;
    }
    let writer = zip.finish().context("failed to finish archive")?;
    Ok(writer)
}

pub fn export_zip_bytes(document: &Document) -> Result<Vec<u8>> {
    let cursor = write_zip(document, Cursor::new(Vec::new()))?;
    Ok(cursor.into_inner())
}

/// Writes the exported files into `dir`, creating it when missing.
pub fn write_site_dir(document: &Document, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;
    for file in export_files(document) {
        let path = dir.join(&file.path);
        fs::write(&path, file.contents).with_context(|| format!("failed to write {:?}", path))?;
    }
    info!(dir = %dir.display(), "site exported");
    Ok(())
}
