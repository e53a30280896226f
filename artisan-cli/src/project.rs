use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use artisan_core::{Document, Page, Theme};
use serde::{Deserialize, Serialize};

/// A generated site as kept on disk between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub theme: Theme,
    pub document: Document,
}

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    theme: Theme,
    pages: Vec<Page>,
    #[serde(default)]
    css: String,
    #[serde(default)]
    js: String,
}

impl Project {
    pub fn placeholder() -> Self {
        Self {
            theme: Theme::default(),
            document: Document::placeholder(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read project file {:?}", path))?;
        let file: ProjectFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode project file {:?}", path))?;
        let document = Document::new(file.pages, file.css, file.js)
            .with_context(|| format!("project file {:?} is not a valid site", path))?;
        Ok(Self {
            theme: file.theme,
            document,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = ProjectFile {
            theme: self.theme,
            pages: self.document.pages().to_vec(),
            css: self.document.css().to_owned(),
            js: self.document.js().to_owned(),
        };
        let payload = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        let mut out = File::create(&tmp)
            .with_context(|| format!("failed to open temp project file {:?}", tmp))?;
        out.write_all(payload.as_bytes())?;
        out.flush()?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to move project file into {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn project_survives_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.json");
        let project = Project {
            theme: Theme::Dark,
            document: Document::new(
                vec![
                    Page::new("index.html", "<h1>Home</h1>"),
                    Page::new("about.html", "<h1>About</h1>"),
                ],
                "body{}",
                "",
            )
            .unwrap(),
        };

        project.save(&path).unwrap();
        assert!(!dir.path().join("site.json.tmp").exists());
        assert_eq!(Project::load(&path).unwrap(), project);
    }

    #[test]
    fn load_rejects_invalid_sites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"pages":[],"css":"","js":""}"#).unwrap();
        let err = Project::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("at least one page"));
    }

    #[test]
    fn theme_defaults_to_light() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.json");
        std::fs::write(
            &path,
            r#"{"pages":[{"filename":"index.html","html":"<p>x</p>"}]}"#,
        )
        .unwrap();
        let project = Project::load(&path).unwrap();
        assert_eq!(project.theme, Theme::Light);
        assert_eq!(project.document.js(), "");
    }
}
