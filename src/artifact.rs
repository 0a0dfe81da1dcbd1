//! Writing artifacts into the output bundle.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Error, Result};
use crate::privacy::Redactor;

/// Written instead of an empty file so every expected path exists.
pub const NO_DATA_PLACEHOLDER: &str = "(no data returned)\n";

/// Bundle subdirectory an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Health,
    Nova,
    Glance,
    Cinder,
    Neutron,
    Heat,
    Keystone,
    Events,
    Logs,
    Describe,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Health,
        Category::Nova,
        Category::Glance,
        Category::Cinder,
        Category::Neutron,
        Category::Heat,
        Category::Keystone,
        Category::Events,
        Category::Logs,
        Category::Describe,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Health => "health",
            Category::Nova => "nova",
            Category::Glance => "glance",
            Category::Cinder => "cinder",
            Category::Neutron => "neutron",
            Category::Heat => "heat",
            Category::Keystone => "keystone",
            Category::Events => "events",
            Category::Logs => "logs",
            Category::Describe => "describe",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.dir_name())
    }
}

/// Content handed to the writer.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Json(serde_json::Value),
    Empty,
}

impl ArtifactContent {
    /// Classify captured backend output for the given file name.
    ///
    /// `.json` files are pretty-printed when the output parses.
    pub fn from_output(file_name: &str, output: &str) -> Self {
        if output.trim().is_empty() {
            return ArtifactContent::Empty;
        }
        if file_name.ends_with(".json") {
            if let Ok(value) = serde_json::from_str(output) {
                return ArtifactContent::Json(value);
            }
        }
        ArtifactContent::Text(output.to_string())
    }

    fn render(self) -> Result<String> {
        let mut body = match self {
            ArtifactContent::Empty => return Ok(NO_DATA_PLACEHOLDER.to_string()),
            ArtifactContent::Text(text) if text.trim().is_empty() => {
                return Ok(NO_DATA_PLACEHOLDER.to_string())
            }
            ArtifactContent::Text(text) => text,
            ArtifactContent::Json(value) => serde_json::to_string_pretty(&value)?,
        };
        if !body.ends_with('\n') {
            body.push('\n');
        }
        Ok(body)
    }
}

/// An artifact as it landed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    /// Path relative to the bundle root.
    pub relative: PathBuf,
    /// Absolute (or caller-relative) path.
    pub path: PathBuf,
    pub bytes: u64,
}

/// Writes artifacts under a bundle root, creating category directories on first use.
///
/// Each bundle path belongs to the first name written to it; a different name
/// that sanitizes onto a taken path gets a numbered suffix instead.
#[derive(Debug)]
pub struct ArtifactWriter {
    root: PathBuf,
    redactor: Option<Redactor>,
    claimed: Mutex<HashMap<PathBuf, String>>,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            redactor: None,
            claimed: Mutex::new(HashMap::new()),
        }
    }

    /// Scrub every artifact with the given redactor before writing it.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Some(redactor).filter(Redactor::is_active);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an artifact to `<root>/<category>/<file_name>`.
    ///
    /// Writing the same name again replaces the earlier artifact.
    pub fn write(
        &self,
        category: Category,
        file_name: &str,
        content: ArtifactContent,
    ) -> Result<WrittenArtifact> {
        let dir = self.root.join(category.dir_name());
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let relative = self.claim(Path::new(category.dir_name()), file_name);
        self.write_relative(relative, content)
    }

    /// Write a file directly under the bundle root.
    pub fn write_root_file(&self, file_name: &str, text: &str) -> Result<WrittenArtifact> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let relative = self.claim(Path::new(""), file_name);
        self.write_relative(relative, ArtifactContent::Text(text.to_string()))
    }

    /// Bundle-relative path for `file_name`, unique among the names written so far.
    fn claim(&self, dir: &Path, file_name: &str) -> PathBuf {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let name = sanitize_file_name(file_name);

        let mut relative = dir.join(&name);
        let mut suffix = 2;
        while claimed
            .get(&relative)
            .map_or(false, |owner| owner != file_name)
        {
            relative = dir.join(numbered(&name, suffix));
            suffix += 1;
        }

        if suffix > 2 {
            debug!(
                "{} collides with an earlier artifact; writing {}",
                file_name,
                relative.display()
            );
        }
        claimed
            .entry(relative.clone())
            .or_insert_with(|| file_name.to_string());
        relative
    }

    fn write_relative(
        &self,
        relative: PathBuf,
        content: ArtifactContent,
    ) -> Result<WrittenArtifact> {
        let mut body = content.render()?;
        if let Some(redactor) = &self.redactor {
            body = redactor.redact(&body);
        }

        let path = self.root.join(&relative);
        fs::write(&path, body.as_bytes()).map_err(|e| Error::io(&path, e))?;

        Ok(WrittenArtifact {
            relative,
            path,
            bytes: body.len() as u64,
        })
    }
}

/// `name` with `-<n>` before its extension.
fn numbered(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('.') => {
            format!("{}-{}.{}", stem, n, ext)
        }
        _ => format!("{}-{}", name, n),
    }
}

/// Map a name onto a safe single path component.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}
