use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use templar::{config::Settings, context::Context, Templar};

/// Scratch layout for one test: a macro library, a snippets root and an
/// include directory under a temporary root.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new(macros: &str) -> Self {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("macros"), macros).unwrap();
        std::fs::create_dir_all(root.path().join("snippets")).unwrap();
        std::fs::create_dir_all(root.path().join("includes")).unwrap();
        Self { root }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn settings(&self) -> Settings {
        Settings {
            legacy_macros_file: self.path("macros"),
            snippets_dir: self.path("snippets"),
            include_dir: Some(self.path("includes")),
            server: "boot.example.org".to_string(),
            ..Settings::default()
        }
    }

    pub fn templar(&self) -> Templar {
        Templar::new(self.settings())
    }
}

pub fn context(value: Value) -> Context {
    value.as_object().cloned().unwrap_or_default()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
