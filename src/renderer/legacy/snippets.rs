use crate::constants::keys;
use crate::context::{value_to_text, Context};
use std::path::{Component, Path, PathBuf};

/// Locates snippet files, preferring per-system and per-profile overrides.
#[derive(Debug, Clone)]
pub struct SnippetLoader {
    root: PathBuf,
}

impl SnippetLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Paths tried for `name`, most specific first.
    pub fn candidates(&self, name: &str, context: &Context) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        let scoped = [("per_system", keys::SYSTEM_NAME), ("per_profile", keys::PROFILE_NAME)];
        for (dir, key) in scoped {
            if let Some(owner) = context.get(key).map(value_to_text).filter(|o| !o.is_empty()) {
                candidates.push(self.root.join(dir).join(name).join(owner));
            }
        }
        candidates.push(self.root.join(name));
        candidates
    }

    /// Raw content of the first readable candidate.
    pub fn read(&self, name: &str, context: &Context) -> Option<String> {
        if !is_relative_name(name) {
            log::warn!("Refusing snippet name '{name}' outside of {}", self.root.display());
            return None;
        }
        self.candidates(name, context).into_iter().find_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            log::debug!("Using snippet {}", path.display());
            Some(content)
        })
    }
}

fn is_relative_name(name: &str) -> bool {
    !name.is_empty() && Path::new(name).components().all(|c| matches!(c, Component::Normal(_)))
}
