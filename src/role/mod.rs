//! System prompts: the built-in data-visualisation role and user role files.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::Config;

const ROLE_EXTENSIONS: &[&str] = &["txt", "md"];

pub const DEFAULT_ROLE_TEXT: &str = "You are an advanced AI assistant specializing in data visualization. \
Your task is to generate only Python code that utilizes the pandas library for data processing and matplotlib for creating charts and graphs. \
Always generate fully functional code that can be executed immediately. \
Include all necessary imports to ensure the code runs without errors and modifications. \
Do not add any comments or explanations, only return the Python code that is properly formatted. \
If the user requests modifications, adjust the code accordingly without repeating the entire initial prompt. \
Ensure that the output remains executable after changes. \
Maintain consistency in variable names and chart styling unless the user specifies otherwise.";

/// Named role file, then `SYSTEM_PROMPT`, then the built-in text.
pub fn resolve_role_text(cfg: &Config, role_name: Option<&str>) -> Result<String> {
    if let Some(name) = role_name {
        return show(cfg, name);
    }
    Ok(cfg.get("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_ROLE_TEXT.to_string()))
}

pub fn show(cfg: &Config, name: &str) -> Result<String> {
    let path = find(cfg, name)
        .with_context(|| format!("role not found: {} (looked in {})", name, cfg.roles_path().display()))?;
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading role file {}", path.display()))?;
    let text = text.trim().to_string();
    if text.is_empty() {
        bail!("role file {} is empty", path.display());
    }
    Ok(text)
}

pub fn list(cfg: &Config) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(cfg.roles_path())
        .map(|rd| {
            rd.filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| has_role_extension(p))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

pub fn create(cfg: &Config, name: &str, text: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("invalid role name: {:?}", name);
    }
    if text.trim().is_empty() {
        bail!("role text is empty");
    }
    let dir = cfg.roles_path();
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.txt", name));
    fs::write(&path, text.trim())?;
    Ok(path)
}

fn find(cfg: &Config, name: &str) -> Option<PathBuf> {
    let dir = cfg.roles_path();
    ROLE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|p| p.is_file())
}

fn has_role_extension(p: &std::path::Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ROLE_EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_roles(dir: &std::path::Path) -> Config {
        Config::from_rc_str(&format!("ROLE_STORAGE_PATH={}", dir.display()))
    }

    #[test]
    fn built_in_role_is_the_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = cfg_with_roles(dir.path());
        assert_eq!(resolve_role_text(&cfg, None)?, DEFAULT_ROLE_TEXT);
        Ok(())
    }

    #[test]
    fn system_prompt_key_overrides_built_in() -> Result<()> {
        let cfg = Config::from_rc_str("SYSTEM_PROMPT=Only answer with seaborn code.");
        assert_eq!(resolve_role_text(&cfg, None)?, "Only answer with seaborn code.");
        Ok(())
    }

    #[test]
    fn created_roles_are_listed_and_resolved() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = cfg_with_roles(dir.path());
        let path = create(&cfg, "terse", "  Reply with code only.\n")?;
        assert_eq!(path, dir.path().join("terse.txt"));
        fs::write(dir.path().join("notes.json"), "{}")?;

        assert_eq!(list(&cfg), vec![path]);
        assert_eq!(resolve_role_text(&cfg, Some("terse"))?, "Reply with code only.");
        assert!(resolve_role_text(&cfg, Some("missing")).is_err());
        Ok(())
    }

    #[test]
    fn role_names_cannot_escape_the_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = cfg_with_roles(dir.path());
        assert!(create(&cfg, "../evil", "x").is_err());
        assert!(create(&cfg, "ok", "   ").is_err());
        Ok(())
    }
}
