//! Utility helpers — path resolution and string manipulation.

use std::path::{Path, PathBuf};

/// Directory name reserved for editor-managed skills; never scanned.
pub const RESERVED_SKILLS_DIR: &str = "skills-cursor";

/// Get the Skillbot data directory (e.g. `~/.skillbot/`).
pub fn get_data_path() -> PathBuf {
    home_dir().join(".skillbot")
}

/// Get the conversation history file (e.g. `~/.skillbot/chat_history.json`).
pub fn get_history_path() -> PathBuf {
    get_data_path().join("chat_history.json")
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

/// Resolve a configured skill root key to a directory.
///
/// - `skills` → `<project_root>/skills`
/// - `project` → `<project_root>/.cursor/skills`
/// - `personal` → `~/.cursor/skills`
/// - anything else is a path, relative paths resolve against `project_root`
pub fn resolve_skills_dir(key: &str, project_root: &Path) -> PathBuf {
    match key {
        "skills" => project_root.join("skills"),
        "project" => project_root.join(".cursor").join("skills"),
        "personal" => home_dir().join(".cursor").join("skills"),
        other => {
            let p = expand_home(other);
            if p.is_absolute() {
                p
            } else {
                project_root.join(p)
            }
        }
    }
}

fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        let result = truncate_string("hello world, this is a long string", 15);
        assert_eq!(result, "hello world,...");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_string("こんにちは世界です", 5), "こん...");
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/test/path");
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("test/path"));
    }

    #[test]
    fn test_expand_home_absolute() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_resolve_skills_dir_keys() {
        let root = Path::new("/srv/app");
        assert_eq!(resolve_skills_dir("skills", root), PathBuf::from("/srv/app/skills"));
        assert_eq!(
            resolve_skills_dir("project", root),
            PathBuf::from("/srv/app/.cursor/skills")
        );
        assert!(resolve_skills_dir("personal", root).ends_with(".cursor/skills"));
        assert_eq!(resolve_skills_dir("extra/skills", root), PathBuf::from("/srv/app/extra/skills"));
        assert_eq!(resolve_skills_dir("/opt/skills", root), PathBuf::from("/opt/skills"));
    }

    #[test]
    fn test_data_path_ends_with_skillbot() {
        assert!(get_data_path().ends_with(".skillbot"));
        assert!(get_history_path().ends_with("chat_history.json"));
    }
}
