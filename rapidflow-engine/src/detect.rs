//! Language auto-detection
//!
//! Inspects a source tree and returns `(language, version)` using manifest
//! precedence: go.mod, *.go, package.json, *.js, Python manifests, *.py,
//! build.sbt, pom.xml / build.gradle, then a golang fallback. Pure reads;
//! missing or unreadable manifests fall through to the next rule.

use std::path::Path;
use tracing::debug;

/// Detected language and version information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language: String,
    pub version: String,
}

impl LanguageInfo {
    fn new(language: &str, version: impl Into<String>) -> Self {
        Self {
            language: language.to_string(),
            version: version.into(),
        }
    }
}

pub fn detect_language(project_path: &Path) -> LanguageInfo {
    debug!("Detecting language and version in {}", project_path.display());

    if let Some(info) = detect_go(project_path) {
        return info;
    }
    if let Some(info) = detect_node(project_path) {
        return info;
    }
    if let Some(info) = detect_python(project_path) {
        return info;
    }
    if let Some(info) = detect_java_scala(project_path) {
        return info;
    }

    debug!("No specific language detected, defaulting to golang");
    LanguageInfo::new("golang", "latest")
}

/// Canonical base image for a detected language.
///
/// An empty or "latest" version yields the `latest` tag.
pub fn base_image(language: &str, version: &str) -> String {
    let version = if version.is_empty() { "latest" } else { version };
    match language {
        "golang" | "go" => format!("golang:{}", version),
        "python" | "python3" => format!("python:{}", version),
        "node" | "javascript" => format!("node:{}", version),
        "scala" => format!("hseeberger/scala-sbt:{}", version),
        _ => "ubuntu:latest".to_string(),
    }
}

fn detect_go(project_path: &Path) -> Option<LanguageInfo> {
    let go_mod = project_path.join("go.mod");
    if go_mod.exists() {
        debug!("Detected Go project (go.mod found)");
        if let Ok(content) = std::fs::read_to_string(&go_mod) {
            let re = regex::Regex::new(r"go\s+(\d+\.\d+(?:\.\d+)?)").unwrap();
            if let Some(captures) = re.captures(&content) {
                return Some(LanguageInfo::new("golang", &captures[1]));
            }
        }
        return Some(LanguageInfo::new("golang", "latest"));
    }

    if has_file_with_extension(project_path, "go") {
        debug!("Detected Go project (.go files found)");
        return Some(LanguageInfo::new("golang", "latest"));
    }

    None
}

fn detect_node(project_path: &Path) -> Option<LanguageInfo> {
    let package_json = project_path.join("package.json");
    if package_json.exists() {
        debug!("Detected Node.js project (package.json found)");
        if let Ok(content) = std::fs::read_to_string(&package_json) {
            if let Ok(data) = serde_json::from_str::<serde_json::Value>(&content) {
                if let Some(node_version) = data
                    .get("engines")
                    .and_then(|e| e.get("node"))
                    .and_then(|v| v.as_str())
                {
                    // Strip range operators (^ ~ >= ...), keeping digits and dots.
                    let clean: String = node_version
                        .chars()
                        .filter(|c| c.is_ascii_digit() || *c == '.')
                        .collect();
                    if !clean.is_empty() {
                        return Some(LanguageInfo::new("node", clean));
                    }
                }
            }
        }
        return Some(LanguageInfo::new("node", "latest"));
    }

    if has_file_with_extension(project_path, "js") {
        debug!("Detected Node.js project (.js files found)");
        return Some(LanguageInfo::new("node", "latest"));
    }

    None
}

fn detect_python(project_path: &Path) -> Option<LanguageInfo> {
    for manifest in ["requirements.txt", "setup.py", "pyproject.toml"] {
        if project_path.join(manifest).exists() {
            debug!("Detected Python project ({} found)", manifest);
            return Some(LanguageInfo::new("python", "latest"));
        }
    }

    if has_file_with_extension(project_path, "py") {
        debug!("Detected Python project (.py files found)");
        return Some(LanguageInfo::new("python", "latest"));
    }

    None
}

fn detect_java_scala(project_path: &Path) -> Option<LanguageInfo> {
    if project_path.join("build.sbt").exists() {
        debug!("Detected Scala project (build.sbt found)");
        return Some(LanguageInfo::new("scala", "latest"));
    }

    for manifest in ["pom.xml", "build.gradle"] {
        if project_path.join(manifest).exists() {
            debug!("Detected Java project ({} found)", manifest);
            return Some(LanguageInfo::new("java", "latest"));
        }
    }

    None
}

fn has_file_with_extension(project_path: &Path, ext: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(project_path) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.path().is_file() && entry.path().extension().is_some_and(|e| e == ext)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_go_mod_with_version() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module demo\n\ngo 1.22\n").unwrap();

        let info = detect_language(dir.path());
        assert_eq!(info, LanguageInfo::new("golang", "1.22"));
    }

    #[test]
    fn test_go_mod_without_version() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module demo\n").unwrap();

        let info = detect_language(dir.path());
        assert_eq!(info, LanguageInfo::new("golang", "latest"));
    }

    #[test]
    fn test_go_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        assert_eq!(detect_language(dir.path()), LanguageInfo::new("golang", "latest"));
    }

    #[test]
    fn test_package_json_with_engine() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name": "demo", "engines": {"node": ">=18.2"}}"#,
        )
        .unwrap();

        assert_eq!(detect_language(dir.path()), LanguageInfo::new("node", "18.2"));
    }

    #[test]
    fn test_package_json_without_engine() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "demo"}"#).unwrap();

        assert_eq!(detect_language(dir.path()), LanguageInfo::new("node", "latest"));
    }

    #[test]
    fn test_unreadable_package_json_falls_back_to_latest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "not json at all").unwrap();

        assert_eq!(detect_language(dir.path()), LanguageInfo::new("node", "latest"));
    }

    #[test]
    fn test_python_manifests() {
        for manifest in ["requirements.txt", "setup.py", "pyproject.toml"] {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join(manifest), "").unwrap();
            assert_eq!(detect_language(dir.path()), LanguageInfo::new("python", "latest"));
        }
    }

    #[test]
    fn test_scala_and_java() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("build.sbt"), "").unwrap();
        assert_eq!(detect_language(dir.path()), LanguageInfo::new("scala", "latest"));

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pom.xml"), "").unwrap();
        assert_eq!(detect_language(dir.path()), LanguageInfo::new("java", "latest"));
    }

    #[test]
    fn test_go_takes_precedence_over_node() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module demo\ngo 1.21\n").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        assert_eq!(detect_language(dir.path()), LanguageInfo::new("golang", "1.21"));
    }

    #[test]
    fn test_empty_dir_defaults_to_golang() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_language(dir.path()), LanguageInfo::new("golang", "latest"));
    }

    #[test]
    fn test_base_image_table() {
        assert_eq!(base_image("golang", "1.22"), "golang:1.22");
        assert_eq!(base_image("go", ""), "golang:latest");
        assert_eq!(base_image("node", "18"), "node:18");
        assert_eq!(base_image("javascript", "latest"), "node:latest");
        assert_eq!(base_image("python", "3.12"), "python:3.12");
        assert_eq!(base_image("scala", "latest"), "hseeberger/scala-sbt:latest");
        assert_eq!(base_image("cobol", "1"), "ubuntu:latest");
    }
}
