use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::analysis::error::StepError;
use crate::analysis::step::{AnalysisOptions, AnalysisStep};
use crate::analysis::types::AnalysisType;
use crate::fs::{ProjectReader, WalkConfig};

use super::ensure_project;

/// npm package name -> framework label.
const JS_FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "react"),
    ("vue", "vue"),
    ("@angular/core", "angular"),
    ("svelte", "svelte"),
    ("next", "next"),
    ("express", "express"),
    ("fastify", "fastify"),
    ("@nestjs/core", "nestjs"),
];

/// Crate names whose presence in Cargo.toml marks a web framework.
const RUST_FRAMEWORKS: &[&str] = &["actix-web", "axum", "rocket", "warp"];

/// Identifies languages, build systems, and frameworks from the manifests
/// present in the tree.
pub struct TechStackStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl TechStackStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            walk: WalkConfig::default(),
        }
    }

    fn manifest_stack(file_name: &str) -> Option<(&'static str, &'static str)> {
        match file_name {
            "Cargo.toml" => Some(("rust", "cargo")),
            "package.json" => Some(("javascript", "npm")),
            "go.mod" => Some(("go", "go")),
            "pom.xml" => Some(("java", "maven")),
            "build.gradle" | "build.gradle.kts" => Some(("java", "gradle")),
            "requirements.txt" => Some(("python", "pip")),
            "pyproject.toml" => Some(("python", "poetry")),
            "Gemfile" => Some(("ruby", "bundler")),
            "composer.json" => Some(("php", "composer")),
            "mix.exs" => Some(("elixir", "mix")),
            "CMakeLists.txt" => Some(("cpp", "cmake")),
            _ => None,
        }
    }

    fn package_json_frameworks(
        content: &str,
        include_dev: bool,
        frameworks: &mut BTreeSet<String>,
    ) {
        let manifest: Value = match serde_json::from_str(content) {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!(error = %err, "skipping unparseable package.json");
                return;
            }
        };
        let sections: &[&str] = if include_dev {
            &["dependencies", "devDependencies"]
        } else {
            &["dependencies"]
        };
        for section in sections {
            if let Some(deps) = manifest.get(*section).and_then(Value::as_object) {
                for (package, label) in JS_FRAMEWORKS {
                    if deps.contains_key(*package) {
                        frameworks.insert((*label).to_string());
                    }
                }
            }
        }
    }

    fn cargo_toml_frameworks(content: &str, frameworks: &mut BTreeSet<String>) {
        for line in content.lines() {
            let name = line.split(&['=', ' ', '\t'][..]).next().unwrap_or("").trim();
            if RUST_FRAMEWORKS.contains(&name) {
                frameworks.insert(name.to_string());
            }
        }
    }
}

#[async_trait]
impl AnalysisStep for TechStackStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::TechStack
    }

    fn description(&self) -> &str {
        "manifest-based language and framework detection"
    }

    async fn execute(
        &self,
        project_path: &Path,
        options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;
        let include_dev = options.get_bool("include_dev_dependencies").unwrap_or(true);

        let mut languages = BTreeSet::new();
        let mut build_systems = BTreeSet::new();
        let mut frameworks = BTreeSet::new();
        let mut manifests = Vec::new();

        for entry in &entries {
            let file_name = match entry.file_name() {
                Some(name) => name,
                None => continue,
            };
            let (language, build_system) = match Self::manifest_stack(file_name) {
                Some(stack) => stack,
                None => continue,
            };

            languages.insert(language);
            build_systems.insert(build_system);
            manifests.push(entry.path.display().to_string());

            if file_name == "package.json" || file_name == "Cargo.toml" {
                match self.reader.read_to_string(&project_path.join(&entry.path)) {
                    Ok(content) if file_name == "package.json" => {
                        Self::package_json_frameworks(&content, include_dev, &mut frameworks)
                    }
                    Ok(content) => Self::cargo_toml_frameworks(&content, &mut frameworks),
                    Err(err) => {
                        debug!(file = %entry.path.display(), error = %err, "manifest unreadable")
                    }
                }
            }
        }

        manifests.sort();

        Ok(json!({
            "languages": languages,
            "build_systems": build_systems,
            "frameworks": frameworks,
            "manifests": manifests,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockProjectReader;

    #[tokio::test]
    async fn test_detects_react_project() {
        let reader = MockProjectReader::new()
            .with_file(
                "/repo/package.json",
                r#"{"dependencies": {"react": "^18.0.0"}, "devDependencies": {"vite": "^5"}}"#,
            )
            .with_file("/repo/src/index.ts", "");
        let step = TechStackStep::new(Arc::new(reader));

        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(payload["languages"], json!(["javascript"]));
        assert_eq!(payload["build_systems"], json!(["npm"]));
        assert_eq!(payload["frameworks"], json!(["react"]));
        assert_eq!(payload["manifests"], json!(["package.json"]));
    }

    #[tokio::test]
    async fn test_detects_polyglot_monorepo() {
        let reader = MockProjectReader::new()
            .with_file(
                "/repo/services/api/Cargo.toml",
                "[dependencies]\naxum = \"0.7\"\ntokio = \"1\"\n",
            )
            .with_file("/repo/web/package.json", r#"{"dependencies": {"next": "14"}}"#)
            .with_file("/repo/tools/requirements.txt", "ruff==0.4\n");
        let step = TechStackStep::new(Arc::new(reader));

        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(payload["languages"], json!(["javascript", "python", "rust"]));
        assert_eq!(payload["build_systems"], json!(["cargo", "npm", "pip"]));
        assert_eq!(payload["frameworks"], json!(["axum", "next"]));
    }

    #[tokio::test]
    async fn test_dev_dependencies_can_be_excluded() {
        let reader = MockProjectReader::new().with_file(
            "/repo/package.json",
            r#"{"devDependencies": {"react": "^18.0.0"}}"#,
        );
        let step = TechStackStep::new(Arc::new(reader));

        let mut map = std::collections::BTreeMap::new();
        map.insert("include_dev_dependencies".to_string(), json!(false));
        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::new(map))
            .await
            .unwrap();

        assert!(payload["frameworks"].as_array().unwrap().is_empty());
        assert_eq!(payload["languages"], json!(["javascript"]));
    }

    #[tokio::test]
    async fn test_no_manifests() {
        let reader = MockProjectReader::new().with_file("/repo/notes.txt", "plain");
        let step = TechStackStep::new(Arc::new(reader));

        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert!(payload["languages"].as_array().unwrap().is_empty());
        assert!(payload["manifests"].as_array().unwrap().is_empty());
    }
}
