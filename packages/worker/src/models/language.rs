use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::Submission;
use tracing::warn;

use super::executor::{ExecutionOutcome, SandboxExecutor};
use super::sandbox::RunnerConfig;
use crate::config::LanguageSettings;

/// Runs submissions of one language.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    fn config(&self) -> &RunnerConfig;

    /// Execute `submission` under this runner's configuration.
    async fn invoke(&self, executor: &SandboxExecutor, submission: &Submission) -> ExecutionOutcome {
        executor
            .execute(
                &submission.code,
                &submission.input,
                submission.limits(),
                self.config(),
            )
            .await
    }
}

/// A runner for interpreted languages: write the source, run the interpreter on it.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: RunnerConfig,
}

impl ScriptRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn python() -> Self {
        Self::new(RunnerConfig {
            image: "python:3.11-alpine".into(),
            command: vec!["python".into(), "/code/main.py".into()],
            file_name: "main.py".into(),
        })
    }
}

impl From<&LanguageSettings> for ScriptRunner {
    fn from(settings: &LanguageSettings) -> Self {
        Self::new(RunnerConfig {
            image: settings.image.clone(),
            command: settings.command.clone(),
            file_name: settings.file_name.clone(),
        })
    }
}

#[async_trait]
impl LanguageRunner for ScriptRunner {
    fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

/// Maps language identifiers to runners.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn LanguageRunner>>,
    /// Alias -> registered language.
    aliases: HashMap<String, String>,
}

impl RunnerRegistry {
    /// A registry with no languages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in runners: `python`, also reachable as `py` and `python3`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("python", Arc::new(ScriptRunner::python()));
        registry.alias("py", "python");
        registry.alias("python3", "python");
        registry
    }

    /// Built-ins plus the languages declared in configuration.
    ///
    /// A configured language with a built-in's name replaces it.
    pub fn from_settings(languages: &HashMap<String, LanguageSettings>) -> Self {
        let mut registry = Self::with_defaults();
        for (language, settings) in languages {
            if settings.command.is_empty() {
                warn!(language = %language, "Skipping language with an empty command");
                continue;
            }
            registry.register(language.clone(), Arc::new(ScriptRunner::from(settings)));
            for alias in &settings.aliases {
                registry.alias(alias.clone(), language);
            }
        }
        registry
    }

    pub fn register(&mut self, language: impl Into<String>, runner: Arc<dyn LanguageRunner>) {
        self.runners.insert(language.into(), runner);
    }

    /// Make `alias` resolve to whatever runner is registered as `target`.
    ///
    /// Returns `false` if `target` is not registered.
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> bool {
        if !self.runners.contains_key(target) {
            return false;
        }
        self.aliases.insert(alias.into(), target.to_string());
        true
    }

    pub fn resolve(&self, language: &str) -> Option<Arc<dyn LanguageRunner>> {
        let language = self
            .aliases
            .get(language)
            .map(String::as_str)
            .unwrap_or(language);
        self.runners.get(language).cloned()
    }

    /// Registered identifiers, aliases included, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .runners
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> LanguageSettings {
        LanguageSettings {
            image: "node:20-alpine".into(),
            command: vec!["node".into(), "/code/main.js".into()],
            file_name: "main.js".into(),
            aliases: vec!["js".into()],
        }
    }

    #[test]
    fn test_python_is_built_in() {
        let registry = RunnerRegistry::with_defaults();
        let runner = registry.resolve("python").unwrap();
        assert_eq!(runner.config().image, "python:3.11-alpine");
        assert_eq!(runner.config().command, vec!["python", "/code/main.py"]);
        assert_eq!(runner.config().file_name, "main.py");

        for alias in ["py", "python3"] {
            assert_eq!(registry.resolve(alias).unwrap().config(), runner.config());
        }
    }

    #[test]
    fn test_unknown_language_resolves_to_none() {
        let registry = RunnerRegistry::with_defaults();
        assert!(registry.resolve("brainf**k").is_none());
        assert!(registry.resolve("Python").is_none());
        assert!(RunnerRegistry::empty().resolve("python").is_none());
    }

    #[test]
    fn test_configured_languages_extend_and_override() {
        let mut languages = HashMap::new();
        languages.insert("node".to_string(), node());
        languages.insert(
            "python".to_string(),
            LanguageSettings {
                image: "python:3.12-slim".into(),
                command: vec!["python".into(), "/code/main.py".into()],
                file_name: "main.py".into(),
                aliases: vec![],
            },
        );
        languages.insert(
            "broken".to_string(),
            LanguageSettings {
                command: vec![],
                ..node()
            },
        );

        let registry = RunnerRegistry::from_settings(&languages);
        assert_eq!(registry.resolve("js").unwrap().config().image, "node:20-alpine");
        for name in ["python", "py", "python3"] {
            assert_eq!(
                registry.resolve(name).unwrap().config().image,
                "python:3.12-slim"
            );
        }
        assert!(registry.resolve("broken").is_none());
        assert_eq!(
            registry.languages(),
            vec!["js", "node", "py", "python", "python3"]
        );
    }

    #[test]
    fn test_alias_to_unknown_target_is_rejected() {
        let mut registry = RunnerRegistry::empty();
        assert!(!registry.alias("rb", "ruby"));
        assert!(registry.resolve("rb").is_none());
    }
}
