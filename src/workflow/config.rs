//! Layered configuration
//!
//! A [`ResolvedConfig`] is built once per invocation from, in increasing
//! precedence: built-in defaults, a YAML file, `DEPLOY_*` environment
//! variables and command-line flags. Every layer is a [`PartialConfig`].
//!
//! ```yaml
//! # deploy.yaml
//! app: flask-app
//! image: flask-app:1.4.0
//! port: 5000
//! region: us-east-1
//! namespace: web
//! min_replicas: 2
//! max_replicas: 6
//! replicas: 3
//! ```
//!
//! Resolution reports every missing or invalid field at once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::error::DeployError;

/// Config file names looked up in the working directory
pub const CONFIG_FILE_NAMES: &[&str] = &["deploy.yaml", "deploy.yml"];

/// Prefix of the environment variables read by the resolver
pub const ENV_PREFIX: &str = "DEPLOY_";

/// (field, environment variable, flag) for every setting
const FIELDS: &[(&str, &str, &str)] = &[
    ("app", "DEPLOY_APP", "--app"),
    ("image", "DEPLOY_IMAGE", "--image"),
    ("container", "DEPLOY_CONTAINER", "--container"),
    ("port", "DEPLOY_PORT", "--port"),
    ("min_replicas", "DEPLOY_MIN_REPLICAS", "--min-replicas"),
    ("max_replicas", "DEPLOY_MAX_REPLICAS", "--max-replicas"),
    ("replicas", "DEPLOY_REPLICAS", "--replicas"),
    ("region", "DEPLOY_REGION", "--region"),
    ("namespace", "DEPLOY_NAMESPACE", "--namespace"),
    ("manifests_dir", "DEPLOY_MANIFESTS_DIR", "--manifests-dir"),
    ("terraform_dir", "DEPLOY_TERRAFORM_DIR", "--terraform-dir"),
    ("ssh_key", "DEPLOY_SSH_KEY", "--ssh-key"),
    ("step_timeout_secs", "DEPLOY_STEP_TIMEOUT_SECS", "--timeout"),
    ("rollout_attempts", "DEPLOY_ROLLOUT_ATTEMPTS", "--rollout-attempts"),
    ("rollout_interval_secs", "DEPLOY_ROLLOUT_INTERVAL_SECS", "--rollout-interval"),
];

/// Replica counts for the deployment and the autoscaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaBounds {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

/// Fully determined settings for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub app: String,
    pub image: String,
    pub container: String,
    pub port: u16,
    pub replicas: ReplicaBounds,
    pub region: String,
    pub namespace: String,
    pub manifests_dir: PathBuf,
    pub terraform_dir: PathBuf,
    pub ssh_key: PathBuf,
    pub step_timeout: Duration,
    pub rollout_attempts: u32,
    pub rollout_interval: Duration,
}

impl ResolvedConfig {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&PartialConfig::from(self))
    }
}

/// One configuration layer; unset fields fall through to lower layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_interval_secs: Option<u64>,
}

impl PartialConfig {
    /// Built-in defaults. `image` and `region` deliberately have none.
    pub fn defaults(home: Option<&Path>) -> Self {
        Self {
            app: Some("flask-app".to_string()),
            image: None,
            container: None,
            port: Some(5000),
            min_replicas: Some(1),
            max_replicas: Some(5),
            replicas: Some(2),
            region: None,
            namespace: Some("default".to_string()),
            manifests_dir: Some(PathBuf::from("k8s")),
            terraform_dir: Some(PathBuf::from("terraform")),
            ssh_key: home.map(|h| h.join(".ssh").join("deploy_key")),
            step_timeout_secs: Some(600),
            rollout_attempts: Some(30),
            rollout_interval_secs: Some(10),
        }
    }

    /// Load a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DeployError::ConfigFile {
            file: path.display().to_string(),
            error: e,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| DeployError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    /// Read `DEPLOY_*` variables; unparsable values are returned as problems
    pub fn from_env<I, K, V>(vars: I) -> (Self, Vec<FieldProblem>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut layer = Self::default();
        let mut problems = Vec::new();

        for (key, value) in vars {
            let key = key.as_ref();
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let Some(&(field, _, _)) = FIELDS.iter().find(|(_, env, _)| *env == key) else {
                continue;
            };
            let value: String = value.into();
            if let Err(message) = layer.set(field, &value) {
                problems.push(FieldProblem::invalid(field, format!("{}={:?}: {}", key, value, message)));
            }
        }

        (layer, problems)
    }

    /// Set a field from its string form
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), String> {
        fn num<T: std::str::FromStr>(value: &str) -> Result<Option<T>, String>
        where
            T::Err: fmt::Display,
        {
            value.trim().parse().map(Some).map_err(|e: T::Err| e.to_string())
        }

        match field {
            "app" => self.app = Some(value.to_string()),
            "image" => self.image = Some(value.to_string()),
            "container" => self.container = Some(value.to_string()),
            "port" => self.port = num(value)?,
            "min_replicas" => self.min_replicas = num(value)?,
            "max_replicas" => self.max_replicas = num(value)?,
            "replicas" => self.replicas = num(value)?,
            "region" => self.region = Some(value.to_string()),
            "namespace" => self.namespace = Some(value.to_string()),
            "manifests_dir" => self.manifests_dir = Some(PathBuf::from(value)),
            "terraform_dir" => self.terraform_dir = Some(PathBuf::from(value)),
            "ssh_key" => self.ssh_key = Some(PathBuf::from(value)),
            "step_timeout_secs" => self.step_timeout_secs = num(value)?,
            "rollout_attempts" => self.rollout_attempts = num(value)?,
            "rollout_interval_secs" => self.rollout_interval_secs = num(value)?,
            other => return Err(format!("unknown setting '{}'", other)),
        }
        Ok(())
    }

    /// Layer `higher` on top of `self`
    pub fn overlay(self, higher: PartialConfig) -> PartialConfig {
        PartialConfig {
            app: higher.app.or(self.app),
            image: higher.image.or(self.image),
            container: higher.container.or(self.container),
            port: higher.port.or(self.port),
            min_replicas: higher.min_replicas.or(self.min_replicas),
            max_replicas: higher.max_replicas.or(self.max_replicas),
            replicas: higher.replicas.or(self.replicas),
            region: higher.region.or(self.region),
            namespace: higher.namespace.or(self.namespace),
            manifests_dir: higher.manifests_dir.or(self.manifests_dir),
            terraform_dir: higher.terraform_dir.or(self.terraform_dir),
            ssh_key: higher.ssh_key.or(self.ssh_key),
            step_timeout_secs: higher.step_timeout_secs.or(self.step_timeout_secs),
            rollout_attempts: higher.rollout_attempts.or(self.rollout_attempts),
            rollout_interval_secs: higher.rollout_interval_secs.or(self.rollout_interval_secs),
        }
    }
}

impl From<&ResolvedConfig> for PartialConfig {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            app: Some(config.app.clone()),
            image: Some(config.image.clone()),
            container: Some(config.container.clone()),
            port: Some(config.port),
            min_replicas: Some(config.replicas.min),
            max_replicas: Some(config.replicas.max),
            replicas: Some(config.replicas.desired),
            region: Some(config.region.clone()),
            namespace: Some(config.namespace.clone()),
            manifests_dir: Some(config.manifests_dir.clone()),
            terraform_dir: Some(config.terraform_dir.clone()),
            ssh_key: Some(config.ssh_key.clone()),
            step_timeout_secs: Some(config.step_timeout.as_secs()),
            rollout_attempts: Some(config.rollout_attempts),
            rollout_interval_secs: Some(config.rollout_interval.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    Missing,
    Invalid(String),
}

/// A single unresolved or invalid setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    pub field: String,
    pub kind: ProblemKind,
}

impl FieldProblem {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: ProblemKind::Missing,
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            kind: ProblemKind::Invalid(message.into()),
        }
    }
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProblemKind::Missing => {
                match FIELDS.iter().find(|(name, _, _)| *name == self.field) {
                    Some((name, env, flag)) => write!(
                        f,
                        "{}: missing (set `{}` in deploy.yaml, {} or {})",
                        name, name, env, flag
                    ),
                    None => write!(f, "{}: missing", self.field),
                }
            }
            ProblemKind::Invalid(message) => write!(f, "{}: {}", self.field, message),
        }
    }
}

/// Every problem found while resolving the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub problems: Vec<FieldProblem>,
}

impl ConfigError {
    pub fn missing_fields(&self) -> Vec<&str> {
        self.problems
            .iter()
            .filter(|p| p.kind == ProblemKind::Missing)
            .map(|p| p.field.as_str())
            .collect()
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration could not be resolved:")?;
        for problem in &self.problems {
            write!(f, "\n  - {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

/// Builds a [`ResolvedConfig`] from layered sources
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    home: Option<PathBuf>,
    defaults: PartialConfig,
    file: PartialConfig,
    env: PartialConfig,
    flags: PartialConfig,
    optional: Vec<String>,
    problems: Vec<FieldProblem>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Resolver seeded with built-in defaults for the current user
    pub fn new() -> Self {
        Self::with_home(home_dir())
    }

    /// Resolver seeded with built-in defaults for the given home directory
    pub fn with_home(home: Option<PathBuf>) -> Self {
        Self {
            defaults: PartialConfig::defaults(home.as_deref()),
            home,
            file: PartialConfig::default(),
            env: PartialConfig::default(),
            flags: PartialConfig::default(),
            optional: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Replace the built-in defaults
    pub fn defaults(mut self, defaults: PartialConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn file(mut self, layer: PartialConfig) -> Self {
        self.file = layer;
        self
    }

    /// Load the file layer from disk
    pub fn file_path(self, path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        debug!("Loading config file {}", path.display());
        Ok(self.file(PartialConfig::load(path)?))
    }

    /// First `deploy.yaml`/`deploy.yml` in `dir`, if any
    pub fn discover_file(dir: impl AsRef<Path>) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|p| p.is_file())
    }

    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (layer, problems) = PartialConfig::from_env(vars);
        self.env = layer;
        self.problems.extend(problems);
        self
    }

    /// Read the environment layer from the process environment
    pub fn process_env(self) -> Self {
        self.env(std::env::vars())
    }

    pub fn flags(mut self, layer: PartialConfig) -> Self {
        self.flags = layer;
        self
    }

    /// Text settings that resolve to an empty string instead of failing
    /// when no layer sets them
    pub fn optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Merge every layer and validate the result
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let merged = self
            .defaults
            .overlay(self.file)
            .overlay(self.env)
            .overlay(self.flags);
        let mut problems = self.problems;

        fn take<T>(value: Option<T>, field: &str, problems: &mut Vec<FieldProblem>) -> Option<T> {
            if value.is_none() {
                problems.push(FieldProblem::missing(field));
            }
            value
        }

        fn non_empty(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let optional = |field: &str, value: Option<String>| match value {
            None if self.optional.iter().any(|f| f == field) => Some(String::new()),
            other => other,
        };

        let app = take(non_empty(merged.app), "app", &mut problems);
        let image = take(optional("image", non_empty(merged.image)), "image", &mut problems);
        let container = non_empty(merged.container).or_else(|| app.clone());
        let port = take(merged.port, "port", &mut problems);
        let min = take(merged.min_replicas, "min_replicas", &mut problems);
        let max = take(merged.max_replicas, "max_replicas", &mut problems);
        let desired = take(merged.replicas, "replicas", &mut problems);
        let region = take(optional("region", non_empty(merged.region)), "region", &mut problems);
        let namespace = take(non_empty(merged.namespace), "namespace", &mut problems);
        let manifests_dir = take(merged.manifests_dir, "manifests_dir", &mut problems);
        let terraform_dir = take(merged.terraform_dir, "terraform_dir", &mut problems);
        let ssh_key = take(merged.ssh_key, "ssh_key", &mut problems)
            .map(|p| expand_home(&p, self.home.as_deref()));
        let timeout = take(merged.step_timeout_secs, "step_timeout_secs", &mut problems);
        let attempts = take(merged.rollout_attempts, "rollout_attempts", &mut problems);
        let interval = take(
            merged.rollout_interval_secs,
            "rollout_interval_secs",
            &mut problems,
        );

        if port == Some(0) {
            problems.push(FieldProblem::invalid("port", "must be between 1 and 65535"));
        }
        if min == Some(0) {
            problems.push(FieldProblem::invalid("min_replicas", "must be at least 1"));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                problems.push(FieldProblem::invalid(
                    "max_replicas",
                    format!("{} is below min_replicas {}", max, min),
                ));
            } else if let Some(desired) = desired {
                if desired < min || desired > max {
                    problems.push(FieldProblem::invalid(
                        "replicas",
                        format!("{} is outside {}..={}", desired, min, max),
                    ));
                }
            }
        }
        if timeout == Some(0) {
            problems.push(FieldProblem::invalid("step_timeout_secs", "must be positive"));
        }
        if attempts == Some(0) {
            problems.push(FieldProblem::invalid("rollout_attempts", "must be at least 1"));
        }

        match (
            app, image, container, port, min, max, desired, region, namespace,
            manifests_dir, terraform_dir, ssh_key, timeout, attempts, interval,
        ) {
            (
                Some(app),
                Some(image),
                Some(container),
                Some(port),
                Some(min),
                Some(max),
                Some(desired),
                Some(region),
                Some(namespace),
                Some(manifests_dir),
                Some(terraform_dir),
                Some(ssh_key),
                Some(timeout),
                Some(attempts),
                Some(interval),
            ) if problems.is_empty() => Ok(ResolvedConfig {
                app,
                image,
                container,
                port,
                replicas: ReplicaBounds { min, max, desired },
                region,
                namespace,
                manifests_dir,
                terraform_dir,
                ssh_key,
                step_timeout: Duration::from_secs(timeout),
                rollout_attempts: attempts,
                rollout_interval: Duration::from_secs(interval),
            }),
            _ => Err(ConfigError { problems }),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigResolver {
        ConfigResolver::with_home(Some(PathBuf::from("/home/dev")))
    }

    #[test]
    fn test_defaults_leave_image_and_region_unset() {
        let err = base().resolve().unwrap_err();
        assert_eq!(err.missing_fields(), vec!["image", "region"]);
    }

    #[test]
    fn test_optional_fields_resolve_blank() {
        let config = base().optional(["image", "region"]).resolve().unwrap();
        assert_eq!(config.image, "");
        assert_eq!(config.region, "");

        let err = base().optional(["image"]).resolve().unwrap_err();
        assert_eq!(err.missing_fields(), vec!["region"]);
    }

    #[test]
    fn test_defaults_fill_the_rest() {
        let flags = PartialConfig {
            image: Some("flask-app:latest".into()),
            region: Some("us-east-1".into()),
            ..Default::default()
        };
        let config = base().flags(flags).resolve().unwrap();
        assert_eq!(config.app, "flask-app");
        assert_eq!(config.container, "flask-app");
        assert_eq!(config.port, 5000);
        assert_eq!(
            config.replicas,
            ReplicaBounds {
                min: 1,
                max: 5,
                desired: 2
            }
        );
        assert_eq!(config.namespace, "default");
        assert_eq!(config.ssh_key, PathBuf::from("/home/dev/.ssh/deploy_key"));
        assert_eq!(config.step_timeout, Duration::from_secs(600));
        assert_eq!(config.rollout_attempts, 30);
    }

    #[test]
    fn test_tilde_is_expanded() {
        assert_eq!(
            expand_home(Path::new("~/.ssh/id"), Some(Path::new("/home/a"))),
            PathBuf::from("/home/a/.ssh/id")
        );
        assert_eq!(
            expand_home(Path::new("/abs/key"), Some(Path::new("/home/a"))),
            PathBuf::from("/abs/key")
        );
        assert_eq!(
            expand_home(Path::new("~/.ssh/id"), None),
            PathBuf::from("~/.ssh/id")
        );
    }

    #[test]
    fn test_set_rejects_bad_numbers() {
        let mut layer = PartialConfig::default();
        assert!(layer.set("port", "80a").is_err());
        assert!(layer.set("port", "70000").is_err());
        assert!(layer.set("port", " 8080 ").is_ok());
        assert_eq!(layer.port, Some(8080));
        assert!(layer.set("colour", "blue").is_err());
    }

    #[test]
    fn test_yaml_roundtrip_of_resolved_config() {
        let flags = PartialConfig {
            image: Some("web:1".into()),
            region: Some("eu-west-1".into()),
            ..Default::default()
        };
        let config = base().flags(flags).resolve().unwrap();
        let yaml = config.to_yaml().unwrap();
        let reparsed: PartialConfig = serde_yaml::from_str(&yaml).unwrap();
        let again = ConfigResolver::with_home(None).file(reparsed).resolve().unwrap();
        assert_eq!(again, config);
    }
}
