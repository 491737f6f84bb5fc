use crate::executor::{CommandExecutorConfig, StdinMode};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid timeout {0} seconds")]
    InvalidTimeout(f64),
    #[error("Specified program {path:?} does not exist: {source}")]
    TargetMissing {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Specified program {0:?} is not executable.")]
    TargetNotExecutable(PathBuf),
    #[error("Path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("Specified script {path:?} is not readable: {source}")]
    ScriptUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigStdin {
    #[default]
    Null,
    Inherit,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunnerSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub stdin: ConfigStdin,
}

pub fn default_timeout_secs() -> f64 {
    1.0
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            working_dir: None,
            stdin: ConfigStdin::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ArgfuzzConfig {
    #[serde(default)]
    pub runner: RunnerSettings,
}

impl ArgfuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn executor_config(&self) -> Result<CommandExecutorConfig, ConfigError> {
        Ok(CommandExecutorConfig {
            timeout: timeout_from_secs(self.runner.timeout_secs)?,
            working_dir: self.runner.working_dir.clone(),
            stdin: match self.runner.stdin {
                ConfigStdin::Null => StdinMode::Null,
                ConfigStdin::Inherit => StdinMode::Inherit,
            },
        })
    }
}

/// Zero disables the timeout. Negative and non-finite values are rejected.
pub fn timeout_from_secs(secs: f64) -> Result<Option<Duration>, ConfigError> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| ConfigError::InvalidTimeout(secs))
}

/// The target must be an existing regular file the current user may execute.
pub fn validate_target(path: &Path) -> Result<(), ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::TargetMissing {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(ConfigError::TargetNotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| ConfigError::TargetNotExecutable(path.to_path_buf()))?;
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        if unsafe { libc::access(c_path.as_ptr(), libc::X_OK) } != 0 {
            return Err(ConfigError::TargetNotExecutable(path.to_path_buf()));
        }
    }
    Ok(())
}

/// Validates the target and returns its absolute path.
///
/// `Command` searches `PATH` for a bare program name, so a relative target
/// such as `prog` must be pinned to the file that was validated.
pub fn resolve_target(path: &Path) -> Result<PathBuf, ConfigError> {
    validate_target(path)?;
    std::fs::canonicalize(path).map_err(|source| ConfigError::TargetMissing {
        path: path.to_path_buf(),
        source,
    })
}

pub fn validate_script(path: &Path) -> Result<(), ConfigError> {
    let unreadable = |source: std::io::Error| ConfigError::ScriptUnreadable {
        path: path.to_path_buf(),
        source,
    };
    if path.is_dir() {
        return Err(unreadable(std::io::Error::other("is a directory")));
    }
    File::open(path).map(drop).map_err(unreadable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ArgfuzzConfig = toml::from_str("").unwrap();
        assert_eq!(config, ArgfuzzConfig::default());
        let exec = config.executor_config().unwrap();
        assert_eq!(exec.timeout, Some(Duration::from_secs(1)));
        assert_eq!(exec.stdin, StdinMode::Null);
        assert!(exec.working_dir.is_none());
    }

    #[test]
    fn parses_runner_section() {
        let config: ArgfuzzConfig = toml::from_str(
            r#"
            [runner]
            timeout-secs = 0
            working-dir = "/tmp"
            stdin = "inherit"
            "#,
        )
        .unwrap();
        let exec = config.executor_config().unwrap();
        assert_eq!(exec.timeout, None);
        assert_eq!(exec.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(exec.stdin, StdinMode::Inherit);
    }

    #[test]
    fn fractional_timeout_is_accepted() {
        let config: ArgfuzzConfig = toml::from_str("[runner]\ntimeout-secs = 2.5\n").unwrap();
        assert_eq!(
            config.executor_config().unwrap().timeout,
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<ArgfuzzConfig, _> = toml::from_str("[runner]\nthreads = 4\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runner").unwrap();
        let err = ArgfuzzConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = ArgfuzzConfig::load_from_file(Path::new("/nonexistent/argfuzz.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn timeout_conversion() {
        assert_eq!(timeout_from_secs(0.0).unwrap(), None);
        assert_eq!(
            timeout_from_secs(0.25).unwrap(),
            Some(Duration::from_millis(250))
        );
        assert!(matches!(
            timeout_from_secs(-1.0),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn non_executable_target_is_a_config_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            validate_target(file.path()),
            Err(ConfigError::TargetNotExecutable(_))
        ));

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(validate_target(file.path()).is_ok());
    }

    #[test]
    fn execute_bit_for_another_user_is_not_enough() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // group execute only; the file is owned by the current user
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o610)).unwrap();
        let is_root = unsafe { libc::geteuid() } == 0;
        // root passes access(X_OK) whenever any execute bit is set
        assert_eq!(validate_target(file.path()).is_ok(), is_root);
    }

    #[test]
    fn relative_target_resolves_to_the_validated_file() {
        let name = format!("argfuzz-resolve-{}", std::process::id());
        std::os::unix::fs::symlink("/bin/echo", &name).unwrap();
        let link = tempfile::TempPath::from_path(&name);

        let resolved = resolve_target(Path::new(&name)).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::fs::canonicalize("/bin/echo").unwrap());
        drop(link);

        assert!(matches!(
            resolve_target(Path::new("argfuzz-no-such-target")),
            Err(ConfigError::TargetMissing { .. })
        ));
    }

    #[test]
    fn missing_or_directory_target_is_rejected() {
        assert!(matches!(
            validate_target(Path::new("/nonexistent/target")),
            Err(ConfigError::TargetMissing { .. })
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_target(dir.path()),
            Err(ConfigError::TargetNotExecutable(_))
        ));
    }

    #[test]
    fn script_must_be_a_readable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate_script(file.path()).is_ok());

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_script(dir.path()),
            Err(ConfigError::ScriptUnreadable { .. })
        ));
        assert!(validate_script(Path::new("/nonexistent/script.txt")).is_err());
    }
}
