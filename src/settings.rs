use crate::assistant::course::{default_catalog, Course};
use crate::assistant::llm::Provider;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            provider: Provider::default(),
            model: None,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub data_file: PathBuf,
    /// Built frontend to serve for non-API paths.
    pub static_dir: Option<PathBuf>,
    /// Also mount the API without the `/api` prefix.
    pub legacy_routes: bool,
    /// Where `/admin/set-llm-key` writes `LLM_API_KEY`.
    pub env_file: PathBuf,
    pub llm: LlmSettings,
    pub courses: Vec<Course>,

    // Secrets only ever come from the environment.
    #[serde(skip)]
    pub admin_token: Option<String>,
    #[serde(skip)]
    pub llm_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_address: "0.0.0.0".to_string(),
            port: 3001,
            data_file: PathBuf::from("tasks.json"),
            static_dir: None,
            legacy_routes: false,
            env_file: PathBuf::from(".env"),
            llm: LlmSettings::default(),
            courses: default_catalog(),
            admin_token: None,
            llm_api_key: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot parse settings file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

impl Settings {
    /// `settings.json` from the working directory (defaults if absent),
    /// then environment overrides.
    pub fn load() -> Result<Settings, SettingsError> {
        let mut settings = Settings::from_file(Path::new(SETTINGS_FILENAME))?;
        settings.apply_env(|var| env::var(var).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => return Err(SettingsError::Read { path: path.to_path_buf(), source }),
        };
        let mut settings: Settings = serde_json::from_str(&content)
            .map_err(|source| SettingsError::Parse { path: path.to_path_buf(), source })?;
        if settings.courses.is_empty() {
            settings.courses = default_catalog();
        }
        Ok(settings)
    }

    /// Overlay environment variables. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), SettingsError> {
        let non_empty = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = non_empty("STUDYDESK_PORT") {
            self.port = port
                .parse()
                .map_err(|_| SettingsError::InvalidEnv { var: "STUDYDESK_PORT", value: port })?;
        }
        if let Some(path) = non_empty("STUDYDESK_DATA_FILE") {
            self.data_file = PathBuf::from(path);
        }
        if let Some(provider) = non_empty("LLM_PROVIDER") {
            self.llm.provider = Provider::parse(&provider)
                .ok_or(SettingsError::InvalidEnv { var: "LLM_PROVIDER", value: provider })?;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        self.admin_token = non_empty("ADMIN_TOKEN");
        self.llm_api_key = non_empty("LLM_API_KEY");
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
