//! `AppConfig` struct, TOML loading and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use epgscrape_core::{Channel, DEFAULT_USER_AGENT, LastStop, PipelineConfig};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default schedule page.
const DEFAULT_SOURCE_URL: &str = "https://www.multimediostv.com/programacion";

/// Default guide document path.
const DEFAULT_OUTPUT_FILE: &str = "/output/multimedios_mty.xml";

/// Top-level application configuration.
///
/// Resolved as defaults, then the TOML file, then environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Schedule page URL (`SOURCE_URL`).
    pub source_url: String,
    /// Guide document path (`OUTPUT_FILE`).
    pub output_file: PathBuf,
    /// IANA timezone of the page's clock times (`TZ` / `TIMEZONE`).
    pub timezone: String,
    /// Cron expression used by the external scheduler (`CRON_SCHEDULE`).
    pub cron_schedule: String,
    /// Whether the launcher runs once at startup (`RUN_ON_STARTUP`).
    pub run_on_startup: bool,
    /// XMLTV channel id (`CHANNEL_ID`).
    pub channel_id: String,
    /// Channel display name (`CHANNEL_NAME`).
    pub channel_name: String,
    /// Language of text elements (`CHANNEL_LANG`).
    pub channel_lang: String,
    /// HTTP User-Agent (`USER_AGENT`).
    pub user_agent: String,
    /// Per-attempt request timeout in seconds (`TIMEOUT_SECONDS`).
    pub timeout_seconds: u64,
    /// Retries after the first attempt (`MAX_RETRIES`).
    pub max_retries: u32,
    /// `midnight` or minutes (`LAST_PROGRAMME_DURATION`).
    pub last_programme_duration: String,
    /// Execution guard lock file (`LOCK_FILE`); defaults to the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_url: String::from(DEFAULT_SOURCE_URL),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            timezone: String::from("America/Monterrey"),
            cron_schedule: String::from("0 */6 * * *"),
            run_on_startup: true,
            channel_id: String::from("multimedios.canal6.monterrey"),
            channel_name: String::from("Canal 6 Multimedios Monterrey"),
            channel_lang: String::from("es"),
            user_agent: String::from(DEFAULT_USER_AGENT),
            timeout_seconds: 30,
            max_retries: 3,
            last_programme_duration: LastStop::Midnight.to_string(),
            lock_file: None,
        }
    }
}

/// Parses a boolean environment value.
///
/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`, case-insensitively.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Loads the optional TOML file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or an environment
    /// value is malformed.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => Self::load(p).context("failed to load config")?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Overrides fields from environment-style variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean value cannot be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SOURCE_URL") {
            self.source_url = v;
        }
        if let Some(v) = get("OUTPUT_FILE") {
            self.output_file = PathBuf::from(v);
        }
        if let Some(v) = get("TZ").or_else(|| get("TIMEZONE")) {
            self.timezone = v;
        }
        if let Some(v) = get("CRON_SCHEDULE") {
            self.cron_schedule = v;
        }
        if let Some(v) = get("RUN_ON_STARTUP") {
            self.run_on_startup =
                parse_bool(&v).with_context(|| format!("invalid RUN_ON_STARTUP value {v:?}"))?;
        }
        if let Some(v) = get("CHANNEL_ID") {
            self.channel_id = v;
        }
        if let Some(v) = get("CHANNEL_NAME") {
            self.channel_name = v;
        }
        if let Some(v) = get("CHANNEL_LANG") {
            self.channel_lang = v;
        }
        if let Some(v) = get("USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = get("TIMEOUT_SECONDS") {
            self.timeout_seconds = v
                .trim()
                .parse()
                .with_context(|| format!("invalid TIMEOUT_SECONDS value {v:?}"))?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = v
                .trim()
                .parse()
                .with_context(|| format!("invalid MAX_RETRIES value {v:?}"))?;
        }
        if let Some(v) = get("LAST_PROGRAMME_DURATION") {
            self.last_programme_duration = v;
        }
        if let Some(v) = get("LOCK_FILE") {
            self.lock_file = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Parsed source timezone.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not an IANA timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {:?}: {e}", self.timezone))
    }

    /// Parsed source URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.source_url)
            .with_context(|| format!("invalid source URL {:?}", self.source_url))
    }

    /// Per-attempt request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero.
    pub fn timeout(&self) -> Result<Duration> {
        if self.timeout_seconds == 0 {
            anyhow::bail!("TIMEOUT_SECONDS must be greater than zero");
        }
        Ok(Duration::from_secs(self.timeout_seconds))
    }

    /// Parsed last programme policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither `midnight` nor positive minutes.
    pub fn last_stop(&self) -> Result<LastStop> {
        self.last_programme_duration
            .parse()
            .context("invalid LAST_PROGRAMME_DURATION")
    }

    /// Lock file for the execution guard.
    ///
    /// Defaults to a file in the system temp directory named after the
    /// output path (`/srv/epg/guide.xml` locks `epgscrape-srv_epg_guide.xml.lock`),
    /// so the lock never appears in the directory the guide is served from.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.lock_file.clone().unwrap_or_else(|| {
            let flat: String = self
                .output_file
                .to_string_lossy()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            std::env::temp_dir().join(format!("epgscrape-{}.lock", flat.trim_start_matches('_')))
        })
    }

    /// Validates every field the pipeline uses and builds its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for the first invalid value.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        self.url()?;
        self.timeout()?;
        if self.channel_id.trim().is_empty() {
            anyhow::bail!("CHANNEL_ID must not be empty");
        }
        Ok(PipelineConfig {
            channel: Channel {
                id: self.channel_id.clone(),
                display_name: self.channel_name.clone(),
            },
            lang: self.channel_lang.clone(),
            timezone: self.tz()?,
            output_file: self.output_file.clone(),
            last_stop: self.last_stop()?,
        })
    }
}
