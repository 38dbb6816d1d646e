//! Configuration types for certpost
//!
//! The configuration is a TOML file. Every section has defaults so that a minimal file
//! only names the form export, the template and the destinations:
//!
//! ```toml
//! [form]
//! location = "https://forms.example.org/export/laser.json"
//!
//! [template]
//! path = "certificat.pptx"
//!
//! [[destinations]]
//! name = "sst"
//! url = "//files.example.org/sst"
//! mount_point = "/mnt/sst"
//! account = "certbot"
//! method = "cifs"
//! ```
//!
//! Relative paths are resolved against the directory holding the configuration file.

use crate::error::{Error, Result};
use crate::scheduler::{DailyTrigger, Weekday};
use crate::utils;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "certpost";

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "certpost.toml";

/// Main configuration for certpost
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// When the pipeline runs
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Where form responses come from
    #[serde(default)]
    pub form: FormConfig,

    /// Which form columns feed which record fields
    #[serde(default)]
    pub fields: FieldMapping,

    /// Fallback values used by normalization
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Certificate template and its placeholder markers
    #[serde(default)]
    pub template: TemplateConfig,

    /// Artifact folder layout shared by every destination
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Credential key naming
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// External binaries
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Local state
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Remote delivery targets
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// Directory relative paths are resolved against (set by [`Config::load`])
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Default configuration path (`<config dir>/certpost/certpost.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;

        let mut config = Self::from_toml(&raw)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML text without validating it
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Resolve a possibly relative path against [`base_dir`](Self::base_dir)
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Absolute path of the certificate template
    pub fn template_path(&self) -> PathBuf {
        self.resolve_path(&self.template.path)
    }

    /// Absolute path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.resolve_path(&self.persistence.database_path)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.form.location.trim().is_empty() {
            return Err(Error::config("form.location", "form export location is empty"));
        }
        if self.template.path.as_os_str().is_empty() {
            return Err(Error::config("template.path", "template path is empty"));
        }
        if self.schedule.poll_interval.is_zero() {
            return Err(Error::config(
                "schedule.poll_interval",
                "poll interval must be at least one second",
            ));
        }

        let folders = &self.artifacts;
        if folders.primary_folder.trim().is_empty() || folders.secondary_folder.trim().is_empty() {
            return Err(Error::config(
                "artifacts",
                "primary and secondary folders must be named",
            ));
        }
        if !utils::is_single_segment(&folders.primary_folder) {
            return Err(Error::config(
                "artifacts.primary_folder",
                "primary folder must be a single folder name",
            ));
        }
        if !utils::is_single_segment(&folders.secondary_folder) {
            return Err(Error::config(
                "artifacts.secondary_folder",
                "secondary folder must be a single folder name",
            ));
        }
        if folders.primary_folder == folders.secondary_folder {
            return Err(Error::config(
                "artifacts.secondary_folder",
                "primary and secondary folders must differ",
            ));
        }

        if self.destinations.is_empty() {
            return Err(Error::config("destinations", "no destination configured"));
        }
        let mut names = HashSet::new();
        for destination in &self.destinations {
            destination.validate()?;
            if !names.insert(destination.name.as_str()) {
                return Err(Error::config(
                    format!("destinations.{}", destination.name),
                    "duplicate destination name",
                ));
            }
        }

        Ok(())
    }
}

/// Schedule settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily run time, `HH:MM` local time (default: 08:00)
    #[serde(default = "default_daily_at", with = "crate::scheduler::time_format")]
    pub daily_at: NaiveTime,

    /// Days the daily run happens (empty = every day)
    #[serde(default)]
    pub days: Vec<Weekday>,

    /// Run the pipeline once immediately at startup (default: true)
    #[serde(default = "default_true")]
    pub run_at_startup: bool,

    /// Interval between trigger polls, in seconds (default: 1)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl ScheduleConfig {
    /// The trigger described by this section
    pub fn trigger(&self) -> DailyTrigger {
        DailyTrigger {
            at: self.daily_at,
            days: self.days.clone(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
            days: Vec::new(),
            run_at_startup: true,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Form export settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormConfig {
    /// File path or http(s) URL of the JSON export
    #[serde(default)]
    pub location: String,

    /// Name used to scope seen-row tracking (default: "form")
    #[serde(default = "default_form_name")]
    pub name: String,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            name: default_form_name(),
            timeout: default_http_timeout(),
        }
    }
}

/// Form column names feeding each canonical field
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    /// Submission timestamp column
    #[serde(default = "default_date_field")]
    pub date: String,
    /// Identifier column
    #[serde(default = "default_identifier_field")]
    pub identifier: String,
    /// Primary email column
    #[serde(default = "default_email_field")]
    pub email: String,
    /// Fallback email column
    #[serde(default = "default_email_fallback_field")]
    pub email_fallback: String,
    /// Primary name column
    #[serde(default = "default_name_field")]
    pub name: String,
    /// Fallback name column
    #[serde(default = "default_name_fallback_field")]
    pub name_fallback: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            date: default_date_field(),
            identifier: default_identifier_field(),
            email: default_email_field(),
            email_fallback: default_email_fallback_field(),
            name: default_name_field(),
            name_fallback: default_name_fallback_field(),
        }
    }
}

/// Values substituted by normalization
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizeConfig {
    /// Primary email value meaning "not provided" (default: "anonymous")
    #[serde(default = "default_email_sentinel")]
    pub email_sentinel: String,
    /// Email used when no address is available (default: "@polymtl.ca")
    #[serde(default = "default_email")]
    pub default_email: String,
    /// Name used when no name is available (default: "anonyme")
    #[serde(default = "default_anonymous_name")]
    pub anonymous_name: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            email_sentinel: default_email_sentinel(),
            default_email: default_email(),
            anonymous_name: default_anonymous_name(),
        }
    }
}

/// Template location and marker texts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Path of the `.pptx` template
    #[serde(default = "default_template_path")]
    pub path: PathBuf,
    /// Run text replaced by the display name (default: "nom")
    #[serde(default = "default_name_marker")]
    pub name_marker: String,
    /// Run text replaced by the identifier (default: "matricule")
    #[serde(default = "default_identifier_marker")]
    pub identifier_marker: String,
    /// Prefix of the run replaced by the date stamp (default: "Date")
    #[serde(default = "default_date_prefix")]
    pub date_prefix: String,
    /// Label written before the date stamp (default: "Date")
    #[serde(default = "default_date_prefix")]
    pub date_label: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: default_template_path(),
            name_marker: default_name_marker(),
            identifier_marker: default_identifier_marker(),
            date_prefix: default_date_prefix(),
            date_label: default_date_prefix(),
        }
    }
}

/// Folder names shared by all destinations
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactConfig {
    /// Folder receiving primary artifacts, relative to the destination sub-path (default: "ppt")
    #[serde(default = "default_primary_folder")]
    pub primary_folder: String,
    /// Sibling folder receiving converted artifacts (default: "pdf")
    #[serde(default = "default_secondary_folder")]
    pub secondary_folder: String,
    /// Secondary format handed to the converter, also the file extension (default: "pdf")
    #[serde(default = "default_secondary_format")]
    pub secondary_format: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            primary_folder: default_primary_folder(),
            secondary_folder: default_secondary_folder(),
            secondary_format: default_secondary_format(),
        }
    }
}

/// Credential key naming
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    /// Store scope (default: "system")
    #[serde(default = "default_credential_scope")]
    pub scope: String,
    /// Prefix of the per-destination key (default: "certpost")
    #[serde(default = "default_credential_namespace")]
    pub namespace: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            scope: default_credential_scope(),
            namespace: default_credential_namespace(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to unoconv (auto-detected if None)
    #[serde(default)]
    pub converter_path: Option<PathBuf>,
    /// Path to mount (auto-detected if None)
    #[serde(default)]
    pub mount_path: Option<PathBuf>,
    /// Path to umount (auto-detected if None)
    #[serde(default)]
    pub umount_path: Option<PathBuf>,
    /// Whether to search PATH for binaries without explicit paths (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            converter_path: None,
            mount_path: None,
            umount_path: None,
            search_path: true,
        }
    }
}

/// Local state storage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "certpost.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// How a destination is attached to the local filesystem
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MountMethod {
    /// SMB/CIFS share
    #[default]
    Cifs,
    /// WebDAV through davfs2
    Davfs,
    /// NFS export
    Nfs,
    /// Directory that is already available locally; nothing is mounted
    Local,
}

impl MountMethod {
    /// Filesystem type passed to `mount -t`
    pub fn fs_type(&self) -> Option<&'static str> {
        match self {
            MountMethod::Cifs => Some("cifs"),
            MountMethod::Davfs => Some("davfs"),
            MountMethod::Nfs => Some("nfs"),
            MountMethod::Local => None,
        }
    }
}

/// One remote delivery target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Unique name, also part of the credential key
    pub name: String,
    /// Remote endpoint (`//host/share` or a URL)
    #[serde(default)]
    pub url: String,
    /// Local directory the endpoint is mounted on
    pub mount_point: PathBuf,
    /// Drive label the share is known by on Windows hosts
    ///
    /// Unix mounts ignore it; it only appears in mount logs and request dumps.
    #[serde(default)]
    pub drive: String,
    /// Account the credential belongs to
    #[serde(default)]
    pub account: String,
    /// Mount method
    #[serde(default)]
    pub method: MountMethod,
    /// Sub-folder under the mount point where artifact folders live
    #[serde(default)]
    pub sub_path: PathBuf,
}

impl DestinationConfig {
    fn validate(&self) -> Result<()> {
        let key = format!("destinations.{}", self.name);
        if self.name.trim().is_empty() {
            return Err(Error::config("destinations", "destination without a name"));
        }
        if self.mount_point.as_os_str().is_empty() {
            return Err(Error::config(key, "mount_point is empty"));
        }
        if !utils::is_contained(&self.sub_path) {
            return Err(Error::config(
                format!("{}.sub_path", key),
                "sub_path must stay inside the mount point",
            ));
        }
        if self.method != MountMethod::Local {
            if self.url.trim().is_empty() {
                return Err(Error::config(key, "url is required for remote destinations"));
            }
            // UNC-style endpoints (//host/share) are not URLs; only check real URLs
            if self.url.contains("://") {
                url::Url::parse(&self.url)
                    .map_err(|e| Error::config(key.clone(), format!("invalid url: {}", e)))?;
            }
            if self.account.trim().is_empty() {
                return Err(Error::config(key, "account is required for remote destinations"));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_daily_at() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_form_name() -> String {
    "form".into()
}

fn default_date_field() -> String {
    "date".into()
}

fn default_identifier_field() -> String {
    "matricule".into()
}

fn default_email_field() -> String {
    "courriel".into()
}

fn default_email_fallback_field() -> String {
    "courriel2".into()
}

fn default_name_field() -> String {
    "nom".into()
}

fn default_name_fallback_field() -> String {
    "nom2".into()
}

fn default_email_sentinel() -> String {
    "anonymous".into()
}

fn default_email() -> String {
    "@polymtl.ca".into()
}

fn default_anonymous_name() -> String {
    "anonyme".into()
}

fn default_template_path() -> PathBuf {
    PathBuf::from("certificat.pptx")
}

fn default_name_marker() -> String {
    "nom".into()
}

fn default_identifier_marker() -> String {
    "matricule".into()
}

fn default_date_prefix() -> String {
    "Date".into()
}

fn default_primary_folder() -> String {
    "ppt".into()
}

fn default_secondary_folder() -> String {
    "pdf".into()
}

fn default_secondary_format() -> String {
    "pdf".into()
}

fn default_credential_scope() -> String {
    "system".into()
}

fn default_credential_namespace() -> String {
    "certpost".into()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("certpost.db")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
