//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::geo::Point;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON lines on standard input
    Stdin,
    /// JSON lines from a file
    File,
    /// JSON messages on an MQTT topic
    Mqtt,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderProvider {
    /// Nominatim-compatible HTTP search API
    Nominatim,
    /// Fixed lookup table from `[geocoder.places]`
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Identifier included in egress payloads
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Single persisted zone slot
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "data/saved_zone.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Path for `kind = "file"`
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { kind: SourceKind::Stdin, file: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "geofence/positions".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// How often the zone store is re-read for changes
    #[serde(default = "default_zone_poll_ms")]
    pub zone_poll_ms: u64,
    /// Position event channel capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { zone_poll_ms: default_zone_poll_ms(), event_buffer: default_event_buffer() }
    }
}

fn default_zone_poll_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for transition egress (JSONL format), empty to disable
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "transitions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    /// Enable MQTT egress publishing
    #[serde(default)]
    pub enabled: bool,
    /// Topic for transition events (QoS 1)
    #[serde(default = "default_transitions_topic")]
    pub transitions_topic: String,
    /// Topic for position source status changes (QoS 0)
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    #[serde(default = "default_metrics_topic")]
    pub metrics_topic: String,
    /// Interval for publishing metrics (seconds)
    #[serde(default = "default_metrics_publish_interval")]
    pub metrics_publish_interval_secs: u64,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transitions_topic: default_transitions_topic(),
            status_topic: default_status_topic(),
            metrics_topic: default_metrics_topic(),
            metrics_publish_interval_secs: default_metrics_publish_interval(),
        }
    }
}

fn default_transitions_topic() -> String {
    "geofence/transitions".to_string()
}

fn default_status_topic() -> String {
    "geofence/status".to_string()
}

fn default_metrics_topic() -> String {
    "geofence/metrics".to_string()
}

fn default_metrics_publish_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlaceConfig {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_provider")]
    pub provider: GeocoderProvider,
    #[serde(default = "default_geocoder_url")]
    pub url: String,
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_geocoder_user_agent")]
    pub user_agent: String,
    /// Address -> coordinates table for the static provider
    #[serde(default)]
    pub places: HashMap<String, PlaceConfig>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            provider: default_geocoder_provider(),
            url: default_geocoder_url(),
            timeout_ms: default_geocoder_timeout_ms(),
            user_agent: default_geocoder_user_agent(),
            places: HashMap::new(),
        }
    }
}

fn default_geocoder_provider() -> GeocoderProvider {
    GeocoderProvider::Nominatim
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_geocoder_timeout_ms() -> u64 {
    5000
}

fn default_geocoder_user_agent() -> String {
    concat!("geofence/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    store_path: String,
    source_kind: SourceKind,
    source_file: Option<String>,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    zone_poll_ms: u64,
    event_buffer: usize,
    egress_file: String,
    mqtt_egress_enabled: bool,
    mqtt_egress_transitions_topic: String,
    mqtt_egress_status_topic: String,
    mqtt_egress_metrics_topic: String,
    mqtt_egress_metrics_interval_secs: u64,
    geocoder_provider: GeocoderProvider,
    geocoder_url: String,
    geocoder_timeout_ms: u64,
    geocoder_user_agent: String,
    geocoder_places: HashMap<String, Point>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::assemble(
            TomlConfig {
                site: SiteConfig::default(),
                store: StoreConfig::default(),
                source: SourceConfig::default(),
                mqtt: MqttConfig::default(),
                tracker: TrackerConfig::default(),
                egress: EgressConfig::default(),
                mqtt_egress: MqttEgressConfig::default(),
                geocoder: GeocoderConfig::default(),
                metrics: MetricsConfig::default(),
            },
            HashMap::new(),
            "default".to_string(),
        )
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn from_toml(mut toml_config: TomlConfig, config_file: String) -> anyhow::Result<Self> {
        if toml_config.source.kind == SourceKind::File && toml_config.source.file.is_none() {
            anyhow::bail!("source.kind = \"file\" requires source.file");
        }

        // Validate static geocoder places up front so lookups never see bad points
        let mut geocoder_places = HashMap::new();
        for (address, place) in std::mem::take(&mut toml_config.geocoder.places) {
            let point = Point::new(place.lat, place.lng)
                .with_context(|| format!("geocoder.places entry {address:?}"))?;
            geocoder_places.insert(normalize_address(&address), point);
        }

        Ok(Self::assemble(toml_config, geocoder_places, config_file))
    }

    fn assemble(
        toml_config: TomlConfig,
        geocoder_places: HashMap<String, Point>,
        config_file: String,
    ) -> Self {
        Self {
            site_id: toml_config.site.id,
            store_path: toml_config.store.path,
            source_kind: toml_config.source.kind,
            source_file: toml_config.source.file,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            zone_poll_ms: toml_config.tracker.zone_poll_ms.max(1),
            event_buffer: toml_config.tracker.event_buffer.max(1),
            egress_file: toml_config.egress.file,
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_egress_transitions_topic: toml_config.mqtt_egress.transitions_topic,
            mqtt_egress_status_topic: toml_config.mqtt_egress.status_topic,
            mqtt_egress_metrics_topic: toml_config.mqtt_egress.metrics_topic,
            mqtt_egress_metrics_interval_secs: toml_config
                .mqtt_egress
                .metrics_publish_interval_secs
                .max(1),
            geocoder_provider: toml_config.geocoder.provider,
            geocoder_url: toml_config.geocoder.url,
            geocoder_timeout_ms: toml_config.geocoder.timeout_ms,
            geocoder_user_agent: toml_config.geocoder.user_agent,
            geocoder_places,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration from process args / environment
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn source_kind(&self) -> &SourceKind {
        &self.source_kind
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn zone_poll_ms(&self) -> u64 {
        self.zone_poll_ms
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_egress_transitions_topic(&self) -> &str {
        &self.mqtt_egress_transitions_topic
    }

    pub fn mqtt_egress_status_topic(&self) -> &str {
        &self.mqtt_egress_status_topic
    }

    pub fn mqtt_egress_metrics_topic(&self) -> &str {
        &self.mqtt_egress_metrics_topic
    }

    pub fn mqtt_egress_metrics_interval_secs(&self) -> u64 {
        self.mqtt_egress_metrics_interval_secs
    }

    pub fn geocoder_provider(&self) -> &GeocoderProvider {
        &self.geocoder_provider
    }

    pub fn geocoder_url(&self) -> &str {
        &self.geocoder_url
    }

    pub fn geocoder_timeout_ms(&self) -> u64 {
        self.geocoder_timeout_ms
    }

    pub fn geocoder_user_agent(&self) -> &str {
        &self.geocoder_user_agent
    }

    /// Static geocoder table, keys normalized with `normalize_address`
    pub fn geocoder_places(&self) -> &HashMap<String, Point> {
        &self.geocoder_places
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the store somewhere else
    pub fn with_store_path(mut self, path: &str) -> Self {
        self.store_path = path.to_string();
        self
    }

    /// Builder method for tests to set the egress file
    pub fn with_egress_file(mut self, path: &str) -> Self {
        self.egress_file = path.to_string();
        self
    }

    /// Builder method for tests to set the zone poll interval
    pub fn with_zone_poll_ms(mut self, ms: u64) -> Self {
        self.zone_poll_ms = ms.max(1);
        self
    }
}

/// Lowercase and collapse whitespace for address table lookups
pub fn normalize_address(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
