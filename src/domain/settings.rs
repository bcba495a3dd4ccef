use crate::domain::models::DeviceType;
use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_uart_tester".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // UART service layout
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_request_uuid")]
    pub ble_request_char_uuid: String,
    #[serde(default = "default_response_uuid")]
    pub ble_response_char_uuid: String,

    // Device check
    #[serde(default = "default_pin_code")]
    pub pin_code: String,
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub serial_range_start: String,
    #[serde(default)]
    pub serial_range_end: String,
    #[serde(default = "default_name_prefix")]
    pub advertised_name_prefix: String,

    // Timing
    #[serde(default = "default_scan_period_ms")]
    pub scan_period_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            ble_service_uuid: default_service_uuid(),
            ble_request_char_uuid: default_request_uuid(),
            ble_response_char_uuid: default_response_uuid(),
            pin_code: default_pin_code(),
            device_type: default_device_type(),
            serial_range_start: String::new(),
            serial_range_end: String::new(),
            advertised_name_prefix: default_name_prefix(),
            scan_period_ms: default_scan_period_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_service_uuid() -> String {
    protocol::SERVICE_UUID.to_string()
}
fn default_request_uuid() -> String {
    protocol::REQUEST_CHAR_UUID.to_string()
}
fn default_response_uuid() -> String {
    protocol::RESPONSE_CHAR_UUID.to_string()
}
fn default_pin_code() -> String {
    "master".to_string()
}
fn default_device_type() -> DeviceType {
    DeviceType::Online
}
fn default_name_prefix() -> String {
    "Satellite".to_string()
}
fn default_scan_period_ms() -> u64 {
    10_000
}
fn default_session_timeout_ms() -> u64 {
    15_000
}
fn default_report_dir() -> String {
    "reports".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load settings from `settings_path`, falling back to defaults when the
    /// file is missing or unreadable
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleUartTester");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn update_serial_range(&mut self, start: &str, end: &str) -> anyhow::Result<()> {
        self.settings.serial_range_start = start.to_string();
        self.settings.serial_range_end = end.to_string();
        self.save()
    }
}
