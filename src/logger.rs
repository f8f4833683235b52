//! Console and file logger behind the `log` facade.

use crate::{
    config::ClientConfig,
    error::{Result, StudioError},
};
use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

static STUDIO_LOGGER: Lazy<StudioLogger> = Lazy::new(StudioLogger::new);

pub fn init() -> Result<()> {
    init_with_config(LoggerConfig::from_env())
}

pub fn init_with_config(config: LoggerConfig) -> Result<()> {
    let filter = config.min_level.to_level_filter();
    STUDIO_LOGGER.update_config(config)?;

    log::set_logger(&*STUDIO_LOGGER)
        .map_err(|e| StudioError::ConfigError(format!("Failed to set logger: {}", e)))?;
    log::set_max_level(filter);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "🎨",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }

    fn admits(&self, level: Level) -> bool {
        LogLevel::from(level) >= *self
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(StudioError::ConfigError(format!(
                "Unknown log level: {}",
                other
            ))),
        }
    }
}

/// One emitted record, as written to JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    pub location: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            level,
            target: target.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.location = Some(format!("{}:{}", file, line));
        self
    }

    fn from_record(record: &Record) -> Self {
        let entry = LogEntry::new(
            record.level().into(),
            record.target(),
            record.args().to_string(),
        );
        match (record.file(), record.line()) {
            (Some(file), Some(line)) => entry.at(file, line),
            _ => entry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_target: bool,
    pub show_location: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
    /// Records from other crates (reqwest, hyper) below this level are dropped.
    pub dependency_level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_target: true,
            show_location: false,
            timestamp_format: "%H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
            dependency_level: LogLevel::Warn,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the `STUDIO_LOG_PROFILE` preset (`development` or
    /// `production`), then applies `STUDIO_LOG_LEVEL`, `STUDIO_LOG_JSON` and
    /// `STUDIO_LOG_FILE`.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("STUDIO_LOG_PROFILE").as_deref() {
            Ok("development") | Ok("dev") => Self::development(),
            Ok("production") | Ok("prod") => Self::production(),
            _ => Self::default(),
        };
        if let Ok(level) = std::env::var("STUDIO_LOG_LEVEL") {
            match level.parse() {
                Ok(level) => config.min_level = level,
                Err(e) => eprintln!("{}", e),
            }
        }
        if let Ok(json) = std::env::var("STUDIO_LOG_JSON") {
            config.output_json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        if let Ok(path) = std::env::var("STUDIO_LOG_FILE") {
            config.log_file_path = Some(path);
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_location: true,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    fn admits(&self, metadata: &Metadata) -> bool {
        let own = metadata.target().starts_with(env!("CARGO_CRATE_NAME"));
        let floor = if own {
            self.min_level
        } else {
            self.min_level.max(self.dependency_level)
        };
        floor.admits(metadata.level())
    }
}

/// Renders one entry as a console line.
pub fn format_line(entry: &LogEntry, config: &LoggerConfig) -> String {
    let paint = |text: String, style: fn(ColoredString) -> ColoredString| {
        if config.show_colors {
            style(text.as_str().normal()).to_string()
        } else {
            text
        }
    };

    let mut line = paint(
        entry.timestamp.format(&config.timestamp_format).to_string(),
        |s| s.bright_black(),
    );

    let level = if config.show_emojis {
        format!("{} {:<5}", entry.level.emoji(), entry.level.as_str())
    } else {
        format!("{:<5}", entry.level.as_str())
    };
    if config.show_colors {
        line.push_str(&format!(" [{}]", level.color(entry.level.color()).bold()));
    } else {
        line.push_str(&format!(" [{}]", level));
    }

    if config.show_target {
        line.push(' ');
        line.push_str(&paint(entry.target.clone(), |s| s.bright_blue()));
        line.push(':');
    }
    line.push(' ');
    line.push_str(&entry.message);

    if config.show_location {
        if let Some(location) = &entry.location {
            line.push_str(&paint(format!(" ({})", location), |s| s.bright_black()));
        }
    }
    line
}

pub struct StudioLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<File>>,
}

impl StudioLogger {
    fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
        }
    }

    fn config(&self) -> MutexGuard<'_, LoggerConfig> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn file(&self) -> MutexGuard<'_, Option<File>> {
        match self.log_file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn update_config(&self, config: LoggerConfig) -> Result<()> {
        let file = match &config.log_file_path {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        StudioError::ConfigError(format!("Cannot open log file {}: {}", path, e))
                    })?,
            ),
            None => None,
        };
        *self.file() = file;
        *self.config() = config;
        Ok(())
    }

    fn render(&self, entry: &LogEntry, config: &LoggerConfig, colored: bool) -> String {
        if config.output_json {
            serde_json::to_string(entry).unwrap_or_else(|_| entry.message.clone())
        } else if colored {
            format_line(entry, config)
        } else {
            format_line(
                entry,
                &LoggerConfig {
                    show_colors: false,
                    ..config.clone()
                },
            )
        }
    }
}

impl log::Log for StudioLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.config().admits(metadata)
    }

    fn log(&self, record: &Record) {
        let config = self.config().clone();
        if !config.admits(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);

        let console = self.render(&entry, &config, config.show_colors);
        if entry.level >= LogLevel::Warn {
            eprintln!("{}", console);
        } else {
            println!("{}", console);
        }

        if let Some(file) = self.file().as_mut() {
            let line = self.render(&entry, &config, false);
            let _ = writeln!(file, "{}", line);
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        if let Some(file) = self.file().as_mut() {
            let _ = file.flush();
        }
    }
}

/// Logs the elapsed time of an operation when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  {} started", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!(
            "⏱️  {} took {:.2}s",
            self.name,
            self.elapsed().as_secs_f64()
        );
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

/// Logs the effective client configuration with the token masked.
pub fn log_client_config(config: &ClientConfig) {
    log::info!("⚙️  Studio configuration:");
    log::info!("   Backend: {}", config.base_url);
    log::info!("   Adapter: {}", config.adapter_id);
    log::info!(
        "   Token: {}",
        if config.token.is_some() { "✅" } else { "❌" }
    );
    match config.timeout {
        Some(timeout) => log::info!("   Timeout: {}s", timeout.as_secs()),
        None => log::info!("   Timeout: none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error > LogLevel::Info);
        assert_eq!(LogLevel::Info.to_level_filter(), LevelFilter::Info);
    }

    #[test]
    fn test_plain_line_format() {
        let config = LoggerConfig::new()
            .with_colors(false)
            .with_level(LogLevel::Debug);
        let config = LoggerConfig {
            show_emojis: false,
            show_location: true,
            ..config
        };
        let entry = LogEntry::new(LogLevel::Warn, "imagegen::generation", "retrying slot 2")
            .at("src/generation/image_to_image.rs", 42);

        let line = format_line(&entry, &config);
        assert!(line.contains("[WARN ] imagegen::generation: retrying slot 2"));
        assert!(line.ends_with("(src/generation/image_to_image.rs:42)"));
    }

    #[test]
    fn test_dependency_records_are_quieter() {
        let config = LoggerConfig::development();
        let own = Metadata::builder()
            .level(Level::Debug)
            .target("imagegen::history::loader")
            .build();
        let foreign = Metadata::builder()
            .level(Level::Debug)
            .target("hyper::proto")
            .build();
        let foreign_warn = Metadata::builder()
            .level(Level::Warn)
            .target("reqwest::connect")
            .build();

        assert!(config.admits(&own));
        assert!(!config.admits(&foreign));
        assert!(config.admits(&foreign_warn));
    }

    #[test]
    fn test_presets() {
        let dev = LoggerConfig::development();
        assert_eq!(dev.min_level, LogLevel::Debug);
        assert!(dev.show_location);

        let prod = LoggerConfig::production();
        assert!(prod.output_json);
        assert!(!prod.show_colors);
        assert_eq!(prod.min_level, LogLevel::Info);
    }

    #[test]
    fn test_json_entry_shape() {
        let entry = LogEntry::new(LogLevel::Info, "imagegen", "done");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "done");
        assert!(value["location"].is_null());
    }
}
