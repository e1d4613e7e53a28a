//! Configuration: a YAML file with command-line overrides, validated once and
//! then shared read-only for the life of the process.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::selector::SelectionPolicy;
use crate::session::ScheduleType;

pub const DEFAULT_CONFIG_FILE: &str = "/usr2/control/skedsync.yaml";
pub const DEFAULT_LOCK_PATH: &str = "/tmp/skedsync.lock";
/// Upper bound for both check intervals: one leap year.
pub const MAX_CHECK_HOURS: f64 = 8784.0;
pub const MAX_LOOK_AHEAD_DAYS: f64 = 366.0;

/// Answers for drudg's interactive prompts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DrudgOptions {
    /// TPI period in centiseconds, 0 disables the TPI daemon.
    pub tpi_period: u32,
    pub cont_cal_action: String,
    pub cont_cal_polarity: String,
    pub vsi_align: String,
}

impl Default for DrudgOptions {
    fn default() -> Self {
        DrudgOptions {
            tpi_period: 0,
            cont_cal_action: "off".into(),
            cont_cal_polarity: "none".into(),
            vsi_align: "none".into(),
        }
    }
}

impl DrudgOptions {
    /// Replace "ask" and unknown answers with the non-interactive defaults.
    fn normalized(self) -> Self {
        let pick = |value: &str, allowed: &[&str], default: &str| {
            let value = value.trim().to_lowercase();
            if allowed.contains(&value.as_str()) {
                value
            } else {
                default.to_string()
            }
        };
        DrudgOptions {
            tpi_period: self.tpi_period,
            cont_cal_action: pick(&self.cont_cal_action, &["on", "off"], "off"),
            cont_cal_polarity: pick(
                &self.cont_cal_polarity,
                &["none", "0", "1", "2", "3"],
                "none",
            ),
            vsi_align: pick(&self.vsi_align, &["none", "0", "1"], "none"),
        }
    }
}

/// The on-disk configuration file. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub stations: Vec<String>,
    pub servers: Vec<String>,
    pub sched_types: Vec<String>,
    pub sched_dir: PathBuf,
    pub proc_dir: PathBuf,
    pub snap_dir: Option<PathBuf>,
    pub lst_dir: PathBuf,
    pub log_dir: PathBuf,
    pub get_master: bool,
    pub get_master_intensive: bool,
    pub master_check_hours: f64,
    pub schedule_check_hours: f64,
    pub look_ahead_days: f64,
    pub do_drudg: bool,
    pub drudg_binary: PathBuf,
    pub drudg: DrudgOptions,
    pub lock_path: PathBuf,
    /// Login credentials for archives that need them (`.netrc` format).
    pub netrc_file: Option<PathBuf>,
    /// Cookies to start from, in the Netscape format curl uses.
    pub cookies_file: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            stations: vec!["hb".into(), "ho".into(), "ke".into(), "yg".into()],
            servers: vec![
                "https://cddis.nasa.gov/archive/vlbi".into(),
                "ftp://ivs.bkg.bund.de/pub/vlbi".into(),
                "ftp://ivsopar.obspm.fr/pub/vlbi".into(),
            ],
            sched_types: vec!["vex".into(), "skd".into()],
            sched_dir: PathBuf::from("/usr2/sched"),
            proc_dir: PathBuf::from("/usr2/proc"),
            snap_dir: None,
            lst_dir: PathBuf::from("/usr2/sched"),
            log_dir: PathBuf::from("/usr2/log"),
            get_master: true,
            get_master_intensive: true,
            master_check_hours: 12.0,
            schedule_check_hours: 1.0,
            look_ahead_days: 14.0,
            do_drudg: true,
            drudg_binary: PathBuf::from("/usr2/fs/bin/drudg"),
            drudg: DrudgOptions::default(),
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            netrc_file: None,
            cookies_file: None,
        }
    }
}

impl FileConfig {
    /// Read a YAML config file. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(FileConfig::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }
}

/// Values given on the command line take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub stations: Option<Vec<String>>,
    pub servers: Option<Vec<String>>,
    pub sched_types: Option<Vec<String>>,
    pub master_check_hours: Option<f64>,
    pub schedule_check_hours: Option<f64>,
    pub look_ahead_days: Option<f64>,
    pub year: Option<i32>,
    pub sessions: Vec<String>,
    pub current: bool,
    pub all_stations: bool,
    pub no_drudg: bool,
    pub netrc_file: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Station codes in configured order, lower case.
    pub stations: Vec<String>,
    pub servers: Vec<String>,
    pub sched_types: Vec<ScheduleType>,
    pub sched_dir: PathBuf,
    pub proc_dir: PathBuf,
    pub snap_dir: PathBuf,
    pub lst_dir: PathBuf,
    pub log_dir: PathBuf,
    pub get_master: bool,
    pub get_master_intensive: bool,
    pub master_check_hours: f64,
    pub schedule_check_hours: f64,
    pub look_ahead_days: f64,
    pub do_drudg: bool,
    pub drudg_binary: PathBuf,
    pub drudg: DrudgOptions,
    pub lock_path: PathBuf,
    pub netrc_file: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
    pub year: i32,
    pub sessions: BTreeSet<String>,
    pub current: bool,
    pub all_stations: bool,
}

fn clean_word(word: &str) -> String {
    word.trim()
        .trim_matches(|c: char| c == ',' || c == '"' || c == '\'')
        .to_string()
}

impl Config {
    /// Merge the file and the command line and normalise the values.
    pub fn build(file: FileConfig, overrides: Overrides) -> Result<Self, ConfigError> {
        let stations: Vec<String> = overrides
            .stations
            .unwrap_or(file.stations)
            .iter()
            .map(|s| {
                s.trim()
                    .trim_matches(|c: char| c.is_ascii_punctuation())
                    .to_lowercase()
            })
            .filter(|s| !s.is_empty())
            .collect();
        let servers: Vec<String> = overrides
            .servers
            .unwrap_or(file.servers)
            .iter()
            .map(|s| clean_word(s).trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let sched_types = overrides
            .sched_types
            .unwrap_or(file.sched_types)
            .iter()
            .map(|s| clean_word(s))
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ScheduleType>().map_err(ConfigError::Invalid))
            .collect::<Result<Vec<_>, _>>()?;

        let config = Config {
            stations,
            servers,
            sched_types,
            snap_dir: file.snap_dir.unwrap_or_else(|| file.sched_dir.clone()),
            sched_dir: file.sched_dir,
            proc_dir: file.proc_dir,
            lst_dir: file.lst_dir,
            log_dir: file.log_dir,
            get_master: file.get_master,
            get_master_intensive: file.get_master_intensive,
            master_check_hours: overrides
                .master_check_hours
                .unwrap_or(file.master_check_hours),
            schedule_check_hours: overrides
                .schedule_check_hours
                .unwrap_or(file.schedule_check_hours),
            look_ahead_days: overrides.look_ahead_days.unwrap_or(file.look_ahead_days),
            do_drudg: file.do_drudg && !overrides.no_drudg,
            drudg_binary: file.drudg_binary,
            drudg: file.drudg.normalized(),
            lock_path: file.lock_path,
            netrc_file: overrides.netrc_file.or(file.netrc_file),
            cookies_file: overrides.cookies_file.or(file.cookies_file),
            year: overrides.year.unwrap_or_else(|| Utc::now().year()),
            sessions: overrides
                .sessions
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            current: overrides.current,
            all_stations: overrides.all_stations,
        };
        config.check_values()?;
        Ok(config)
    }

    fn check_values(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one schedule server must be given".into(),
            ));
        }
        if self.sched_types.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one schedule file type must be given".into(),
            ));
        }
        if self.stations.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one station must be given".into(),
            ));
        }
        if let Some(bad) = self.stations.iter().find(|s| s.chars().count() != 2) {
            return Err(ConfigError::Invalid(format!(
                "Station name length wrong: \"{bad}\". Should be two characters."
            )));
        }
        for (what, hours) in [
            ("master check interval", self.master_check_hours),
            ("schedule check interval", self.schedule_check_hours),
        ] {
            if !(hours > 0.0 && hours <= MAX_CHECK_HOURS) {
                return Err(ConfigError::Invalid(format!(
                    "{what} must be greater than zero and at most {MAX_CHECK_HOURS} hours, got {hours}"
                )));
            }
        }
        if !(self.look_ahead_days >= 0.0 && self.look_ahead_days <= MAX_LOOK_AHEAD_DAYS) {
            return Err(ConfigError::Invalid(format!(
                "look-ahead time must be between 0 and {MAX_LOOK_AHEAD_DAYS} days, got {}",
                self.look_ahead_days
            )));
        }
        if !self.get_master && !self.get_master_intensive {
            return Err(ConfigError::Invalid(
                "at least one of get_master and get_master_intensive must be enabled".into(),
            ));
        }
        Ok(())
    }

    /// Check that every directory and binary the configuration names exists.
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("schedule directory", &self.sched_dir),
            ("procedure directory", &self.proc_dir),
            ("SNAP directory", &self.snap_dir),
            ("drudg LST directory", &self.lst_dir),
        ];
        for (what, path) in dirs {
            if !path.is_dir() {
                return Err(ConfigError::MissingPath {
                    what,
                    path: path.clone(),
                });
            }
        }
        let login_files = [
            ("netrc file", &self.netrc_file),
            ("cookies file", &self.cookies_file),
        ];
        for (what, path) in login_files {
            if let Some(path) = path.as_ref().filter(|p| !p.is_file()) {
                return Err(ConfigError::MissingPath {
                    what,
                    path: path.clone(),
                });
            }
        }
        if self.do_drudg && !self.drudg_binary.exists() {
            return Err(ConfigError::MissingPath {
                what: "drudg executable",
                path: self.drudg_binary.clone(),
            });
        }
        Ok(())
    }

    pub fn station_set(&self) -> BTreeSet<String> {
        self.stations.iter().cloned().collect()
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            explicit_codes: self.sessions.clone(),
            current_only: self.current,
            all_stations_required: self.all_stations,
            look_ahead_days: self.look_ahead_days,
            configured_stations: self.station_set(),
        }
    }

    /// Time between two scheduled cycles in continuous mode, before the margin.
    pub fn cycle_interval_hours(&self) -> f64 {
        self.master_check_hours.min(self.schedule_check_hours)
    }
}
