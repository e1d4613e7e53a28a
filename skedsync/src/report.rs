//! Read-only status summary of masters, sessions and generated files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tabwriter::TabWriter;
use tracing::{info, warn};

use crate::config::Config;
use crate::invoker::ArtifactDirs;
use crate::session::{ScheduleType, Session};

const LAST_CHECK_STAMP: &str = ".skedsync-last-check";
const RULE: &str = "--------------------------------------------------------------";

pub fn last_check_path(sched_dir: &Path) -> PathBuf {
    sched_dir.join(LAST_CHECK_STAMP)
}

/// Record the end of a mutating cycle.
pub fn write_last_check(sched_dir: &Path, now: DateTime<Utc>) -> io::Result<()> {
    fs::write(last_check_path(sched_dir), format!("{}\n", now.to_rfc3339()))
}

pub fn read_last_check(sched_dir: &Path) -> Option<SystemTime> {
    fs::metadata(last_check_path(sched_dir))
        .and_then(|m| m.modified())
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterVersion {
    pub intensive: bool,
    pub released: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub code: String,
    pub start: DateTime<Utc>,
    pub got_schedule: bool,
    /// Hours since the schedule file was released.
    pub age_hours: Option<u64>,
    /// Per configured station: `None` when the station is not observing,
    /// otherwise whether SNAP, procedure and listing files all exist.
    pub readiness: Vec<Option<bool>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub stations: Vec<String>,
    pub masters: Vec<MasterVersion>,
    pub sessions: Vec<SessionStatus>,
    pub since_last_check: Option<Duration>,
}

fn yes_no(b: bool) -> &'static str {
    if b { "Yes" } else { "No" }
}

impl StatusReport {
    /// Look at the local files only; nothing is modified.
    pub fn gather(
        config: &Config,
        masters: &[PathBuf],
        sessions: &[&Session],
        now: SystemTime,
    ) -> Self {
        let dirs = ArtifactDirs::from_config(config);
        let masters = masters
            .iter()
            .filter_map(|m| {
                let modified = fs::metadata(m).and_then(|meta| meta.modified()).ok()?;
                Some(MasterVersion {
                    intensive: m.to_string_lossy().contains("-int"),
                    released: modified.into(),
                })
            })
            .collect();

        let sessions = sessions
            .iter()
            .map(|ses| {
                let schedule_time = [ScheduleType::Skd, ScheduleType::Vex]
                    .iter()
                    .filter_map(|t| {
                        fs::metadata(dirs.schedule_file(&ses.code, *t))
                            .and_then(|m| m.modified())
                            .ok()
                    })
                    .max();
                let age_hours = schedule_time.map(|t| {
                    now.duration_since(t)
                        .map(|d| d.as_secs() / 3600)
                        .unwrap_or(0)
                });
                let readiness = config
                    .stations
                    .iter()
                    .map(|stn| {
                        ses.relevant_stations.contains(stn).then(|| {
                            dirs.snap_file(&ses.code, stn).exists()
                                && dirs.proc_file(&ses.code, stn).exists()
                                && dirs.lst_file(&ses.code, stn).exists()
                        })
                    })
                    .collect();
                SessionStatus {
                    code: ses.code.clone(),
                    start: ses.start,
                    got_schedule: schedule_time.is_some(),
                    age_hours,
                    readiness,
                }
            })
            .collect();

        StatusReport {
            stations: config.stations.clone(),
            masters,
            sessions,
            since_last_check: read_last_check(&config.sched_dir)
                .and_then(|t| now.duration_since(t).ok()),
        }
    }

    pub fn render(&self) -> io::Result<String> {
        let mut out = String::new();
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "Schedule Status for {}:\n",
            self.stations.join(", ")
        ));
        if self.masters.len() > 1 {
            out.push_str("Master file versions (UTC of latest version downloaded):\n");
        } else {
            out.push_str("Master file version (UTC of latest version downloaded):\n");
        }
        for master in &self.masters {
            let label = if master.intensive {
                "Intensive sessions:"
            } else {
                "24h sessions:      "
            };
            out.push_str(&format!(
                "    {label} {}\n",
                master.released.format("%Y-%m-%d %H:%M")
            ));
        }
        out.push('\n');
        out.push_str("Sessions:\n");

        if self.sessions.is_empty() {
            out.push_str("    No sessions to process\n");
        } else {
            let mut table = Vec::new();
            let mut tab_writer = TabWriter::new(&mut table);
            write!(&mut tab_writer, "SESSION\tSTART (UT)\tGOT SCHEDULE\tAGE* (HRS)")?;
            for stn in &self.stations {
                write!(&mut tab_writer, "\t{}", stn.to_uppercase())?;
            }
            writeln!(&mut tab_writer)?;
            for ses in &self.sessions {
                write!(
                    &mut tab_writer,
                    "{}\t{}\t{}\t{}",
                    ses.code,
                    ses.start.format("%Y-%m-%d %H:%M"),
                    yes_no(ses.got_schedule),
                    ses.age_hours.map(|h| h.to_string()).unwrap_or_default()
                )?;
                for ready in &ses.readiness {
                    write!(&mut tab_writer, "\t{}", ready.map(yes_no).unwrap_or("-"))?;
                }
                writeln!(&mut tab_writer)?;
            }
            tab_writer.flush()?;
            drop(tab_writer);
            out.push_str(&String::from_utf8_lossy(&table));
        }

        out.push_str(RULE);
        out.push('\n');
        out.push_str("[*] Age = time since the schedule file was released.\n");
        if let Some(since) = self.since_last_check {
            let minutes = since.as_secs() / 60;
            out.push_str(&format!(
                "Schedules were last checked {}:{:02} ago\n",
                minutes / 60,
                minutes % 60
            ));
        }
        Ok(out)
    }

    /// Emit the rendered report through the log.
    pub fn log(&self) {
        match self.render() {
            Ok(text) => {
                for line in text.lines() {
                    info!("{line}");
                }
            }
            Err(e) => warn!("Failed to render status report: {e}"),
        }
    }
}
