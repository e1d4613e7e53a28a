//! Per-station file generation with `drudg`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{Config, DrudgOptions};
use crate::error::InvokeError;
use crate::session::ScheduleType;

/// Where schedule files live and where generated files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDirs {
    pub sched_dir: PathBuf,
    pub snap_dir: PathBuf,
    pub proc_dir: PathBuf,
    pub lst_dir: PathBuf,
}

impl ArtifactDirs {
    pub fn from_config(config: &Config) -> Self {
        ArtifactDirs {
            sched_dir: config.sched_dir.clone(),
            snap_dir: config.snap_dir.clone(),
            proc_dir: config.proc_dir.clone(),
            lst_dir: config.lst_dir.clone(),
        }
    }

    pub fn schedule_file(&self, code: &str, sched_type: ScheduleType) -> PathBuf {
        self.sched_dir.join(format!("{code}.{sched_type}"))
    }

    pub fn snap_file(&self, code: &str, station: &str) -> PathBuf {
        self.snap_dir.join(format!("{code}{station}.snp"))
    }

    pub fn proc_file(&self, code: &str, station: &str) -> PathBuf {
        self.proc_dir.join(format!("{code}{station}.prc"))
    }

    pub fn lst_file(&self, code: &str, station: &str) -> PathBuf {
        self.lst_dir.join(format!("{code}{station}.lst"))
    }
}

/// Files produced for one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub snap: PathBuf,
    pub procedures: PathBuf,
    pub listing: PathBuf,
}

impl Artifacts {
    pub fn paths(&self) -> [&Path; 3] {
        [&self.snap, &self.procedures, &self.listing]
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True when the SNAP and procedure files of `station` exist and are newer
/// than the schedule file.
pub fn artifacts_current(
    dirs: &ArtifactDirs,
    sched_type: ScheduleType,
    code: &str,
    station: &str,
) -> bool {
    let Some(schedule_time) = modified(&dirs.schedule_file(code, sched_type)) else {
        return false;
    };
    [dirs.snap_file(code, station), dirs.proc_file(code, station)]
        .iter()
        .all(|artifact| match modified(artifact) {
            Some(t) => t > schedule_time,
            None => {
                debug!("{} does not exist", artifact.display());
                false
            }
        })
}

#[async_trait]
pub trait ProcessingInvoker: Send + Sync {
    async fn invoke(
        &self,
        station: &str,
        session_code: &str,
        sched_type: ScheduleType,
    ) -> Result<Artifacts, InvokeError>;

    fn artifacts_current(
        &self,
        sched_type: ScheduleType,
        session_code: &str,
        station: &str,
    ) -> bool;
}

/// Answers fed to drudg's menu: station, SNAP file, procedures, listing, exit.
pub fn drudg_script(station: &str, options: &DrudgOptions) -> String {
    let mut script = String::new();
    script.push_str(station);
    script.push('\n');
    script.push_str("3\n");
    script.push_str("12\n");
    script.push_str(&format!("{}\n", options.tpi_period));
    script.push_str(&format!("{}\n", options.cont_cal_action));
    if options.cont_cal_action == "on" {
        script.push_str(&format!("{}\n", options.cont_cal_polarity));
    }
    script.push_str(&format!("{}\n", options.vsi_align));
    script.push_str("5\n");
    script.push_str("0\n");
    script
}

/// Runs the `drudg` binary in the schedule directory.
pub struct DrudgInvoker {
    binary: PathBuf,
    dirs: ArtifactDirs,
    options: DrudgOptions,
}

impl DrudgInvoker {
    pub fn new(binary: PathBuf, dirs: ArtifactDirs, options: DrudgOptions) -> Self {
        DrudgInvoker {
            binary,
            dirs,
            options,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.drudg_binary.clone(),
            ArtifactDirs::from_config(config),
            config.drudg.clone(),
        )
    }

    /// Move `name` from the working directory to `dest`. A file already at
    /// `dest` only counts when it is newer than the schedule.
    fn collect(&self, name: &str, dest: &Path, schedule: &Path) -> Result<(), InvokeError> {
        let produced = self.dirs.sched_dir.join(name);
        if produced != dest && produced.exists() {
            if fs::rename(&produced, dest).is_err() {
                fs::copy(&produced, dest)?;
                fs::remove_file(&produced)?;
            }
            return Ok(());
        }
        match (modified(dest), modified(schedule)) {
            (Some(made), Some(released)) if made > released => Ok(()),
            _ => Err(InvokeError::MissingArtifact(dest.to_path_buf())),
        }
    }
}

#[async_trait]
impl ProcessingInvoker for DrudgInvoker {
    async fn invoke(
        &self,
        station: &str,
        session_code: &str,
        sched_type: ScheduleType,
    ) -> Result<Artifacts, InvokeError> {
        let schedule = self.dirs.schedule_file(session_code, sched_type);
        info!("Running drudg on {} for station {station}", schedule.display());

        let mut child = Command::new(&self.binary)
            .arg(&schedule)
            .current_dir(&self.dirs.sched_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let script = drudg_script(station, &self.options);
            if let Err(e) = stdin.write_all(script.as_bytes()).await {
                warn!("drudg closed its input early: {e}");
            }
        }
        let output = child.wait_with_output().await?;
        debug!("drudg output:\n{}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            debug!("drudg errors:\n{}", String::from_utf8_lossy(&output.stderr));
            return Err(InvokeError::ExitStatus {
                station: station.to_string(),
                status: output.status.to_string(),
            });
        }

        let artifacts = Artifacts {
            snap: self.dirs.snap_file(session_code, station),
            procedures: self.dirs.proc_file(session_code, station),
            listing: self.dirs.lst_file(session_code, station),
        };
        for (ext, dest) in [
            ("snp", &artifacts.snap),
            ("prc", &artifacts.procedures),
            ("lst", &artifacts.listing),
        ] {
            self.collect(&format!("{session_code}{station}.{ext}"), dest, &schedule)?;
        }
        Ok(artifacts)
    }

    fn artifacts_current(
        &self,
        sched_type: ScheduleType,
        session_code: &str,
        station: &str,
    ) -> bool {
        artifacts_current(&self.dirs, sched_type, session_code, station)
    }
}
