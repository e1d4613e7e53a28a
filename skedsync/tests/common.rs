use std::collections::HashMap;
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use skedsync::config::{Config, FileConfig, Overrides};
use skedsync::error::{InvokeError, RetrievalError};
use skedsync::invoker::{ArtifactDirs, Artifacts, ProcessingInvoker, artifacts_current};
use skedsync::session::ScheduleType;
use skedsync::sync::retrieval::{Retrieval, RetrievalClient, TargetId};

pub const SERVER_A: &str = "https://a.example.org/vlbi";
pub const SERVER_B: &str = "https://b.example.org/vlbi";

/// A file as published by one fake server.
#[derive(Clone)]
pub enum Remote {
    /// `newer` tells whether the copy is newer than any local one.
    File { content: String, newer: bool },
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub server: String,
    pub file: String,
    pub forced: bool,
}

/// Serves files from memory and records every request.
#[derive(Default)]
pub struct FakeServers {
    files: Mutex<HashMap<(String, String), Remote>>,
    calls: Mutex<Vec<Call>>,
}

#[allow(dead_code)]
impl FakeServers {
    pub fn publish(&self, server: &str, file: &str, content: &str, newer: bool) {
        self.files.lock().unwrap().insert(
            (server.to_string(), file.to_string()),
            Remote::File {
                content: content.to_string(),
                newer,
            },
        );
    }

    pub fn fail(&self, server: &str, file: &str) {
        self.files
            .lock()
            .unwrap()
            .insert((server.to_string(), file.to_string()), Remote::Error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, file: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.file == file).collect()
    }
}

#[async_trait]
impl RetrievalClient for FakeServers {
    async fn retrieve(
        &self,
        server: &str,
        target: &TargetId,
        dest_dir: &Path,
        forced: bool,
        _freshness_hours: f64,
    ) -> Result<Retrieval, RetrievalError> {
        let file = target.file_name();
        self.calls.lock().unwrap().push(Call {
            server: server.to_string(),
            file: file.clone(),
            forced,
        });
        let remote = self
            .files
            .lock()
            .unwrap()
            .get(&(server.to_string(), file.clone()))
            .cloned();
        let dest = dest_dir.join(&file);
        match remote {
            None => Ok(Retrieval::default()),
            Some(Remote::Error) => Err(RetrievalError::Status {
                url: format!("{server}/{file}"),
                status: 500,
            }),
            Some(Remote::File { content, newer }) => {
                if forced || newer || !dest.exists() {
                    fs::write(&dest, content)?;
                    Ok(Retrieval {
                        obtained: true,
                        is_new: true,
                    })
                } else {
                    Ok(Retrieval {
                        obtained: true,
                        is_new: false,
                    })
                }
            }
        }
    }
}

/// Writes empty artifacts instead of running drudg.
pub struct FakeDrudg {
    pub dirs: ArtifactDirs,
    pub failing: Vec<String>,
    calls: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl FakeDrudg {
    pub fn new(dirs: ArtifactDirs) -> Self {
        FakeDrudg {
            dirs,
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (station, session) per invocation.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessingInvoker for FakeDrudg {
    async fn invoke(
        &self,
        station: &str,
        session_code: &str,
        _sched_type: ScheduleType,
    ) -> Result<Artifacts, InvokeError> {
        self.calls
            .lock()
            .unwrap()
            .push((station.to_string(), session_code.to_string()));
        if self.failing.iter().any(|s| s == station) {
            return Err(InvokeError::ExitStatus {
                station: station.to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        let artifacts = Artifacts {
            snap: self.dirs.snap_file(session_code, station),
            procedures: self.dirs.proc_file(session_code, station),
            listing: self.dirs.lst_file(session_code, station),
        };
        for path in artifacts.paths() {
            fs::write(path, station)?;
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

/// A validated configuration rooted in `root`, with every directory created.
#[allow(dead_code)]
pub fn test_config(root: &Path, overrides: Overrides) -> Config {
    let sched_dir = root.join("sched");
    let proc_dir = root.join("proc");
    let lst_dir = root.join("lst");
    for dir in [&sched_dir, &proc_dir, &lst_dir] {
        fs::create_dir_all(dir).unwrap();
    }
    let file = FileConfig {
        stations: vec!["hb".into(), "ke".into()],
        servers: vec![SERVER_A.into(), SERVER_B.into()],
        sched_types: vec!["vex".into(), "skd".into()],
        sched_dir,
        proc_dir,
        snap_dir: None,
        lst_dir,
        log_dir: root.join("log"),
        drudg_binary: root.join("drudg"),
        lock_path: root.join("skedsync.lock"),
        ..Default::default()
    };
    Config::build(file, overrides).unwrap()
}

/// Make `path` look older than it is.
#[allow(dead_code)]
pub fn age_file(path: &Path, by: Duration) {
    let then = SystemTime::now() - by;
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_accessed(then).set_modified(then))
        .unwrap();
}

#[allow(dead_code)]
pub fn sched_path(config: &Config, name: &str) -> PathBuf {
    config.sched_dir.join(name)
}

/// Move the modification time of `path` into the past, leaving the access time.
#[allow(dead_code)]
pub fn backdate_modified(path: &Path, by: Duration) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_modified(SystemTime::now() - by))
        .unwrap();
}
