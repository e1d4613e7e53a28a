use std::fmt::{Display, Formatter};
use std::path::Path;

use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::session::ScheduleType;

/// What a sync target refers to on the servers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetId {
    Master {
        year: i32,
    },
    MasterIntensive {
        year: i32,
    },
    Schedule {
        code: String,
        year: i32,
        sched_type: ScheduleType,
    },
}

impl TargetId {
    /// Name of the local (and remote) file.
    pub fn file_name(&self) -> String {
        match self {
            TargetId::Master { year } => format!("master{:02}.txt", year.rem_euclid(100)),
            TargetId::MasterIntensive { year } => {
                format!("master{:02}-int.txt", year.rem_euclid(100))
            }
            TargetId::Schedule {
                code, sched_type, ..
            } => format!("{code}.{sched_type}"),
        }
    }

    /// Location of the file below a server's top directory.
    pub fn remote_path(&self) -> String {
        match self {
            TargetId::Master { .. } | TargetId::MasterIntensive { .. } => {
                format!("ivscontrol/{}", self.file_name())
            }
            TargetId::Schedule { code, year, .. } => {
                format!("ivsdata/aux/{year}/{code}/{}", self.file_name())
            }
        }
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetId::Master { .. } => write!(f, "24h session Master File {}", self.file_name()),
            TargetId::MasterIntensive { .. } => {
                write!(f, "Intensive session Master File {}", self.file_name())
            }
            TargetId::Schedule { .. } => write!(f, "schedule file {}", self.file_name()),
        }
    }
}

/// Outcome of asking one server for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retrieval {
    /// The server has the file and a local copy is now present.
    pub obtained: bool,
    /// The local copy was replaced by a newer one.
    pub is_new: bool,
}

/// Fetches a target from one server into `dest_dir`, named by
/// [`TargetId::file_name`].
///
/// With `forced` the file is downloaded even if the local copy looks current;
/// otherwise a remote copy only counts as new when it is more than
/// `freshness_hours` newer than the local one.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn retrieve(
        &self,
        server: &str,
        target: &TargetId,
        dest_dir: &Path,
        forced: bool,
        freshness_hours: f64,
    ) -> Result<Retrieval, RetrievalError>;
}
