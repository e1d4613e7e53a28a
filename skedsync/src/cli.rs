use std::path::PathBuf;

use clap::Parser;

use skedsync::config::Overrides;
use skedsync::cycle::CycleCommand;

#[derive(Parser, Debug)]
#[command(name = "skedsync", version)]
#[command(
    about = "Keeps VLBI master and schedule files up to date and prepares them with drudg",
    long_about = "Checks the IVS servers for new or updated master and schedule files and runs \
                  drudg on new ones. Checks happen when the time since the last check exceeds a \
                  given interval. Checks can be forced from the command line."
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "SKEDSYNC_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stations to consider, two-letter codes
    #[arg(long, num_args = 1.., value_name = "STN")]
    pub stations: Option<Vec<String>>,

    /// Schedule servers in priority order
    #[arg(long, num_args = 1.., value_name = "URL")]
    pub servers: Option<Vec<String>>,

    /// Schedule file types in priority order (vex, skd)
    #[arg(long, num_args = 1.., value_name = "TYPE")]
    pub sched_types: Option<Vec<String>>,

    /// Hours between checks of the master files
    #[arg(short = 't', long, value_name = "HOURS")]
    pub master_check_hours: Option<f64>,

    /// Hours between checks of the schedule files
    #[arg(short = 's', long, value_name = "HOURS")]
    pub schedule_check_hours: Option<f64>,

    /// Only process sessions starting within this many days
    #[arg(short = 'l', long, value_name = "DAYS")]
    pub look_ahead_days: Option<f64>,

    /// Year of the master files
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Process these sessions regardless of their start time
    #[arg(short = 'g', num_args = 1.., value_name = "CODE")]
    pub sessions: Vec<String>,

    /// Only process the current or next session
    #[arg(short = 'n', long)]
    pub current: bool,

    /// Only process sessions that include all of the stations
    #[arg(short, long)]
    pub all: bool,

    /// Check once and exit
    #[arg(short, long)]
    pub once: bool,

    /// Report the status of local files and exit; nothing is downloaded
    #[arg(short = 'e', long)]
    pub check: bool,

    /// Force a download of the master files
    #[arg(short = 'm', long)]
    pub master_update: bool,

    /// Force a download of the schedule files
    #[arg(short = 'u', long)]
    pub sched_update: bool,

    /// Accept updated schedule files that differ from the local copy
    #[arg(long)]
    pub update: bool,

    /// Do not run drudg
    #[arg(long)]
    pub no_drudg: bool,

    /// Credentials for servers that need a login, in .netrc format
    #[arg(long, env = "SKEDSYNC_NETRC", value_name = "FILE")]
    pub netrc_file: Option<PathBuf>,

    /// Cookie file in the Netscape format written by curl
    #[arg(long, value_name = "FILE")]
    pub cookies_file: Option<PathBuf>,

    /// Only log to the log file
    #[arg(short, long)]
    pub quiet: bool,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            stations: self.stations.clone(),
            servers: self.servers.clone(),
            sched_types: self.sched_types.clone(),
            master_check_hours: self.master_check_hours,
            schedule_check_hours: self.schedule_check_hours,
            look_ahead_days: self.look_ahead_days,
            year: self.year,
            sessions: self.sessions.clone(),
            current: self.current,
            all_stations: self.all,
            no_drudg: self.no_drudg || self.check,
            netrc_file: self.netrc_file.clone(),
            cookies_file: self.cookies_file.clone(),
        }
    }

    pub fn command(&self) -> CycleCommand {
        CycleCommand {
            force_master: self.master_update,
            force_schedule: self.sched_update,
            accept_updates: self.update,
            check_only: self.check,
        }
    }
}
