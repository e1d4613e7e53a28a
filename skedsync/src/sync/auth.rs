//! Login material for archives that sit behind an authentication service:
//! a `.netrc` file with per-host credentials and a cookie file in the
//! Netscape format curl reads and writes.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use netrc::Netrc;
use reqwest::Url;
use reqwest::cookie::Jar;
use tracing::debug;

use crate::error::RetrievalError;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Per-host basic-auth credentials.
#[derive(Debug)]
pub struct NetrcCredentials {
    netrc: Netrc,
}

impl NetrcCredentials {
    pub fn load(path: &Path) -> Result<Self, RetrievalError> {
        let file = File::open(path).map_err(|e| RetrievalError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let netrc = Netrc::parse(BufReader::new(file)).map_err(|e| RetrievalError::Credentials {
            path: path.to_path_buf(),
            reason: format!("{e:?}"),
        })?;
        debug!(
            "Loaded credentials for {} hosts from {}",
            netrc.hosts.len(),
            path.display()
        );
        Ok(NetrcCredentials { netrc })
    }

    /// Login and password for `host`, falling back to the `default` entry.
    pub fn for_host(&self, host: &str) -> Option<(String, Option<String>)> {
        self.netrc
            .hosts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(host))
            .map(|(_, machine)| machine)
            .or(self.netrc.default.as_ref())
            .map(|machine| (machine.login.clone(), machine.password.clone()))
    }
}

/// Add every unexpired cookie in a Netscape cookie file to `jar`.
/// Returns the number of cookies added.
pub fn load_cookies(path: &Path, jar: &Jar) -> Result<usize, RetrievalError> {
    let content = fs::read_to_string(path).map_err(|e| RetrievalError::Credentials {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut added = 0;
    for line in content.lines() {
        let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [domain, subdomains, cookie_path, secure, expires, name, value] = fields[..] else {
            debug!("Skipping malformed cookie line in {}", path.display());
            continue;
        };
        let expires: u64 = expires.trim().parse().unwrap_or(0);
        if expires != 0 && expires < now {
            continue;
        }

        let host = domain.trim_start_matches('.');
        let secure = secure.eq_ignore_ascii_case("TRUE");
        let scheme = if secure { "https" } else { "http" };
        let Ok(url) = Url::parse(&format!("{scheme}://{host}{cookie_path}")) else {
            continue;
        };
        let mut cookie = format!("{name}={value}; Path={cookie_path}");
        if subdomains.eq_ignore_ascii_case("TRUE") {
            cookie.push_str(&format!("; Domain={host}"));
        }
        if secure {
            cookie.push_str("; Secure");
        }
        jar.add_cookie_str(&cookie, &url);
        added += 1;
    }
    debug!("Loaded {added} cookies from {}", path.display());
    Ok(added)
}
