//! HTTP(S) retrieval with conditional GET requests.
//!
//! Redirects are followed here rather than by reqwest so that every hop can
//! carry the credentials `.netrc` lists for its host, the way `curl --netrc -L`
//! logs in to archives fronted by a separate login service.

use std::fs::{self, File, FileTimes};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Response, StatusCode, Url};
use tracing::debug;

use crate::error::RetrievalError;
use crate::sync::auth::{NetrcCredentials, load_cookies};
use crate::sync::retrieval::{Retrieval, RetrievalClient, TargetId};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_REDIRECTS: usize = 10;

pub struct HttpRetrievalClient {
    client: reqwest::Client,
    credentials: Option<NetrcCredentials>,
}

impl HttpRetrievalClient {
    /// A client without login data.
    pub fn new() -> Result<Self, RetrievalError> {
        Self::with_auth(None, None)
    }

    /// A client that logs in with `.netrc` credentials and starts from the
    /// cookies in `cookies_file`. Cookies set by servers are kept in memory
    /// for the life of the client.
    pub fn with_auth(
        netrc_file: Option<&Path>,
        cookies_file: Option<&Path>,
    ) -> Result<Self, RetrievalError> {
        let jar = Arc::new(Jar::default());
        if let Some(path) = cookies_file {
            load_cookies(path, &jar)?;
        }
        let credentials = netrc_file.map(NetrcCredentials::load).transpose()?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("skedsync/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(jar)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    async fn get(&self, url: &str, since: Option<String>) -> Result<Response, RetrievalError> {
        let mut url = Url::parse(url).map_err(|e| RetrievalError::BadUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        for _ in 0..MAX_REDIRECTS {
            let mut request = self.client.get(url.clone());
            if let Some(since) = &since {
                request = request.header(IF_MODIFIED_SINCE, since.as_str());
            }
            let login = url
                .host_str()
                .zip(self.credentials.as_ref())
                .and_then(|(host, creds)| creds.for_host(host));
            if let Some((user, password)) = login {
                request = request.basic_auth(user, password);
            }
            debug!("GET {url}");
            let response = request.send().await?;

            let status = response.status();
            if !status.is_redirection() || status == StatusCode::NOT_MODIFIED {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(response);
            };
            url = url.join(location).map_err(|e| RetrievalError::BadUrl {
                url: location.to_string(),
                reason: e.to_string(),
            })?;
        }
        Err(RetrievalError::TooManyRedirects(url.to_string()))
    }
}

fn freshness(hours: f64) -> Duration {
    Duration::try_from_secs_f64((hours * 3600.0).max(0.0)).unwrap_or(Duration::ZERO)
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn retrieve(
        &self,
        server: &str,
        target: &TargetId,
        dest_dir: &Path,
        forced: bool,
        freshness_hours: f64,
    ) -> Result<Retrieval, RetrievalError> {
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(RetrievalError::UnsupportedScheme(server.to_string()));
        }
        let url = format!("{}/{}", server.trim_end_matches('/'), target.remote_path());
        let dest = dest_dir.join(target.file_name());
        let local_mtime = fs::metadata(&dest).and_then(|m| m.modified()).ok();
        let threshold = local_mtime.map(|t| t + freshness(freshness_hours));

        let since = match (forced, threshold) {
            (false, Some(threshold)) => {
                let since: DateTime<Utc> = threshold.into();
                Some(since.format(HTTP_DATE).to_string())
            }
            _ => None,
        };
        let response = self.get(&url, since).await?;

        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(Retrieval { obtained: true, is_new: false }),
            StatusCode::NOT_FOUND => return Ok(Retrieval::default()),
            status if !status.is_success() => {
                return Err(RetrievalError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let remote_mtime: Option<SystemTime> = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.with_timezone(&Utc).into());

        let is_new = match (forced, threshold, remote_mtime) {
            (true, _, _) | (false, None, _) | (false, Some(_), None) => true,
            (false, Some(threshold), Some(remote)) => remote > threshold,
        };
        if !is_new {
            // server ignored If-Modified-Since and sent an old copy
            return Ok(Retrieval { obtained: true, is_new: false });
        }

        let body = response.bytes().await?;
        let mut partial = dest.clone().into_os_string();
        partial.push(".part");
        fs::write(&partial, &body)?;
        fs::rename(&partial, &dest)?;

        let mut times = FileTimes::new().set_accessed(SystemTime::now());
        if let Some(remote) = remote_mtime {
            times = times.set_modified(remote);
        }
        File::options().write(true).open(&dest)?.set_times(times)?;
        debug!("Wrote {} bytes to {}", body.len(), dest.display());

        Ok(Retrieval { obtained: true, is_new: true })
    }
}
