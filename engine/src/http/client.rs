//! Jenkins HTTP client

use std::time::Duration;

use jenkins_models::Crumb;
use reqwest::{redirect, Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::errors::RunnerError;

/// HTTP client for one Jenkins controller
pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    username: String,
    api_token: SecretString,
}

impl JenkinsClient {
    /// Create a new Jenkins client
    pub fn new(
        base_url: &str,
        username: &str,
        api_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, RunnerError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RunnerError::InvalidInput(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RunnerError::InvalidInput(format!(
                "not a base URL: {}",
                base_url
            )));
        }

        // Jenkins answers stop/trigger with redirects to HTML pages
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            api_token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Browser URL of a job, with a trailing slash as Jenkins reports it
    pub fn job_url(&self, job: &str) -> Result<String, RunnerError> {
        let url = self.job_endpoint(job, &[])?;
        Ok(format!("{}/", url))
    }

    /// Build an endpoint URL below the base URL
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, RunnerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RunnerError::InvalidInput(format!("not a base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Endpoint below a job; `a/b` addresses job `b` inside folder `a`
    pub(crate) fn job_endpoint(&self, job: &str, rest: &[&str]) -> Result<Url, RunnerError> {
        let mut segments = job_segments(job)?;
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(self.api_token.expose_secret()))
    }

    /// Make a GET request and return the raw response
    pub(crate) async fn get(&self, url: Url) -> Result<Response, RunnerError> {
        debug!("GET {}", url);
        let response = self.request(Method::GET, url).send().await?;
        check_status(response, "GET").await
    }

    /// Make a GET request and decode the JSON body
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RunnerError> {
        let response = self.get(url).await?;
        let body = response.json().await?;
        Ok(body)
    }

    /// Make a POST request, attaching a CSRF crumb when the server issues one
    pub(crate) async fn post(&self, url: Url) -> Result<Response, RunnerError> {
        let crumb = self.crumb().await?;

        debug!("POST {}", url);
        let mut request = self.request(Method::POST, url);
        if let Some(crumb) = crumb {
            request = request.header(crumb.crumb_request_field.as_str(), crumb.crumb.as_str());
        }

        let response = request.send().await?;
        check_status(response, "POST").await
    }

    async fn crumb(&self) -> Result<Option<Crumb>, RunnerError> {
        let url = self.endpoint(&["crumbIssuer", "api", "json"])?;
        match self.get_json::<Crumb>(url).await {
            Ok(crumb) => Ok(Some(crumb)),
            // CSRF protection disabled
            Err(RunnerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Path segments addressing a (possibly nested) job
pub fn job_segments(job: &str) -> Result<Vec<&str>, RunnerError> {
    let parts: Vec<&str> = job.split('/').filter(|part| !part.is_empty()).collect();
    if parts.is_empty() {
        return Err(RunnerError::InvalidInput("job name is empty".to_string()));
    }

    let mut segments = Vec::with_capacity(parts.len() * 2);
    for part in parts {
        segments.push("job");
        segments.push(part);
    }
    Ok(segments)
}

/// Queue item id from the `Location` header returned by a trigger
pub fn parse_queue_id(location: &str) -> Option<u64> {
    let path = location.trim_end_matches('/');
    let (head, id) = path.rsplit_once('/')?;
    if !head.ends_with("/queue/item") {
        return None;
    }
    id.parse().ok()
}

async fn check_status(response: Response, method: &str) -> Result<Response, RunnerError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => {
            debug!("Jenkins {} {} returned 404", method, url);
            Err(RunnerError::NotFound(url))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!("Jenkins {} {} rejected credentials: {}", method, url, status);
            Err(RunnerError::Auth(format!("{} {}", status, url)))
        }
        _ => {
            error!("Jenkins {} {} failed: {} - {}", method, url, status, body);
            Err(RunnerError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}
