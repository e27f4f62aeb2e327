//! Controller diagnostics

use std::time::Duration;

use jenkins_models::{Queue, SystemInfo};
use secrecy::SecretString;

use crate::errors::RunnerError;
use crate::http::client::JenkinsClient;

const SYSTEM_TREE: &str = "mode,nodeName,nodeDescription,numExecutors,quietingDown,useSecurity";

impl JenkinsClient {
    /// Controller mode, executors and version
    pub async fn get_system_info(&self) -> Result<SystemInfo, RunnerError> {
        let mut url = self.endpoint(&["api", "json"])?;
        url.query_pairs_mut().append_pair("tree", SYSTEM_TREE);

        let response = self.get(url).await?;
        let version = response
            .headers()
            .get("X-Jenkins")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut info: SystemInfo = response.json().await?;
        info.version = version;
        Ok(info)
    }

    /// Reach a controller with ad-hoc credentials and read its system info
    pub async fn check_connection(
        base_url: &str,
        username: &str,
        password: SecretString,
        timeout: Duration,
    ) -> Result<SystemInfo, RunnerError> {
        let client = JenkinsClient::new(base_url, username, password, timeout)?;
        client.get_system_info().await
    }

    /// Items waiting in the build queue
    pub async fn get_queue_info(&self) -> Result<Queue, RunnerError> {
        let url = self.endpoint(&["queue", "api", "json"])?;
        self.get_json(url).await
    }
}
