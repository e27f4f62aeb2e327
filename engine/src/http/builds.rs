//! Build trigger, inspection and console endpoints

use std::collections::HashMap;

use http::header::LOCATION;
use jenkins_models::{BuildDetail, LogChunk, QueueItem, QueuedBuild};
use tracing::info;

use crate::errors::RunnerError;
use crate::http::client::{parse_queue_id, JenkinsClient};

const TEXT_SIZE_HEADER: &str = "X-Text-Size";
const MORE_DATA_HEADER: &str = "X-More-Data";

impl JenkinsClient {
    /// Queue a build of a job
    ///
    /// Jenkins only returns the queue item; the build number is assigned
    /// once an executor picks the item up.
    pub async fn start_job(
        &self,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<QueuedBuild, RunnerError> {
        let action = if params.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let mut url = self.job_endpoint(job, &[action])?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let response = self.post(url).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                RunnerError::Protocol(format!("trigger of {} returned no Location header", job))
            })?;
        let queue_id = parse_queue_id(location).ok_or_else(|| {
            RunnerError::Protocol(format!("unexpected queue location: {}", location))
        })?;

        info!("Queued job {} as queue item {}", job, queue_id);
        Ok(QueuedBuild {
            queued: true,
            queue_id,
        })
    }

    /// Get a queue item; 404 once Jenkins has forgotten it
    pub async fn get_queue_item(&self, queue_id: u64) -> Result<QueueItem, RunnerError> {
        let id = queue_id.to_string();
        let url = self.endpoint(&["queue", "item", id.as_str(), "api", "json"])?;
        self.get_json(url).await
    }

    /// Remove an item from the queue before an executor picks it up
    pub async fn cancel_queue_item(&self, queue_id: u64) -> Result<(), RunnerError> {
        let mut url = self.endpoint(&["queue", "cancelItem"])?;
        url.query_pairs_mut()
            .append_pair("id", &queue_id.to_string());
        self.post(url).await?;
        info!("Cancelled queue item {}", queue_id);
        Ok(())
    }

    /// Get build detail
    pub async fn get_build(&self, job: &str, number: u64) -> Result<BuildDetail, RunnerError> {
        let number = number.to_string();
        let url = self.job_endpoint(job, &[number.as_str(), "api", "json"])?;
        self.get_json(url).await
    }

    /// Abort a running build
    pub async fn stop_build(&self, job: &str, number: u64) -> Result<(), RunnerError> {
        let build = self.get_build(job, number).await?;
        if !build.building {
            return Err(RunnerError::AlreadyTerminal(format!("{} #{}", job, number)));
        }

        let number_segment = number.to_string();
        let url = self.job_endpoint(job, &[number_segment.as_str(), "stop"])?;
        self.post(url).await?;
        info!("Stop requested for {} #{}", job, number);
        Ok(())
    }

    /// Read the console log from byte offset `start`
    pub async fn get_build_log(
        &self,
        job: &str,
        number: u64,
        start: u64,
        html: bool,
    ) -> Result<LogChunk, RunnerError> {
        let number = number.to_string();
        let action = if html {
            "progressiveHtml"
        } else {
            "progressiveText"
        };
        let mut url = self.job_endpoint(job, &[number.as_str(), "logText", action])?;
        url.query_pairs_mut().append_pair("start", &start.to_string());

        let response = self.get(url).await?;
        let headers = response.headers();
        let text_size = headers
            .get(TEXT_SIZE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let has_more = headers
            .get(MORE_DATA_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        let text = response.text().await?;
        let next_start = text_size.unwrap_or(start + text.len() as u64);

        Ok(LogChunk {
            text,
            next_start,
            has_more,
        })
    }
}
