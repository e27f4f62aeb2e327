//! Job discovery endpoints

use jenkins_models::{BuildList, BuildSummary, Job, JobDetail, JobList};

use crate::errors::RunnerError;
use crate::http::client::JenkinsClient;

const JOB_TREE: &str = "jobs[name,url,color,displayName,description,buildable]";
const BUILD_TREE: &str =
    "builds[number,url,displayName,result,building,duration,timestamp,keepLog,queueId]{0,50}";

impl JenkinsClient {
    /// List top-level jobs
    pub async fn list_jobs(&self) -> Result<Vec<Job>, RunnerError> {
        let mut url = self.endpoint(&["api", "json"])?;
        url.query_pairs_mut().append_pair("tree", JOB_TREE);
        let list: JobList = self.get_json(url).await?;
        Ok(list.jobs)
    }

    /// Case-insensitive search over job name, display name and description
    pub async fn search_jobs(&self, keyword: &str) -> Result<Vec<Job>, RunnerError> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Err(RunnerError::InvalidInput("search keyword is empty".to_string()));
        }

        let jobs = self.list_jobs().await?;
        Ok(jobs.into_iter().filter(|job| job.matches(&needle)).collect())
    }

    /// Get a job with its last build summaries
    pub async fn get_job(&self, job: &str) -> Result<JobDetail, RunnerError> {
        let url = self.job_endpoint(job, &["api", "json"])?;
        self.get_json(url).await
    }

    /// Recent builds of a job, newest first
    pub async fn list_builds(&self, job: &str) -> Result<Vec<BuildSummary>, RunnerError> {
        let mut url = self.job_endpoint(job, &["api", "json"])?;
        url.query_pairs_mut().append_pair("tree", BUILD_TREE);
        let list: BuildList = self.get_json(url).await?;
        Ok(list.builds)
    }
}
