//! `datalyst evaluate`: one benchmark round trip.
//!
//! Fetches a random question, downloads its attachment when there is one,
//! runs the agent and submits the trimmed answer for grading.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use datalyst_agent::AgentLoop;
use datalyst_config::AppConfig;
use datalyst_core::event::EventBus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A benchmark task.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Question {
    /// The attachment's bare file name, if the task has one.
    pub fn attachment_name(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
    }
}

#[derive(Debug, Serialize)]
struct Submission<'a> {
    task_id: &'a str,
    answer: &'a str,
}

/// The grading response.
#[derive(Debug, Clone, Deserialize)]
pub struct Grade {
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
}

/// Client for the benchmark question service.
pub struct BenchmarkClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl BenchmarkClient {
    pub fn new(api_base: &str, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn random_question(&self) -> Result<Question, reqwest::Error> {
        self.http
            .get(format!("{}/random-question", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn download_file(&self, task_id: &str) -> Result<Vec<u8>, reqwest::Error> {
        let bytes = self
            .http
            .get(format!("{}/files/{task_id}", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    pub async fn submit(&self, task_id: &str, answer: &str) -> Result<Grade, reqwest::Error> {
        self.http
            .post(format!("{}/submit", self.api_base))
            .bearer_auth(&self.token)
            .json(&Submission { task_id, answer })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let token = std::env::var("HF_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or("HF_TOKEN is not set. Add it to the environment or to a .env file.")?;

    let client = BenchmarkClient::new(&config.evaluation.api_base, token);

    let task = client.random_question().await?;
    println!("Question [{}]: {}", task.task_id, task.question);

    let mut files: Vec<String> = Vec::new();
    if let Some(name) = task.attachment_name() {
        let bytes = client.download_file(&task.task_id).await?;
        let path = save_attachment(&config.tools.data_dir, name, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Attachment downloaded");
        println!("Downloaded file: {name}");
        files.push(path.display().to_string());
    }

    let provider = datalyst_providers::build_from_config(&config)?;
    let tools = Arc::new(datalyst_tools::default_registry(&config.tools));
    let agent = AgentLoop::from_config(&config, provider, tools, Arc::new(EventBus::default()))
        .with_recursion_limit(config.evaluation.recursion_limit);

    let outcome = agent.run(&task.question, files).await?;
    let answer = outcome.answer.trim();
    println!("Agent answer: \"{answer}\"");

    let grade = client.submit(&task.task_id, answer).await?;
    println!(
        "Result: {}",
        if grade.correct { "CORRECT" } else { "INCORRECT" }
    );
    if let Some(score) = grade.score {
        println!("Score: {score}");
    }

    Ok(())
}

fn save_attachment(data_dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(file_name: Option<&str>) -> Question {
        Question {
            task_id: "t1".into(),
            question: "q".into(),
            file_name: file_name.map(String::from),
        }
    }

    #[test]
    fn question_without_file_name_parses() {
        let task: Question =
            serde_json::from_str(r#"{"task_id": "abc", "question": "How many?"}"#).unwrap();
        assert_eq!(task.task_id, "abc");
        assert!(task.attachment_name().is_none());
    }

    #[test]
    fn blank_file_name_means_no_attachment() {
        assert!(question(Some("")).attachment_name().is_none());
        assert!(question(Some("  ")).attachment_name().is_none());
    }

    #[test]
    fn attachment_name_drops_directories() {
        assert_eq!(question(Some("sales.xlsx")).attachment_name(), Some("sales.xlsx"));
        assert_eq!(question(Some("../../etc/passwd")).attachment_name(), Some("passwd"));
    }

    #[test]
    fn grade_tolerates_missing_fields() {
        let grade: Grade = serde_json::from_str(r#"{"correct": true}"#).unwrap();
        assert!(grade.correct);
        assert!(grade.score.is_none());
    }

    #[test]
    fn attachment_is_written_into_data_dir() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        let path = save_attachment(&data_dir, "report.txt", b"hello").unwrap();
        assert_eq!(path, data_dir.join("report.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = BenchmarkClient::new("https://example.test/", "token");
        assert_eq!(client.api_base, "https://example.test");
    }
}
