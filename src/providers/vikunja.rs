use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{TaskFilter, TaskSource};
use crate::model::task::{parse_timestamp, Comment, Task};
use crate::util::html::TextConverter;

const TOTAL_PAGES_HEADER: &str = "x-pagination-total-pages";
const UNKNOWN_PROJECT: &str = "N/A";

pub struct VikunjaProvider {
    api_base: String,
    task_base: String,
    auth_header: String,
    filter: TaskFilter,
    converter: Box<dyn TextConverter>,
    client: reqwest::Client,
}

impl VikunjaProvider {
    /// `base_url` is the server root including scheme, e.g. `https://tasks.example.com`.
    pub fn new(
        base_url: &str,
        token: &str,
        filter: TaskFilter,
        converter: Box<dyn TextConverter>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            api_base: format!("{base}/api/v1"),
            task_base: format!("{base}/tasks"),
            auth_header: format!("Bearer {token}"),
            filter,
            converter,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, url: &str, page: Option<u32>) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json");
        if let Some(page) = page {
            request = request.query(&[("page", page)]);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("Vikunja API request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Vikunja API returned {status} for {url}: {body}");
        }
        Ok(resp)
    }

    /// Fetch every page of a listing endpoint. The first response carries the
    /// total page count.
    async fn paginate<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let url = format!("{}/{endpoint}", self.api_base);

        let resp = self.get(&url, None).await?;
        let total_pages = total_pages(resp.headers());
        let mut records: Vec<T> = parse_list(resp, &url).await?;

        for page in 2..=total_pages {
            debug!(endpoint, page, total_pages, "Fetching page");
            let resp = self.get(&url, Some(page)).await?;
            records.extend(parse_list::<T>(resp, &url).await?);
        }

        Ok(records)
    }

    async fn fetch_comments(&self, task_id: u64) -> Result<Vec<ApiComment>> {
        self.paginate(&format!("tasks/{task_id}/comments")).await
    }

    fn build_task(
        &self,
        raw: ApiTask,
        project: String,
        labels: Vec<String>,
        comments: Vec<ApiComment>,
    ) -> Task {
        let comments = comments
            .into_iter()
            .map(|c| Comment {
                author: c.author.map(|a| a.display_name()).unwrap_or_default(),
                created: c.created.as_deref().and_then(parse_timestamp),
                body: self.converter.convert(&c.comment),
            })
            .collect();

        let done_at = if raw.done {
            raw.done_at.as_deref().and_then(parse_timestamp)
        } else {
            None
        };

        Task {
            id: raw.id,
            url: format!("{}/{}", self.task_base, raw.id),
            title: raw.title,
            created: raw.created.as_deref().and_then(parse_timestamp),
            updated: raw.updated.as_deref().and_then(parse_timestamp),
            done: raw.done,
            done_at,
            project,
            labels,
            description: self
                .converter
                .convert(raw.description.as_deref().unwrap_or_default()),
            comments,
        }
    }
}

fn total_pages(headers: &HeaderMap) -> u32 {
    headers
        .get(TOTAL_PAGES_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}

/// Vikunja answers an empty listing with `null` rather than `[]`.
async fn parse_list<T: DeserializeOwned>(resp: reqwest::Response, url: &str) -> Result<Vec<T>> {
    let records: Option<Vec<T>> = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse Vikunja response from {url}"))?;
    Ok(records.unwrap_or_default())
}

#[derive(Deserialize)]
struct ApiTask {
    id: u64,
    #[serde(default)]
    title: String,
    description: Option<String>,
    #[serde(default)]
    done: bool,
    done_at: Option<String>,
    created: Option<String>,
    updated: Option<String>,
    project_id: Option<u64>,
    labels: Option<Vec<ApiLabel>>,
}

#[derive(Deserialize)]
struct ApiLabel {
    title: String,
}

#[derive(Deserialize)]
struct ApiProject {
    id: u64,
    title: String,
}

#[derive(Deserialize)]
struct ApiComment {
    #[serde(default)]
    comment: String,
    author: Option<ApiUser>,
    created: Option<String>,
}

#[derive(Deserialize)]
struct ApiUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    username: String,
}

impl ApiUser {
    fn display_name(self) -> String {
        if self.name.trim().is_empty() {
            self.username
        } else {
            self.name
        }
    }
}

#[async_trait]
impl TaskSource for VikunjaProvider {
    fn name(&self) -> &str {
        "Vikunja"
    }

    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        info!("Fetching tasks");
        let raw_tasks: Vec<ApiTask> = self
            .paginate("tasks/all")
            .await
            .context("Failed to fetch tasks")?;

        debug!("Fetching projects");
        let projects: HashMap<u64, String> = self
            .paginate::<ApiProject>("projects")
            .await
            .context("Failed to fetch projects")?
            .into_iter()
            .map(|p| (p.id, p.title))
            .collect();

        debug!(
            ignore_projects = ?self.filter.ignore_projects,
            ignore_labels = ?self.filter.ignore_labels,
            "Applying filters"
        );

        let total = raw_tasks.len();
        let mut tasks = Vec::with_capacity(total);
        for mut raw in raw_tasks {
            let project = match raw.project_id.and_then(|id| projects.get(&id)) {
                Some(title) => title.clone(),
                None => {
                    warn!(
                        task_id = raw.id,
                        project_id = ?raw.project_id,
                        "Task has unknown project"
                    );
                    UNKNOWN_PROJECT.to_string()
                }
            };
            let labels: Vec<String> = raw
                .labels
                .take()
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.title)
                .collect();

            if !self.filter.allows(&project, &labels) {
                continue;
            }

            let comments = self
                .fetch_comments(raw.id)
                .await
                .with_context(|| format!("Failed to fetch comments for task {}", raw.id))?;
            tasks.push(self.build_task(raw, project, labels, comments));
        }

        info!(ignored = total - tasks.len(), "Found {} tasks", tasks.len());
        Ok(tasks)
    }
}
