pub mod vikunja;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::VikunjaSettings;
use crate::model::task::Task;
use crate::util::html::HtmlToMarkdown;

/// Where tasks come from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    fn name(&self) -> &str;
    /// Fetch the complete, filtered task set. Any failure is fatal: a partial
    /// set would make the reconciler delete files for tasks it never saw.
    async fn fetch_tasks(&self) -> Result<Vec<Task>>;
}

/// Project and label ignore lists. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub ignore_projects: HashSet<String>,
    pub ignore_labels: HashSet<String>,
}

impl TaskFilter {
    pub fn allows(&self, project: &str, labels: &[String]) -> bool {
        !self.ignore_projects.contains(project)
            && !labels.iter().any(|label| self.ignore_labels.contains(label))
    }
}


pub fn create_source(settings: &VikunjaSettings) -> Box<dyn TaskSource> {
    Box::new(vikunja::VikunjaProvider::new(
        &settings.base_url,
        &settings.token,
        settings.filter.clone(),
        Box::new(HtmlToMarkdown),
    ))
}
