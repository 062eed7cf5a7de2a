use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;

const DATE_FORMAT: &str = "%Y-%m-%d";
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MISSING_DATE: &str = "N/A";

/// A task as exported: populated once from the task API, immutable afterwards.
///
/// Rich-text fields (`description`, comment bodies) hold already-converted
/// Markdown. An empty `description` means the task has none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    /// Link back to the task in the web UI.
    pub url: String,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub done: bool,
    /// Only set for completed tasks.
    pub done_at: Option<DateTime<Utc>>,
    pub project: String,
    pub labels: Vec<String>,
    pub description: String,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub author: String,
    pub created: Option<DateTime<Utc>>,
    pub body: String,
}

impl Task {
    /// Canonical remote filename, e.g. `7_Buy_milk.md`.
    pub fn filename(&self) -> String {
        task_filename(self.id, &self.title)
    }

    /// Whether the task gets its own detail document.
    pub fn has_detail(&self) -> bool {
        !self.description.is_empty() || !self.comments.is_empty()
    }

    /// One-line entry for the combined summary document.
    pub fn summary(&self) -> String {
        let labels = self
            .labels
            .iter()
            .map(|label| format!("[{label}]"))
            .collect::<Vec<_>>()
            .join(" ");
        let check = if self.done { "✅ " } else { "   " };
        format!(
            "{:0>4}{check}: {} / {} {labels} {}",
            self.id,
            self.project,
            self.title,
            format_date(self.created)
        )
    }

    /// Markdown detail document, or an empty string when the task has neither
    /// a description nor comments.
    pub fn detail(&self) -> String {
        if !self.has_detail() {
            return String::new();
        }

        let mut lines = vec![
            format!("# {}", self.title),
            format!("* URL: {}", self.url),
            format!("* Created: {}", format_date(self.created)),
            format!("* Updated: {}", format_date(self.updated)),
            format!("* Completed: {}", format_date(self.done_at)),
            format!("* Project: {}", self.project),
            format!("* Labels: {}", self.labels.join(", ")),
        ];

        if !self.description.is_empty() {
            lines.push("\n# Description".to_string());
            lines.push(self.description.clone());
        }

        if !self.comments.is_empty() {
            lines.push("\n# Comments".to_string());
            for comment in &self.comments {
                lines.push(format!(
                    "\n## {} {}",
                    comment.author,
                    format_date(comment.created)
                ));
                lines.push(comment.body.clone());
            }
        }

        lines.join("\n")
    }
}

/// Build `{id}_{title}.md`, dropping everything but word characters and
/// whitespace from the title and joining the remaining words with `_`.
pub fn task_filename(id: u64, title: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("Valid regex pattern"));

    let stripped = re.replace_all(title, "");
    let slug = stripped.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{id}_{slug}.md")
}

/// Parse an API timestamp. Accepts RFC 3339 and bare `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC). The API's zero time (year 1) counts as missing.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, NAIVE_TIMESTAMP_FORMAT).map(|dt| dt.and_utc())
        })
        .ok()?;

    (parsed.year() > 1).then_some(parsed)
}

pub fn format_date(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| MISSING_DATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single()
    }

    fn make_task(id: u64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            url: format!("https://tasks.example.com/tasks/{id}"),
            created: ts(2024, 1, 2),
            updated: ts(2024, 3, 4),
            done: false,
            done_at: None,
            project: "Home".to_string(),
            labels: vec!["errand".to_string(), "urgent".to_string()],
            description: String::new(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn filename_strips_punctuation() {
        assert_eq!(task_filename(7, "Buy milk!"), "7_Buy_milk.md");
    }

    #[test]
    fn filename_collapses_whitespace() {
        assert_eq!(task_filename(12, "  Fix   the\tlogin bug  "), "12_Fix_the_login_bug.md");
    }

    #[test]
    fn filename_keeps_unicode_word_characters() {
        assert_eq!(task_filename(3, "Café: läuft?"), "3_Café_läuft.md");
    }

    #[test]
    fn filename_is_deterministic_and_title_sensitive() {
        let a = make_task(5, "Plan trip");
        let b = make_task(5, "Plan trip");
        let c = make_task(5, "Plan vacation");
        assert_eq!(a.filename(), b.filename());
        assert_ne!(a.filename(), c.filename());
    }

    #[test]
    fn summary_open_task() {
        let task = make_task(7, "Buy milk");
        assert_eq!(
            task.summary(),
            "0007   : Home / Buy milk [errand] [urgent] 2024-01-02"
        );
    }

    #[test]
    fn summary_done_task_without_labels() {
        let mut task = make_task(12345, "Ship it");
        task.done = true;
        task.labels.clear();
        assert_eq!(task.summary(), "12345✅ : Home / Ship it  2024-01-02");
    }

    #[test]
    fn detail_empty_without_description_or_comments() {
        let task = make_task(1, "Nothing here");
        assert!(!task.has_detail());
        assert_eq!(task.detail(), "");
    }

    #[test]
    fn detail_with_description_and_comments() {
        let mut task = make_task(9, "Paint fence");
        task.done = true;
        task.done_at = ts(2024, 5, 6);
        task.description = "Use the *green* paint".to_string();
        task.comments = vec![
            Comment {
                author: "Alice".to_string(),
                created: ts(2024, 2, 1),
                body: "Bought paint".to_string(),
            },
            Comment {
                author: "bob".to_string(),
                created: None,
                body: "Done".to_string(),
            },
        ];

        let expected = "# Paint fence\n\
            * URL: https://tasks.example.com/tasks/9\n\
            * Created: 2024-01-02\n\
            * Updated: 2024-03-04\n\
            * Completed: 2024-05-06\n\
            * Project: Home\n\
            * Labels: errand, urgent\n\
            \n# Description\n\
            Use the *green* paint\n\
            \n# Comments\n\
            \n## Alice 2024-02-01\n\
            Bought paint\n\
            \n## bob N/A\n\
            Done";
        assert_eq!(task.detail(), expected);
    }

    #[test]
    fn detail_comments_only_has_no_description_section() {
        let mut task = make_task(2, "Call");
        task.comments.push(Comment {
            author: "Alice".to_string(),
            created: ts(2024, 2, 1),
            body: "Left a message".to_string(),
        });
        let detail = task.detail();
        assert!(detail.contains("* Completed: N/A"));
        assert!(!detail.contains("# Description"));
        assert!(detail.contains("\n# Comments\n\n## Alice 2024-02-01\nLeft a message"));
    }

    #[test]
    fn parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-02T12:00:00Z"), ts(2024, 1, 2));
        assert_eq!(parse_timestamp("2024-01-02T13:00:00+01:00"), ts(2024, 1, 2));
        assert_eq!(parse_timestamp("2024-01-02T12:00:00"), ts(2024, 1, 2));
    }

    #[test]
    fn parse_timestamp_missing_values() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("0001-01-01T00:00:00Z"), None);
    }

    #[test]
    fn format_date_missing_is_na() {
        assert_eq!(format_date(None), "N/A");
        assert_eq!(format_date(ts(2023, 12, 31)), "2023-12-31");
    }
}
