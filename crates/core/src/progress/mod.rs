//! Task status updates for progress-tracking markdown files.
//!
//! A progress file keeps its tasks under the `tasks` key of the frontmatter:
//!
//! ```yaml
//! tasks:
//!   - id: TASK-1.1
//!     status: pending
//! ```
//!
//! Every update rewrites the derived counters (`progress`, `status`,
//! `total_tasks`, ...) and stamps `updated` with today's date.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_yml::Value;

use crate::Error;
use crate::frontmatter::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    AtRisk,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] =
        [Self::Pending, Self::InProgress, Self::Completed, Self::Blocked, Self::AtRisk];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::AtRisk => "at_risk",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == s.trim()).ok_or_else(|| {
            let valid: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
            Error::InvalidInput(format!("unknown task status '{s}', expected one of {}", valid.join(", ")))
        })
    }
}

/// Status of the file as a whole, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    InProgress,
    AtRisk,
    Completed,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::AtRisk => "at_risk",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub blocked_tasks: usize,
    pub at_risk_tasks: usize,
    pub progress: u8,
    pub status: OverallStatus,
}

/// One `id:status` pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUpdate {
    pub id: String,
    pub status: TaskStatus,
}

/// Derive counters and overall status from task statuses.
pub fn summarize(statuses: &[TaskStatus]) -> ProgressSummary {
    let count = |wanted: TaskStatus| statuses.iter().filter(|&&s| s == wanted).count();
    let total_tasks = statuses.len();
    let completed_tasks = count(TaskStatus::Completed);
    let in_progress_tasks = count(TaskStatus::InProgress);
    let blocked_tasks = count(TaskStatus::Blocked);
    let at_risk_tasks = count(TaskStatus::AtRisk);

    let progress = if total_tasks == 0 { 0 } else { (completed_tasks * 100 / total_tasks) as u8 };
    let status = if progress == 100 {
        OverallStatus::Completed
    } else if blocked_tasks + at_risk_tasks > 0 {
        OverallStatus::AtRisk
    } else if in_progress_tasks > 0 {
        OverallStatus::InProgress
    } else {
        OverallStatus::Pending
    };

    ProgressSummary { total_tasks, completed_tasks, in_progress_tasks, blocked_tasks, at_risk_tasks, progress, status }
}

/// Parse `T1:completed,T2:in_progress`.
///
/// # Errors
///
/// `Error::InvalidInput` for an empty batch, a pair without `:`, an empty id
/// or an unknown status.
pub fn parse_batch(input: &str) -> Result<Vec<TaskUpdate>, Error> {
    let updates = input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (id, status) = pair
                .split_once(':')
                .ok_or_else(|| Error::InvalidInput(format!("expected ID:STATUS, got '{pair}'")))?;
            let id = id.trim();
            if id.is_empty() {
                return Err(Error::InvalidInput(format!("missing task id in '{pair}'")));
            }
            Ok(TaskUpdate { id: id.to_string(), status: status.parse()? })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    if updates.is_empty() {
        return Err(Error::InvalidInput("no updates given".into()));
    }
    Ok(updates)
}

/// Set one task's status and refresh the derived keys.
pub fn update_task_status(doc: &mut Document, id: &str, status: TaskStatus) -> Result<ProgressSummary, Error> {
    apply_batch(doc, &[TaskUpdate { id: id.to_string(), status }])
}

/// Apply all updates, or none if any id is unknown.
pub fn apply_batch(doc: &mut Document, updates: &[TaskUpdate]) -> Result<ProgressSummary, Error> {
    apply_batch_on(doc, updates, Local::now().date_naive())
}

pub(crate) fn apply_batch_on(
    doc: &mut Document, updates: &[TaskUpdate], today: NaiveDate,
) -> Result<ProgressSummary, Error> {
    let tasks = match doc.get_mut("tasks") {
        Some(Value::Sequence(tasks)) => tasks,
        Some(_) => return Err(Error::InvalidInput("'tasks' must be a list".into())),
        None => {
            return Err(Error::NotFound(format!(
                "task {}",
                updates.first().map(|u| u.id.as_str()).unwrap_or_default()
            )));
        }
    };

    let positions = updates
        .iter()
        .map(|update| {
            tasks
                .iter()
                .position(|task| task_id(task).as_deref() == Some(update.id.as_str()))
                .ok_or_else(|| Error::NotFound(format!("task {}", update.id)))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    for (update, idx) in updates.iter().zip(positions) {
        if let Value::Mapping(task) = &mut tasks[idx] {
            task.insert(Value::String("status".into()), Value::String(update.status.as_str().into()));
        }
        tracing::debug!(task = %update.id, status = %update.status, "updated task");
    }

    let statuses = tasks
        .iter()
        .map(|task| match task.get("status").and_then(Value::as_str) {
            Some(raw) => raw.parse(),
            None => Ok(TaskStatus::Pending),
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let summary = summarize(&statuses);
    write_summary(doc, &summary, today)?;
    Ok(summary)
}

fn task_id(task: &Value) -> Option<String> {
    match task.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn write_summary(doc: &mut Document, summary: &ProgressSummary, today: NaiveDate) -> Result<(), Error> {
    doc.set("progress", Value::from(summary.progress))?;
    doc.set("status", Value::String(summary.status.as_str().into()))?;
    doc.set("total_tasks", Value::from(summary.total_tasks as u64))?;
    doc.set("completed_tasks", Value::from(summary.completed_tasks as u64))?;
    doc.set("in_progress_tasks", Value::from(summary.in_progress_tasks as u64))?;
    doc.set("blocked_tasks", Value::from(summary.blocked_tasks as u64))?;
    doc.set("at_risk_tasks", Value::from(summary.at_risk_tasks as u64))?;
    doc.set("updated", Value::String(today.format("%Y-%m-%d").to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "---\ntitle: Phase 1\nstatus: pending\nprogress: 0\ntasks:\n  - id: T1\n    status: pending\n  - id: T2\n    status: pending\n    assigned_to: [backend]\n---\n\n## Notes\n";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()
    }

    #[test]
    fn test_summarize_rules() {
        use TaskStatus::*;

        let empty = summarize(&[]);
        assert_eq!((empty.progress, empty.status), (0, OverallStatus::Pending));

        let s = summarize(&[Completed, Pending, Pending]);
        assert_eq!(s.progress, 33);
        assert_eq!(s.status, OverallStatus::Pending);

        assert_eq!(summarize(&[Completed, InProgress]).status, OverallStatus::InProgress);
        assert_eq!(summarize(&[InProgress, Blocked]).status, OverallStatus::AtRisk);
        assert_eq!(summarize(&[AtRisk, Completed]).status, OverallStatus::AtRisk);
        assert_eq!(summarize(&[Completed, Completed]).status, OverallStatus::Completed);
    }

    #[test]
    fn test_batch_completes_file() {
        let mut doc = Document::parse(FILE).unwrap();
        let updates = parse_batch("T1:completed,T2:completed").unwrap();
        let summary = apply_batch_on(&mut doc, &updates, today()).unwrap();

        assert_eq!(summary.progress, 100);
        assert_eq!(summary.status, OverallStatus::Completed);
        assert_eq!(doc.get("completed_tasks").and_then(Value::as_u64), Some(2));
        assert_eq!(doc.get("status").and_then(Value::as_str), Some("completed"));
        assert_eq!(doc.get("updated").and_then(Value::as_str), Some("2025-02-14"));
        assert_eq!(doc.get("tasks.1.assigned_to.0").and_then(Value::as_str), Some("backend"));
        assert_eq!(doc.body, "\n## Notes\n");
    }

    #[test]
    fn test_unknown_id_applies_nothing() {
        let mut doc = Document::parse(FILE).unwrap();
        let updates = parse_batch("T1:completed, T9:completed").unwrap();
        let err = apply_batch_on(&mut doc, &updates, today()).unwrap_err();

        assert!(matches!(err, Error::NotFound(ref m) if m.contains("T9")));
        assert_eq!(doc.get("tasks.0.status").and_then(Value::as_str), Some("pending"));
        assert!(doc.get("updated").is_none());
    }

    #[test]
    fn test_single_update() {
        let mut doc = Document::parse(FILE).unwrap();
        let summary = update_task_status(&mut doc, "T2", TaskStatus::Blocked).unwrap();
        assert_eq!(summary.status, OverallStatus::AtRisk);
        assert_eq!(summary.blocked_tasks, 1);
        assert_eq!(doc.get("progress").and_then(Value::as_u64), Some(0));
    }

    #[test]
    fn test_parse_batch_errors() {
        assert!(matches!(parse_batch(""), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_batch("T1"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_batch(":completed"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_batch("T1:done"), Err(Error::InvalidInput(_))));

        let updates = parse_batch(" T1 : in_progress ,").unwrap();
        assert_eq!(updates, vec![TaskUpdate { id: "T1".into(), status: TaskStatus::InProgress }]);
    }

    #[test]
    fn test_file_without_tasks() {
        let mut doc = Document::parse("---\ntitle: x\n---\n").unwrap();
        let err = update_task_status(&mut doc, "T1", TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
