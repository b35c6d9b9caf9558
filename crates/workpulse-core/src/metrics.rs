// Workflow metrics engine.
//
// Derives per-work-item timing and pattern metrics from the ordered status
// transition chain. Milestone detection scans newest-first: last_* fields are
// first-seen wins, first_* fields are last-seen wins. Time accumulation only
// sums the per-transition dwell times, so scan order does not affect it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Normalized status category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    ToDo,
    InProgress,
    Done,
}

impl StatusCategory {
    /// Parse a provider category name; lowercased, unknown categories are None
    pub fn parse(s: &str) -> Option<StatusCategory> {
        match s.trim().to_lowercase().as_str() {
            "to do" | "todo" | "new" => Some(StatusCategory::ToDo),
            "in progress" | "indeterminate" => Some(StatusCategory::InProgress),
            "done" | "complete" => Some(StatusCategory::Done),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::ToDo => "to do",
            StatusCategory::InProgress => "in progress",
            StatusCategory::Done => "done",
        }
    }
}

/// One status transition, as stored on the changelogs table
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub to_status_id: Option<i64>,
    pub transition_change_date: Option<DateTime<Utc>>,
    pub time_in_status_seconds: f64,
}

/// Derived metric columns for one work item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowMetrics {
    pub work_first_committed_at: Option<DateTime<Utc>>,
    pub work_first_started_at: Option<DateTime<Utc>>,
    pub work_last_started_at: Option<DateTime<Utc>>,
    pub work_first_completed_at: Option<DateTime<Utc>>,
    pub work_last_completed_at: Option<DateTime<Utc>>,
    pub total_work_starts: i32,
    pub total_completions: i32,
    pub total_backlog_returns: i32,
    pub total_work_time_seconds: f64,
    pub total_review_time_seconds: f64,
    pub total_cycle_time_seconds: f64,
    pub total_lead_time_seconds: f64,
    pub workflow_complexity_score: i32,
    pub rework_indicator: bool,
    pub direct_completion: bool,
}

impl WorkflowMetrics {
    /// Compute metrics from a work item's transition chain and the
    /// status-id -> category map. Pure function of its inputs.
    pub fn compute(
        transitions: &[TransitionRecord],
        categories: &HashMap<i64, StatusCategory>,
    ) -> WorkflowMetrics {
        let mut metrics = WorkflowMetrics::default();
        if transitions.is_empty() {
            return metrics;
        }

        // Newest first for milestone detection
        let mut ordered: Vec<&TransitionRecord> = transitions.iter().collect();
        ordered.sort_by_key(|t| std::cmp::Reverse(t.transition_change_date));

        for transition in &ordered {
            let (Some(transition_date), Some(to_status_id)) =
                (transition.transition_change_date, transition.to_status_id)
            else {
                continue;
            };
            let Some(category) = categories.get(&to_status_id) else {
                continue;
            };

            match category {
                StatusCategory::ToDo => {
                    metrics.total_backlog_returns += 1;
                    metrics.total_review_time_seconds += transition.time_in_status_seconds;
                    // Oldest transition wins: keep overwriting in DESC order
                    metrics.work_first_committed_at = Some(transition_date);
                }
                StatusCategory::InProgress => {
                    metrics.total_work_starts += 1;
                    metrics.total_work_time_seconds += transition.time_in_status_seconds;
                    if metrics.work_last_started_at.is_none() {
                        metrics.work_last_started_at = Some(transition_date);
                    }
                    metrics.work_first_started_at = Some(transition_date);
                }
                StatusCategory::Done => {
                    metrics.total_completions += 1;
                    if metrics.work_last_completed_at.is_none() {
                        metrics.work_last_completed_at = Some(transition_date);
                    }
                    metrics.work_first_completed_at = Some(transition_date);
                }
            }
        }

        if let (Some(started), Some(completed)) =
            (metrics.work_first_started_at, metrics.work_last_completed_at)
        {
            metrics.total_cycle_time_seconds = seconds_between(started, completed);
        }
        if let (Some(committed), Some(completed)) =
            (metrics.work_first_committed_at, metrics.work_last_completed_at)
        {
            metrics.total_lead_time_seconds = seconds_between(committed, completed);
        }

        metrics.workflow_complexity_score =
            metrics.total_backlog_returns * 2 + (metrics.total_completions - 1).max(0);
        metrics.rework_indicator = metrics.total_work_starts > 1;
        metrics.direct_completion = transitions.len() == 1
            && metrics.total_completions == 1
            && metrics.total_work_starts == 0;

        metrics
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    fn transition(to_status_id: i64, day: u32, dwell: f64) -> TransitionRecord {
        TransitionRecord {
            to_status_id: Some(to_status_id),
            transition_change_date: Some(at(day)),
            time_in_status_seconds: dwell,
        }
    }

    fn category_map() -> HashMap<i64, StatusCategory> {
        HashMap::from([
            (1, StatusCategory::ToDo),
            (3, StatusCategory::InProgress),
            (5, StatusCategory::Done),
        ])
    }

    #[test]
    fn test_fresh_issue_two_transitions() {
        // Created day 1, into in-progress day 2, into done day 3
        let transitions = vec![transition(3, 2, 86400.0), transition(5, 3, 86400.0)];
        let metrics = WorkflowMetrics::compute(&transitions, &category_map());

        assert_eq!(metrics.work_first_committed_at, None);
        assert_eq!(metrics.work_first_started_at, Some(at(2)));
        assert_eq!(metrics.work_last_started_at, Some(at(2)));
        assert_eq!(metrics.work_first_completed_at, Some(at(3)));
        assert_eq!(metrics.work_last_completed_at, Some(at(3)));
        assert_eq!(metrics.total_work_starts, 1);
        assert_eq!(metrics.total_completions, 1);
        assert_eq!(metrics.total_backlog_returns, 0);
        assert_eq!(metrics.total_work_time_seconds, 86400.0);
        assert_eq!(metrics.total_review_time_seconds, 0.0);
        assert_eq!(metrics.total_cycle_time_seconds, 86400.0);
        assert_eq!(metrics.total_lead_time_seconds, 0.0);
        assert_eq!(metrics.workflow_complexity_score, 0);
        assert!(!metrics.rework_indicator);
        assert!(!metrics.direct_completion);
    }

    #[test]
    fn test_rework_cycle() {
        // done on day 3, reopened into in-progress day 4, done again day 5
        let transitions = vec![
            transition(3, 2, 86400.0),
            transition(5, 3, 86400.0),
            transition(3, 4, 86400.0),
            transition(5, 5, 86400.0),
        ];
        let metrics = WorkflowMetrics::compute(&transitions, &category_map());

        assert_eq!(metrics.total_work_starts, 2);
        assert_eq!(metrics.total_completions, 2);
        assert!(metrics.rework_indicator);
        assert_eq!(metrics.workflow_complexity_score, 1);
        assert_eq!(metrics.work_first_started_at, Some(at(2)));
        assert_eq!(metrics.work_last_started_at, Some(at(4)));
        assert_eq!(metrics.work_first_completed_at, Some(at(3)));
        assert_eq!(metrics.work_last_completed_at, Some(at(5)));
        // first start (day 2) to last completion (day 5)
        assert_eq!(metrics.total_cycle_time_seconds, 3.0 * 86400.0);
    }

    #[test]
    fn test_backlog_return_and_lead_time() {
        let transitions = vec![
            transition(1, 2, 3600.0),
            transition(3, 3, 7200.0),
            transition(5, 4, 0.0),
        ];
        let metrics = WorkflowMetrics::compute(&transitions, &category_map());

        assert_eq!(metrics.total_backlog_returns, 1);
        assert_eq!(metrics.work_first_committed_at, Some(at(2)));
        assert_eq!(metrics.total_review_time_seconds, 3600.0);
        assert_eq!(metrics.total_work_time_seconds, 7200.0);
        assert_eq!(metrics.total_lead_time_seconds, 2.0 * 86400.0);
        assert_eq!(metrics.workflow_complexity_score, 2);
    }

    #[test]
    fn test_direct_completion() {
        let transitions = vec![transition(5, 2, 86400.0)];
        let metrics = WorkflowMetrics::compute(&transitions, &category_map());
        assert!(metrics.direct_completion);
        assert_eq!(metrics.total_completions, 1);
        assert_eq!(metrics.total_work_starts, 0);
    }

    #[test]
    fn test_empty_chain() {
        let metrics = WorkflowMetrics::compute(&[], &category_map());
        assert_eq!(metrics, WorkflowMetrics::default());
    }

    #[test]
    fn test_unknown_status_ignored() {
        let transitions = vec![transition(99, 2, 500.0), transition(5, 3, 100.0)];
        let metrics = WorkflowMetrics::compute(&transitions, &category_map());
        assert_eq!(metrics.total_completions, 1);
        assert_eq!(metrics.total_work_time_seconds, 0.0);
        assert_eq!(metrics.total_review_time_seconds, 0.0);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(StatusCategory::parse("To Do"), Some(StatusCategory::ToDo));
        assert_eq!(StatusCategory::parse("IN PROGRESS"), Some(StatusCategory::InProgress));
        assert_eq!(StatusCategory::parse("done"), Some(StatusCategory::Done));
        assert_eq!(StatusCategory::parse("blocked"), None);
    }
}
