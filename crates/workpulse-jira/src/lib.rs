// Jira provider client

pub mod client;
pub mod types;

pub use client::{JiraClient, ProgressHook};
pub use types::{ApproximateCount, SearchPage, ValuesPage};
