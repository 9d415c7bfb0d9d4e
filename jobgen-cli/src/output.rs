use crate::{cli::OutputFormat, error::Result};
#[cfg(feature = "colored-output")]
use colored::*;
use jobgen_client::{
    AnalysisReport, AnalysisResult, Credential, Job, JobEvent, JobStatus, LoginOutcome,
    MatchedJobsPage, SessionState, Submission,
};
use serde::Serialize;
use serde_json::json;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_login(&self, outcome: &LoginOutcome, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return self.to_json(
                &json!({
                    "status": "ok",
                    "user": outcome.user,
                    "expires_at": outcome.credential.expires_at(),
                }),
                format,
            );
        }

        let who = outcome
            .user
            .as_ref()
            .map(|u| u.full_name.clone().unwrap_or_else(|| u.email.clone()))
            .unwrap_or_else(|| "user".to_string());
        let mut output = format!(
            "{} Signed in as {}\n",
            self.colorize("✓", &Color::Green, true),
            self.colorize(&who, &Color::Cyan, false)
        );
        if let Some(expires_at) = outcome.credential.expires_at() {
            output.push_str(&self.field("Token expires", &expires_at.to_rfc3339()));
        }
        Ok(output)
    }

    pub fn format_session(
        &self,
        state: &SessionState,
        credential: Option<&Credential>,
        format: &OutputFormat,
    ) -> Result<String> {
        let expires_at = credential.and_then(Credential::expires_at);
        if format.is_json() {
            return self.to_json(
                &json!({
                    "session": state,
                    "expires_at": expires_at,
                    "has_refresh_token": credential.is_some_and(Credential::has_refresh_token),
                }),
                format,
            );
        }

        if !state.authenticated {
            return Ok(format!(
                "{} Not signed in. Run `jobgen login` first.\n",
                self.colorize("!", &Color::Yellow, true)
            ));
        }

        let status = if state.requires_reauthentication() {
            self.colorize("expired, sign in again", &Color::Red, true)
        } else if state.expired {
            self.colorize("access token expired, will refresh", &Color::Yellow, false)
        } else {
            self.colorize("active", &Color::Green, false)
        };

        let mut output = self.colorize("Session:", &Color::Green, true);
        output.push('\n');
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("Status", &Color::Yellow, false),
            status
        ));
        if let Some(expires_at) = expires_at {
            output.push_str(&self.field("Expires", &expires_at.to_rfc3339()));
        }
        if let Some(tag) = state.error {
            output.push_str(&self.field("Last error", tag.as_str()));
        }
        Ok(output)
    }

    pub fn format_submission(
        &self,
        submission: &Submission,
        format: &OutputFormat,
    ) -> Result<String> {
        if format.is_json() {
            return self.to_json(submission, format);
        }

        match submission {
            Submission::Accepted { job_id, message } => {
                let mut output = format!(
                    "{} Job accepted\n",
                    self.colorize("✓", &Color::Green, true)
                );
                output.push_str(&self.field("Job ID", job_id));
                if let Some(message) = message {
                    output.push_str(&self.field("Message", message));
                }
                output.push_str(&format!(
                    "\nTrack it with `jobgen status {job_id} --wait`\n"
                ));
                Ok(output)
            }
            Submission::Completed(result) => {
                let mut output = self.colorize("Analysis completed", &Color::Green, true);
                output.push('\n');
                output.push_str(&self.format_result(result));
                Ok(output)
            }
        }
    }

    pub fn format_job(&self, job: &Job, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return self.to_json(job, format);
        }
        Ok(self.format_job_pretty(job))
    }

    pub fn format_report(&self, report: &AnalysisReport, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return self.to_json(report, format);
        }

        let mut output = self.format_job_pretty(&report.job);
        if let Some(matches) = &report.matches {
            output.push('\n');
            output.push_str(&self.format_matches_pretty(matches));
        }
        if let Some(error) = &report.matches_error {
            output.push_str(&format!(
                "\n{} Matched jobs unavailable: {}\n",
                self.colorize("!", &Color::Yellow, true),
                error
            ));
        }
        Ok(output)
    }

    pub fn format_matches(&self, page: &MatchedJobsPage, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return self.to_json(page, format);
        }
        Ok(self.format_matches_pretty(page))
    }

    pub fn format_message(&self, message: &str, format: &OutputFormat) -> Result<String> {
        if format.is_json() {
            return self.to_json(&json!({"status": "ok", "message": message}), format);
        }
        Ok(format!("{} {}\n", self.colorize("✓", &Color::Green, true), message))
    }

    /// One-line progress text for a poll event.
    pub fn event_message(&self, event: &JobEvent) -> String {
        match event {
            JobEvent::Progress { job, next_delay_ms } => format!(
                "{} (check #{}), next in {:.1}s",
                job.status,
                job.attempt,
                *next_delay_ms as f64 / 1000.0
            ),
            JobEvent::Retrying {
                attempt,
                error,
                next_delay_ms,
                ..
            } => format!(
                "Network hiccup on check #{} ({}), retrying in {:.1}s",
                attempt + 1,
                error,
                *next_delay_ms as f64 / 1000.0
            ),
            JobEvent::Completed { .. } => "Analysis completed".to_string(),
            JobEvent::Failed { message, .. } => format!("Analysis failed: {message}"),
            JobEvent::Cancelled { .. } => "Cancelled".to_string(),
            JobEvent::TimedOut { attempts, .. } => {
                format!("Gave up after {attempts} checks")
            }
        }
    }

    fn format_job_pretty(&self, job: &Job) -> String {
        let status_color = match job.status {
            JobStatus::Completed => Color::Green,
            JobStatus::Failed => Color::Red,
            JobStatus::Queued | JobStatus::Processing => Color::Yellow,
        };

        let mut output = self.colorize("Analysis:", &Color::Green, true);
        output.push('\n');
        output.push_str(&self.field("Job ID", &job.id));
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("Status", &Color::Yellow, false),
            self.colorize(job.status.as_str(), &status_color, true)
        ));
        if let Some(message) = job.failure_message() {
            output.push_str(&self.field("Reason", message));
        }
        if let Some(result) = &job.result {
            output.push_str(&self.format_result(result));
        }
        output
    }

    fn format_result(&self, result: &AnalysisResult) -> String {
        let mut output = String::new();
        if let Some(file_name) = &result.file_name {
            output.push_str(&self.field("File", file_name));
        }
        if let Some(score) = result.score {
            output.push_str(&self.field("Score", &format!("{score:.0}/100")));
        }
        if let Some(summary) = &result.profile_summary {
            output.push_str(&self.field("Summary", summary));
        }
        if !result.skills.is_empty() {
            output.push_str(&self.field("Skills", &result.skills.join(", ")));
        }
        if !result.suggestions.is_empty() {
            output.push_str(&format!(
                "  {}:\n",
                self.colorize("Suggestions", &Color::Yellow, false)
            ));
            for suggestion in &result.suggestions {
                let kind = if suggestion.kind.is_empty() {
                    String::new()
                } else {
                    format!("[{}] ", self.colorize(&suggestion.kind, &Color::Blue, false))
                };
                output.push_str(&format!("    - {}{}\n", kind, suggestion.content));
            }
        }
        output
    }

    #[cfg(feature = "table-output")]
    fn format_matches_pretty(&self, page: &MatchedJobsPage) -> String {
        if page.items.is_empty() {
            return self.no_matches();
        }

        #[derive(Tabled)]
        struct MatchRow<'a> {
            #[tabled(rename = "Score")]
            score: String,
            #[tabled(rename = "Title")]
            title: &'a str,
            #[tabled(rename = "Company")]
            company: &'a str,
            #[tabled(rename = "Location")]
            location: &'a str,
            #[tabled(rename = "Apply")]
            apply_url: &'a str,
        }

        let rows = page.items.iter().map(|job| MatchRow {
            score: job
                .match_score
                .map(|s| format!("{s:.0}%"))
                .unwrap_or_else(|| "-".to_string()),
            title: &job.title,
            company: &job.company_name,
            location: &job.location,
            apply_url: &job.apply_url,
        });

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        format!("{}\n{}\n", table, self.page_footer(page))
    }

    #[cfg(not(feature = "table-output"))]
    fn format_matches_pretty(&self, page: &MatchedJobsPage) -> String {
        if page.items.is_empty() {
            return self.no_matches();
        }

        let mut output = self.colorize("Matched jobs:", &Color::Green, true);
        output.push('\n');
        for job in &page.items {
            let score = job
                .match_score
                .map(|s| format!("{s:.0}%"))
                .unwrap_or_else(|| "-".to_string());
            output.push_str(&format!(
                "  {} {} at {} ({})\n      {}\n",
                self.colorize(&score, &Color::Cyan, true),
                job.title,
                job.company_name,
                job.location,
                self.colorize(&job.apply_url, &Color::Blue, false)
            ));
        }
        output.push_str(&self.page_footer(page));
        output.push('\n');
        output
    }

    fn no_matches(&self) -> String {
        format!(
            "{} No matched jobs yet\n",
            self.colorize("!", &Color::Yellow, true)
        )
    }

    fn page_footer(&self, page: &MatchedJobsPage) -> String {
        let mut footer = format!(
            "Page {} of {} ({} total)",
            page.page,
            page.total_pages.max(1),
            page.total
        );
        if page.has_next {
            footer.push_str(&format!(", next: --page {}", page.page + 1));
        }
        footer
    }

    fn field(&self, name: &str, value: &str) -> String {
        format!(
            "  {}: {}\n",
            self.colorize(name, &Color::Yellow, false),
            self.colorize(value, &Color::Cyan, false)
        )
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T, format: &OutputFormat) -> Result<String> {
        let mut json = match format {
            OutputFormat::JsonCompact => serde_json::to_string(value)?,
            _ => serde_json::to_string_pretty(value)?,
        };
        json.push('\n');
        Ok(json)
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}
