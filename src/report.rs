/*!
 * Reporting functionality for mastersd
 *
 * Renders folder listings and session status either as console tables
 * (via the tabled library) or as JSON.
 */

use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::error::Result;
use crate::session::Controller;
use crate::types::{Crumb, FolderView, Space};
use crate::utils::format_file_size;

/// Connection summary printed by `status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Host base URL
    pub host: String,
    /// Controller name, `None` while disconnected
    pub controller: Option<String>,
    /// Label of the switch action, if it is available
    pub switch_action: Option<String>,
    /// Space counters when a listing is loaded
    pub space: Option<Space>,
}

impl StatusReport {
    pub fn new(host: &str, controller: Option<Controller>, space: Option<Space>) -> Self {
        let switch_action = controller
            .filter(|c| *c != Controller::Unknown)
            .map(|c| c.switch_label().to_string());

        Self {
            host: host.to_string(),
            controller: controller.map(|c| c.to_string()),
            switch_action,
            space,
        }
    }
}

/// A folder listing together with where it sits on the card
#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub breadcrumb: Vec<Crumb>,
    pub view: FolderView,
    pub space: Space,
}

/// Format of the report output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
    /// Pretty-printed JSON
    Json,
}

/// Report generator
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    /// Create a new reporter
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Render a folder listing
    pub fn folder_report(&self, report: &FolderReport) -> Result<String> {
        match self.format {
            ReportFormat::ConsoleTable => Ok(self.folder_table(report)),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }

    /// Render the connection summary
    pub fn status_report(&self, report: &StatusReport) -> Result<String> {
        match self.format {
            ReportFormat::ConsoleTable => Ok(self.status_table(report)),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }

    fn folder_table(&self, report: &FolderReport) -> String {
        #[derive(Tabled)]
        struct EntryRow {
            #[tabled(rename = "Name")]
            name: String,

            #[tabled(rename = "Size")]
            size: String,
        }

        let title = report
            .breadcrumb
            .iter()
            .map(|crumb| crumb.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ");

        if report.view.is_empty() {
            return format!("{}\n(empty)\n\n{}", title, self.space_line(&report.space));
        }

        // Folders first, then files, each in listing order
        let rows = report
            .view
            .folders
            .iter()
            .map(|folder| EntryRow {
                name: format!("{}/", folder.name),
                size: "-".to_string(),
            })
            .chain(report.view.files.iter().map(|file| EntryRow {
                name: file.name.clone(),
                size: format_file_size(file.size),
            }));

        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));

        format!("{}\n{}\n\n{}", title, table, self.space_line(&report.space))
    }

    fn status_table(&self, report: &StatusReport) -> String {
        #[derive(Tabled)]
        struct SummaryRow {
            #[tabled(rename = "Metric")]
            key: String,

            #[tabled(rename = "Value")]
            value: String,
        }

        let mut rows = vec![
            SummaryRow {
                key: "Host".to_string(),
                value: report.host.clone(),
            },
            SummaryRow {
                key: "SD card held by".to_string(),
                value: report
                    .controller
                    .clone()
                    .unwrap_or_else(|| "Disconnected".to_string()),
            },
        ];

        if let Some(action) = &report.switch_action {
            rows.push(SummaryRow {
                key: "Available action".to_string(),
                value: action.clone(),
            });
        }

        if let Some(space) = &report.space {
            rows.push(SummaryRow {
                key: "Free".to_string(),
                value: format_file_size(space.free_bytes),
            });
            rows.push(SummaryRow {
                key: "Used".to_string(),
                value: format_file_size(space.used_bytes),
            });
            rows.push(SummaryRow {
                key: "Total".to_string(),
                value: format_file_size(space.total_bytes()),
            });
        }

        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));

        table.to_string()
    }

    fn space_line(&self, space: &Space) -> String {
        format!(
            "{} free, {} used",
            format_file_size(space.free_bytes),
            format_file_size(space.used_bytes)
        )
    }
}
