use crate::ledger::RunLedger;
use casewatch_core::{Category, Record};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SUBJECT_TAG: &str = "[casewatch]";
pub const DEFERRED_DISPLAY_CAP: usize = 10;

pub const REPORT_COLUMNS: [&str; 18] = [
    "process_number",
    "category",
    "viewed",
    "title",
    "specification",
    "assignee_name",
    "assignee_tax_id",
    "markers",
    "has_unseen_documents",
    "has_annotations",
    "process_id",
    "hash",
    "url",
    "new_since_last_run",
    "updated_since_last_run",
    "deferred_by_quota",
    "has_artifact",
    "reason_not_processed",
];

/// One row of the tabular report. Field order follows [`REPORT_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub process_number: String,
    pub category: Category,
    pub viewed: bool,
    pub title: String,
    pub specification: String,
    pub assignee_name: String,
    pub assignee_tax_id: String,
    pub markers: String,
    pub has_unseen_documents: bool,
    pub has_annotations: bool,
    pub process_id: String,
    pub hash: String,
    pub url: String,
    pub new_since_last_run: bool,
    pub updated_since_last_run: bool,
    pub deferred_by_quota: bool,
    pub has_artifact: bool,
    pub reason_not_processed: String,
}

/// One row per collected record, processed or not.
pub fn build_rows(records: &[Record], ledger: &RunLedger) -> Vec<ReportRow> {
    records
        .iter()
        .map(|record| {
            let key = record.key();
            let assignee = record.assignee.as_ref();
            ReportRow {
                process_number: record.process_number.clone(),
                category: record.category,
                viewed: record.viewed,
                title: record.title.clone().unwrap_or_default(),
                specification: record.specification.clone().unwrap_or_default(),
                assignee_name: assignee.map(|a| a.name.clone()).unwrap_or_default(),
                assignee_tax_id: assignee
                    .and_then(|a| a.tax_id.clone())
                    .unwrap_or_default(),
                markers: record.markers.join(", "),
                has_unseen_documents: record.has_unseen_documents,
                has_annotations: record.has_annotations,
                process_id: record.process_id.clone().unwrap_or_default(),
                hash: record.hash.clone().unwrap_or_default(),
                url: record.url.clone(),
                new_since_last_run: ledger.new_keys.contains(&key),
                updated_since_last_run: ledger.updated_keys.contains(&key),
                deferred_by_quota: ledger.quota_deferred.contains(&key),
                has_artifact: ledger.artifacts.contains_key(&key),
                reason_not_processed: ledger
                    .reason_for(key.as_str())
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Subject plus plain-text and markup bodies carrying the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub subject: String,
    pub text: String,
    pub markup: String,
}

struct Field {
    name: Option<&'static str>,
    value: String,
}

struct SummaryLine {
    label: String,
    fields: Vec<Field>,
    artifact: Option<String>,
}

struct Summary {
    heading: String,
    new: Vec<SummaryLine>,
    updated: Vec<SummaryLine>,
    deferred_shown: Vec<(String, String)>,
    deferred_total: usize,
}

const CLOSING_NOTE: &str = "Note: automatic content summaries are not implemented yet.";

pub fn daily_subject(unit: &str, report_date: NaiveDate) -> String {
    format!(
        "{SUBJECT_TAG} Daily report - {unit} - {}",
        report_date.format("%Y-%m-%d")
    )
}

pub fn daily_narrative(
    unit: &str,
    report_date: NaiveDate,
    new_selected: &[&Record],
    updated: &[&Record],
    ledger: &RunLedger,
) -> Narrative {
    let subject = daily_subject(unit, report_date);
    let artifact_of = |record: &Record| {
        ledger
            .artifact_for(record.key().as_str())
            .map(|path| path.display().to_string())
    };

    let new = new_selected
        .iter()
        .map(|&record| SummaryLine {
            label: record.process_number.clone(),
            fields: vec![
                Field {
                    name: None,
                    value: record.category.to_string(),
                },
                Field {
                    name: Some("Title"),
                    value: record.display_title().to_string(),
                },
                Field {
                    name: Some("Markers"),
                    value: markers_or_none(record),
                },
            ],
            artifact: artifact_of(record),
        })
        .collect();

    let updated = updated
        .iter()
        .map(|&record| SummaryLine {
            label: record.process_number.clone(),
            fields: vec![
                Field {
                    name: Some("New documents"),
                    value: record.new_document_count().to_string(),
                },
                Field {
                    name: Some("Markers"),
                    value: format!("[{}]", markers_or_none(record)),
                },
            ],
            artifact: artifact_of(record),
        })
        .collect();

    let deferrals = ledger.deferrals();
    let summary = Summary {
        heading: subject.clone(),
        new,
        updated,
        deferred_shown: deferrals
            .iter()
            .take(DEFERRED_DISPLAY_CAP)
            .map(|(key, reason)| (key.to_string(), reason.to_string()))
            .collect(),
        deferred_total: deferrals.len(),
    };

    Narrative {
        subject,
        text: render_text(&summary),
        markup: render_markup(&summary),
    }
}

fn markers_or_none(record: &Record) -> String {
    let markers: Vec<&str> = record
        .markers
        .iter()
        .map(|marker| marker.trim())
        .filter(|marker| !marker.is_empty())
        .collect();
    if markers.is_empty() {
        "(none)".to_string()
    } else {
        markers.join(", ")
    }
}

fn text_line(line: &SummaryLine) -> String {
    let mut parts = vec![line.label.clone()];
    for field in &line.fields {
        parts.push(match field.name {
            Some(name) => format!("{name}: {}", field.value),
            None => field.value.clone(),
        });
    }
    if let Some(artifact) = &line.artifact {
        parts.push(format!("Artifact: stored at {artifact}"));
    }
    format!("   - {}", parts.join(" | "))
}

fn markup_line(line: &SummaryLine) -> String {
    let mut parts = vec![format!("<strong>{}</strong>", escape_markup(&line.label))];
    for field in &line.fields {
        let value = escape_markup(&field.value);
        parts.push(match field.name {
            Some(name) => format!("{name}: {value}"),
            None => value,
        });
    }
    if let Some(artifact) = &line.artifact {
        parts.push(format!(
            "<strong>Artifact:</strong> stored at {}",
            escape_markup(artifact)
        ));
    }
    format!("<li>{}</li>", parts.join(" | "))
}

fn render_text(summary: &Summary) -> String {
    let mut lines = vec![summary.heading.clone(), String::new()];

    let sections = [
        ("1. New records", &summary.new, "   (no new records)"),
        ("2. Updated records", &summary.updated, "   (no updated records)"),
    ];
    for (title, entries, empty) in sections {
        lines.push(format!("{title} ({}):", entries.len()));
        lines.push(String::new());
        if entries.is_empty() {
            lines.push(empty.to_string());
        } else {
            lines.extend(entries.iter().map(text_line));
        }
        lines.push(String::new());
    }

    if summary.deferred_total > 0 {
        lines.push(format!(
            "3. Not processed (quota/size/error) ({}):",
            summary.deferred_total
        ));
        lines.push(String::new());
        for (key, reason) in &summary.deferred_shown {
            lines.push(format!("   - {key} | Reason: {reason}"));
        }
        if let Some(hidden) = overflow(summary) {
            lines.push(format!("   ... and {hidden} more record(s)"));
        }
        lines.push(String::new());
    }

    lines.push(CLOSING_NOTE.to_string());
    lines.join("\n")
}

fn render_markup(summary: &Summary) -> String {
    let mut parts = markup_preamble(&summary.heading);

    let sections = [
        ("1. New records", &summary.new, "(no new records)"),
        ("2. Updated records", &summary.updated, "(no updated records)"),
    ];
    for (title, entries, empty) in sections {
        parts.push(format!("<h2>{title} ({})</h2>", entries.len()));
        if entries.is_empty() {
            parts.push(format!("<p>{empty}</p>"));
        } else {
            parts.push("<ul>".to_string());
            parts.extend(entries.iter().map(markup_line));
            parts.push("</ul>".to_string());
        }
    }

    if summary.deferred_total > 0 {
        parts.push(format!(
            "<h2>3. Not processed (quota/size/error) ({})</h2>",
            summary.deferred_total
        ));
        parts.push("<ul>".to_string());
        for (key, reason) in &summary.deferred_shown {
            parts.push(format!(
                "<li><strong>{}</strong> | Reason: {}</li>",
                escape_markup(key),
                escape_markup(reason)
            ));
        }
        if let Some(hidden) = overflow(summary) {
            parts.push(format!("<li>... and {hidden} more record(s)</li>"));
        }
        parts.push("</ul>".to_string());
    }

    parts.push(format!("<p><em>{CLOSING_NOTE}</em></p>"));
    parts.push("</body>".to_string());
    parts.push("</html>".to_string());
    parts.join("\n")
}

fn overflow(summary: &Summary) -> Option<usize> {
    summary
        .deferred_total
        .checked_sub(summary.deferred_shown.len())
        .filter(|hidden| *hidden > 0)
}

fn markup_preamble(heading: &str) -> Vec<String> {
    vec![
        "<!DOCTYPE html>".to_string(),
        "<html>".to_string(),
        "<head><meta charset='UTF-8'></head>".to_string(),
        "<body style='font-family: Arial, sans-serif;'>".to_string(),
        format!("<h1>{}</h1>", escape_markup(heading)),
    ]
}

pub fn baseline_narrative(unit: &str, records: &[Record]) -> Narrative {
    let mut per_category: BTreeMap<Category, usize> =
        Category::ALL.iter().map(|category| (*category, 0)).collect();
    for record in records {
        *per_category.entry(record.category).or_default() += 1;
    }
    let received = per_category[&Category::Received];
    let generated = per_category[&Category::Generated];
    let total = records.len();

    let subject = format!("{SUBJECT_TAG} Initial registration complete - {unit}");

    let text = format!(
        "Initial registration complete\n\n\
         The initial record history for {unit} was created successfully.\n\n\
         Total records registered: {total}\n\
         - Received: {received}\n\
         - Generated: {generated}\n\n\
         From the next run on, reports will only highlight new and updated records.\n\n\
         Full spreadsheet attached.\n"
    );

    let unit_markup = escape_markup(unit);
    let mut parts = markup_preamble(&subject);
    parts.push(format!(
        "<p>The initial record history for <strong>{unit_markup}</strong> was created successfully.</p>"
    ));
    parts.push("<ul>".to_string());
    parts.push(format!(
        "<li><strong>Total records registered:</strong> {total}</li>"
    ));
    parts.push(format!("<li><strong>Received:</strong> {received}</li>"));
    parts.push(format!("<li><strong>Generated:</strong> {generated}</li>"));
    parts.push("</ul>".to_string());
    parts.push(
        "<p>From the next run on, reports will only highlight new and updated records.</p>"
            .to_string(),
    );
    parts.push("<p>Full spreadsheet attached.</p>".to_string());
    parts.push("</body>".to_string());
    parts.push("</html>".to_string());

    Narrative {
        subject,
        text,
        markup: parts.join("\n"),
    }
}

pub fn escape_markup(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
