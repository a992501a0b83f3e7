//! Mail drafts pre-filled from a row.
//!
//! Nothing is sent: a submitted draft is rendered, logged and acknowledged.

use log::info;
use serde::{Deserialize, Serialize};

use crate::record::{EMAIL_HEADER, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailDraft {
    pub to: String,
    pub from: String,
    pub date: String,
    pub subject: String,
    pub message: String,
    pub attachment: String,
    pub member: String,
    /// Display name of the row the draft was opened from.
    #[serde(default)]
    pub member_name: String,
}

impl MailDraft {
    /// Start a draft addressed to the row's `EMAIL`, tagged with its member id.
    pub fn for_record(record: &Record) -> Self {
        MailDraft {
            to: record.get(EMAIL_HEADER).to_text(),
            member: record.member().to_text(),
            member_name: record.name().to_text(),
            ..MailDraft::default()
        }
    }

    pub fn render_html(&self) -> String {
        format!(
            "<div><h1>Email Template</h1>\
             <p>To: {}</p><p>From: {}</p><p>Subject: {}</p>\
             <p>Message: {}</p><p>Member: {}</p></div>",
            escape_html(&self.to),
            escape_html(&self.from),
            escape_html(&self.subject),
            escape_html(&self.message),
            escape_html(&self.member_name),
        )
    }
}

/// Render and log a draft. Returns the rendered body.
pub fn submit_draft(draft: &MailDraft) -> String {
    let html = draft.render_html();
    info!(
        "mail draft to '{}' for member '{}' ({} bytes of html)",
        draft.to,
        draft.member,
        html.len()
    );
    html
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
