//! Confirmation and notification collaborators.
//!
//! The pipeline never talks to a terminal or a browser directly: it asks a
//! [`Confirm`] before destructive commits and reports every outcome to a
//! [`Notify`].

use log::{error, info, warn};
use serde::Serialize;

/// A blocking yes/no question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub title: String,
    pub body: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl Prompt {
    /// The "Are you sure?" prompt used before every destructive commit.
    pub fn are_you_sure(body: impl Into<String>, confirm_label: &str) -> Self {
        Prompt {
            title: "Are you sure?".to_string(),
            body: body.into(),
            confirm_label: confirm_label.to_string(),
            cancel_label: "No, keep it".to_string(),
        }
    }
}

pub trait Confirm {
    fn confirm(&mut self, prompt: &Prompt) -> bool;
}

impl<F: FnMut(&Prompt) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        self(prompt)
    }
}

/// Answers every prompt with a fixed decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, _prompt: &Prompt) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Notice {
            level,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn success(title: &str, body: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, body)
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, "Error!", body)
    }

    pub fn warning(title: &str, body: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, body)
    }

    pub fn info(title: &str, body: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, body)
    }
}

pub trait Notify {
    fn notify(&mut self, notice: Notice);
}

/// Collects notices so a caller can hand them back in one response.
#[derive(Debug, Default, Clone)]
pub struct NoticeBuffer {
    notices: Vec<Notice>,
}

impl NoticeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

impl Notify for NoticeBuffer {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

/// Sends notices to the `log` facade only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!("{}: {}", notice.title, notice.body),
            NoticeLevel::Warning => warn!("{}: {}", notice.title, notice.body),
            NoticeLevel::Success | NoticeLevel::Info => info!("{}: {}", notice.title, notice.body),
        }
    }
}
