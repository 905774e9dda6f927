//! Mail message model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: PathBuf,
    /// File name shown to the recipient.
    pub name: String,
}

/// One outbound email.
///
/// Empty `from`/`from_name` are filled from [`super::MailConfig`] by the
/// dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    /// Name of the template the transport renders, if any.
    pub template: Option<String>,
    /// Template data (or the plain body when no template is set).
    pub data: serde_json::Value,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            path: path.into(),
            name: name.into(),
        });
        self
    }
}
