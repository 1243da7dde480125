use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::attachment::AttachmentStore;
use crate::error::MailError;
use crate::template::{Renderer, TemplateSet};
use crate::variables::{job_auto_variables, load_variables, resolve, Variables};

pub const EMAIL_FILE: &str = "email.txt";
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Job-wide material every recipient falls back on.
#[derive(Default)]
pub struct JobContext {
    pub templates: TemplateSet,
    pub variables: Variables,
    pub attachments: AttachmentStore,
    pub renderer: Renderer,
}

impl JobContext {
    /// Loads templates, `variables.json` and the strict shared attachment
    /// store from the job directory.
    pub fn load(job_dir: &Path) -> Result<Self, MailError> {
        Ok(JobContext {
            templates: TemplateSet::load(job_dir),
            variables: load_variables(job_dir),
            attachments: AttachmentStore::load(&job_dir.join(ATTACHMENTS_DIR), false)?,
            renderer: Renderer::new(),
        })
    }
}

/// A fully resolved mail for one recipient directory.
///
/// Only constructed when the address, the subject and at least one body are
/// all present.
#[derive(Debug)]
pub struct Recipient {
    key: String,
    name: String,
    email: String,
    variables: Variables,
    subject: String,
    body_text: Option<String>,
    body_html: Option<String>,
    attachments: AttachmentStore,
}

impl Recipient {
    pub fn load(path: &Path, job: &JobContext) -> Result<Self, MailError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let overrides = TemplateSet::load(path);
        let persisted = load_variables(path);
        let email = load_email(path)?;

        let mut attachments = AttachmentStore::load(&path.join(ATTACHMENTS_DIR), true)
            .map_err(|e| MailError::load(path, e))?;
        attachments.merge(&job.attachments);

        let mut auto = job_auto_variables();
        auto.insert("email".into(), Value::String(email.clone()));
        auto.insert("recipient_dir".into(), Value::String(name.clone()));
        let mut variables = resolve(&job.variables, &persisted, &auto);

        let render_err = |e: minijinja::Error| MailError::load(path, e);

        let subject = match present(overrides.subject) {
            Some(subject) => Some(subject),
            None => job
                .templates
                .render_subject(&job.renderer, &variables)
                .map_err(render_err)?,
        };
        let subject = present(subject)
            .ok_or_else(|| MailError::load(path, "subject.txt is mandatory file"))?;
        variables.insert("subject".into(), Value::String(subject.clone()));

        let body_text = match present(overrides.body_text) {
            Some(text) => Some(text),
            None => job
                .templates
                .render_body_text(&job.renderer, &variables)
                .map_err(render_err)?,
        };
        let body_html = match present(overrides.body_html) {
            Some(html) => Some(html),
            None => job
                .templates
                .render_body_html(&job.renderer, &variables)
                .map_err(render_err)?,
        };
        let body_text = present(body_text);
        let body_html = present(body_html);
        if body_text.is_none() && body_html.is_none() {
            return Err(MailError::load(
                path,
                "either body.txt or body.html are mandatory files",
            ));
        }

        Ok(Recipient {
            key: path.to_string_lossy().into_owned(),
            name,
            email,
            variables,
            subject,
            body_text,
            body_html,
            attachments,
        })
    }

    /// Identity of this recipient in `redo.log`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body_text.as_deref()
    }

    pub fn body_html(&self) -> Option<&str> {
        self.body_html.as_deref()
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn load_email(dir: &Path) -> Result<String, MailError> {
    let path = dir.join(EMAIL_FILE);
    let raw = fs::read_to_string(&path).map_err(|e| MailError::load(&path, e))?;
    let email = raw.trim();
    if !email.contains('@') {
        return Err(MailError::load(&path, "invalid email address"));
    }
    Ok(email.to_string())
}
