use std::fs;
use std::path::Path;

use minijinja::Environment;

use crate::variables::Variables;

pub const SUBJECT_FILE: &str = "subject.txt";
pub const BODY_TEXT_FILE: &str = "body.txt";
pub const BODY_HTML_FILE: &str = "body.html";

/// Reads a UTF-8 file, treating absence and read errors alike as "not there".
pub(crate) fn load_optional(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

/// Collapses a possibly multi-line subject into one `"; "`-separated line.
pub fn join_subject_lines(raw: &str) -> String {
    raw.lines().map(str::trim_end).collect::<Vec<_>>().join("; ")
}

/// Subject and bodies of a mail as found in one directory.
///
/// At job level these are templates, at recipient level they are literal
/// overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

impl TemplateSet {
    pub fn load(dir: &Path) -> Self {
        TemplateSet {
            subject: load_optional(&dir.join(SUBJECT_FILE)).map(|s| join_subject_lines(&s)),
            body_text: load_optional(&dir.join(BODY_TEXT_FILE)),
            body_html: load_optional(&dir.join(BODY_HTML_FILE)),
        }
    }

    pub fn render_subject(
        &self,
        renderer: &Renderer,
        variables: &Variables,
    ) -> Result<Option<String>, minijinja::Error> {
        renderer.render_optional(SUBJECT_FILE, self.subject.as_deref(), variables)
    }

    pub fn render_body_text(
        &self,
        renderer: &Renderer,
        variables: &Variables,
    ) -> Result<Option<String>, minijinja::Error> {
        renderer.render_optional(BODY_TEXT_FILE, self.body_text.as_deref(), variables)
    }

    pub fn render_body_html(
        &self,
        renderer: &Renderer,
        variables: &Variables,
    ) -> Result<Option<String>, minijinja::Error> {
        renderer.render_optional(BODY_HTML_FILE, self.body_html.as_deref(), variables)
    }
}

/// Substitutes `{{name}}` placeholders. Undefined names render empty.
///
/// The template name picks the escaping: `*.html` sources are HTML-escaped,
/// everything else is rendered verbatim.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        Renderer { env }
    }

    pub fn render(
        &self,
        name: &str,
        source: &str,
        variables: &Variables,
    ) -> Result<String, minijinja::Error> {
        self.env.render_named_str(name, source, variables)
    }

    fn render_optional(
        &self,
        name: &str,
        source: Option<&str>,
        variables: &Variables,
    ) -> Result<Option<String>, minijinja::Error> {
        source.map(|s| self.render(name, s, variables)).transpose()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
