//! Plain-text rendering of store contents.

use docchat_client::store::TrackedDocument;
use docchat_protocol::Citation;
use docchat_protocol::Message;
use docchat_protocol::MessageRole;
use docchat_protocol::Session;
use docchat_protocol::SourceType;
use owo_colors::OwoColorize;

/// Highlighting is applied only when stdout supports color.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn detect() -> Self {
        Self {
            enabled: supports_color::on(supports_color::Stream::Stdout).is_some(),
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    pub fn accent(&self, text: &str) -> String {
        if self.enabled {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.enabled {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn error(&self, text: &str) -> String {
        if self.enabled {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, text: &str) -> String {
        if self.enabled {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }
}

pub fn sessions(palette: Palette, sessions: &[Session], current: Option<&str>) -> String {
    if sessions.is_empty() {
        return palette.dim("no sessions yet; create one with `new <name>`");
    }
    sessions
        .iter()
        .map(|session| {
            let marker = if current == Some(session.session_id.as_str()) {
                "*"
            } else {
                " "
            };
            let docs = match session.document_count {
                1 => "1 doc".to_string(),
                n => format!("{n} docs"),
            };
            format!(
                "{marker} {}  {}  {}",
                palette.accent(&session.session_id),
                session.name,
                palette.dim(&format!("({docs})"))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn documents(palette: Palette, documents: &[TrackedDocument]) -> String {
    if documents.is_empty() {
        return palette.dim("no documents; add one with `upload <path.pdf>`");
    }
    documents
        .iter()
        .map(|doc| document(palette, doc))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn document(palette: Palette, doc: &TrackedDocument) -> String {
    let mut line = format!(
        "{}  {}  [{}]",
        palette.accent(doc.id()),
        doc.file_name(),
        doc.status()
    );
    if let Some(stored) = doc.document() {
        if let Some(pages) = stored.page_count {
            line.push_str(&palette.dim(&format!("  {pages} pages")));
        }
        if let Some(error) = &stored.error_message {
            line.push_str(&format!("  {}", palette.error(error)));
        }
    }
    line
}

pub fn message(palette: Palette, message: &Message) -> String {
    let role = match message.role {
        MessageRole::User => palette.accent("you"),
        MessageRole::Assistant => palette.success("docchat"),
    };
    let mut out = format!("{role}> {}", message.content);
    for (index, citation) in message.citations().iter().enumerate() {
        out.push('\n');
        out.push_str(&palette.dim(&format!("  [{}] {}", index + 1, citation_label(citation))));
    }
    out
}

pub fn messages(palette: Palette, messages: &[Message]) -> String {
    if messages.is_empty() {
        return palette.dim("no messages yet; type a question");
    }
    messages
        .iter()
        .map(|m| message(palette, m))
        .collect::<Vec<_>>()
        .join("\n")
}

fn citation_label(citation: &Citation) -> String {
    let source = match citation.source_type {
        SourceType::Document => match citation.page_number {
            Some(page) => format!("document {} p.{page}", citation.source_id),
            None => format!("document {}", citation.source_id),
        },
        SourceType::Web => citation
            .url
            .clone()
            .unwrap_or_else(|| citation.source_id.clone()),
        SourceType::LlmKnowledge => "model knowledge".to_string(),
    };
    let snippet: String = citation.snippet.chars().take(80).collect();
    format!("{source} ({:.2}) {snippet}", citation.confidence)
}
