//! Parsing of console input lines.

use std::path::PathBuf;

use anyhow::Result;
use anyhow::bail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String },
    Signup { email: String },
    Logout,
    Sessions,
    New { name: String, description: Option<String> },
    Use { session_id: String },
    Rename { name: String },
    Remove { session_id: String },
    Docs,
    Upload { path: PathBuf },
    Doc { document_id: String },
    Retry { document_id: String },
    RemoveDoc { document_id: String },
    History,
    Ask { query: String },
    Help,
    Quit,
}

pub const HELP: &str = "\
login <email>             sign in (password is asked next)
signup <email>            create an account
logout                    sign out
sessions                  list sessions
new <name> [| desc]       create a session and switch to it
use <session_id>          switch to a session
rename <name>             rename the current session
rm <session_id>           delete a session
docs                      list documents of the current session
upload <path.pdf>         upload a PDF to the current session
doc <id>                  show a document's processing status
retry <id>                reprocess a failed document
rmdoc <id>                delete a document
history                   show the conversation
ask <question>            ask a question (plain text works too)
help                      show this help
quit                      exit";

/// Parse one input line. Blank lines yield `None`; anything that is not a
/// known command is treated as a question.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "login" => Command::Login {
            email: single_arg(word, rest, "<email>")?,
        },
        "signup" => Command::Signup {
            email: single_arg(word, rest, "<email>")?,
        },
        "logout" => Command::Logout,
        "sessions" | "ls" => Command::Sessions,
        "new" => {
            let (name, description) = match rest.split_once('|') {
                Some((name, description)) => (name.trim(), Some(description.trim().to_string())),
                None => (rest, None),
            };
            if name.is_empty() {
                bail!("usage: new <name> [| description]");
            }
            Command::New {
                name: name.to_string(),
                description: description.filter(|d| !d.is_empty()),
            }
        }
        "use" => Command::Use {
            session_id: single_arg(word, rest, "<session_id>")?,
        },
        "rename" => {
            if rest.is_empty() {
                bail!("usage: rename <name>");
            }
            Command::Rename {
                name: rest.to_string(),
            }
        }
        "rm" => Command::Remove {
            session_id: single_arg(word, rest, "<session_id>")?,
        },
        "docs" => Command::Docs,
        "upload" => {
            if rest.is_empty() {
                bail!("usage: upload <path.pdf>");
            }
            Command::Upload {
                path: PathBuf::from(rest),
            }
        }
        "doc" => Command::Doc {
            document_id: single_arg(word, rest, "<id>")?,
        },
        "retry" => Command::Retry {
            document_id: single_arg(word, rest, "<id>")?,
        },
        "rmdoc" => Command::RemoveDoc {
            document_id: single_arg(word, rest, "<id>")?,
        },
        "history" => Command::History,
        "ask" => {
            if rest.is_empty() {
                bail!("usage: ask <question>");
            }
            Command::Ask {
                query: rest.to_string(),
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Ask {
            query: line.to_string(),
        },
    };
    Ok(Some(command))
}

fn single_arg(word: &str, rest: &str, placeholder: &str) -> Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        bail!("usage: {word} {placeholder}");
    }
    Ok(rest.to_string())
}
