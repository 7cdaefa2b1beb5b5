//! Interactive console loop.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::pin::Pin;

use anyhow::Context;
use anyhow::Result;
use bytes::Bytes;
use docchat_client::ApiError;
use docchat_client::SessionController;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::io::Stdin;

use crate::command;
use crate::command::Command;
use crate::render;
use crate::render::Palette;

type SignOutWatch = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

enum Flow {
    Continue,
    Exit,
}

pub struct Repl {
    controller: SessionController,
    palette: Palette,
    input: Lines<BufReader<Stdin>>,
}

impl Repl {
    pub fn new(controller: SessionController, palette: Palette) -> Self {
        Self {
            controller,
            palette,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    fn watch(&self) -> SignOutWatch {
        Box::pin(SessionController::watch_sign_out(self.controller.subscribe()))
    }

    pub async fn run(mut self) -> Result<()> {
        println!("docchat {}; type `help` for commands", env!("CARGO_PKG_VERSION"));
        let mut sign_out = self.watch();
        loop {
            self.prompt()?;
            tokio::select! {
                line = self.input.next_line() => {
                    let Some(line) = line.context("failed to read input")? else {
                        break;
                    };
                    match command::parse(&line) {
                        Ok(None) => {}
                        Ok(Some(command)) => {
                            if let Flow::Exit = self.execute(command).await? {
                                break;
                            }
                        }
                        Err(err) => println!("{}", self.palette.error(&err.to_string())),
                    }
                }
                reason = &mut sign_out => {
                    let Some(reason) = reason else {
                        break;
                    };
                    self.controller.handle_forced_sign_out();
                    println!();
                    let notice = format!("Signed out: {reason}. Use `login <email>` to continue.");
                    println!("{}", self.palette.error(&notice));
                    sign_out = self.watch();
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }
        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        let label = match (self.controller.user(), self.controller.current_session()) {
            (None, _) => "signed out".to_string(),
            (Some(_), None) => "no session".to_string(),
            (Some(_), Some(session)) => session.name,
        };
        print!("{} ", self.palette.accent(&format!("[{label}]>")));
        std::io::stdout().flush().context("failed to flush stdout")
    }

    async fn read_secret(&mut self, label: &str) -> Result<String> {
        print!("{label}: ");
        std::io::stdout().flush()?;
        let line = self
            .input
            .next_line()
            .await
            .context("failed to read input")?
            .unwrap_or_default();
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn execute(&mut self, command: Command) -> Result<Flow> {
        let palette = self.palette;
        let outcome = match command {
            Command::Quit => return Ok(Flow::Exit),
            Command::Help => {
                println!("{}", command::HELP);
                Ok(())
            }
            Command::Login { email } => {
                let password = self.read_secret("password").await?;
                self.controller.login(&email, &password).await.map(|auth| {
                    let who = auth.email.unwrap_or(email);
                    println!("{}", palette.success(&format!("Signed in as {who}")));
                    self.print_sessions();
                })
            }
            Command::Signup { email } => {
                let password = self.read_secret("choose a password").await?;
                self.controller.signup(&email, &password).await.map(|_| {
                    println!("{}", palette.success(&format!("Account created for {email}")));
                })
            }
            Command::Logout => self.controller.logout().await.map(|()| {
                println!("Signed out.");
            }),
            Command::Sessions => self
                .controller
                .load_sessions()
                .await
                .map(|_| self.print_sessions()),
            Command::New { name, description } => self
                .controller
                .create_session(&name, description.as_deref())
                .await
                .map(|session| {
                    println!(
                        "Created {} and switched to it.",
                        palette.accent(&session.session_id)
                    );
                }),
            Command::Use { session_id } => {
                self.controller.select_session(&session_id).await.map(|()| {
                    let documents = self.controller.documents().snapshot().items;
                    let messages = self.controller.messages().snapshot().items;
                    println!("{}", render::documents(palette, &documents));
                    println!("{}", render::messages(palette, &messages));
                })
            }
            Command::Rename { name } => match self.controller.current_session_id() {
                Some(session_id) => self
                    .controller
                    .rename_session(&session_id, &name)
                    .await
                    .map(|session| println!("Renamed to {}.", session.name)),
                None => Err(no_session()),
            },
            Command::Remove { session_id } => self
                .controller
                .delete_session(&session_id)
                .await
                .map(|()| println!("Deleted {session_id}.")),
            Command::Docs => self
                .controller
                .refresh_documents()
                .await
                .map(|_| {
                    let documents = self.controller.documents().snapshot().items;
                    println!("{}", render::documents(palette, &documents));
                }),
            Command::Upload { path } => {
                let (file_name, bytes) = match read_upload(&path).await {
                    Ok(upload) => upload,
                    Err(err) => {
                        println!("{}", palette.error(&format!("{err:#}")));
                        return Ok(Flow::Continue);
                    }
                };
                let size = bytes.len();
                println!("{}", palette.dim(&format!("uploading {file_name} ({size} bytes)...")));
                self.controller
                    .upload_document(&file_name, bytes)
                    .await
                    .map(|doc| {
                        println!(
                            "Uploaded {} [{}]. Processing runs in the background.",
                            palette.accent(&doc.id),
                            doc.status
                        );
                        println!("Check progress with `doc {}`.", doc.id);
                    })
            }
            Command::Doc { document_id } => {
                self.controller
                    .refresh_document(&document_id)
                    .await
                    .map(|doc| {
                        let tracked = docchat_client::store::TrackedDocument::Stored(doc);
                        println!("{}", render::document(palette, &tracked));
                    })
            }
            Command::Retry { document_id } => self
                .controller
                .retry_document(&document_id)
                .await
                .map(|doc| println!("Reprocessing {} [{}].", doc.id, doc.status)),
            Command::RemoveDoc { document_id } => self
                .controller
                .delete_document(&document_id)
                .await
                .map(|()| println!("Deleted {document_id}.")),
            Command::History => self
                .controller
                .refresh_messages()
                .await
                .map(|_| {
                    let messages = self.controller.messages().snapshot().items;
                    println!("{}", render::messages(palette, &messages));
                }),
            Command::Ask { query } => {
                println!("{}", palette.dim("thinking..."));
                self.controller
                    .ask(&query)
                    .await
                    .map(|answer| println!("{}", render::message(palette, &answer)))
            }
        };

        if let Err(err) = outcome {
            self.report(&err);
        }
        Ok(Flow::Continue)
    }

    fn print_sessions(&self) {
        let current = self.controller.current_session_id();
        println!(
            "{}",
            render::sessions(
                self.palette,
                &self.controller.sessions().snapshot().items,
                current.as_deref()
            )
        );
    }

    fn report(&self, err: &ApiError) {
        tracing::debug!(error = ?err, "command failed");
        // Forced sign-out is announced by the watcher.
        if err.is_terminal_auth() && !matches!(err, ApiError::NotSignedIn) {
            return;
        }
        println!("{}", self.palette.error(&err.user_message()));
    }
}

fn no_session() -> ApiError {
    ApiError::InvalidRequest("Select or create a session first.".to_string())
}

async fn read_upload(path: &Path) -> Result<(String, Bytes)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((file_name, Bytes::from(bytes)))
}
