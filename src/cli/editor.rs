use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::commands::AppContext;
use crate::api::NoteStore;
use crate::editing::{spawn_editor, EditSession, EditorHandle, LoadError, SaveStatus};
use crate::html::strip_html;

const HELP: &str = "\
commands:
  title <text>     replace the title
  body <html>      replace the body
  private | public change who can read the note
  save | :w        save right away
  quit | :q | :wq  save pending edits and leave
  quit! | :q!      leave without saving pending edits
  help             show this message";

/// One line typed in the interactive editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditInput {
    Title(String),
    Body(String),
    Privacy(bool),
    Save,
    Quit,
    Discard,
    Help,
}

pub fn parse_edit_command(line: &str) -> Result<EditInput, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let input = match word {
        "title" => EditInput::Title(rest.to_string()),
        "body" => EditInput::Body(rest.to_string()),
        "private" if rest.is_empty() => EditInput::Privacy(true),
        "public" if rest.is_empty() => EditInput::Privacy(false),
        "save" | ":w" if rest.is_empty() => EditInput::Save,
        "quit" | ":q" | ":wq" if rest.is_empty() => EditInput::Quit,
        "quit!" | ":q!" if rest.is_empty() => EditInput::Discard,
        "help" | "?" => EditInput::Help,
        "" => return Err("type `help` to list commands".to_string()),
        other => return Err(format!("unknown command `{other}`; type `help`")),
    };
    Ok(input)
}

pub async fn edit_note(ctx: &AppContext, id: &str) -> Result<()> {
    let store: Arc<dyn NoteStore> = Arc::new(ctx.notes()?);
    let session = match EditSession::load(store, id).await {
        Ok(session) => session,
        Err(err @ LoadError::PermissionDenied) => bail!("{err}"),
        Err(err) => return Err(err).with_context(|| format!("loading note {id}")),
    };
    print_draft(&session);
    println!("{HELP}");

    let editor = spawn_editor(session);
    let reporter = tokio::spawn(report_status(editor.status(), |message| {
        eprintln!("[{message}]")
    }));
    let result = read_commands(&editor).await;

    let flush = !matches!(result, Ok(false));
    let session = editor.close(flush).await?;
    let discarded = session.is_dirty();
    // Dropping the session closes the status channel, so the reporter
    // prints the last status and returns.
    drop(session);
    if let Err(err) = reporter.await {
        tracing::debug!(?err, "status reporter stopped early");
    }
    if discarded {
        eprintln!("Unsaved changes were discarded");
    }
    result.map(|_| ())
}

/// Feeds stdin lines to the editor. Returns `Ok(true)` when the editor should
/// flush on close and `Ok(false)` when the user discarded pending edits.
async fn read_commands(editor: &EditorHandle) -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading editor input")? {
        let input = match parse_edit_command(&line) {
            Ok(input) => input,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        match input {
            EditInput::Title(title) => editor.set_title(title)?,
            EditInput::Body(body) => editor.set_body(body)?,
            EditInput::Privacy(privacy) => editor.set_privacy(privacy)?,
            EditInput::Save => {
                let outcome = editor.save_now().await?;
                tracing::debug!(?outcome, "manual save");
            }
            EditInput::Quit => return Ok(true),
            EditInput::Discard => return Ok(false),
            EditInput::Help => println!("{HELP}"),
        }
    }
    Ok(true)
}

/// Emits each new status message until the session owning the channel is gone.
async fn report_status(
    mut status: watch::Receiver<SaveStatus>,
    mut emit: impl FnMut(&'static str),
) {
    while status.changed().await.is_ok() {
        let message = status.borrow_and_update().message();
        if !message.is_empty() {
            emit(message);
        }
    }
}

fn print_draft(session: &EditSession) {
    let draft = session.draft();
    println!("{}", draft.title);
    println!("privacy: {}", if draft.privacy { "private" } else { "free to read" });
    println!();
    println!("{}", strip_html(&draft.body, None).trim());
    println!();
}
