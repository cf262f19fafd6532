use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use time::{macros::format_description, OffsetDateTime};

use super::{editor, Commands};
use crate::api::{
    ApiClient, BasicInfo, HttpNoteStore, Note, NoteStore, PasswordChange, SignIn, SignUp,
    UserApi, UserProfile,
};
use crate::config::{AppConfig, DisplayOptions};
use crate::confirmation::{self, ConfirmationOutcome};
use crate::html::{strip_html, truncate_title};
use crate::search::SearchFilter;
use crate::session::{SessionStore, StoredSession};

const CONFIRMATION_REMINDER: &str = "It looks like you haven't confirmed your account yet. \
Run `purplenotes account confirm` once you have the confirmation email.";

#[derive(Args, Debug, Clone)]
pub struct SignInArgs {
    #[arg(long)]
    pub email: String,
    /// Read from the terminal when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SignUpArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    /// Read (with confirmation) from the terminal when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show notes whose title contains this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    /// Note identifier
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub id: String,
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccountCommand {
    /// Change name and/or email
    BasicInfo(BasicInfoArgs),
    /// Change the account password
    Password,
    /// Delete the account permanently
    Delete(PasswordArgs),
    /// Confirm the account
    Confirm,
    /// Ask for a new confirmation email
    SendConfirmation,
    /// Send a password recovery email
    Recover(RecoverArgs),
    /// Set a new password from a recovery link id
    Reset(ResetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub command: AccountCommand,
}

#[derive(Args, Debug, Clone)]
pub struct BasicInfoArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PasswordArgs {
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RecoverArgs {
    #[arg(long)]
    pub email: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Recovery id from the email link
    pub id: String,
}

/// Configuration and session shared by every command.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
}

impl AppContext {
    pub fn new(config: Arc<AppConfig>, sessions: SessionStore) -> Self {
        Self { config, sessions }
    }

    fn client(&self) -> Result<ApiClient> {
        let token = self.sessions.token()?;
        let client = ApiClient::new(&self.config.api).context("building http client")?;
        Ok(client.with_token(token.as_deref()))
    }

    pub fn notes(&self) -> Result<HttpNoteStore> {
        Ok(HttpNoteStore::new(self.client()?))
    }

    pub fn users(&self) -> Result<UserApi> {
        Ok(UserApi::new(self.client()?))
    }

    fn require_session(&self) -> Result<StoredSession> {
        self.sessions
            .load()?
            .ok_or_else(|| anyhow!("not signed in; run `purplenotes sign-in` first"))
    }
}

pub async fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::SignIn(args) => sign_in(ctx, args).await,
        Commands::SignUp(args) => sign_up(ctx, args).await,
        Commands::SignOut => sign_out(ctx),
        Commands::Whoami => whoami(ctx),
        Commands::List(args) => list_notes(ctx, args).await,
        Commands::Show(args) => show_note(ctx, args).await,
        Commands::New => new_note(ctx).await,
        Commands::Edit(args) => editor::edit_note(ctx, &args.id).await,
        Commands::Delete(args) => delete_note(ctx, args).await,
        Commands::Account(args) => handle_account_command(ctx, args).await,
    }
}

async fn sign_in(ctx: &AppContext, args: SignInArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    let form = SignIn {
        email: args.email.trim().to_string(),
        password,
    };
    let auth = ctx.users()?.sign_in(&form).await.context("signing in")?;
    ctx.sessions
        .save(&StoredSession::new(auth.token, auth.user.clone()))?;
    println!("Signed in as {}", format_user(&auth.user));
    if confirmation::needs_confirmation(Some(&auth.user)) {
        println!("{CONFIRMATION_REMINDER}");
    }
    Ok(())
}

async fn sign_up(ctx: &AppContext, args: SignUpArgs) -> Result<()> {
    let (password, confirmation) = match args.password {
        Some(password) => (password, None),
        None => {
            let password = prompt("Password")?;
            let confirmation = prompt("Password confirmation")?;
            (password, Some(confirmation))
        }
    };
    let form = SignUp {
        name: args.name.trim().to_string(),
        email: args.email.trim().to_string(),
        password,
        password_confirmation: confirmation,
    };
    let auth = ctx.users()?.sign_up(&form).await.context("creating account")?;
    ctx.sessions
        .save(&StoredSession::new(auth.token, auth.user.clone()))?;
    println!("Welcome, {}", format_user(&auth.user));
    println!("{CONFIRMATION_REMINDER}");
    Ok(())
}

fn sign_out(ctx: &AppContext) -> Result<()> {
    ctx.sessions.clear()?;
    println!("Signed out");
    Ok(())
}

fn whoami(ctx: &AppContext) -> Result<()> {
    let session = ctx.require_session()?;
    match &session.user {
        Some(user) => {
            println!("{}", format_user(user));
            if confirmation::needs_confirmation(Some(user)) {
                println!("{CONFIRMATION_REMINDER}");
            }
        }
        None => println!("Signed in (no cached profile)"),
    }
    Ok(())
}

async fn list_notes(ctx: &AppContext, args: ListArgs) -> Result<()> {
    let session = ctx.require_session()?;
    let notes = ctx
        .notes()?
        .list_my_notes()
        .await
        .context("fetching your notes")?;
    let mut filter = SearchFilter::new(notes);
    if let Some(query) = args.search {
        filter.set_query(query, tokio::time::Instant::now());
        filter.apply_now();
    }
    print!("{}", format_note_list(&filter, &ctx.config.display));
    if confirmation::needs_confirmation(session.user.as_ref()) {
        println!("\n{CONFIRMATION_REMINDER}");
    }
    Ok(())
}

async fn show_note(ctx: &AppContext, args: NoteArgs) -> Result<()> {
    let note = match ctx.notes()?.read_note(&args.id).await {
        Ok(note) => note,
        Err(err) => {
            tracing::debug!(?err, note_id = %args.id, "note not readable");
            bail!("You do not have permission to read this note");
        }
    };
    print!("{}", format_note(&note));
    Ok(())
}

async fn new_note(ctx: &AppContext) -> Result<()> {
    ctx.require_session()?;
    let note = ctx
        .notes()?
        .create_note()
        .await
        .context("creating note")?;
    println!("Note created successfully");
    println!("Edit it with: purplenotes edit {}", note.id);
    Ok(())
}

async fn delete_note(ctx: &AppContext, args: DeleteArgs) -> Result<()> {
    ctx.require_session()?;
    let password = match args.password {
        Some(password) => password,
        None => prompt("Password (the note cannot be recovered)")?,
    };
    ctx.notes()?
        .delete_note(&args.id, &password)
        .await
        .with_context(|| format!("deleting note {}", args.id))?;
    println!("Note deleted");
    Ok(())
}

pub async fn handle_account_command(ctx: &AppContext, args: AccountArgs) -> Result<()> {
    match args.command {
        AccountCommand::BasicInfo(args) => update_basic_info(ctx, args).await,
        AccountCommand::Password => update_password(ctx).await,
        AccountCommand::Delete(args) => delete_account(ctx, args).await,
        AccountCommand::Confirm => confirm_account(ctx).await,
        AccountCommand::SendConfirmation => {
            ctx.require_session()?;
            ctx.users()?
                .send_account_confirmation()
                .await
                .context("requesting confirmation email")?;
            println!("Confirmation email sent");
            Ok(())
        }
        AccountCommand::Recover(args) => {
            ctx.users()?
                .send_password_recovery(args.email.trim())
                .await
                .context("requesting password recovery")?;
            println!("Check your inbox for the recovery link");
            Ok(())
        }
        AccountCommand::Reset(args) => reset_password(ctx, args).await,
    }
}

async fn update_basic_info(ctx: &AppContext, args: BasicInfoArgs) -> Result<()> {
    let session = ctx.require_session()?;
    let Some(current) = session.user else {
        bail!("no cached profile; sign in again");
    };
    let form = BasicInfo {
        name: args.name.unwrap_or_else(|| current.name.clone()),
        email: args.email.unwrap_or_else(|| current.email.clone()),
    };
    if form.matches(&current) {
        println!("Nothing to update");
        return Ok(());
    }
    let user = ctx
        .users()?
        .update_basic_info(&form)
        .await
        .context("updating basic info")?;
    ctx.sessions.update_user(user)?;
    println!("Basic info edited successfully");
    Ok(())
}

async fn update_password(ctx: &AppContext) -> Result<()> {
    ctx.require_session()?;
    let form = PasswordChange {
        password: prompt("New password")?,
        password_confirmation: Some(prompt("Password confirmation")?),
    };
    ctx.users()?
        .update_password(&form)
        .await
        .context("updating password")?;
    println!("Password edited successfully");
    Ok(())
}

async fn delete_account(ctx: &AppContext, args: PasswordArgs) -> Result<()> {
    ctx.require_session()?;
    let password = match args.password {
        Some(password) => password,
        None => prompt("Password (this cannot be undone)")?,
    };
    ctx.users()?
        .delete_account(&password)
        .await
        .context("deleting account")?;
    ctx.sessions.clear()?;
    println!("Account deleted");
    Ok(())
}

async fn confirm_account(ctx: &AppContext) -> Result<()> {
    ctx.require_session()?;
    let outcome =
        confirmation::confirm_account(&ctx.users()?, &ctx.sessions, OffsetDateTime::now_utc())
            .await?;
    match outcome {
        ConfirmationOutcome::Failed => bail!("{}", outcome.message()),
        ConfirmationOutcome::Confirmed(_) => {
            println!("{}", outcome.message());
            println!("Go back to your notes with: purplenotes list");
        }
        ConfirmationOutcome::AlreadyConfirmed | ConfirmationOutcome::Expired => {
            eprintln!("{}", outcome.message());
        }
    }
    Ok(())
}

async fn reset_password(ctx: &AppContext, args: ResetArgs) -> Result<()> {
    let users = ctx.users()?;
    users
        .get_password_recovery(&args.id)
        .await
        .context("recovery link is invalid or expired")?;
    let password = prompt("New password")?;
    let confirmation = prompt("Password confirmation")?;
    if password != confirmation {
        bail!("Passwords must be the same");
    }
    users
        .confirm_password_recovery(&args.id, &password)
        .await
        .context("setting new password")?;
    println!("Password changed; sign in with your new password");
    Ok(())
}

fn format_user(user: &UserProfile) -> String {
    format!("{} <{}>", user.name, user.email)
}

fn format_date(at: OffsetDateTime) -> String {
    at.format(&format_description!("[day]/[month]/[year] - [hour]:[minute]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn privacy_label(note: &Note) -> &'static str {
    if note.privacy {
        "Private"
    } else {
        "Free to read"
    }
}

pub fn format_note_list(filter: &SearchFilter, display: &DisplayOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", filter.summary());
    for note in filter.visible() {
        out.push('\n');
        let _ = writeln!(
            &mut out,
            "[{}] {}",
            note.id,
            truncate_title(&note.title, display.title_chars)
        );
        let _ = writeln!(&mut out, "    {}", privacy_label(note));
        let _ = writeln!(&mut out, "    Created at {}", format_date(note.created_at));
        if note.was_edited() {
            let _ = writeln!(&mut out, "    Updated at {}", format_date(note.updated_at));
        }
        if display.preview_chars > 0 {
            let preview = strip_html(&note.body, Some(display.preview_chars));
            let preview = preview.split_whitespace().collect::<Vec<_>>().join(" ");
            if !preview.is_empty() {
                let _ = writeln!(&mut out, "    {preview}");
            }
        }
    }
    out
}

pub fn format_note(note: &Note) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", note.title);
    let _ = writeln!(&mut out, "created at: {}", format_date(note.created_at));
    if note.was_edited() {
        let _ = writeln!(&mut out, "updated at: {}", format_date(note.updated_at));
    }
    let _ = writeln!(
        &mut out,
        "privacy: {}",
        privacy_label(note).to_lowercase()
    );
    out.push('\n');
    let _ = writeln!(&mut out, "{}", strip_html(&note.body, None).trim());
    out
}

pub(crate) fn prompt(label: &str) -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        let mut stdout = io::stdout();
        write!(stdout, "{}: ", label)?;
        stdout.flush()?;
    }
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .with_context(|| format!("reading {}", label.to_lowercase()))?;
    Ok(input.trim_end().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn note(id: &str, title: &str, body: &str, privacy: bool, edited: bool) -> Note {
        let created_at = datetime!(2024-03-01 10:05 UTC);
        Note {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            privacy,
            created_at,
            updated_at: if edited {
                datetime!(2024-03-02 18:30 UTC)
            } else {
                created_at
            },
        }
    }

    fn sample_filter() -> SearchFilter {
        SearchFilter::new(vec![
            note("a1", "Groceries", "<p>milk</p><p>eggs</p>", true, false),
            note(
                "b2",
                "Release checklist for the spring launch",
                "<h1>Steps</h1>",
                false,
                true,
            ),
        ])
    }

    #[test]
    fn note_list_shows_cards() {
        let display = DisplayOptions {
            preview_chars: 20,
            title_chars: 20,
        };
        insta::assert_snapshot!(format_note_list(&sample_filter(), &display), @r###"
        You have 2 notes

        [a1] Groceries
            Private
            Created at 01/03/2024 - 10:05
            milkeggs

        [b2] Release checklist fo...
            Free to read
            Created at 01/03/2024 - 10:05
            Updated at 02/03/2024 - 18:30
            Steps
        "###);
    }

    #[test]
    fn note_list_reports_search_matches() {
        let mut filter = sample_filter();
        filter.set_query("GROC", tokio::time::Instant::now());
        filter.apply_now();
        let display = DisplayOptions {
            preview_chars: 0,
            title_chars: 33,
        };
        insta::assert_snapshot!(format_note_list(&filter, &display), @r###"
        1 note found

        [a1] Groceries
            Private
            Created at 01/03/2024 - 10:05
        "###);
    }

    #[test]
    fn single_note_is_rendered_as_text() {
        let note = note("a1", "Groceries", "<p>milk</p>", false, true);
        insta::assert_snapshot!(format_note(&note), @r###"
        Groceries
        created at: 01/03/2024 - 10:05
        updated at: 02/03/2024 - 18:30
        privacy: free to read

        milk
        "###);
    }
}
