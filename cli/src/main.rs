use std::io::{self, Write};

use chatlist::{
    ConversationFeed, ConversationPage, ConversationWithMessages, FeedRequest, Message, SseDecoder,
    SseEvent,
};
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::Method;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing session token; pass --session-token or set CHAT_SESSION_TOKEN")]
    MissingSessionToken,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned error for {context}: {message}")]
    ServerError { context: String, message: String },
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("chat stream ended before the reply was stored")]
    StreamEnded,
    #[error("{0}")]
    Usage(String),
}

#[derive(Parser, Debug)]
#[command(name = "chat-cli", about = "BetterChat API CLI")]
struct Cli {
    #[arg(long, env = "CHAT_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[arg(long, env = "CHAT_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    session_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    /// Show the signed-in user.
    Me,
    Conversations(ConversationsCommand),
    Messages(MessagesCommand),
    /// Send a message and stream the assistant reply.
    Chat {
        content: String,
        /// Continue this conversation; a new one is started when omitted.
        #[arg(long)]
        conversation_id: Option<Uuid>,
    },
    /// Interactive session that keeps the conversation list between commands.
    Shell {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Args, Debug)]
struct ConversationsCommand {
    #[command(subcommand)]
    command: ConversationsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ConversationsSubcommand {
    /// List conversations grouped by recency.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Follow the cursor until every page is fetched.
        #[arg(long, default_value_t = false)]
        all: bool,
        /// Print raw pages instead of grouped text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Get {
        id: Uuid,
    },
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        id: Option<Uuid>,
    },
    Rename {
        id: Uuid,
        title: String,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct MessagesCommand {
    #[command(subcommand)]
    command: MessagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum MessagesSubcommand {
    List {
        conversation_id: Uuid,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    Add {
        conversation_id: Uuid,
        content: String,
        #[arg(long, default_value = "user")]
        role: String,
        #[arg(long, help = "JSON object stored with the message")]
        metadata: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = CliContext { base_url: cli.base_url, session_token: cli.session_token };
    let limit = match &cli.command {
        Command::Shell { limit } => *limit,
        _ => 20,
    };
    let mut ws = Workspace::new(ctx, limit);

    match cli.command {
        Command::Ping => run_ping(&ws.ctx).await,
        Command::Me => {
            let json = api_request(&ws.ctx, Method::GET, "/api/auth/me", &[], None).await?;
            print_json(&json)
        }
        Command::Conversations(command) => run_conversations(&mut ws, command).await,
        Command::Messages(command) => run_messages(&mut ws, command).await,
        Command::Chat { content, conversation_id } => ws.chat(conversation_id, &content).await,
        Command::Shell { .. } => run_shell(ws).await,
    }
}

async fn run_ping(cli: &CliContext) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let response = client.get(api_url(&cli.base_url, "/healthz")).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError {
            context: format!("HTTP {}", status.as_u16()),
            message: "health check failed".to_owned(),
        });
    }
    println!("ok");
    Ok(())
}

async fn run_conversations(
    ws: &mut Workspace,
    command: ConversationsCommand,
) -> Result<(), CliError> {
    match command.command {
        ConversationsSubcommand::List { search, limit, all, json } => {
            ws.limit = limit;
            ws.search = search;
            ws.load_page().await?;
            while all && ws.feed.has_next_page() {
                ws.load_page().await?;
            }
            if json {
                let items: Vec<&ConversationWithMessages> = ws.feed.conversations().collect();
                return print_json(&serde_json::to_value(items)?);
            }
            print_groups(&ws.feed);
            if ws.feed.has_next_page() {
                println!("(more available; pass --all to fetch every page)");
            }
            Ok(())
        }
        ConversationsSubcommand::Get { id } => {
            let path = format!("/api/conversations/{id}");
            let json = api_request(&ws.ctx, Method::GET, &path, &[], None).await?;
            print_json(&json)
        }
        ConversationsSubcommand::Create { title, id } => {
            let json = ws.create(id, title).await?;
            print_json(&json)
        }
        ConversationsSubcommand::Rename { id, title } => {
            let json = ws.rename(id, &title).await?;
            print_json(&json)
        }
        ConversationsSubcommand::Delete { id } => {
            let json = ws.delete(id).await?;
            print_json(&json)
        }
    }
}

async fn run_messages(ws: &mut Workspace, command: MessagesCommand) -> Result<(), CliError> {
    match command.command {
        MessagesSubcommand::List { conversation_id, limit, offset } => {
            let path = format!("/api/conversations/{conversation_id}/messages");
            let mut query = Vec::new();
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            if let Some(offset) = offset {
                query.push(("offset", offset.to_string()));
            }
            let json = api_request(&ws.ctx, Method::GET, &path, &query, None).await?;
            print_json(&json)
        }
        MessagesSubcommand::Add { conversation_id, content, role, metadata } => {
            let metadata = metadata
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()?;
            let path = format!("/api/conversations/{conversation_id}/messages");
            let body =
                serde_json::json!({ "role": role, "content": content, "metadata": metadata });
            let json = ws.mutate(Method::POST, &path, Some(body)).await?;
            print_json(&json)
        }
    }
}

// =============================================================================
// WORKSPACE
// =============================================================================

/// The conversation list as seen by one CLI session.
///
/// The feed survives between commands. Every mutation drops it before the
/// request goes out, so the next listing starts again from the newest page.
struct Workspace {
    ctx: CliContext,
    feed: ConversationFeed,
    search: Option<String>,
    limit: u32,
}

impl Workspace {
    fn new(ctx: CliContext, limit: u32) -> Self {
        Self { ctx, feed: ConversationFeed::new(), search: None, limit }
    }

    /// Fetch the page the feed asks for next. No-op once the list is exhausted.
    async fn load_page(&mut self) -> Result<(), CliError> {
        let Some(request) = self.feed.next_request() else {
            return Ok(());
        };
        let query = list_query(&request, self.search.as_deref(), self.limit);
        let json = api_request(&self.ctx, Method::GET, "/api/conversations", &query, None).await?;
        self.feed.push_page(serde_json::from_value::<ConversationPage>(json)?);
        Ok(())
    }

    /// Show the list, reusing fetched pages unless the search changed or a
    /// mutation dropped them.
    async fn list(&mut self, search: Option<String>) -> Result<(), CliError> {
        if search != self.search {
            self.search = search;
            self.feed.invalidate();
        }
        if self.feed.page_count() == 0 {
            self.load_page().await?;
        }
        print_groups(&self.feed);
        if self.feed.has_next_page() {
            println!("(more available; type `more`)");
        }
        Ok(())
    }

    async fn more(&mut self) -> Result<(), CliError> {
        if !self.feed.has_next_page() {
            println!("no more conversations");
            return Ok(());
        }
        self.load_page().await?;
        print_groups(&self.feed);
        Ok(())
    }

    async fn mutate(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CliError> {
        self.feed.invalidate();
        api_request(&self.ctx, method, path, &[], body).await
    }

    async fn create(&mut self, id: Option<Uuid>, title: Option<String>) -> Result<Value, CliError> {
        let body = serde_json::json!({ "id": id, "title": title });
        self.mutate(Method::POST, "/api/conversations", Some(body)).await
    }

    async fn rename(&mut self, id: Uuid, title: &str) -> Result<Value, CliError> {
        let body = serde_json::json!({ "title": title });
        self.mutate(Method::PATCH, &format!("/api/conversations/{id}"), Some(body)).await
    }

    async fn delete(&mut self, id: Uuid) -> Result<Value, CliError> {
        self.mutate(Method::DELETE, &format!("/api/conversations/{id}"), None).await
    }

    /// Chat stores a user message and a reply, so it drops the feed too.
    async fn chat(&mut self, conversation_id: Option<Uuid>, content: &str) -> Result<(), CliError> {
        self.feed.invalidate();
        run_chat(&self.ctx, conversation_id, content).await
    }

    async fn open(&self, id: Uuid) -> Result<(), CliError> {
        let path = format!("/api/conversations/{id}");
        let json = api_request(&self.ctx, Method::GET, &path, &[], None).await?;
        let item: ConversationWithMessages = serde_json::from_value(json)?;
        println!("{}", item.conversation.display_title());
        for message in &item.messages {
            println!("{}", transcript_line(message));
        }
        Ok(())
    }
}

// =============================================================================
// SHELL
// =============================================================================

const SHELL_HELP: &str = "\
commands:
  list [search]            show conversations, optionally filtered
  more                     fetch the next page
  open <id>                print a conversation
  new [title]              create a conversation
  rename <id> <title>      rename a conversation
  delete <id>              delete a conversation
  chat <id|new> <message>  send a message and stream the reply
  quit";

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    List(Option<String>),
    More,
    Open(Uuid),
    New(Option<String>),
    Rename(Uuid, String),
    Delete(Uuid),
    Chat(Option<Uuid>, String),
    Help,
    Quit,
}

fn usage(message: &str) -> CliError {
    CliError::Usage(message.to_owned())
}

fn parse_id(word: &str) -> Result<Uuid, CliError> {
    Uuid::parse_str(word).map_err(|_| CliError::Usage(format!("not a conversation id: {word}")))
}

/// Parse one shell line. Blank lines yield `None`.
///
/// Free text after the command word (search terms, titles, messages) is kept
/// as typed apart from the single separating space.
fn parse_shell_line(line: &str) -> Result<Option<ShellCommand>, CliError> {
    let line = line.trim_start().trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let text = (!rest.is_empty()).then(|| rest.to_owned());

    let command = match word {
        "list" | "ls" => ShellCommand::List(text),
        "more" => ShellCommand::More,
        "open" => ShellCommand::Open(parse_id(rest.trim())?),
        "new" => ShellCommand::New(text),
        "rename" => {
            let (id, title) = rest
                .trim_start()
                .split_once(' ')
                .ok_or_else(|| usage("usage: rename <id> <title>"))?;
            ShellCommand::Rename(parse_id(id)?, title.to_owned())
        }
        "delete" | "rm" => ShellCommand::Delete(parse_id(rest.trim())?),
        "chat" => {
            let (target, message) = rest
                .trim_start()
                .split_once(' ')
                .filter(|(_, message)| !message.trim().is_empty())
                .ok_or_else(|| usage("usage: chat <id|new> <message>"))?;
            let id = if target == "new" { None } else { Some(parse_id(target)?) };
            ShellCommand::Chat(id, message.to_owned())
        }
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(CliError::Usage(format!("unknown command `{other}`; try `help`"))),
    };
    Ok(Some(command))
}

/// Run one command. Returns `false` when the session should end.
async fn shell_step(ws: &mut Workspace, command: ShellCommand) -> Result<bool, CliError> {
    match command {
        ShellCommand::List(search) => ws.list(search).await?,
        ShellCommand::More => ws.more().await?,
        ShellCommand::Open(id) => ws.open(id).await?,
        ShellCommand::New(title) => {
            let json = ws.create(None, title).await?;
            let id = json.get("id").and_then(Value::as_str).ok_or(CliError::MissingField("id"))?;
            println!("created {id}");
        }
        ShellCommand::Rename(id, title) => {
            ws.rename(id, &title).await?;
            println!("renamed {id}");
        }
        ShellCommand::Delete(id) => {
            ws.delete(id).await?;
            println!("deleted {id}");
        }
        ShellCommand::Chat(id, message) => ws.chat(id, &message).await?,
        ShellCommand::Help => println!("{SHELL_HELP}"),
        ShellCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn run_shell(mut ws: Workspace) -> Result<(), CliError> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.read_line(&mut line).await? == 0 {
            println!();
            return Ok(());
        }
        let step = match parse_shell_line(&line) {
            Ok(Some(command)) => shell_step(&mut ws, command).await,
            Ok(None) => Ok(true),
            Err(e) => Err(e),
        };
        match step {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

// =============================================================================
// CONVERSATION LIST
// =============================================================================

fn list_query(
    request: &FeedRequest,
    search: Option<&str>,
    limit: u32,
) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(cursor) = request.cursor() {
        query.push(("cursor", cursor.to_owned()));
    }
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        query.push(("search", search.to_owned()));
    }
    query
}

/// Sidebar text: a period label followed by its indented conversations.
fn group_lines(feed: &ConversationFeed) -> Vec<String> {
    if feed.is_empty() {
        return vec!["no conversations".to_owned()];
    }
    let mut lines = Vec::new();
    for group in chatlist::group_by_period_local(feed.conversations()) {
        lines.push(group.period.label().to_owned());
        for item in group.conversations {
            lines.push(format!("  {}", conversation_line(item)));
        }
    }
    lines
}

fn print_groups(feed: &ConversationFeed) {
    for line in group_lines(feed) {
        println!("{line}");
    }
}

fn conversation_line(item: &ConversationWithMessages) -> String {
    let title = item.conversation.display_title();
    let id = item.conversation.id;
    match item.preview() {
        Some(message) => {
            format!("{id}  {title}  {}", preview_text(&message.content, PREVIEW_CHARS))
        }
        None => format!("{id}  {title}"),
    }
}

fn transcript_line(message: &Message) -> String {
    let marker = if message
        .metadata
        .as_ref()
        .is_some_and(|m| m.get("truncated") == Some(&Value::Bool(true)))
    {
        " [truncated]"
    } else {
        ""
    };
    format!("{}: {}{marker}", message.role, message.content)
}

/// First `max` characters of `content` on one line.
fn preview_text(content: &str, max: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max).collect();
    cut.push('…');
    cut
}

// =============================================================================
// CHAT
// =============================================================================

/// What a decoded chat event means for the terminal.
#[derive(Debug, PartialEq, Eq)]
enum ChatOutput {
    Text(String),
    Done(Uuid),
    Ignore,
}

fn chat_output(event: &SseEvent) -> Result<ChatOutput, CliError> {
    match event.name() {
        "delta" => {
            let payload: Value = serde_json::from_str(&event.data)?;
            let text = payload
                .get("text")
                .and_then(Value::as_str)
                .ok_or(CliError::MissingField("text"))?;
            Ok(ChatOutput::Text(text.to_owned()))
        }
        "done" => {
            let payload: Value = serde_json::from_str(&event.data)?;
            payload
                .get("messageId")
                .and_then(Value::as_str)
                .and_then(|value| Uuid::parse_str(value).ok())
                .map(ChatOutput::Done)
                .ok_or(CliError::MissingField("messageId"))
        }
        "error" => {
            let message = serde_json::from_str::<Value>(&event.data)
                .ok()
                .and_then(|payload| {
                    payload.get("error").and_then(Value::as_str).map(ToOwned::to_owned)
                })
                .unwrap_or_else(|| event.data.clone());
            Err(CliError::ServerError { context: "chat".to_owned(), message })
        }
        _ => Ok(ChatOutput::Ignore),
    }
}

async fn run_chat(
    cli: &CliContext,
    conversation_id: Option<Uuid>,
    content: &str,
) -> Result<(), CliError> {
    let conversation_id = conversation_id.unwrap_or_else(|| {
        let id = Uuid::new_v4();
        eprintln!("conversation: {id}");
        id
    });

    let client = authed_client(cli)?;
    let response = client
        .post(api_url(&cli.base_url, "/api/chat"))
        .json(&serde_json::json!({ "conversationId": conversation_id, "content": content }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let value = response.json::<Value>().await.unwrap_or(Value::Null);
        return Err(server_error(status, &value));
    }

    let mut stdout = io::stdout();
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.push(&chunk) {
            match chat_output(&event)? {
                ChatOutput::Text(text) => {
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
                ChatOutput::Done(message_id) => {
                    writeln!(stdout)?;
                    eprintln!("reply saved: {message_id}");
                    return Ok(());
                }
                ChatOutput::Ignore => {}
            }
        }
    }
    Err(CliError::StreamEnded)
}

// =============================================================================
// HTTP
// =============================================================================

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn authed_client(cli: &CliContext) -> Result<reqwest::Client, CliError> {
    let session_token = cli
        .session_token
        .as_deref()
        .ok_or(CliError::MissingSessionToken)?;

    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&format!("session_token={session_token}"))?);

    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

fn server_error(status: reqwest::StatusCode, value: &Value) -> CliError {
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .map_or_else(|| value.to_string(), ToOwned::to_owned);
    CliError::ServerError { context: format!("HTTP {}", status.as_u16()), message }
}

async fn api_request(
    cli: &CliContext,
    method: Method,
    path: &str,
    query: &[(&'static str, String)],
    body: Option<Value>,
) -> Result<Value, CliError> {
    let client = authed_client(cli)?;
    let request = client.request(method, api_url(&cli.base_url, path)).query(query);
    let request = if let Some(json) = body { request.json(&json) } else { request };

    let response = request.send().await?;
    let status = response.status();
    let value = response
        .json::<Value>()
        .await
        .unwrap_or_else(|_| Value::Null);

    if !status.is_success() {
        return Err(server_error(status, &value));
    }

    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
