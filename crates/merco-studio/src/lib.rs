//! merco-studio: a line-oriented driver for a workspace session.
//!
//! Browse the remote strategy tree, open files into tabs, edit and save
//! them. Autosave runs in the background; its outcomes are reported after
//! the next command.

pub mod config;

use std::fmt::Display;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::{self, error::TryRecvError};

use merco_session::{HttpStore, MemoryStore, SessionEvent, SourceStore, Workspace, path};

pub use config::StudioConfig;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "merco-studio", version, about = "Edit merco strategy sources")]
pub struct Cli {
    /// Work against an in-process store instead of the server.
    #[arg(long)]
    pub memory: bool,

    /// Server base URL. Overrides the config file and MERCO_SERVER_URL.
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Config file to use instead of $XDG_CONFIG_HOME/merco/studio.toml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only save on request.
    #[arg(long)]
    pub no_autosave: bool,
}

/// REPL state: one workspace and its save notifications.
pub struct Repl {
    workspace: Workspace,
    events: broadcast::Receiver<SessionEvent>,
    color: bool,
    quit: bool,
}

impl Repl {
    pub fn new(workspace: Workspace) -> Self {
        let events = workspace.session().subscribe();
        Self {
            workspace,
            events,
            color: false,
            quit: false,
        }
    }

    /// Enable ANSI colors in output.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// True once `quit` succeeded.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Run one command line. Save notices that arrived since the last line
    /// are appended to the output.
    pub async fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let result = self.dispatch(line.trim()).await;
        let notices = self.take_notices();
        let output = result?;
        if notices.is_empty() {
            return Ok(output);
        }
        let mut text = output.unwrap_or_default();
        for notice in notices {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&notice);
        }
        Ok(Some(text))
    }

    /// Drain pending save notifications, formatted for display.
    pub fn take_notices(&mut self) -> Vec<String> {
        let mut notices = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => notices.push(self.format_event(&event)),
                Err(TryRecvError::Lagged(missed)) => {
                    notices.push(format!("({missed} save notices dropped)"));
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        notices
    }

    async fn dispatch(&mut self, line: &str) -> Result<Option<String>> {
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "help" | "?" => Ok(Some(HELP_TEXT.to_string())),
            "ls" => self.list(rest, false).await,
            "reload" => self.list(rest, true).await,
            "open" => self.open(rest).await,
            "tabs" => self.show_tabs().await,
            "select" => {
                let index = self.tab_arg(rest).await?;
                self.workspace.session().select_tab(index).await?;
                self.show_tabs().await
            }
            "close" => {
                let index = self.tab_arg(rest).await?;
                let tab = self.workspace.session().close_tab(index).await?;
                if tab.is_dirty {
                    Ok(Some(format!("closed {} (unsaved edits discarded)", tab.path)))
                } else {
                    Ok(Some(format!("closed {}", tab.path)))
                }
            }
            "cat" => {
                let index = self.tab_arg(rest).await?;
                let tab = self.workspace.session().tab(index).await;
                let tab = tab.with_context(|| format!("no tab at index {index}"))?;
                Ok(Some(tab.content))
            }
            "edit" => {
                let index = self.active_tab().await?;
                let content = rest.replace("\\n", "\n").replace("\\t", "\t");
                self.workspace.session().edit_content(index, content).await?;
                Ok(None)
            }
            "save" if rest == "all" => {
                let failures = self.workspace.session().save_all().await;
                if failures.is_empty() {
                    Ok(None)
                } else {
                    bail!("{} tab(s) could not be saved", failures.len())
                }
            }
            "save" => {
                let index = self.tab_arg(rest).await?;
                self.workspace.session().save_tab(index).await?;
                Ok(None)
            }
            "new" => self.create(rest).await,
            "rm" => {
                let target = path::normalize(require(rest, "rm <path>")?);
                self.workspace.tree().delete(&target).await?;
                self.invalidate_parent(&target).await;
                self.workspace.tree().invalidate(&target).await;
                Ok(Some(format!("removed {target}")))
            }
            "mv" => {
                let Some((from, to)) = rest.split_once(char::is_whitespace) else {
                    bail!("usage: mv <from> <to>");
                };
                let from = path::normalize(from);
                let to = path::normalize(to.trim());
                self.workspace.tree().move_path(&from, &to).await?;
                self.invalidate_parent(&from).await;
                self.invalidate_parent(&to).await;
                Ok(Some(format!("moved {from} -> {to}")))
            }
            "quit" | "exit" => self.finish().await,
            "quit!" => {
                self.quit = true;
                Ok(None)
            }
            other => Ok(Some(format!("unknown command: {other} (try `help`)"))),
        }
    }

    async fn list(&self, dir: &str, reload: bool) -> Result<Option<String>> {
        let tree = self.workspace.tree();
        if reload {
            tree.invalidate(dir).await;
        }
        let children = tree.expand(dir).await?;
        if children.is_empty() {
            return Ok(Some("(empty)".to_string()));
        }
        let lines: Vec<String> = children
            .iter()
            .map(|node| {
                if node.is_dir() {
                    self.styled(format!("{}/", node.name), Style::new().blue().bold())
                } else {
                    node.name.clone()
                }
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    async fn open(&self, file_path: &str) -> Result<Option<String>> {
        let file_path = require(file_path, "open <path>")?;
        let outcome = self.workspace.open(file_path).await?;
        if outcome.created {
            self.show_tabs().await
        } else {
            Ok(Some(format!("switched to tab {}", outcome.index)))
        }
    }

    async fn create(&self, args: &str) -> Result<Option<String>> {
        let args = require(args, "new <path> [content]")?;
        let (target, content) = match args.split_once(char::is_whitespace) {
            Some((target, content)) => (target, content.trim().replace("\\n", "\n")),
            None => (args, String::new()),
        };
        let target = path::normalize(target);
        self.workspace.tree().create(&target, &content).await?;
        self.invalidate_parent(&target).await;
        Ok(Some(format!("created {target}")))
    }

    async fn show_tabs(&self) -> Result<Option<String>> {
        let session = self.workspace.session();
        let tabs = session.tabs().await;
        if tabs.is_empty() {
            return Ok(Some("(no open tabs)".to_string()));
        }
        let active = session.active_index().await;
        let lines: Vec<String> = tabs
            .iter()
            .enumerate()
            .map(|(i, tab)| {
                let marker = if active == Some(i) { "*" } else { " " };
                let dirty = if tab.is_dirty {
                    format!(" {}", self.styled("[+]", Style::new().yellow()))
                } else {
                    String::new()
                };
                format!("{marker} {i}: {}{dirty}", tab.display_name)
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    /// Save everything and mark the REPL for exit. Refuses if a save fails.
    async fn finish(&mut self) -> Result<Option<String>> {
        let failures = self.workspace.session().save_all().await;
        if !failures.is_empty() {
            bail!(
                "{} tab(s) could not be saved; fix and retry, or `quit!` to discard",
                failures.len()
            );
        }
        self.quit = true;
        Ok(None)
    }

    async fn invalidate_parent(&self, target: &str) {
        let parent = path::parent(target).unwrap_or_default();
        self.workspace.tree().invalidate(parent).await;
    }

    async fn active_tab(&self) -> Result<usize> {
        self.workspace
            .session()
            .active_index()
            .await
            .context("no tab is open")
    }

    /// Tab index from `arg`, or the active tab if `arg` is empty.
    async fn tab_arg(&self, arg: &str) -> Result<usize> {
        if arg.is_empty() {
            return self.active_tab().await;
        }
        arg.parse()
            .with_context(|| format!("not a tab index: {arg}"))
    }

    fn format_event(&self, event: &SessionEvent) -> String {
        match event {
            SessionEvent::Saved { path, clean: true } => format!("saved {path}"),
            SessionEvent::Saved { path, clean: false } => {
                format!("saved {path} (newer edits pending)")
            }
            SessionEvent::SaveFailed { error, .. } => {
                self.styled(format!("{error}"), Style::new().red())
            }
        }
    }

    fn styled(&self, text: impl Display, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

fn require<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(arg)
}

const HELP_TEXT: &str = r#"merco studio

Tree:
  ls [dir]               List a directory (cached after the first fetch)
  reload [dir]           Re-fetch a directory
  new <path> [content]   Create a file (\n for newlines)
  rm <path>              Delete a file or directory
  mv <from> <to>         Move or rename

Tabs (index defaults to the active tab):
  open <path>            Open a file, or switch to it if already open
  tabs                   List open tabs (* active, [+] unsaved)
  select <n>             Make tab n active
  cat [n]                Show a tab's buffer
  edit <content>         Replace the active buffer (\n for newlines)
  save [n | all]         Save now
  close [n]              Close a tab, discarding unsaved edits

  help                   Show this help
  quit                   Save everything and exit (quit! skips saving)
"#;

/// Run the REPL until `quit` or end of input.
pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(file) => StudioConfig::load_from(file)?,
        None => StudioConfig::load()?,
    };
    let mut config = config.with_server_override(cli.server.clone());
    if cli.no_autosave {
        config.autosave = false;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let (store, origin): (Arc<dyn SourceStore>, String) = if cli.memory {
        (Arc::new(MemoryStore::new()), "in-memory store".to_string())
    } else {
        let store = HttpStore::with_timeout(&config.server_url, config.timeout());
        (Arc::new(store), config.server_url.clone())
    };
    tracing::info!(origin = %origin, autosave = config.autosave, "starting session");

    let workspace = Workspace::new(store, config.session_config());
    let mut repl = Repl::new(workspace).with_color(std::io::stdout().is_terminal());

    println!("merco studio v{} ({origin})", env!("CARGO_PKG_VERSION"));
    println!("Type help for commands, quit to exit.\n");

    let mut rl = DefaultEditor::new().context("Failed to create editor")?;
    let history = config::history_path();
    let _ = rl.load_history(&history);

    loop {
        match rl.readline("merco> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match runtime.block_on(repl.process_line(&line)) {
                    Ok(Some(output)) => println!("{output}"),
                    Ok(None) => {}
                    Err(e) => {
                        eprintln!("{} {e:#}", repl.styled("Error:", Style::new().red().bold()))
                    }
                }
                if repl.should_quit() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                // End of input still persists edits.
                if let Err(e) = runtime.block_on(repl.process_line("quit")) {
                    eprintln!("Error: {e:#}");
                }
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    if let Some(parent) = history.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history);

    Ok(())
}
