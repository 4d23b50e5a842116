// src/console/command.rs

//! Parsing of front-end input lines.

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/host <source_ref>`; `None` when the argument is missing.
    Host(Option<String>),
    /// `/stop <id>`
    Stop(Option<String>),
    List,
    VarsMenu,
    ShowVars,
    EditVar,
    AddVar,
    DelVar,
    Cancel,
    /// `/import <path>`: bulk import from a `.env` file.
    Import(Option<String>),
    /// `/save`: persist the store now.
    Save,
    Unknown(String),
    /// Anything that is not a command: a reply inside a conversation.
    Text(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            // Keep the value part of `KEY=value` replies verbatim.
            return Command::Text(line.trim_end_matches(['\r', '\n']).to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::to_string);

        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "host" => Command::Host(arg),
            "stop" => Command::Stop(arg),
            "list" => Command::List,
            "vars" => Command::VarsMenu,
            "show_vars" => Command::ShowVars,
            "edit_var" => Command::EditVar,
            "add_var" => Command::AddVar,
            "del_var" => Command::DelVar,
            "cancel" => Command::Cancel,
            "import" => Command::Import(arg),
            "save" => Command::Save,
            other => Command::Unknown(other.to_string()),
        }
    }
}
