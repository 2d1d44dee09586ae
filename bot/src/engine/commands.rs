use thiserror::Error;

use crate::error::WatchError;

use super::permissions::Permissions;

/// How long the bridge keeps command replies before deleting them.
pub const REPLY_LIFETIME_SECS: u64 = 5;

/// A prefixed command pulled out of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Lowercased command name without the prefix.
    pub name: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split `content` into a command and whitespace-separated arguments.
    /// Returns `None` when the message does not start with `prefix`.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.strip_prefix(prefix)?;
        let mut words = rest.split_whitespace();
        let name = if rest.starts_with(char::is_whitespace) {
            String::new()
        } else {
            words.next().unwrap_or_default().to_lowercase()
        };
        Some(Self {
            name,
            args: words.map(str::to_string).collect(),
        })
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Info,
    Watch,
    SetPriority,
    SetPrefix,
    SetSocial,
}

/// Static description of a command.
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub arguments: &'static str,
    pub description: &'static str,
    pub permission: Permissions,
    pub guild_only: bool,
}

/// Every command, in the order `help` lists them.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        kind: CommandKind::Help,
        name: "help",
        arguments: "",
        description: "Displays the complete list of commands",
        permission: Permissions::empty(),
        guild_only: true,
    },
    CommandSpec {
        kind: CommandKind::Info,
        name: "info",
        arguments: "",
        description: "Displays the info about this bot.",
        permission: Permissions::empty(),
        guild_only: true,
    },
    CommandSpec {
        kind: CommandKind::Watch,
        name: "watch",
        arguments: "[channel id]",
        description: "Watch the Provided Voice Channel.",
        permission: Permissions::ADMINISTRATOR,
        guild_only: true,
    },
    CommandSpec {
        kind: CommandKind::SetPriority,
        name: "setpriority",
        arguments: "<member id> <priority>",
        description: "Set a member's priority level.",
        permission: Permissions::ADMINISTRATOR,
        guild_only: true,
    },
    CommandSpec {
        kind: CommandKind::SetPrefix,
        name: "setprefix",
        arguments: "<prefix>",
        description: "Change the prefix for this guild.",
        permission: Permissions::ADMINISTRATOR,
        guild_only: true,
    },
    CommandSpec {
        kind: CommandKind::SetSocial,
        name: "setsocial",
        // Filled in from the configured platforms when rendering help.
        arguments: "",
        description: "Set your social media names.",
        permission: Permissions::empty(),
        guild_only: false,
    },
];

pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Why a command was rejected. The `Display` text is the reply shown to the
/// author; nothing is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Command not found, try {prefix}help")]
    NotFound { prefix: String },
    #[error("This command can only be used in a guild text channel.")]
    GuildOnly,
    #[error("You don't have permission to run this command.")]
    MissingPermission,
    #[error("Either Provide a VoiceChannelId or use this while in Voice Channel.")]
    NotInVoice,
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("Please provide a valid MemberId.")]
    MissingMember,
    #[error("Couldn't find a member with the provided id.")]
    UnknownMember,
    #[error("Please provide a valid Platform.")]
    MissingPlatform,
    #[error("Invalid Platform provided.")]
    UnknownPlatform,
    /// Argument failed validation; carries the validator's message.
    #[error("{0}")]
    Invalid(String),
}

/// Render the help listing for `prefix`.
pub fn help_text(prefix: &str, platforms: &[String]) -> String {
    let mut out = String::from("--=== Help ===--\nComplete list of commands.\n");
    for cmd in COMMANDS {
        let arguments = match cmd.kind {
            CommandKind::SetSocial => format!("<{}> <name>", platforms.join("|")),
            _ => cmd.arguments.to_string(),
        };
        let usage = format!("{prefix}{} {arguments}", cmd.name);
        out.push_str(&format!("\n{}\n    {}", usage.trim_end(), cmd.description));
    }
    out
}

pub fn info_text() -> String {
    "--=== Info ===--\n\
     This bot stores the info of users within a given voice channel \
     for use in software such as OBS Studio."
        .to_string()
}
