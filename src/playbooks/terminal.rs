use crate::error::{SocError, SocResult};

/// Operator command accepted by the SOC terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    BlockIp(String),
    IsolateUser(String),
}

impl TerminalCommand {
    /// Parse `block ip <address>` or `isolate user <id>`.
    ///
    /// Verbs are case-insensitive; the target is kept as typed.
    pub fn parse(input: &str) -> SocResult<Self> {
        let mut parts = input.split_whitespace();
        let verb = parts.next().map(str::to_ascii_lowercase);
        let noun = parts.next().map(str::to_ascii_lowercase);
        let target = parts.next();

        if parts.next().is_some() {
            return Err(unknown(input));
        }

        match (verb.as_deref(), noun.as_deref(), target) {
            (Some("block"), Some("ip"), Some(ip)) => Ok(Self::BlockIp(ip.to_string())),
            (Some("isolate"), Some("user"), Some(user)) => Ok(Self::IsolateUser(user.to_string())),
            (Some("block"), Some("ip"), None) => {
                Err(SocError::validation("command", "block ip requires an address"))
            }
            (Some("isolate"), Some("user"), None) => {
                Err(SocError::validation("command", "isolate user requires a user id"))
            }
            _ => Err(unknown(input)),
        }
    }
}

fn unknown(input: &str) -> SocError {
    SocError::validation(
        "command",
        format!(
            "Unknown command '{}'. Use 'block ip <address>' or 'isolate user <id>'",
            input.trim()
        ),
    )
}
