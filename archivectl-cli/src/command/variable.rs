use archivectl::command::Command;
use archivectl::config::VariableValue;

/// Parse `name=value` into its parts; the value's type is decided later,
/// against the registered variable's kind.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("{s:?} is not of the form name=value"))
}

#[derive(clap::Subcommand, Debug)]
pub enum VariableCommand {
    /// Show every runtime variable's current value.
    ShowAll,
    /// Show one runtime variable's current value.
    Show { name: String },
    /// Assign a runtime variable. The value is parsed against the
    /// variable's registered kind (bool, integer, string, or enum).
    Set {
        #[clap(value_parser = parse_assignment)]
        assignment: (String, String),
    },
    /// Restore a runtime variable to its default.
    Reset { name: String },
}

impl VariableCommand {
    #[must_use]
    pub fn into_command(self) -> Command {
        match self {
            VariableCommand::ShowAll => Command::ShowVariables,
            VariableCommand::Show { name } => Command::ShowVariable { name },
            VariableCommand::Set { assignment: (name, raw) } => {
                // The registry's own `set` validates this against the
                // variable's kind; here we only need a plausible guess so
                // dispatch can proceed. Booleans and integers parse
                // greedily; anything else is treated as a string.
                let value = if let Ok(b) = raw.parse::<bool>() {
                    VariableValue::Bool(b)
                } else if let Ok(n) = raw.parse::<i64>() {
                    VariableValue::Integer(n)
                } else {
                    VariableValue::String(raw)
                };
                Command::SetVariable { name, value }
            }
            VariableCommand::Reset { name } => Command::ResetVariable { name },
        }
    }
}
