use crate::core::decision::Family;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for fw-bouncer
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Configuration parsed but holds an unusable value
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// The firewall control binary is not installed or not resolvable
    #[error("{} command not found: {}", .path.display(), .reason)]
    ToolNotFound { path: PathBuf, reason: String },

    /// The kernel-side device the engine talks to is missing
    #[error("{} device not found: {}", .path.display(), .reason)]
    DeviceNotFound { path: PathBuf, reason: String },

    /// A required table/set does not exist on the engine side
    #[error("table {table} doesn't exist")]
    TableMissing { table: String },

    /// A tool invocation exited non-zero
    #[error("{0}")]
    Tool(#[from] ToolFailure),

    /// Decision duration could not be parsed
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Decision value is not an IP address or network
    #[error("invalid address '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    /// A decision failed to apply to a family table
    #[error("failed to {op} '{value}' on {family} table: {source}")]
    Decision {
        op: &'static str,
        value: String,
        family: Family,
        #[source]
        source: Box<Error>,
    },

    /// Engine initialisation failed for one family
    #[error("{engine} init failed for {family}: {source}")]
    Init {
        engine: &'static str,
        family: Family,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether the error is confined to the decision that raised it.
    ///
    /// Malformed decisions and one-off spawn failures leave the backend
    /// usable, so a sync loop should log them and move on. A firewall tool
    /// that has disappeared fails every later decision too.
    pub fn is_decision_scoped(&self) -> bool {
        match self {
            Error::InvalidDuration { .. } | Error::InvalidValue { .. } => true,
            Error::Decision { source, .. } => !matches!(**source, Error::ToolNotFound { .. }),
            _ => false,
        }
    }
}

/// A tool invocation that ran but exited non-zero.
///
/// Carries the combined stdout/stderr so callers can surface it in
/// diagnostics without re-running the command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` exited with {}: {}", exit_label(*.exit_code), .output.trim())]
pub struct ToolFailure {
    pub command: String,
    pub exit_code: Option<i32>,
    pub output: String,
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

impl ToolFailure {
    /// Operator hint for this failure, derived from the captured output.
    pub fn hint(&self) -> ErrorTranslation {
        ToolErrorPattern::match_error(&self.output)
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known failure patterns of pfctl, ipset and nft output
pub struct ToolErrorPattern;

impl ToolErrorPattern {
    /// Matches tool output against known patterns and returns a translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall tables")
                .with_suggestion("Run the bouncer as root")
                .with_suggestion("Check that CAP_NET_ADMIN is available (Linux)");
        }

        // pfctl: "pfctl: Table does not exist." / nft: "No such file or directory" on list set
        if lower.contains("table does not exist")
            || lower.contains("set does not exist")
            || lower.contains("the set with the given name does not exist")
        {
            return ErrorTranslation::new("Firewall table or set does not exist")
                .with_suggestion("Create the table in the firewall configuration before starting")
                .with_suggestion("For pf: declare `table <crowdsec-blacklists> persist` in pf.conf");
        }

        if lower.contains("pf not enabled") || lower.contains("/dev/pf") {
            return ErrorTranslation::new("Packet filter is not enabled")
                .with_suggestion("Enable pf: pfctl -e");
        }

        if lower.contains("invalid argument")
            || lower.contains("syntax error")
            || lower.contains("cannot be parsed")
            || lower.contains("resolve")
        {
            return ErrorTranslation::new("The engine rejected the address")
                .with_suggestion("Check that the decision value is a valid IP address or CIDR")
                .with_suggestion("Check that the address family matches the table");
        }

        if lower.contains("already added") || lower.contains("already exists") {
            return ErrorTranslation::new("Address is already present in the table");
        }

        if lower.contains("not added") || lower.contains("not in set") {
            return ErrorTranslation::new("Address is not present in the table");
        }

        if lower.contains("netlink") || lower.contains("kernel module") {
            return ErrorTranslation::new("Communication error with the kernel")
                .with_suggestion("Check kernel modules: lsmod | grep -e nf_tables -e ip_set");
        }

        ErrorTranslation::new(format!("Firewall tool error: {}", msg.trim()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
