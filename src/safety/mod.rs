//! Safety layer: PII redaction for outbound prompts and a command blocklist
//! for inbound LLM suggestions.

pub mod command_check;
pub mod redact;

pub use command_check::{is_command_safe, is_path_safe, CommandCheck};
pub use redact::{redact_sensitive_data, RedactionOutcome};
