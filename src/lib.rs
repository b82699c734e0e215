//! Omni-Glass core: the snip-to-action pipeline.
//!
//! A screen region (or a typed command) becomes a menu of contextual
//! actions via a streaming LLM classifier; a chosen action becomes a
//! safety-checked, executable result via built-in handlers or sandboxed
//! MCP plugins. Capture, native OCR, and rendering are external
//! collaborators reached through the traits in [`ocr`] and the events in
//! [`events`]; the UI drives the engine through [`host::Host`].

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod heuristics;
pub mod host;
pub mod llm;
pub mod mcp;
pub mod ocr;
pub mod pipeline;
pub mod safety;

pub use host::Host;
