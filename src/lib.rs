// Library root
// -----------
// The binary (`main.rs`) parses arguments and hands them to `ui::run`.
//
// Module responsibilities:
// - `cli`: flags and command words, merging piped stdin lines.
// - `config`: service endpoint plus the settings remembered between runs.
// - `resolve`: candidate token -> sandboxed file reference.
// - `detect`: command tokens -> command text and the set of files to upload.
// - `api`: HTTP interactions with the execution service.
// - `orchestrator`: create, stream output, list and download, with
//   cancellation and per-file failure reporting.
// - `progress`: spinners on stderr.
// - `ui`: one invocation end to end, exit status.
pub mod api;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod resolve;
pub mod ui;

pub use error::{ReshError, Result, Step};
