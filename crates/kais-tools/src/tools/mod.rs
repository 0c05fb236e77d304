//! Built-in tools (§4.2). Each is a self-contained module implementing `Tool`;
//! wiring lives in `create_default_registry` in `../lib.rs`.

pub mod bash;
pub mod commit_file;
pub mod read_file;
pub mod send_message;
pub mod spawn_cell;
pub mod write_file;
