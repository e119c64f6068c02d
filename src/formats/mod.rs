//! Parsers for 3DS binary metadata.
//!
//! Parsers follow the same conventions:
//!
//! * **Explicit byte offsets** - every field is read big-endian from a known
//!   position through the helpers in `utils`; nothing is reinterpreted from
//!   raw memory.
//! * **Bounds first** - declared sizes are checked against the buffer before
//!   any record is read, so a truncated input yields an error instead of a
//!   partial structure.
//! * **Read-only results** - parsed structures are immutable snapshots.
//!
//! ## Format overview
//!
//! | Module  | Format | Description |
//! |---------|--------|-------------|
//! | [`tmd`] | TMD    | Title metadata; version info and per-content ID, flags, size, hash and counter |

pub mod tmd;
