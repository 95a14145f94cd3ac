//! Support code for the `idiomstore` command-line tool.
//!
//! The binary itself only parses arguments and prints JSON; the operations
//! that need more than one accessor call live here.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import` | Create or update idioms from a JSON file |
//! | `get` | Show one idiom, by id or implementation id |
//! | `list` | List idioms, optionally for one language |
//! | `search` | Full-text search, favorite languages first |
//! | `recent` / `popular` | Ranked lists |
//! | `langs` | Languages having implementations |
//! | `random` | A random idiom |
//! | `delete` / `delete-impl` | Remove an idiom or one implementation |
//! | `history` | Snapshots of an idiom |
//! | `reindex` | Rebuild the search index |
//! | `toggles` | Show or set application toggles |
//! | `flush-cache` | Drop every cache entry |
//!
//! # Example Usage
//!
//! ```bash
//! idiomstore import idioms.json
//! idiomstore search sort map --lang rust --lang go --others
//! idiomstore toggles set writable=true greetings=false
//! ```

mod import;
mod toggles;

pub use import::{ImportSummary, import_idioms, read_idioms};
pub use toggles::{apply_toggles, parse_toggle};
