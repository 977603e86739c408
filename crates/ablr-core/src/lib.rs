//! ablr core
//!
//! The engine under ABL (Progress 4GL) refactorings:
//! - literal scanner lists per source file and the mark/sweep edits over them
//! - synchronization of syntax-tree nodes with those scanner tokens
//! - expansion trees for `{...}` include and macro references, with every
//!   `&IF` branch kept
//! - rollback of modified files

pub mod batch;
pub mod config;
pub mod error;
pub mod lexer;
pub mod prepro;
pub mod result;
pub mod rollback;
pub mod scan;
pub mod store;
pub mod sync;
pub mod token;

// Re-export commonly used types
pub use batch::{BatchReport, BatchRunner, Refactoring, RefactorContext, Target};
pub use config::{ConfigLoader, Opsys, RefactorConfig};
pub use error::{ErrorKind, RefactorError};
pub use prepro::{ExpansionTree, Processor};
pub use result::{Result, ResultExt};
pub use rollback::{ChangeKind, Rollback, RollbackManager};
pub use scan::{AblScanner, LooseChain, Scan, ScanManager, SourceScanner};
pub use store::{HiddenToken, Node, NodeId, Position, TokenStore, TreeBuilder};
pub use sync::{
    IncludeListing, IncludeParent, IncludeReference, get_insert_point_in_file,
    get_section_with_comments, hidden_before_sync, msync_branch, nsync,
};
pub use token::{FileIndex, FileTable, TokenKind};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    init_tracing_with_default("ablr=info");
}

/// Like [`init_tracing`], with a filter used when `RUST_LOG` is unset
pub fn init_tracing_with_default(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
