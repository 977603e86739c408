//! Terminal output for tokens, include listings and change lists

use ablr_core::rollback::FileChange;
use ablr_core::sync::{IncludeListing, IncludeParent};
use ablr_core::{ChangeKind, FileTable, Node};
use colored::*;

/// One literal token as `line:col KIND "text"`
pub fn print_token(node: &Node) {
    println!(
        "{}:{} {} {:?}",
        node.line,
        node.column,
        node.kind.to_string().cyan(),
        node.text
    );
}

pub fn print_include_listing(listing: &IncludeListing, files: &FileTable) {
    if listing.is_empty() {
        println!("No include references");
        return;
    }
    for reference in listing.references() {
        let included = files.display_name(reference.file);
        match reference.parent {
            IncludeParent::File(parent) => println!(
                "{}:{}:{} -> {}",
                files.display_name(parent),
                reference.line,
                reference.column,
                included.green()
            ),
            IncludeParent::Macro => {
                println!("{} -> {}", "(macro)".dimmed(), included.green())
            }
        }
    }
}

pub fn print_changes(changes: &[FileChange], with_diff: bool) {
    for change in changes {
        let label = match change.kind {
            ChangeKind::New => change.kind.label().green(),
            ChangeKind::Modified => change.kind.label().yellow(),
            ChangeKind::Deleted => change.kind.label().red(),
        };
        println!("{} {}", label.bold(), change.path.display());
        if with_diff && let Some(diff) = &change.diff {
            print!("{diff}");
        }
    }
}
