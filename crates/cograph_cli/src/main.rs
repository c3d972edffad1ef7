//! Inspection entry point.
//!
//! # Responsibility
//! - Verify `cograph_core` linkage with a deterministic ping/version line.
//! - Given a stack store path (or `--default` for the per-user store), list
//!   stack names with undo/redo depths.

use cograph_core::db::{default_db_path, open_db, open_default_db};
use cograph_core::{SqliteUndoStackStore, StackRole, UndoStackRepository};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("cograph_core ping={}", cograph_core::ping());
    println!("cograph_core version={}", cograph_core::core_version());

    let Some(arg) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match list_stacks(&arg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn list_stacks(arg: &str) -> Result<(), Box<dyn Error>> {
    let (conn, db_path) = if arg == "--default" {
        (open_default_db()?, default_db_path().display().to_string())
    } else {
        (open_db(arg)?, arg.to_string())
    };
    let store = SqliteUndoStackStore::try_new(&conn)?;
    let names = store.stack_names()?;
    if names.is_empty() {
        println!("no stacks in {db_path}");
        return Ok(());
    }
    for name in names {
        println!(
            "{name} undo={} redo={}",
            store.stack_depth(StackRole::Undo, &name)?,
            store.stack_depth(StackRole::Redo, &name)?
        );
    }
    Ok(())
}
