//! Table command implementation.

use serde::Serialize;
use txscope_core::{decide, Action, Propagation};

/// One row of the decision table.
#[derive(Debug, Serialize)]
pub struct TableRow {
    /// Propagation mode name.
    pub propagation: &'static str,
    /// Action when a scope is active.
    pub scope_present: String,
    /// Action when no scope is active.
    pub scope_absent: String,
    /// Whether the mode is reserved.
    pub reserved: bool,
}

/// Builds the table from [`decide`].
pub fn rows() -> Vec<TableRow> {
    Propagation::ALL
        .into_iter()
        .map(|mode| TableRow {
            propagation: mode.as_str(),
            scope_present: describe(&decide(Some(()), mode)),
            scope_absent: describe(&decide(None, mode)),
            reserved: mode.is_reserved(),
        })
        .collect()
}

fn describe(action: &Action<()>) -> String {
    match action {
        Action::Reject(reason) => format!("reject ({reason})"),
        other => other.label().replace('_', " "),
    }
}

/// Runs the table command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows = rows();
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        _ => print_text_output(&rows),
    }
    Ok(())
}

fn print_text_output(rows: &[TableRow]) {
    println!("Propagation Decision Table");
    println!("==========================");
    println!();
    println!("{:<14} {:<24} {}", "MODE", "SCOPE PRESENT", "SCOPE ABSENT");
    for row in rows {
        let name = if row.reserved {
            format!("{}*", row.propagation)
        } else {
            row.propagation.to_string()
        };
        println!("{:<14} {:<24} {}", name, row.scope_present, row.scope_absent);
    }
    println!();
    println!("* reserved, rejected when options are built");
}
