//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format.
pub fn print<T: Serialize + std::fmt::Display>(value: &T, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", value),
        },
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => println!("{}", status_json("success", message)),
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => eprintln!("{}", status_json("error", message)),
    }
}

fn status_json(status: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "status": status, "message": message })
}

/// Format a labelled row.
pub fn row(label: &str, value: &str) -> String {
    format!("{:<10} {}", format!("{}:", label), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_escapes_message() {
        let value = status_json("error", r#"bad "quote""#);
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], r#"bad "quote""#);
        assert!(value.to_string().contains(r#"bad \"quote\""#));
    }

    #[test]
    fn test_row_alignment() {
        assert_eq!(row("Auth", "logged in"), "Auth:      logged in");
    }
}
