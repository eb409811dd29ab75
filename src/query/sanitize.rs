//! Identifier quoting and validation
//!
//! Identifiers in parsed condition templates are backtick-quoted. Table and
//! column names are validated once when models are registered.

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

/// Quote an identifier with backticks
///
/// # Example
/// ```
/// use strata::query::quote_identifier;
///
/// assert_eq!(quote_identifier("user_id"), "`user_id`");
/// assert_eq!(quote_identifier("odd`name"), "`odd``name`");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Validate a table or column name
///
/// Rules:
/// - Must not be empty
/// - Must start with a letter or underscore
/// - Can only contain ASCII letters, numbers and underscores
///
/// # Example
/// ```
/// use strata::query::validate_identifier;
///
/// assert!(validate_identifier("order_items").is_ok());
/// assert!(validate_identifier("2fast").is_err());
/// assert!(validate_identifier("drop table").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    let re = IDENTIFIER.as_ref().map_err(|e| e.to_string())?;
    if !re.is_match(name) {
        return Err(format!(
            "Invalid identifier '{}': must start with a letter or underscore and contain only letters, numbers, and underscores",
            name
        ));
    }

    Ok(())
}
