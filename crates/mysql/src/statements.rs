//! SQL statement builders.
//!
//! Identifiers are validated before interpolation and string literals are
//! escaped, so every builder returns `Result`.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::{MysqlError, Result};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z0-9_$-]{1,64}$";

/// Databases the server owns; never listed or dropped.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Validate a database or user name.
///
/// # Errors
///
/// Returns `InvalidIdentifier` if the name is empty, longer than 64
/// characters, or contains anything outside `[A-Za-z0-9_$-]`.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
    let re = Regex::new(IDENTIFIER_PATTERN)
        .map_err(|e| MysqlError::invalid_identifier(kind, value, e.to_string()))?;

    if re.is_match(value) {
        Ok(())
    } else {
        Err(MysqlError::invalid_identifier(
            kind,
            value,
            "expected 1-64 characters from [A-Za-z0-9_$-]",
        ))
    }
}

/// Escape a string for use inside a single-quoted literal.
#[must_use]
pub fn escape_literal(value: &str) -> String {
    value
        .chars()
        .fold(String::with_capacity(value.len()), |mut out, c| {
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                '\0' => out.push_str("\\0"),
                other => out.push(other),
            }
            out
        })
}

fn account(username: &str) -> Result<String> {
    validate_identifier("user", username)?;
    Ok(format!("'{username}'@'%'"))
}

fn schema(database: &str) -> Result<String> {
    validate_identifier("database", database)?;
    Ok(format!("`{database}`"))
}

/// `CREATE USER IF NOT EXISTS` for a relation login.
///
/// # Errors
///
/// Returns an error if the username is invalid.
pub fn create_user(username: &str, password: &str) -> Result<String> {
    Ok(format!(
        "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}';",
        account(username)?,
        escape_literal(password)
    ))
}

/// Superuser creation with grant option. Fails on the server if the user exists.
///
/// # Errors
///
/// Returns an error if the username is invalid.
pub fn create_super_user(username: &str, password: &str) -> Result<String> {
    let account = account(username)?;
    Ok(format!(
        "CREATE USER {account} IDENTIFIED BY '{}';\n\
         GRANT ALL PRIVILEGES ON *.* TO {account} WITH GRANT OPTION;\n{}",
        escape_literal(password),
        flush_privileges()
    ))
}

/// # Errors
///
/// Returns an error if the username is invalid.
pub fn set_password(username: &str, password: &str) -> Result<String> {
    Ok(format!(
        "ALTER USER {} IDENTIFIED BY '{}';",
        account(username)?,
        escape_literal(password)
    ))
}

/// # Errors
///
/// Returns an error if the database name is invalid.
pub fn create_database(database: &str) -> Result<String> {
    Ok(format!("CREATE DATABASE IF NOT EXISTS {};", schema(database)?))
}

/// Strict variant used by the administrative action.
///
/// # Errors
///
/// Returns an error if the database name is invalid.
pub fn create_database_strict(database: &str) -> Result<String> {
    Ok(format!("CREATE DATABASE {};", schema(database)?))
}

/// Grant every privilege on one database, then flush.
///
/// # Errors
///
/// Returns an error if either name is invalid.
pub fn grant_all(username: &str, database: &str) -> Result<String> {
    Ok(format!(
        "GRANT ALL PRIVILEGES ON {}.* TO {};\n{}",
        schema(database)?,
        account(username)?,
        flush_privileges()
    ))
}

#[must_use]
pub const fn flush_privileges() -> &'static str {
    "FLUSH PRIVILEGES;"
}

/// # Errors
///
/// Returns an error if the username is invalid.
pub fn drop_user(username: &str) -> Result<String> {
    Ok(format!("DROP USER IF EXISTS {};", account(username)?))
}

/// Strict variant used by the administrative action.
///
/// # Errors
///
/// Returns an error if the username is invalid.
pub fn drop_user_strict(username: &str) -> Result<String> {
    Ok(format!("DROP USER {};", account(username)?))
}

/// One `DROP DATABASE IF EXISTS` per name, newline-joined. System schemas
/// are skipped.
///
/// # Errors
///
/// Returns an error if any name is invalid; nothing is built in that case.
pub fn drop_databases(databases: &BTreeSet<String>) -> Result<String> {
    databases
        .iter()
        .filter(|name| !is_system_schema(name))
        .map(|name| Ok(format!("DROP DATABASE IF EXISTS {};", schema(name)?)))
        .collect::<Result<Vec<_>>>()
        .map(|statements| statements.join("\n"))
}

#[must_use]
pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_accepts_allowed_characters() {
        assert!(validate_identifier("database", "app_1").is_ok());
        assert!(validate_identifier("database", "my-db$2").is_ok());
        assert!(validate_identifier("user", &"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_bad_names() {
        assert!(validate_identifier("database", "").is_err());
        assert!(validate_identifier("database", &"a".repeat(65)).is_err());
        assert!(validate_identifier("database", "app`; DROP TABLE x").is_err());
        assert!(validate_identifier("user", "bob'@'%").is_err());
        assert!(validate_identifier("database", "a.b").is_err());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_create_user_statement() -> Result<()> {
        assert_eq!(
            create_user("user_3", "s3cret")?,
            "CREATE USER IF NOT EXISTS 'user_3'@'%' IDENTIFIED BY 's3cret';"
        );
        Ok(())
    }

    #[test]
    fn test_create_super_user_statement() -> Result<()> {
        let sql = create_super_user("admin", "pw")?;
        assert!(sql.starts_with("CREATE USER 'admin'@'%' IDENTIFIED BY 'pw';"));
        assert!(sql.contains("GRANT ALL PRIVILEGES ON *.* TO 'admin'@'%' WITH GRANT OPTION;"));
        assert!(sql.ends_with("FLUSH PRIVILEGES;"));
        Ok(())
    }

    #[test]
    fn test_create_database_statements() -> Result<()> {
        assert_eq!(create_database("app1")?, "CREATE DATABASE IF NOT EXISTS `app1`;");
        assert_eq!(create_database_strict("app1")?, "CREATE DATABASE `app1`;");
        Ok(())
    }

    #[test]
    fn test_grant_statement_flushes() -> Result<()> {
        assert_eq!(
            grant_all("user_3", "app1")?,
            "GRANT ALL PRIVILEGES ON `app1`.* TO 'user_3'@'%';\nFLUSH PRIVILEGES;"
        );
        Ok(())
    }

    #[test]
    fn test_drop_statements() -> Result<()> {
        assert_eq!(drop_user("user_3")?, "DROP USER IF EXISTS 'user_3'@'%';");
        assert_eq!(drop_user_strict("user_3")?, "DROP USER 'user_3'@'%';");
        assert_eq!(set_password("user_3", "n'ew")?, "ALTER USER 'user_3'@'%' IDENTIFIED BY 'n''ew';");
        Ok(())
    }

    #[test]
    fn test_drop_databases_joins_and_skips_system_schemas() -> Result<()> {
        let names: BTreeSet<String> = ["b", "a", "mysql"].into_iter().map(String::from).collect();
        assert_eq!(
            drop_databases(&names)?,
            "DROP DATABASE IF EXISTS `a`;\nDROP DATABASE IF EXISTS `b`;"
        );
        assert_eq!(drop_databases(&BTreeSet::new())?, "");
        Ok(())
    }

    #[test]
    fn test_drop_databases_rejects_any_invalid_name() {
        let names: BTreeSet<String> = ["ok", "not ok"].into_iter().map(String::from).collect();
        assert!(drop_databases(&names).is_err());
    }
}
