//! Secret references in `config.toml`.
//!
//! `client_id` and `client_secret` may point at a secret instead of holding
//! it: `env::VAR` reads an environment variable, `pass::entry` takes the
//! first line of `pass show entry`. Anything else is used verbatim.

use std::process::{Command, Stdio};

/// A parsed config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// Value stored directly in the file.
    Plain(&'a str),
    /// `env::VAR`
    Env(&'a str),
    /// `pass::entry`
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns true if the value is not stored in the file itself.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    pub fn resolve(&self) -> Result<String, String> {
        match self {
            Self::Plain(value) => Ok((*value).to_string()),
            Self::Env(var) => std::env::var(var)
                .map_err(|_| format!("environment variable `{}` is not set", var)),
            Self::Pass(entry) => read_pass_entry(entry),
        }
    }
}

/// Resolves `value`, following `env::` and `pass::` references.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn read_pass_entry(entry: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("could not run `pass show {}`: {}", entry, e))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {}` exited with {}: {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`pass show {}` printed nothing", entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_prefixes() {
        assert_eq!(SecretRef::parse("env::X"), SecretRef::Env("X"));
        assert_eq!(SecretRef::parse("pass::google/id"), SecretRef::Pass("google/id"));
        assert_eq!(
            SecretRef::parse("123.apps.googleusercontent.com"),
            SecretRef::Plain("123.apps.googleusercontent.com")
        );
        assert!(!SecretRef::parse("plain").is_reference());
        assert!(SecretRef::parse("env::X").is_reference());
    }

    #[test]
    fn plain_values_resolve_to_themselves() {
        assert_eq!(resolve("GOCSPX-secret").unwrap(), "GOCSPX-secret");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_reference_reads_variable() {
        unsafe {
            std::env::set_var("_GWS_SECRET_TEST_VALUE", "from-env");
        }
        assert_eq!(resolve("env::_GWS_SECRET_TEST_VALUE").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_GWS_SECRET_TEST_VALUE");
        }
    }

    #[test]
    fn env_reference_to_unset_variable_fails() {
        let err = resolve("env::_GWS_SECRET_TEST_NEVER_SET_4711").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn pass_reference_to_missing_entry_fails() {
        assert!(resolve("pass::gworkspace/test/entry/that/does/not/exist").is_err());
    }
}
