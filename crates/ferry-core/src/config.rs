//! Flat, dotted-key configuration consumed by the adapter configurator.
//!
//! Keys follow git's rules: the first segment (section) and the last segment
//! (variable) are case-insensitive, everything in between (the subsection,
//! e.g. `customtransfer.<name>`) is case-sensitive.

use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Somewhere configuration values come from.
pub trait ConfigSource {
    /// Look up a single value by its dotted key.
    fn get(&self, key: &str) -> Option<&str>;

    /// Every `(key, value)` pair, in a stable order.
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_>;
}

/// In-memory configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    values: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flatten a TOML document into dotted keys.
    ///
    /// `[lfs.customtransfer.agent] path = "x"` becomes
    /// `lfs.customtransfer.agent.path = x`. Scalars are stringified; arrays
    /// are not part of the key space and are skipped.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut map = Self::new();
        map.flatten_table("", &table);
        Ok(map)
    }

    fn flatten_table(&mut self, prefix: &str, table: &toml::Table) {
        for (key, value) in table {
            let key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                toml::Value::Table(inner) => self.flatten_table(&key, inner),
                toml::Value::String(s) => self.insert(&key, s.clone()),
                toml::Value::Integer(i) => self.insert(&key, i.to_string()),
                toml::Value::Float(f) => self.insert(&key, f.to_string()),
                toml::Value::Boolean(b) => self.insert(&key, b.to_string()),
                toml::Value::Datetime(d) => self.insert(&key, d.to_string()),
                toml::Value::Array(_) => {
                    tracing::debug!(key = %key, "skipping array value in configuration");
                }
            }
        }
    }

    /// Parse `git config --list` output: one `key=value` per line. A line
    /// with no `=` is a valueless key, which git treats as boolean true.
    /// Later lines override earlier ones.
    pub fn from_git_config_list(output: &str) -> Self {
        let mut map = Self::new();
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            match line.split_once('=') {
                Some((key, value)) => map.insert(key, value),
                None => map.insert(line, ""),
            }
        }
        map
    }
}

impl ConfigSource for ConfigMap {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(self.values.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key.as_ref(), value);
        }
        map
    }
}

/// Lowercase the section and variable of a dotted key, leaving the
/// subsection untouched.
pub fn normalize_key(key: &str) -> String {
    let Some((section, rest)) = key.split_once('.') else {
        return key.to_ascii_lowercase();
    };
    match rest.rsplit_once('.') {
        Some((subsection, variable)) => format!(
            "{}.{subsection}.{}",
            section.to_ascii_lowercase(),
            variable.to_ascii_lowercase()
        ),
        None => format!(
            "{}.{}",
            section.to_ascii_lowercase(),
            rest.to_ascii_lowercase()
        ),
    }
}

/// Interpret a git-style boolean. An empty value is true.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Split an argument string the way a POSIX shell would for simple cases:
/// whitespace separates words, single quotes are literal, double quotes
/// group and honour backslash escapes of `"`, `\`, `$` and `` ` ``.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => current.push('\\'),
                },
                _ => current.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        args.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_subsection_case() {
        assert_eq!(
            normalize_key("LFS.customtransfer.MyAgent.PATH"),
            "lfs.customtransfer.MyAgent.path"
        );
        assert_eq!(normalize_key("Core.Editor"), "core.editor");
        assert_eq!(normalize_key("single"), "single");
    }

    #[test]
    fn lookup_is_case_insensitive_on_section_and_variable() {
        let map: ConfigMap = [("lfs.customtransfer.Agent.path", "/bin/agent")]
            .into_iter()
            .collect();
        assert_eq!(map.get("LFS.customtransfer.Agent.Path"), Some("/bin/agent"));
        assert_eq!(map.get("lfs.customtransfer.agent.path"), None);
    }

    #[test]
    fn toml_flattens_to_dotted_keys() {
        let map = ConfigMap::from_toml_str(
            r#"
            [lfs.customtransfer.testagent]
            path = "/usr/local/bin/agent"
            args = "--verbose"
            concurrent = false
            timeout = 30
            tags = ["a", "b"]
            "#,
        )
        .unwrap();
        assert_eq!(map.get("lfs.customtransfer.testagent.path"), Some("/usr/local/bin/agent"));
        assert_eq!(map.get("lfs.customtransfer.testagent.args"), Some("--verbose"));
        assert_eq!(map.get("lfs.customtransfer.testagent.concurrent"), Some("false"));
        assert_eq!(map.get("lfs.customtransfer.testagent.timeout"), Some("30"));
        assert_eq!(map.get("lfs.customtransfer.testagent.tags"), None);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = ConfigMap::from_toml_str("[unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn git_config_list_parsing() {
        let map = ConfigMap::from_git_config_list(
            "core.bare=false\n\
             lfs.customtransfer.a.path=/bin/a\n\
             lfs.customtransfer.a.args=--url=https://x\n\
             lfs.customtransfer.a.concurrent\n\
             lfs.customtransfer.a.path=/bin/a2\n",
        );
        assert_eq!(map.get("lfs.customtransfer.a.path"), Some("/bin/a2"));
        assert_eq!(map.get("lfs.customtransfer.a.args"), Some("--url=https://x"));
        assert_eq!(map.get("lfs.customtransfer.a.concurrent"), Some(""));
    }

    #[test]
    fn bools_follow_git_spelling() {
        for value in ["true", "YES", "on", "1", ""] {
            assert!(parse_bool("k", value).unwrap(), "{value:?}");
        }
        for value in ["false", "No", "OFF", "0"] {
            assert!(!parse_bool("k", value).unwrap(), "{value:?}");
        }
        assert!(matches!(
            parse_bool("k", "maybe"),
            Err(ConfigError::InvalidBool { .. })
        ));
    }

    #[test]
    fn split_args_plain_words() {
        assert_eq!(split_args("  --a  b\tc "), vec!["--a", "b", "c"]);
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn split_args_quotes_group_words() {
        assert_eq!(
            split_args(r#"--name "two words" 'single $x' mixed"quote"d"#),
            vec!["--name", "two words", "single $x", "mixedquoted"]
        );
        assert_eq!(split_args(r#"'' """#), vec!["", ""]);
    }

    #[test]
    fn split_args_escapes() {
        assert_eq!(split_args(r#"a\ b "c\"d" "e\nf""#), vec!["a b", "c\"d", "e\\nf"]);
    }
}
