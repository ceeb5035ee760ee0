//! MCP server configuration and `${var}` substitution.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// How to reach one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpServerConfig {
    /// Spawned subprocess speaking newline-delimited JSON-RPC on stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Hosted server speaking JSON-RPC over HTTP POST.
    #[serde(alias = "streamable-http", alias = "streamable_http")]
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl McpServerConfig {
    /// Return a copy with `${name}` placeholders replaced from `vars`.
    ///
    /// Unknown placeholders are left untouched.
    pub fn substitute(&self, vars: &HashMap<String, String>) -> Self {
        let sub = |s: &String| substitute_vars(s, vars);
        match self {
            Self::Stdio { command, args, env } => Self::Stdio {
                command: sub(command),
                args: args.iter().map(sub).collect(),
                env: env.iter().map(|(k, v)| (k.clone(), sub(v))).collect(),
            },
            Self::Http { url, headers } => Self::Http {
                url: sub(url),
                headers: headers.iter().map(|(k, v)| (k.clone(), sub(v))).collect(),
            },
        }
    }

    /// Transport name for logs and metrics.
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
        }
    }
}

fn substitute_vars(input: &str, vars: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), "42".to_string());
        vars.insert("user_name".to_string(), "bob".to_string());
        vars
    }

    #[test]
    fn test_substitute_stdio_args_and_env() {
        let config = McpServerConfig::Stdio {
            command: "sandbox-server".to_string(),
            args: vec!["--task".to_string(), "${task_id}".to_string()],
            env: BTreeMap::from([("OWNER".to_string(), "user-${user_name}".to_string())]),
        };
        let McpServerConfig::Stdio { args, env, .. } = config.substitute(&vars()) else {
            panic!("expected stdio config");
        };
        assert_eq!(args, vec!["--task", "42"]);
        assert_eq!(env["OWNER"], "user-bob");
    }

    #[test]
    fn test_substitute_http_url_and_headers() {
        let config = McpServerConfig::Http {
            url: "http://mcp/${task_id}/sse".to_string(),
            headers: BTreeMap::from([("X-Task".to_string(), "${task_id}".to_string())]),
        };
        let McpServerConfig::Http { url, headers } = config.substitute(&vars()) else {
            panic!("expected http config");
        };
        assert_eq!(url, "http://mcp/42/sse");
        assert_eq!(headers["X-Task"], "42");
    }

    #[test]
    fn test_unknown_placeholder_left_intact() {
        assert_eq!(substitute_vars("${missing}-${task_id}", &vars()), "${missing}-42");
    }

    #[test]
    fn test_deserialize_streamable_http_alias() {
        let config: McpServerConfig = serde_json::from_value(serde_json::json!({
            "type": "streamable-http",
            "url": "http://example/mcp"
        }))
        .unwrap();
        assert_eq!(config.transport(), "http");
    }
}
