//! Server lifecycle states and the options the router publishes into.

use crate::server::ServerConfig;

/// Server lifecycle states observed by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Server-wide options shared between the server and the router.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Every method the server accepts; the router merges its route methods in at start.
    pub allowed_methods: Vec<String>,
    /// Upper-case method names before comparing them.
    pub normalize_method_case: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            allowed_methods: config.allowed_methods.clone(),
            normalize_method_case: config.normalize_method_case,
        }
    }

    /// Apply the case rule to a method name.
    pub fn normalize_method(&self, method: &str) -> String {
        if self.normalize_method_case {
            method.to_ascii_uppercase()
        } else {
            method.to_string()
        }
    }

    /// Merge `methods` into `allowed_methods`, normalizing and deduplicating.
    ///
    /// Already configured methods keep their position; new ones are appended
    /// in the order given.
    pub fn publish_methods<'a>(&mut self, methods: impl IntoIterator<Item = &'a str>) {
        let mut merged: Vec<String> = Vec::with_capacity(self.allowed_methods.len());
        let configured = std::mem::take(&mut self.allowed_methods);
        let incoming: Vec<String> = methods.into_iter().map(str::to_string).collect();
        for method in configured.iter().chain(incoming.iter()) {
            let method = self.normalize_method(method);
            if !merged.contains(&method) {
                merged.push(method);
            }
        }
        self.allowed_methods = merged;
    }

    pub fn is_allowed(&self, method: &str) -> bool {
        self.allowed_methods.iter().any(|allowed| allowed == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_merges_and_normalizes() {
        let mut options = ServerOptions {
            allowed_methods: vec!["GET".into(), "post".into(), "GET".into()],
            normalize_method_case: true,
        };
        options.publish_methods(["put", "GET", "PURGE"]);
        assert_eq!(options.allowed_methods, vec!["GET", "POST", "PUT", "PURGE"]);
        assert!(options.is_allowed("PURGE"));
    }

    #[test]
    fn test_publish_keeps_case_when_disabled() {
        let mut options = ServerOptions {
            allowed_methods: vec!["GET".into()],
            normalize_method_case: false,
        };
        options.publish_methods(["get"]);
        assert_eq!(options.allowed_methods, vec!["GET", "get"]);
    }

    #[test]
    fn test_publish_borrowed_route_methods() {
        let routed: Vec<String> = vec!["delete".to_string(), "GET".to_string()];
        let mut options = ServerOptions {
            allowed_methods: vec!["GET".into()],
            normalize_method_case: true,
        };
        options.publish_methods(routed.iter().map(String::as_str));
        assert_eq!(options.allowed_methods, vec!["GET", "DELETE"]);
    }
}
