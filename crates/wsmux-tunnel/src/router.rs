use std::future::Future;
use std::sync::Arc;

use wsmux_transport::BoxFuture;

use crate::stream::Stream;

/// Async stream handler as stored by a [`Router`].
pub type Handler = Arc<dyn Fn(Stream) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Stream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |stream: Stream| -> BoxFuture<'static, ()> { Box::pin(f(stream)) })
}

/// Maps request paths to handlers.
///
/// A pattern matches a path exactly, or, if it ends in `/`, matches every
/// path beneath it. The longest matching pattern wins.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<(String, Handler)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`, replacing any previous registration.
    pub fn insert(&mut self, pattern: impl Into<String>, handler: Handler) {
        let pattern = pattern.into();
        match self.routes.iter_mut().find(|(p, _)| *p == pattern) {
            Some(route) => route.1 = handler,
            None => self.routes.push((pattern, handler)),
        }
    }

    /// Handler for `path`, if any pattern matches.
    pub fn lookup(&self, path: &str) -> Option<Handler> {
        self.best_match(path).map(|(_, handler)| Arc::clone(handler))
    }

    /// The pattern that would serve `path`.
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.best_match(path).map(|(pattern, _)| pattern.as_str())
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(pattern, _)| pattern.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn best_match(&self, path: &str) -> Option<&(String, Handler)> {
        self.routes
            .iter()
            .filter(|(pattern, _)| matches(pattern, path))
            .max_by_key(|(pattern, _)| pattern.len())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.patterns().collect::<Vec<_>>())
            .finish()
    }
}

fn matches(pattern: &str, path: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        pattern == path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        handler(|_stream| async {})
    }

    #[test]
    fn exact_match() {
        let mut router = Router::new();
        router.insert("/echo", noop());
        assert_eq!(router.matching_pattern("/echo"), Some("/echo"));
        assert!(router.lookup("/echo").is_some());
        assert!(router.lookup("/echo/more").is_none());
        assert!(router.lookup("/other").is_none());
    }

    #[test]
    fn subtree_and_longest_match() {
        let mut router = Router::new();
        router.insert("/", noop());
        router.insert("/api/", noop());
        router.insert("/api/status", noop());

        assert_eq!(router.matching_pattern("/anything"), Some("/"));
        assert_eq!(router.matching_pattern("/api/users"), Some("/api/"));
        assert_eq!(router.matching_pattern("/api/status"), Some("/api/status"));
        assert_eq!(router.matching_pattern("/api"), Some("/"));
    }

    #[test]
    fn reinsert_replaces() {
        let mut router = Router::new();
        router.insert("/echo", noop());
        router.insert("/echo", noop());
        assert_eq!(router.patterns().count(), 1);
        assert!(!router.is_empty());
    }
}
