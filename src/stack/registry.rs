use super::handlers::{GenericHandler, NodeSiteHandler, StaticSiteHandler};
use super::{DeploymentHandler, StackId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerLoadError {
    /// A prerequisite tool is not on the search path
    #[error("{stack} handler requires `{tool}` on PATH")]
    MissingTool { stack: String, tool: String },

    #[error("Failed to load {stack} handler: {message}")]
    Other { stack: String, message: String },
}

pub type HandlerLoader =
    Box<dyn Fn() -> Result<Arc<dyn DeploymentHandler>, HandlerLoadError> + Send + Sync>;

struct HandlerSlot {
    loader: HandlerLoader,
    loaded: OnceLock<Arc<dyn DeploymentHandler>>,
    last_failure: Mutex<Option<String>>,
}

/// Outcome of routing a stack id
#[derive(Clone)]
pub struct Resolution {
    pub handler: Arc<dyn DeploymentHandler>,
    /// True when the generic handler stands in for the requested stack
    pub fallback: bool,
}

/// Routes stack ids to deployment handlers.
///
/// Handlers load lazily on first resolve. A successful load is cached for the
/// registry's lifetime; a failed one is recorded, answered with the fallback
/// handler and retried on the next resolve.
pub struct HandlerRegistry {
    slots: HashMap<StackId, HandlerSlot>,
    fallback: Arc<dyn DeploymentHandler>,
}

impl HandlerRegistry {
    pub fn new(fallback: Arc<dyn DeploymentHandler>) -> Self {
        Self {
            slots: HashMap::new(),
            fallback,
        }
    }

    /// Built-in handlers, checking prerequisites on the process `PATH`
    pub fn with_defaults() -> Self {
        Self::defaults(None)
    }

    /// Built-in handlers, checking prerequisites on `search_path` instead of
    /// the process `PATH`
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self::defaults(Some(search_path.into()))
    }

    fn defaults(search_path: Option<OsString>) -> Self {
        let mut registry = Self::new(Arc::new(GenericHandler));

        let handlers: Vec<Arc<dyn DeploymentHandler>> = vec![
            Arc::new(StaticSiteHandler),
            Arc::new(NodeSiteHandler::react()),
            Arc::new(NodeSiteHandler::vue()),
            Arc::new(NodeSiteHandler::nextjs()),
            Arc::new(NodeSiteHandler::gatsby()),
        ];
        for handler in handlers {
            let search_path = search_path.clone();
            registry.register(
                handler.id(),
                Box::new(move || check_prerequisites(&handler, search_path.as_deref())),
            );
        }

        registry
    }

    /// Binds `stack` to `loader`, replacing any earlier registration
    pub fn register(&mut self, stack: StackId, loader: HandlerLoader) {
        self.slots.insert(
            stack,
            HandlerSlot {
                loader,
                loaded: OnceLock::new(),
                last_failure: Mutex::new(None),
            },
        );
    }

    pub fn fallback(&self) -> &Arc<dyn DeploymentHandler> {
        &self.fallback
    }

    pub fn is_registered(&self, stack: &StackId) -> bool {
        self.slots.contains_key(stack)
    }

    pub fn resolve(&self, stack: &StackId) -> Resolution {
        let Some(slot) = self.slots.get(stack) else {
            debug!(stack = %stack, "No handler registered, using fallback");
            return self.fallback_resolution();
        };

        match Self::load(stack, slot) {
            Ok(handler) => Resolution {
                handler,
                fallback: false,
            },
            Err(e) => {
                warn!(stack = %stack, error = %e, "Handler unavailable, using fallback");
                self.fallback_resolution()
            }
        }
    }

    /// Returns the cached handler or runs the loader, recording the outcome
    fn load(stack: &StackId, slot: &HandlerSlot) -> Result<Arc<dyn DeploymentHandler>, HandlerLoadError> {
        if let Some(handler) = slot.loaded.get() {
            return Ok(Arc::clone(handler));
        }

        let mut last_failure = slot.last_failure.lock().unwrap_or_else(PoisonError::into_inner);
        match (slot.loader)() {
            Ok(handler) => {
                // Another caller may have won the race; keep whichever landed first
                let handler = Arc::clone(slot.loaded.get_or_init(|| handler));
                *last_failure = None;
                debug!(stack = %stack, handler = handler.name(), "Handler loaded");
                Ok(handler)
            }
            Err(e) => {
                *last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Handler for `stack`, or the generic fallback. Never fails.
    pub fn resolve_handler(&self, stack: &StackId) -> Arc<dyn DeploymentHandler> {
        self.resolve(stack).handler
    }

    fn fallback_resolution(&self) -> Resolution {
        Resolution {
            handler: Arc::clone(&self.fallback),
            fallback: true,
        }
    }

    /// Registered stacks whose handler loads right now.
    ///
    /// Load failures are recorded for [`load_failures`](Self::load_failures)
    /// but only logged at debug level.
    pub fn list_available(&self) -> BTreeSet<String> {
        self.slots
            .iter()
            .filter(|(stack, slot)| match Self::load(stack, slot) {
                Ok(_) => true,
                Err(e) => {
                    debug!(stack = %stack, error = %e, "Handler unavailable");
                    false
                }
            })
            .map(|(stack, _)| stack.as_str().to_string())
            .collect()
    }

    /// Most recent load failure per stack, for stacks currently failing
    pub fn load_failures(&self) -> BTreeMap<String, String> {
        self.slots
            .iter()
            .filter_map(|(stack, slot)| {
                slot.last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .map(|failure| (stack.as_str().to_string(), failure))
            })
            .collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn check_prerequisites(
    handler: &Arc<dyn DeploymentHandler>,
    search_path: Option<&std::ffi::OsStr>,
) -> Result<Arc<dyn DeploymentHandler>, HandlerLoadError> {
    let path = match search_path {
        Some(path) => Some(path.to_os_string()),
        None => env::var_os("PATH"),
    };
    for tool in handler.prerequisites() {
        if find_on_path(tool, path.as_deref()).is_none() {
            return Err(HandlerLoadError::MissingTool {
                stack: handler.id().to_string(),
                tool: tool.to_string(),
            });
        }
    }
    Ok(Arc::clone(handler))
}

/// Locates an executable named `tool` in a `PATH`-style list
pub fn find_on_path(tool: &str, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let search_path = search_path?;
    env::split_paths(search_path).find_map(|dir| {
        let candidate = dir.join(tool);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", tool));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn empty_path() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_known_stack_resolves_to_its_handler() {
        let registry = HandlerRegistry::with_defaults();
        let resolution = registry.resolve(&StackId::Static);
        assert!(!resolution.fallback);
        assert_eq!(resolution.handler.name(), "static");
    }

    #[test]
    fn test_unsupported_stack_uses_generic_fallback() {
        let registry = HandlerRegistry::with_defaults();
        let resolution = registry.resolve(&StackId::parse("cobol-legacy"));
        assert!(resolution.fallback);
        assert_eq!(resolution.handler.name(), "generic");
        assert!(registry.load_failures().is_empty());
    }

    #[test]
    fn test_missing_toolchain_falls_back_and_is_recorded() {
        let path = empty_path();
        let registry = HandlerRegistry::with_search_path(path.path());

        let handler = registry.resolve_handler(&StackId::React);
        assert_eq!(handler.name(), "generic");

        let failures = registry.load_failures();
        assert!(failures["react"].contains("`node`"));
        assert!(!failures.contains_key("static"));
    }

    #[cfg(unix)]
    #[test]
    fn test_toolchain_found_on_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let path = empty_path();
        for tool in ["node", "npm"] {
            let bin = path.path().join(tool);
            std::fs::write(&bin, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let registry = HandlerRegistry::with_search_path(path.path());

        let resolution = registry.resolve(&StackId::NextJs);
        assert!(!resolution.fallback);
        assert_eq!(resolution.handler.name(), "nextjs");
        assert_eq!(
            registry.list_available(),
            ["gatsby", "nextjs", "react", "static", "vue"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_failed_load_is_retried_and_success_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new(Arc::new(GenericHandler));
        let counter = Arc::clone(&attempts);
        registry.register(
            StackId::Vue,
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HandlerLoadError::Other {
                        stack: "vue".to_string(),
                        message: "toolchain warming up".to_string(),
                    })
                } else {
                    Ok(Arc::new(NodeSiteHandler::vue()))
                }
            }),
        );

        assert!(registry.resolve(&StackId::Vue).fallback);
        assert!(registry.load_failures()["vue"].contains("warming up"));

        assert!(!registry.resolve(&StackId::Vue).fallback);
        assert!(registry.load_failures().is_empty());

        registry.resolve(&StackId::Vue);
        registry.resolve(&StackId::Vue);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_list_available_excludes_failing() {
        let path = empty_path();
        let registry = HandlerRegistry::with_search_path(path.path());
        let available = registry.list_available();
        assert!(available.contains("static"));
        assert!(!available.contains("react"));
        assert_eq!(registry.load_failures().len(), 4);
    }

    /// Counts WARN events emitted while installed as the default subscriber
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_listing_does_not_warn_about_unavailable_handlers() {
        let path = empty_path();
        let registry = HandlerRegistry::with_search_path(path.path());
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                let available = registry.list_available();
                assert_eq!(available.len(), 1);
            }
            assert_eq!(warnings.load(Ordering::SeqCst), 0);
            assert_eq!(registry.load_failures().len(), 4);

            // Routing a deployment to a broken handler still warns
            assert!(registry.resolve(&StackId::React).fallback);
            assert_eq!(warnings.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_concurrent_resolution_shares_one_handler() {
        let registry = Arc::new(HandlerRegistry::with_defaults());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve_handler(&StackId::Static))
            })
            .collect();
        let handlers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(handlers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_find_on_path_none_without_path() {
        assert!(find_on_path("sh", None).is_none());
    }
}
