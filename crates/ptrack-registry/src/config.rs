//! Registry configuration: tracing, violation policy, and abort hooks.
//!
//! [`RegistryConfig`] is built once and handed to
//! [`PointerRegistry::new`](crate::PointerRegistry::new). Only the verbose
//! flag may change afterwards.

use std::env;
use std::fmt;

use ptrack_core::{PtrError, RecordId};

/// Function invoked to terminate the process on a fatal violation or a
/// targeted-abort hit. Receives the diagnostic message.
pub type AbortHandler = fn(&str) -> !;

/// What the registry does when it detects a violation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Log the violation and call the abort handler.
    #[default]
    Abort,
    /// Return the violation to the caller as an error value.
    Propagate,
}

/// Configuration for a [`PointerRegistry`](crate::PointerRegistry).
#[derive(Clone)]
pub struct RegistryConfig {
    /// Emit a trace line for every register, increment, decrement, and
    /// mark-deleted operation. Default: false.
    pub verbose: bool,
    /// Fail-fast or return violations. Default: [`ViolationPolicy::Abort`].
    pub policy: ViolationPolicy,
    /// Abort when the record with this id is about to be created.
    pub abort_on_new: Option<RecordId>,
    /// Abort when the record with this id is about to be marked deleted.
    pub abort_on_delete: Option<RecordId>,
    /// Called to terminate the process. Default: [`default_abort`].
    pub abort_handler: AbortHandler,
}

impl RegistryConfig {
    /// Environment variable enabling verbose traces.
    pub const VERBOSE_VAR: &'static str = "PTRACK_VERBOSE";
    /// Environment variable selecting the policy (`abort` or `propagate`).
    pub const POLICY_VAR: &'static str = "PTRACK_POLICY";
    /// Environment variable naming a record id to abort on at creation.
    pub const ABORT_NEW_VAR: &'static str = "PTRACK_ABORT_NEW";
    /// Environment variable naming a record id to abort on at deletion.
    pub const ABORT_DELETE_VAR: &'static str = "PTRACK_ABORT_DELETE";

    /// Default configuration: quiet, fail-fast, no abort hooks.
    pub fn new() -> Self {
        Self {
            verbose: false,
            policy: ViolationPolicy::Abort,
            abort_on_new: None,
            abort_on_delete: None,
            abort_handler: default_abort,
        }
    }

    /// Read overrides from `PTRACK_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable values are ignored
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(raw) = lookup(Self::VERBOSE_VAR) {
            match parse_bool(&raw) {
                Some(v) => config.verbose = v,
                None => ignored(Self::VERBOSE_VAR, &raw),
            }
        }

        if let Some(raw) = lookup(Self::POLICY_VAR) {
            match raw.to_lowercase().as_str() {
                "abort" => config.policy = ViolationPolicy::Abort,
                "propagate" => config.policy = ViolationPolicy::Propagate,
                _ => ignored(Self::POLICY_VAR, &raw),
            }
        }

        if let Some(raw) = lookup(Self::ABORT_NEW_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(id) => config.abort_on_new = Some(RecordId(id)),
                Err(_) => ignored(Self::ABORT_NEW_VAR, &raw),
            }
        }

        if let Some(raw) = lookup(Self::ABORT_DELETE_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(id) => config.abort_on_delete = Some(RecordId(id)),
                Err(_) => ignored(Self::ABORT_DELETE_VAR, &raw),
            }
        }

        config
    }

    /// Set the verbose flag.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the violation policy.
    pub fn with_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort when record `id` is created.
    pub fn with_abort_on_new(mut self, id: RecordId) -> Self {
        self.abort_on_new = Some(id);
        self
    }

    /// Abort when record `id` is marked deleted.
    pub fn with_abort_on_delete(mut self, id: RecordId) -> Self {
        self.abort_on_delete = Some(id);
        self
    }

    /// Replace the abort handler.
    pub fn with_abort_handler(mut self, handler: AbortHandler) -> Self {
        self.abort_handler = handler;
        self
    }

    /// The handler violations are routed to, or `None` when they propagate.
    pub fn fatal_handler(&self) -> Option<AbortHandler> {
        match self.policy {
            ViolationPolicy::Abort => Some(self.abort_handler),
            ViolationPolicy::Propagate => None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("verbose", &self.verbose)
            .field("policy", &self.policy)
            .field("abort_on_new", &self.abort_on_new)
            .field("abort_on_delete", &self.abort_on_delete)
            .finish_non_exhaustive()
    }
}

/// Hand an error to `handler`, or return `result` unchanged when there is none.
pub(crate) fn apply_policy<T>(
    handler: Option<AbortHandler>,
    result: Result<T, PtrError>,
) -> Result<T, PtrError> {
    if let (Some(handler), Err(err)) = (handler, &result) {
        handler(&format!("{}: {err}", err.kind()));
    }
    result
}

/// Log `message` and abort the process.
pub fn default_abort(message: &str) -> ! {
    tracing::error!(target: "ptrack::registry", "{message}");
    std::process::abort()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn ignored(name: &str, raw: &str) {
    tracing::warn!(target: "ptrack::registry", "ignoring unparsable {name}={raw:?}");
}
