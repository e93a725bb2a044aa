//! Tracker engine
//!
//! Wraps functions, methods, and method groups into instrumented
//! equivalents whose calls are recorded to the call log and replayed on
//! later runs. One engine owns one store handle and one call counter;
//! every wrapper produced by the same engine shares both.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use super::matcher::{self, Decision};
use super::preview;
use crate::config::{StoreLocation, TrackerConfig};
use crate::store::{CallLog, CallRecord, Database, StoreError};
use crate::value::{decode, encode, encode_args, Arg, SerializationError, Value};

/// Errors surfaced by tracked calls and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("tracker not initialized; call init() before tracking calls")]
    NotInitialized,
    #[error("call store error: {0}")]
    Store(#[from] StoreError),
    #[error("injected failure: {0}")]
    Injected(anyhow::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
    #[error("no tracked method named {0:?}")]
    UnknownMethod(String),
    #[error(transparent)]
    Function(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for CallError {
    fn from(err: rusqlite::Error) -> Self {
        CallError::Store(StoreError::Sqlite(err))
    }
}

type FailureFactory = Box<dyn FnOnce() -> anyhow::Error + Send>;
type DynCall = Box<dyn FnMut(Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> + Send>;

/// Session state shared by every wrapper the engine hands out.
struct EngineState {
    /// `None` once the engine has been closed
    log: Option<CallLog>,
    /// Call numbers currently present in the store, kept dense by
    /// truncation
    history: Vec<u64>,
    /// Next call number to assign; `None` before init and after close
    call_counter: Option<u64>,
    last_call_from_db: bool,
    /// One-shot failure consumed by the next tracked call
    pending_failure: Option<FailureFactory>,
}

impl EngineState {
    fn log(&self) -> Result<&CallLog, CallError> {
        self.log.as_ref().ok_or(CallError::NotInitialized)
    }

    fn truncate_from(&mut self, call_number: u64) -> Result<(), CallError> {
        self.log()?.truncate_from(call_number)?;
        self.history.retain(|&n| n < call_number);
        Ok(())
    }
}

/// Records and replays calls against a single backing store.
pub struct Tracker {
    state: Arc<Mutex<EngineState>>,
    config: TrackerConfig,
}

impl Tracker {
    /// Create a tracker over an explicitly owned store handle.
    ///
    /// The schema is ensured when the `Database` is opened; call
    /// [`Tracker::init`] before issuing tracked calls.
    pub fn new(db: Database, config: TrackerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                log: Some(CallLog::new(db.connection())),
                history: Vec::new(),
                call_counter: None,
                last_call_from_db: false,
                pending_failure: None,
            })),
            config,
        }
    }

    /// Build the store from `config.store_location` and initialize.
    pub async fn open(config: TrackerConfig) -> Result<Self, CallError> {
        let db = match &config.store_location {
            StoreLocation::InMemory => {
                tracing::warn!(
                    "using an in-memory call store; history will not survive this process"
                );
                Database::open_in_memory()?
            }
            StoreLocation::Path(path) => Database::open(path.clone())?,
        };

        let tracker = Self::new(db, config);
        tracker.init().await?;
        Ok(tracker)
    }

    /// Load history and make the tracker ready for tracked calls.
    ///
    /// A resumed run replays from position zero, so the call counter
    /// starts at zero regardless of how much history was loaded.
    pub async fn init(&self) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        let numbers = state.log()?.call_numbers()?;
        tracing::debug!(entries = numbers.len(), "loaded call history");
        state.history = numbers;
        state.call_counter = Some(0);
        state.last_call_from_db = false;
        Ok(())
    }

    /// Wrap an async function over the value model.
    ///
    /// `name` identifies the function in the log and is part of the
    /// match: a recorded call only replays for a wrapper with the same
    /// name. The wrapper receives arguments opaque-unwrapped, as real
    /// values.
    pub fn track<F, Fut>(&self, name: impl Into<String>, mut func: F) -> TrackedFn
    where
        F: FnMut(Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        TrackedFn {
            name: name.into(),
            state: self.state.clone(),
            verbose: self.config.verbose,
            func: Box::new(move |args| Box::pin(func(args))),
        }
    }

    /// Wrap a blocking closure.
    pub fn track_sync<F>(&self, name: impl Into<String>, mut func: F) -> TrackedFn
    where
        F: FnMut(Vec<Value>) -> Result<Value, CallError> + Send + 'static,
    {
        self.track(name, move |args| std::future::ready(func(args)))
    }

    /// Wrap a method bound to a shared receiver.
    ///
    /// The receiver is read at call time, not at wrap time, so state
    /// mutated between calls is visible to later calls.
    pub fn track_method<T, M, Fut>(
        &self,
        name: impl Into<String>,
        receiver: Arc<Mutex<T>>,
        mut method: M,
    ) -> TrackedFn
    where
        T: Send + 'static,
        M: FnMut(Arc<Mutex<T>>, Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        self.track(name, move |args| method(receiver.clone(), args))
    }

    /// Start building a tracked method group.
    ///
    /// The group is an explicit mapping from method name to tracked
    /// function, fixed at build time. Every entry shares this engine's
    /// call counter and history.
    pub fn track_object(&self) -> TrackedObjectBuilder<'_> {
        TrackedObjectBuilder {
            tracker: self,
            methods: HashMap::new(),
        }
    }

    /// Arm a one-shot failure consumed by the next tracked call.
    ///
    /// The intercepted call consumes its call number but never reaches
    /// the store or the wrapped function.
    pub async fn fail_next<E>(&self, factory: E)
    where
        E: FnOnce() -> anyhow::Error + Send + 'static,
    {
        self.state.lock().await.pending_failure = Some(Box::new(factory));
    }

    /// Discard all history from the current call counter forward.
    pub async fn truncate(&self) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        let counter = state.call_counter.ok_or(CallError::NotInitialized)?;
        state.truncate_from(counter)
    }

    /// Snapshot of currently valid call numbers.
    pub async fn history(&self) -> Vec<u64> {
        self.state.lock().await.history.clone()
    }

    /// Whether the most recent tracked call was served from history.
    /// Meaningful only after at least one tracked call has completed.
    pub async fn was_last_call_from_db(&self) -> bool {
        self.state.lock().await.last_call_from_db
    }

    /// Release the store connection. Tracked calls issued afterwards
    /// fail with [`CallError::NotInitialized`].
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.log = None;
        state.call_counter = None;
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .finish()
    }
}

/// An instrumented function produced by [`Tracker::track`].
pub struct TrackedFn {
    name: String,
    state: Arc<Mutex<EngineState>>,
    verbose: bool,
    func: DynCall,
}

impl TrackedFn {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the call through the matcher: replay a recorded result, or
    /// execute the real function and record it.
    ///
    /// The engine lock is held from call-number reservation through the
    /// store write, so concurrent calls against the same engine cannot
    /// interleave their bookkeeping.
    pub async fn call(&mut self, args: Vec<Arg>) -> Result<Value, CallError> {
        let mut state = self.state.lock().await;

        let call_number = state.call_counter.ok_or(CallError::NotInitialized)?;
        state.call_counter = Some(call_number + 1);

        if let Some(factory) = state.pending_failure.take() {
            return Err(CallError::Injected(factory()));
        }

        self.trace(call_number, "track", &preview::args(&args));

        if (call_number as usize) < state.history.len() {
            let record = state.log()?.get(call_number)?;
            match (matcher::decide(record.as_ref(), &self.name, &args)?, record) {
                (Decision::Reuse, Some(record)) => {
                    let result = decode(&record.result)?;
                    state.last_call_from_db = true;
                    self.trace(call_number, "reuse", &preview::value(&result));
                    return Ok(result);
                }
                _ => {
                    self.trace(call_number, "diverge, truncating from here", "");
                    state.truncate_from(call_number)?;
                }
            }
        }

        state.last_call_from_db = false;
        let unwrapped: Vec<Value> = args.into_iter().map(Arg::into_value).collect();

        self.trace(call_number, "execute", "");
        let result = (self.func)(unwrapped.clone()).await?;
        self.trace(call_number, "result", &preview::value(&result));

        let record = CallRecord::new(
            call_number,
            &self.name,
            encode_args(&unwrapped)?,
            encode(&result)?,
        );
        state.log()?.record(&record)?;
        state.history.push(call_number);

        Ok(result)
    }

    fn trace(&self, call_number: u64, event: &str, detail: &str) {
        if self.verbose {
            tracing::info!(call = call_number, function = %self.name, detail = %detail, "{}", event);
        } else {
            tracing::debug!(call = call_number, function = %self.name, detail = %detail, "{}", event);
        }
    }
}

impl std::fmt::Debug for TrackedFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedFn").field("name", &self.name).finish()
    }
}

/// Builder for [`TrackedObject`]: registers each callable field under an
/// explicit name at wrap time.
pub struct TrackedObjectBuilder<'a> {
    tracker: &'a Tracker,
    methods: HashMap<String, TrackedFn>,
}

impl<'a> TrackedObjectBuilder<'a> {
    /// Register an async method under `name`.
    pub fn method<F, Fut>(mut self, name: &str, func: F) -> Self
    where
        F: FnMut(Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        self.methods
            .insert(name.to_string(), self.tracker.track(name, func));
        self
    }

    /// Register a blocking method under `name`.
    pub fn method_sync<F>(mut self, name: &str, func: F) -> Self
    where
        F: FnMut(Vec<Value>) -> Result<Value, CallError> + Send + 'static,
    {
        self.methods
            .insert(name.to_string(), self.tracker.track_sync(name, func));
        self
    }

    pub fn build(self) -> TrackedObject {
        TrackedObject {
            methods: self.methods,
        }
    }
}

/// A group of tracked methods sharing one engine.
pub struct TrackedObject {
    methods: HashMap<String, TrackedFn>,
}

impl TrackedObject {
    /// Invoke the tracked method registered under `name`.
    pub async fn call(&mut self, name: &str, args: Vec<Arg>) -> Result<Value, CallError> {
        let method = self
            .methods
            .get_mut(name)
            .ok_or_else(|| CallError::UnknownMethod(name.to_string()))?;
        method.call(args).await
    }

    /// Names of the registered methods, in no particular order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}
