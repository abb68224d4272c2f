//! Root-value engine
//!
//! One tokio task owns the root value and every registered observer. Callers
//! talk to it through [`Engine`], which only sends commands, so there is no
//! shared mutable state: updates are applied one at a time in arrival order
//! and each observer sees every committed root exactly once.
//!
//! An observer is an expression plus callbacks. After each successful update
//! the expression is re-evaluated against the new root and `on_update` gets the
//! result. If evaluation fails, the callback returns an error, or either one
//! panics, that observer alone is closed with the failure and dropped.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::ast::Expression;
use crate::config::EngineConfig;
use crate::error::{EngineError, EvalError};
use crate::evaluator::{globals, Eval};
use crate::scope::Scope;
use crate::set::Set;
use crate::value::Value;

type UpdateFn = Box<dyn FnMut(&Value) -> anyhow::Result<()> + Send>;
type CloseFn = Box<dyn FnOnce(Option<EngineError>) + Send>;

enum Command {
    Update {
        expr: Expression,
        reply: oneshot::Sender<Result<(), EvalError>>,
    },
    AddObserver {
        observer: Observer,
        ack: oneshot::Sender<()>,
    },
    RemoveObserver {
        id: u64,
        ack: oneshot::Sender<()>,
    },
    Root(oneshot::Sender<Value>),
    Hangup(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

struct Observer {
    id: u64,
    expr: Expression,
    on_update: UpdateFn,
    on_close: Option<CloseFn>,
}

impl Observer {
    fn notify(&mut self, scope: &Scope) -> Result<(), EngineError> {
        let expr = &self.expr;
        let on_update = &mut self.on_update;
        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<(), EngineError> {
            let value = expr.eval(scope)?;
            on_update(&value).map_err(|err| EngineError::Observer(err.to_string()))
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(EngineError::ObserverPanic(panic_message(payload))),
        }
    }

    fn close(mut self, err: Option<EngineError>) {
        match &err {
            Some(err) => warn!(observer = self.id, error = %err, "closing observer"),
            None => debug!(observer = self.id, "closing observer"),
        }
        if let Some(on_close) = self.on_close.take() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(move || on_close(err))) {
                warn!(
                    observer = self.id,
                    panic = %panic_message(payload),
                    "observer close callback panicked"
                );
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running engine task; cheap to clone
#[derive(Clone)]
pub struct Engine {
    tx: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Engine {
    /// Spawn the engine task on the current tokio runtime
    ///
    /// The root starts as the empty set.
    pub fn start(config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        info!(root = %config.root_name, "starting engine");
        tokio::spawn(run(rx, config));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.tx.send(command).await.map_err(|_| EngineError::Stopped)
    }

    /// Replace the root with `expr` evaluated against the current root
    ///
    /// On failure the root is unchanged. On success every observer has been
    /// notified by the time this returns.
    pub async fn update(&self, expr: Expression) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Update { expr, reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)??;
        Ok(())
    }

    /// Current root value
    pub async fn root(&self) -> Result<Value, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Root(reply)).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Register an observer; it is evaluated once against the current root
    /// before this returns
    pub async fn observe<U, C>(
        &self,
        expr: Expression,
        on_update: U,
        on_close: C,
    ) -> Result<Observation, EngineError>
    where
        U: FnMut(&Value) -> anyhow::Result<()> + Send + 'static,
        C: FnOnce(Option<EngineError>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let observer = Observer {
            id,
            expr,
            on_update: Box::new(on_update),
            on_close: Some(Box::new(on_close)),
        };
        let (ack, rx) = oneshot::channel();
        self.send(Command::AddObserver { observer, ack }).await?;
        rx.await.map_err(|_| EngineError::Stopped)?;
        Ok(Observation {
            id,
            tx: self.tx.clone(),
        })
    }

    /// Close every observer without error; the engine keeps running
    pub async fn hangup(&self) -> Result<(), EngineError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Hangup(ack)).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Close every observer and end the engine task
    pub async fn stop(&self) -> Result<(), EngineError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Stop(ack)).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }
}

/// A registered observer; cancel it to close it without error
#[derive(Debug)]
pub struct Observation {
    id: u64,
    tx: mpsc::Sender<Command>,
}

impl Observation {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the observer; a no-op if the engine already closed it
    pub async fn cancel(self) -> Result<(), EngineError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveObserver { id: self.id, ack })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Update { expr, .. } => write!(f, "Update({})", expr),
            Command::AddObserver { observer, .. } => write!(f, "AddObserver({})", observer.id),
            Command::RemoveObserver { id, .. } => write!(f, "RemoveObserver({})", id),
            Command::Root(_) => write!(f, "Root"),
            Command::Hangup(_) => write!(f, "Hangup"),
            Command::Stop(_) => write!(f, "Stop"),
        }
    }
}

struct State {
    globals: Scope,
    root_name: String,
    root: Value,
    scope: Scope,
    observers: BTreeMap<u64, Observer>,
}

impl State {
    fn new(config: EngineConfig) -> Self {
        let globals = Scope::from_bindings(globals());
        let root = Value::Set(Set::empty());
        let scope = globals.with(config.root_name.clone(), root.clone());
        Self {
            globals,
            root_name: config.root_name,
            root,
            scope,
            observers: BTreeMap::new(),
        }
    }

    fn commit(&mut self, value: Value) {
        self.scope = self.globals.with(self.root_name.clone(), value.clone());
        self.root = value;
        let failed: Vec<(u64, EngineError)> = self
            .observers
            .iter_mut()
            .filter_map(|(id, observer)| observer.notify(&self.scope).err().map(|e| (*id, e)))
            .collect();
        for (id, err) in failed {
            if let Some(observer) = self.observers.remove(&id) {
                observer.close(Some(err));
            }
        }
    }

    fn add(&mut self, mut observer: Observer) {
        info!(observer = observer.id, expr = %observer.expr, "adding observer");
        match observer.notify(&self.scope) {
            Ok(()) => {
                self.observers.insert(observer.id, observer);
            }
            Err(err) => observer.close(Some(err)),
        }
    }

    fn close_all(&mut self) {
        for (_, observer) in std::mem::take(&mut self.observers) {
            observer.close(None);
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Command>, config: EngineConfig) {
    let mut state = State::new(config);
    while let Some(command) = rx.recv().await {
        debug!(?command, "engine command");
        match command {
            Command::Update { expr, reply } => {
                info!(expr = %expr, "updating root");
                match expr.eval(&state.scope) {
                    Ok(value) => {
                        state.commit(value);
                        let _ = reply.send(Ok(()));
                    }
                    Err(err) => {
                        warn!(expr = %expr, error = %err, "update failed");
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::AddObserver { observer, ack } => {
                state.add(observer);
                let _ = ack.send(());
            }
            Command::RemoveObserver { id, ack } => {
                if let Some(observer) = state.observers.remove(&id) {
                    info!(observer = id, "removing observer");
                    observer.close(None);
                }
                let _ = ack.send(());
            }
            Command::Root(reply) => {
                let _ = reply.send(state.root.clone());
            }
            Command::Hangup(ack) => {
                info!(observers = state.observers.len(), "hanging up observers");
                state.close_all();
                let _ = ack.send(());
            }
            Command::Stop(ack) => {
                info!("stopping engine");
                state.close_all();
                let _ = ack.send(());
                return;
            }
        }
    }
    state.close_all();
}
