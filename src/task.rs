//! Cooperative tasks on top of `std::future`.
//!
//! A [`Task`] owns a future and is driven one step at a time by
//! [`Task::resume`]. Inside the body, [`suspend`] hands a value back to the
//! resumer; outside any task it fails with
//! [`BouquetError::CannotYieldOnMainThread`]. Each step reports a tagged
//! [`Resumed`]: a yielded value, a return value, or a raised
//! [`Exception`], so "raise" and "return" never look alike across the
//! resume boundary. Panics inside a body are caught and surface as raised
//! exceptions.
//!
//! Task-local storage lives inside the task and goes away with it.

use std::{
    any::{Any, TypeId},
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    future::Future,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use crate::diagnostics::{BouquetError, Result};

type Body<R> = Pin<Box<dyn Future<Output = std::result::Result<R, Exception>>>>;
type Locals = HashMap<TypeId, Box<dyn Any>>;

thread_local! {
    static RUNNING: RefCell<Vec<Rc<TaskState>>> = const { RefCell::new(Vec::new()) };
    static MAIN_LOCALS: RefCell<Locals> = RefCell::new(HashMap::new());
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Suspended,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Raised,
    Panicked,
}

/// Error object carried out of a task, distinct from its return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub message: String,
    pub origin: Origin,
    pub context: Vec<String>,
}

impl Exception {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: Origin::Raised,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, note: impl Into<String>) -> Self {
        self.context.push(note.into());
        self
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Exception>() {
            Ok(exception) => return *exception,
            Err(payload) => payload,
        };
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "task panicked".to_string()
        };
        Self {
            message,
            origin: Origin::Panicked,
            context: Vec::new(),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for note in &self.context {
            write!(f, "\n  in {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

impl From<BouquetError> for Exception {
    fn from(err: BouquetError) -> Self {
        Exception::new(err.to_string())
    }
}

/// Unwinds out of the current body with `exception`. The enclosing
/// [`Task::resume`], [`pcall`] or [`catch`] hands it back unchanged.
pub fn raise(exception: Exception) -> ! {
    panic::resume_unwind(Box::new(exception))
}

/// Outcome of one [`Task::resume`] step.
#[derive(Debug)]
pub enum Resumed<Y, R> {
    Yielded(Y),
    Returned(R),
    Raised(Exception),
}

impl<Y, R> Resumed<Y, R> {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Resumed::Raised(_))
    }
}

struct TaskState {
    id: TaskId,
    yielded: RefCell<Option<Box<dyn Any>>>,
    locals: RefCell<Locals>,
}

impl TaskState {
    fn new() -> Rc<Self> {
        let id = NEXT_ID.with(|next| {
            let id = next.get() + 1;
            next.set(id);
            TaskId(id)
        });
        Rc::new(Self {
            id,
            yielded: RefCell::new(None),
            locals: RefCell::new(HashMap::new()),
        })
    }
}

/// Marks a task as running for the duration of one poll.
struct Enter;

impl Enter {
    fn push(state: Rc<TaskState>) -> Self {
        RUNNING.with(|running| running.borrow_mut().push(state));
        Enter
    }
}

impl Drop for Enter {
    fn drop(&mut self) {
        RUNNING.with(|running| {
            running.borrow_mut().pop();
        });
    }
}

enum Step<R> {
    Pending(Option<Box<dyn Any>>),
    Done(std::result::Result<R, Exception>),
}

pub struct Task<Y, R> {
    state: Rc<TaskState>,
    body: Option<Body<R>>,
    _yields: PhantomData<fn() -> Y>,
}

impl<Y: 'static, R: 'static> Task<Y, R> {
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = std::result::Result<R, Exception>> + 'static,
    {
        Self {
            state: TaskState::new(),
            body: Some(Box::pin(body)),
            _yields: PhantomData,
        }
    }

    pub fn id(&self) -> TaskId {
        self.state.id
    }

    pub fn status(&self) -> Status {
        if self.body.is_some() {
            Status::Suspended
        } else {
            Status::Dead
        }
    }

    /// Runs the body until it suspends, returns or raises.
    pub fn resume(&mut self) -> Result<Resumed<Y, R>> {
        let id = self.state.id;
        match self.step()? {
            Step::Done(Ok(value)) => Ok(Resumed::Returned(value)),
            Step::Done(Err(exception)) => Ok(Resumed::Raised(exception)),
            Step::Pending(Some(yielded)) => match yielded.downcast::<Y>() {
                Ok(value) => Ok(Resumed::Yielded(*value)),
                Err(_) => {
                    self.body = None;
                    Ok(Resumed::Raised(
                        Exception::new("yielded a value of an unexpected type")
                            .with_context(id.to_string()),
                    ))
                }
            },
            Step::Pending(None) => {
                self.body = None;
                Ok(Resumed::Raised(
                    Exception::new("suspended without yielding").with_context(id.to_string()),
                ))
            }
        }
    }

    fn step(&mut self) -> Result<Step<R>> {
        let body = self.body.as_mut().ok_or(BouquetError::CannotResumeDeadTask)?;
        let polled = {
            let _enter = Enter::push(Rc::clone(&self.state));
            let mut cx = Context::from_waker(Waker::noop());
            panic::catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(&mut cx)))
        };
        let step = match polled {
            Ok(Poll::Pending) => {
                return Ok(Step::Pending(self.state.yielded.borrow_mut().take()));
            }
            Ok(Poll::Ready(outcome)) => Step::Done(outcome),
            Err(payload) => Step::Done(Err(Exception::from_panic(payload))),
        };
        self.body = None;
        Ok(step)
    }
}

impl<Y, R> fmt::Debug for Task<Y, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.state.id)
            .field("dead", &self.body.is_none())
            .finish()
    }
}

/// Runs `body` as a fresh task to completion and reports success or the
/// raised exception. A body that suspends is an error here because there is
/// no resumer to receive the value; inside a task use [`catch`] instead.
pub fn pcall<R, F>(body: F) -> std::result::Result<R, Exception>
where
    R: 'static,
    F: Future<Output = std::result::Result<R, Exception>> + 'static,
{
    let mut task: Task<(), R> = Task::new(body);
    match task.step() {
        Ok(Step::Done(outcome)) => outcome,
        Ok(Step::Pending(_)) => Err(BouquetError::CannotYieldOnMainThread.into()),
        Err(err) => Err(err.into()),
    }
}

/// Wraps `body` so that panics and raised exceptions become an `Err` while
/// suspensions pass through to the enclosing task.
pub fn catch<F, R>(body: F) -> Catch<F>
where
    F: Future<Output = std::result::Result<R, Exception>>,
{
    Catch {
        inner: Box::pin(body),
    }
}

pub struct Catch<F> {
    inner: Pin<Box<F>>,
}

impl<F, R> Future for Catch<F>
where
    F: Future<Output = std::result::Result<R, Exception>>,
{
    type Output = std::result::Result<R, Exception>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(Exception::from_panic(payload))),
        }
    }
}

/// Hands `value` to whoever resumed the running task. Await the returned
/// future to actually give up control.
pub fn suspend<Y: 'static>(value: Y) -> Result<Suspend> {
    RUNNING.with(|running| {
        let running = running.borrow();
        let state = running.last().ok_or(BouquetError::CannotYieldOnMainThread)?;
        *state.yielded.borrow_mut() = Some(Box::new(value));
        Ok(Suspend { polled: false })
    })
}

#[derive(Debug)]
#[must_use = "a suspension does nothing unless awaited"]
pub struct Suspend {
    polled: bool,
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            Poll::Pending
        }
    }
}

pub fn is_yieldable() -> bool {
    RUNNING.with(|running| !running.borrow().is_empty())
}

pub fn current() -> Option<TaskId> {
    RUNNING.with(|running| running.borrow().last().map(|state| state.id))
}

fn current_state() -> Option<Rc<TaskState>> {
    RUNNING.with(|running| running.borrow().last().cloned())
}

fn with_locals<U>(f: impl FnOnce(&mut Locals) -> U) -> U {
    match current_state() {
        Some(state) => f(&mut *state.locals.borrow_mut()),
        None => MAIN_LOCALS.with(|locals| f(&mut *locals.borrow_mut())),
    }
}

/// Stores `value` in the running task's local storage (or the main
/// context's), returning the previous value of the same type.
pub fn set_local<T: 'static>(value: T) -> Option<T> {
    with_locals(|locals| {
        locals
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    })
}

pub fn take_local<T: 'static>() -> Option<T> {
    with_locals(|locals| {
        locals
            .remove(&TypeId::of::<T>())
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    })
}

/// Borrows the local of type `T`. `f` must not touch task-local storage
/// itself.
pub fn with_local<T: 'static, U>(f: impl FnOnce(Option<&mut T>) -> U) -> U {
    with_locals(|locals| {
        f(locals
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>()))
    })
}
