//! Per-thread stack of context frames.
//!
//! A [`LocalStack`] is a `static`-friendly handle onto a `thread_local!`
//! vector of frames. Every thread sees only its own vector, so two threads
//! dispatching requests at the same time never observe each other's frames
//! and no lock is needed between them.
//!
//! Declaring one takes two items, the thread-local storage and the handle:
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use vial::stack::{Frames, LocalStack};
//!
//! thread_local! {
//!     static JOBS: Frames<String> = const { RefCell::new(Vec::new()) };
//! }
//! static JOB_STACK: LocalStack<String> = LocalStack::new(&JOBS);
//!
//! JOB_STACK.push(Rc::new("import".to_owned()));
//! assert_eq!(*JOB_STACK.top().unwrap(), "import");
//! JOB_STACK.pop().unwrap();
//! assert!(JOB_STACK.top().is_err());
//! ```
//!
//! Frames are held as `Rc<T>`: they are `!Send`, so a frame cannot leave the
//! thread that pushed it.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::LocalKey;

use crate::error::ContextError;

/// Backing storage of a [`LocalStack`]; declare it with `thread_local!`.
pub type Frames<T> = RefCell<Vec<Rc<T>>>;

/// Handle to a per-thread stack of `T` frames.
pub struct LocalStack<T: 'static> {
    frames: &'static LocalKey<Frames<T>>,
}

impl<T: 'static> LocalStack<T> {
    pub const fn new(frames: &'static LocalKey<Frames<T>>) -> Self {
        Self { frames }
    }

    /// Pushes `frame` onto the calling thread's stack.
    pub fn push(&self, frame: Rc<T>) {
        self.frames.with(|frames| frames.borrow_mut().push(frame));
    }

    /// Removes the calling thread's top frame and hands it back.
    ///
    /// The frame is returned rather than dropped in place so that its
    /// destructor runs after the stack borrow is released.
    pub fn pop(&self) -> Result<Rc<T>, ContextError> {
        self.frames
            .with(|frames| frames.borrow_mut().pop())
            .ok_or(ContextError::EmptyStack)
    }

    /// The calling thread's innermost frame.
    pub fn top(&self) -> Result<Rc<T>, ContextError> {
        self.frames
            .with(|frames| frames.borrow().last().cloned())
            .ok_or(ContextError::NoActiveContext)
    }

    pub fn depth(&self) -> usize {
        self.frames.with(|frames| frames.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}
