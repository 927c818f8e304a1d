//! Read-through accessors onto the current frame.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::error::ContextError;
use crate::stack::LocalStack;

/// A stable, process-wide name for "field `T` of whatever frame is on top of
/// the calling thread's stack right now".
///
/// Nothing is cached: each read goes back to the stack, so a proxy used
/// inside a nested context resolves the inner frame, and resolves the outer
/// one again once the inner context is popped.
pub struct LocalProxy<F: 'static, T: ?Sized + 'static> {
    stack: &'static LocalStack<F>,
    resolve: fn(&F) -> &T,
}

impl<F: 'static, T: ?Sized + 'static> LocalProxy<F, T> {
    pub const fn new(stack: &'static LocalStack<F>, resolve: fn(&F) -> &T) -> Self {
        Self { stack, resolve }
    }

    /// Resolves the proxy. The returned guard keeps the frame alive and
    /// derefs to the field.
    pub fn get(&self) -> Result<Resolved<F, T>, ContextError> {
        let frame = self.stack.top()?;
        Ok(Resolved { frame, resolve: self.resolve })
    }

    /// Runs `f` against the resolved field.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ContextError> {
        let frame = self.stack.top()?;
        Ok(f((self.resolve)(&frame)))
    }

    /// Whether a frame is active on the calling thread.
    pub fn is_bound(&self) -> bool {
        !self.stack.is_empty()
    }
}

/// A proxy read that succeeded.
pub struct Resolved<F, T: ?Sized> {
    frame: Rc<F>,
    resolve: fn(&F) -> &T,
}

impl<F, T: ?Sized> Resolved<F, T> {
    /// The whole frame the field was read from.
    pub fn frame(&self) -> &Rc<F> {
        &self.frame
    }
}

impl<F, T: ?Sized> Deref for Resolved<F, T> {
    type Target = T;

    fn deref(&self) -> &T {
        (self.resolve)(&self.frame)
    }
}

impl<F, T: ?Sized + fmt::Debug> fmt::Debug for Resolved<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
