//! Messaging context.
//!
//! A [`Context`] groups sockets that may talk over `inproc://` and owns the
//! background dispatcher used for `tcp://`. Contexts are independent: an
//! inproc name bound in one is invisible to another.

use crate::dispatcher::Dispatcher;
use crate::socket::{Socket, SocketCore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tandem_core::endpoint::EndpointError;
use tandem_core::error::{Result, SocketError};
use tandem_core::options::SocketOptions;
use tandem_core::socket_type::SocketType;
use tracing::debug;

pub(crate) struct ContextInner {
    options: SocketOptions,
    inproc: DashMap<String, Weak<SocketCore>>,
    /// Started on first TCP use
    dispatcher: OnceCell<Dispatcher>,
    terminated: AtomicBool,
}

impl ContextInner {
    pub(crate) fn default_options(&self) -> SocketOptions {
        self.options.clone()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn check_alive(&self) -> Result<()> {
        if self.is_terminated() {
            Err(SocketError::Terminated)
        } else {
            Ok(())
        }
    }

    pub(crate) fn dispatcher(&self) -> Result<&Dispatcher> {
        self.check_alive()?;
        self.dispatcher.get_or_try_init(Dispatcher::start)
    }

    pub(crate) fn register_inproc(&self, name: &str, socket: Weak<SocketCore>) -> Result<()> {
        match self.inproc.entry(name.to_string()) {
            // A name left behind by a socket that no longer exists is free.
            Entry::Occupied(mut entry) if entry.get().strong_count() == 0 => {
                entry.insert(socket);
            }
            Entry::Occupied(_) => {
                return Err(EndpointError::InprocInUse(name.to_string()).into());
            }
            Entry::Vacant(entry) => {
                entry.insert(socket);
            }
        }
        Ok(())
    }

    pub(crate) fn lookup_inproc(&self, name: &str) -> Result<Arc<SocketCore>> {
        self.inproc
            .get(name)
            .and_then(|entry| entry.upgrade())
            .filter(|core| !core.is_closed())
            .ok_or_else(|| EndpointError::InprocNotBound(name.to_string()).into())
    }

    /// Remove `name` if it still belongs to `owner`.
    pub(crate) fn unregister_inproc(&self, name: &str, owner: &Arc<SocketCore>) {
        let owner = Arc::downgrade(owner);
        self.inproc
            .remove_if(name, |_, registered| Weak::ptr_eq(registered, &owner));
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.shutdown();
        }
        debug!("Context terminated");
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Owner of the inproc namespace and the TCP dispatcher.
///
/// Cheap to clone; clones share the same state. Sockets keep their context
/// alive, so the dispatcher runs until [`Context::terminate`] is called or
/// the context and every socket created from it are dropped.
///
/// ```rust,no_run
/// use tandem::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> tandem::Result<()> {
/// let ctx = Context::with_options(
///     SocketOptions::default().with_recv_timeout(Duration::from_secs(1)),
/// );
/// let sub = ctx.socket(SocketType::Sub)?;
/// sub.subscribe("weather")?;
/// sub.connect("tcp://127.0.0.1:5556")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Context with default socket options.
    pub fn new() -> Self {
        Self::with_options(SocketOptions::default())
    }

    /// Context whose sockets start from `options`.
    pub fn with_options(options: SocketOptions) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                options,
                inproc: DashMap::new(),
                dispatcher: OnceCell::new(),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Create a socket of the given pattern.
    pub fn socket(&self, socket_type: SocketType) -> Result<Socket> {
        self.inner.check_alive()?;
        Ok(Socket::new(Arc::clone(&self.inner), socket_type))
    }

    /// Stop the dispatcher and refuse new sockets, binds and connects.
    ///
    /// Every TCP connection is dropped; PAIR peers observe
    /// `ConnectionClosed`. Inproc connections that already exist keep
    /// working. Idempotent.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Default options for new sockets.
    pub fn options(&self) -> SocketOptions {
        self.inner.default_options()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("inproc_names", &self.inner.inproc.len())
            .field("dispatcher", &self.inner.dispatcher.get().is_some())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
