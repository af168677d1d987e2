use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::commands::blpop::{self, Blpop};
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;

/// A command together with the channel its reply is sent on.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Frame>,
}

/// Sent back to the dispatcher by a blocked pop's helper task.
#[derive(Debug)]
enum Callback {
    /// The key was signalled, the pop should be attempted again.
    Wakeup(Wakeup),
    /// The helper gave up on `key`, either on timeout or because its client left.
    Abandoned(String),
}

#[derive(Debug)]
struct Wakeup {
    key: String,
    deadline: Option<Instant>,
    reply: oneshot::Sender<Frame>,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum DispatcherError {
    #[error("ERR server is shutting down")]
    Closed,
}

/// Submission side of the dispatcher. Cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct Handle {
    requests: mpsc::Sender<Request>,
}

impl Handle {
    /// Queues `command` and waits for its reply. Waits as long as a blocked pop does.
    pub async fn submit(&self, command: Command) -> Result<Frame, DispatcherError> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| DispatcherError::Closed)?;

        response.await.map_err(|_| DispatcherError::Closed)
    }
}

/// The single task that owns the [`Store`] and the [`WaiterRegistry`].
///
/// Requests are executed one at a time in arrival order, which is what makes every command atomic
/// with respect to the others. A blocked pop never holds the loop: it is handed to a helper task
/// that waits on the key's signal and reports back through the callback channel.
pub struct Dispatcher {
    store: Store,
    waiters: WaiterRegistry,
    requests: mpsc::Receiver<Request>,
    callbacks: mpsc::UnboundedReceiver<Callback>,
    callback_tx: mpsc::UnboundedSender<Callback>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(store: Store, capacity: usize, shutdown: CancellationToken) -> (Dispatcher, Handle) {
        let (requests_tx, requests) = mpsc::channel(capacity.max(1));
        let (callback_tx, callbacks) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            store,
            waiters: WaiterRegistry::new(),
            requests,
            callbacks,
            callback_tx,
            shutdown,
        };

        (dispatcher, Handle { requests: requests_tx })
    }

    /// Runs until shutdown is requested or every [`Handle`] has been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Dispatcher received shutdown signal");
                    break;
                }
                // Never closed, `self` keeps a sender alive.
                Some(callback) = self.callbacks.recv() => match callback {
                    Callback::Wakeup(wakeup) => self.handle_wakeup(wakeup),
                    Callback::Abandoned(key) => self.waiters.release(&key),
                },
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
            }
        }

        debug!("Dispatcher stopped");
    }

    fn handle_request(&mut self, Request { command, reply }: Request) {
        match command {
            Command::Blpop(blpop) => self.block(blpop, reply),
            command => {
                let res = command
                    .exec(&mut self.store, &mut self.waiters)
                    .unwrap_or_else(|e| Frame::Error(e.to_string()));

                if reply.send(res).is_err() {
                    debug!("Client left before its reply was sent");
                }
            }
        }
    }

    /// Pops right away when the list has data, parks the request otherwise.
    fn block(&mut self, Blpop { key, timeout }: Blpop, reply: oneshot::Sender<Frame>) {
        match blpop::pop(&key, &mut self.store, &mut self.waiters) {
            Ok(Some(element)) => self.deliver(key, element, reply),
            Ok(None) => {
                // A deadline past what `Instant` can represent is as good as none.
                let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
                self.park(Wakeup {
                    key,
                    deadline,
                    reply,
                });
            }
            Err(e) => {
                let _ = reply.send(Frame::Error(e.to_string()));
            }
        }
    }

    fn handle_wakeup(&mut self, wakeup: Wakeup) {
        let Wakeup {
            key,
            deadline,
            reply,
        } = wakeup;

        if reply.is_closed() {
            debug!(key, "Client left after being signalled, passing the signal on");
            self.waiters.signal(&key);
            self.waiters.release(&key);
            return;
        }

        match blpop::pop(&key, &mut self.store, &mut self.waiters) {
            Ok(Some(element)) => {
                debug!(key, "Blocked pop served");
                self.deliver(key, element, reply);
            }
            // Another client drained the list first.
            Ok(None) if deadline.is_some_and(|deadline| deadline <= Instant::now()) => {
                debug!(key, "Blocked pop lost the race past its deadline");
                let _ = reply.send(Frame::NullArray);
                self.waiters.release(&key);
            }
            Ok(None) => {
                debug!(key, "Blocked pop lost the race, parking again");
                self.park(Wakeup {
                    key,
                    deadline,
                    reply,
                });
            }
            Err(e) => {
                let _ = reply.send(Frame::Error(e.to_string()));
                self.waiters.release(&key);
            }
        }
    }

    /// Sends `[key, element]`. If the client is gone by then, the element goes back to the head of
    /// the list so that it is not lost.
    fn deliver(&mut self, key: String, element: Bytes, reply: oneshot::Sender<Frame>) {
        let res = blpop::reply(&key, element.clone());
        if reply.send(res).is_ok() {
            return;
        }

        debug!(key, "Client left while being served, restoring the element");
        match self.store.push_front(&key, vec![element]) {
            Ok(_) => self.waiters.signal(&key),
            Err(e) => warn!(key, "Failed to restore popped element: {}", e),
        }
    }

    fn park(&mut self, wakeup: Wakeup) {
        debug!(key = wakeup.key, deadline = ?wakeup.deadline, "Blocked pop parked");

        let notify = self.waiters.subscribe(&wakeup.key);
        let callbacks = self.callback_tx.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(wait_for_push(notify, wakeup, callbacks, shutdown));
    }
}

enum Wait {
    Signalled,
    TimedOut,
    ClientGone,
    Shutdown,
}

/// Waits for `key` to be signalled, for the deadline to pass, or for the client to leave.
///
/// The store is never touched here: a signal is handed back to the dispatcher, a timeout is
/// answered directly.
async fn wait_for_push(
    notify: Arc<Notify>,
    mut wakeup: Wakeup,
    callbacks: mpsc::UnboundedSender<Callback>,
    shutdown: CancellationToken,
) {
    let deadline = wakeup.deadline;

    let outcome = {
        let signalled = async {
            match deadline {
                Some(deadline) => time::timeout_at(deadline, notify.notified())
                    .await
                    .map_or(Wait::TimedOut, |_| Wait::Signalled),
                None => {
                    notify.notified().await;
                    Wait::Signalled
                }
            }
        };

        tokio::select! {
            outcome = signalled => outcome,
            _ = wakeup.reply.closed() => Wait::ClientGone,
            _ = shutdown.cancelled() => Wait::Shutdown,
        }
    };

    // The registry counts live handles to decide whether a key is still waited on.
    drop(notify);

    let callback = match outcome {
        Wait::Signalled => {
            debug!(key = wakeup.key, "Blocked pop signalled");
            Callback::Wakeup(wakeup)
        }
        Wait::TimedOut => {
            debug!(key = wakeup.key, "Blocked pop timed out");
            let _ = wakeup.reply.send(Frame::NullArray);
            Callback::Abandoned(wakeup.key)
        }
        Wait::ClientGone => {
            debug!(key = wakeup.key, "Client left while blocked");
            Callback::Abandoned(wakeup.key)
        }
        Wait::Shutdown => return,
    };

    // Fails only once the dispatcher has stopped.
    let _ = callbacks.send(callback);
}
