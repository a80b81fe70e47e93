//! Output events and the observer list that delivers them.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// What a shell emits while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Raw process output.
    Data(Vec<u8>),
    /// Status text produced by the shell itself.
    Message(String),
}

impl ShellEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ShellEvent::Data(_) => "data",
            ShellEvent::Message(_) => "message",
        }
    }
}

type Listener<E> = Box<dyn FnMut(&E)>;

/// A list of callbacks receiving every emitted event, in subscription order.
///
/// Clones share the same listener list. Delivery is synchronous; a listener
/// must not subscribe to or emit on the emitter that is calling it.
pub struct Emitter<E> {
    listeners: Rc<RefCell<Vec<Listener<E>>>>,
}

impl<E> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E: 'static> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl FnMut(&E) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn emit(&self, event: &E) {
        for listener in self.listeners.borrow_mut().iter_mut() {
            listener(event);
        }
    }

    /// Re-emit every event of this emitter on `sink`.
    pub fn forward_to(&self, sink: &Emitter<E>) {
        let sink = sink.clone();
        self.subscribe(move |event| sink.emit(event));
    }
}

impl Emitter<ShellEvent> {
    /// Write data and messages to `out` as one stream.
    ///
    /// Messages go on their own line; data following a message is separated
    /// from it by a blank line. Write errors are dropped: a closed sink must
    /// not stop the command producing the output.
    pub fn pipe<W: Write + 'static>(&self, mut out: W) {
        let mut after_message = false;
        self.subscribe(move |event| {
            let _ = write_event(&mut out, event, &mut after_message);
        });
    }
}

fn write_event<W: Write>(out: &mut W, event: &ShellEvent, after_message: &mut bool) -> std::io::Result<()> {
    match event {
        ShellEvent::Data(bytes) => {
            if *after_message {
                out.write_all(b"\r\n\n")?;
            }
            *after_message = false;
            out.write_all(bytes)?;
        }
        ShellEvent::Message(message) => {
            write!(out, "\r\n{message}")?;
            *after_message = true;
        }
    }
    out.flush()
}

/// An in-memory sink whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
