//! Continuation engine
//!
//! A program is a state machine. Each scheduling slot runs one step, and the
//! step returns what should run next. Waiting for input is expressed by
//! returning a reading continuation; the engine then re-enters the line
//! editor, key reader or pager on every slot until it completes, and only
//! then resumes the program at the state it named.
//!
//! ```text
//!   step(Start) ──readline──▶ [line editor] ··· [line editor] ──▶ step(GotLine)
//!                                   ▲ one slot per re-entry
//! ```

use crate::context::{LineEvent, PagerEvent, ProcessContext};
use crate::error::ProcessError;
use std::fmt;

/// What a step asks the engine to do next
///
/// Build the reading variants through [`ProcessContext::readline`],
/// [`ProcessContext::readchar`] and [`ProcessContext::pager`], which also
/// print the prompt and reset the input state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation<S> {
    /// Run the program again at `S` next slot
    Step(S),
    /// Edit a line, then run `next`; `on_interrupt` runs on ^C if set
    ReadLine { next: S, on_interrupt: Option<S> },
    /// Read one key, then run `next`
    ReadChar { next: S },
    /// Page through text, then run `next`
    Pager { next: S },
    /// Terminate the process
    Exit,
}

/// A program the scheduler can run
pub trait Program: Send + 'static {
    type State: fmt::Debug + Send + 'static;

    fn name(&self) -> &str;

    /// State the first step runs in
    fn entry(&self) -> Self::State;

    fn step(
        &mut self,
        state: Self::State,
        cx: &mut ProcessContext<'_>,
    ) -> Result<Continuation<Self::State>, ProcessError>;

    /// Cleanup hook run when the process is reaped for any reason
    fn on_kill(&mut self) {}
}

/// What a process is waiting on between slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Running,
    ReadLine,
    ReadChar,
    Pager,
    Done,
}

/// Outcome of one scheduling slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Type-erased program as stored in a process table
pub trait Runnable: Send {
    fn name(&self) -> &str;
    fn run_slice(&mut self, cx: &mut ProcessContext<'_>) -> Result<Flow, ProcessError>;
    fn waiting(&self) -> Wait;
    fn on_kill(&mut self);
}

enum Mode<S> {
    Run(S),
    ReadLine { next: S, on_interrupt: Option<S> },
    ReadChar { next: S },
    Pager { next: S },
    Done,
}

/// Drives a [`Program`] through its continuations
pub struct Driver<P: Program> {
    program: P,
    mode: Mode<P::State>,
}

impl<P: Program> Driver<P> {
    pub fn new(program: P) -> Self {
        let entry = program.entry();
        Self {
            program,
            mode: Mode::Run(entry),
        }
    }

    pub fn boxed(program: P) -> Box<dyn Runnable> {
        Box::new(Self::new(program))
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    fn enter(&mut self, next: Continuation<P::State>) -> Flow {
        self.mode = match next {
            Continuation::Step(state) => Mode::Run(state),
            Continuation::ReadLine { next, on_interrupt } => Mode::ReadLine { next, on_interrupt },
            Continuation::ReadChar { next } => Mode::ReadChar { next },
            Continuation::Pager { next } => Mode::Pager { next },
            Continuation::Exit => Mode::Done,
        };
        match self.mode {
            Mode::Done => Flow::Exit,
            _ => Flow::Continue,
        }
    }
}

impl<P: Program> Runnable for Driver<P> {
    fn name(&self) -> &str {
        self.program.name()
    }

    fn run_slice(&mut self, cx: &mut ProcessContext<'_>) -> Result<Flow, ProcessError> {
        let mode = std::mem::replace(&mut self.mode, Mode::Done);
        match mode {
            Mode::Run(state) => {
                let next = self.program.step(state, cx)?;
                Ok(self.enter(next))
            }
            Mode::ReadLine { next, on_interrupt } => {
                self.mode = match (cx.poll_line(on_interrupt.is_some()), on_interrupt) {
                    (LineEvent::Submitted, _) => Mode::Run(next),
                    (LineEvent::Interrupted, Some(abort)) => Mode::Run(abort),
                    (_, on_interrupt) => Mode::ReadLine { next, on_interrupt },
                };
                Ok(Flow::Continue)
            }
            Mode::ReadChar { next } => {
                self.mode = if cx.poll_char() {
                    Mode::Run(next)
                } else {
                    Mode::ReadChar { next }
                };
                Ok(Flow::Continue)
            }
            Mode::Pager { next } => {
                self.mode = match cx.poll_pager() {
                    PagerEvent::Closed => Mode::Run(next),
                    PagerEvent::Open => Mode::Pager { next },
                };
                Ok(Flow::Continue)
            }
            Mode::Done => Ok(Flow::Exit),
        }
    }

    fn waiting(&self) -> Wait {
        match self.mode {
            Mode::Run(_) => Wait::Running,
            Mode::ReadLine { .. } => Wait::ReadLine,
            Mode::ReadChar { .. } => Wait::ReadChar,
            Mode::Pager { .. } => Wait::Pager,
            Mode::Done => Wait::Done,
        }
    }

    fn on_kill(&mut self) {
        self.mode = Mode::Done;
        self.program.on_kill();
    }
}
