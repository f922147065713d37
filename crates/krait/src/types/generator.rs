//! Generator state and continuation frames.
//!
//! A generator is either a fully materialised sequence (eager mode) or a
//! suspended computation described by a scope snapshot plus an ordered list
//! of resumption frames (deferred mode). Frame order is the critical
//! invariant: the innermost suspension context sits at the head of the list,
//! so the resume driver peels frames in execution order.

use std::{collections::VecDeque, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{Block, ExceptHandler, ExprLoc, Target},
    exc::PyExc,
    value::{RangeVal, Value},
};

use super::function::FuncObj;

/// Iteration state of a for-loop captured across a suspension.
#[derive(Debug, Clone)]
pub(crate) enum ForIter {
    /// Remaining already-evaluated items.
    Items(VecDeque<Value>),
    /// A lazy range cursor; huge ranges never materialise.
    Range(RangeVal),
}

impl ForIter {
    pub(crate) fn next(&mut self) -> Option<Value> {
        match self {
            Self::Items(items) => items.pop_front(),
            Self::Range(r) => {
                let done = if r.step > 0 { r.start >= r.stop } else { r.start <= r.stop };
                if done {
                    return None;
                }
                let value = Value::int(r.start);
                r.start += r.step;
                Some(value)
            }
        }
    }
}

/// The source feeding a suspended `yield from`.
#[derive(Debug, Clone)]
pub(crate) enum YieldSource {
    /// Unconsumed items of a materialised iterable.
    Items(VecDeque<Value>),
    /// An inner deferred generator whose suspensions are forwarded.
    Gen(Rc<std::cell::RefCell<GeneratorObj>>),
}

/// One resumption frame: the work remaining at one lexical scope after a
/// suspension. On `yield`, each enclosing construct appends its own frame so
/// inner frames precede outer frames.
#[derive(Debug, Clone)]
pub(crate) enum Frame {
    /// Remaining statements of a block, starting at `next`.
    Block { body: Block, next: usize },
    /// A for-loop mid-iteration: remaining items plus body and else clause.
    ForLoop {
        target: Target,
        iter: ForIter,
        body: Block,
        or_else: Option<Block>,
    },
    /// A while-loop: condition re-evaluated each round.
    WhileLoop {
        cond: ExprLoc,
        body: Block,
        or_else: Option<Block>,
    },
    /// A `yield from` with unconsumed inner values.
    YieldFrom { source: YieldSource },
    /// A try statement suspended inside one of its regions.
    ///
    /// The protected continuation lives inside the frame rather than ahead
    /// of it in the list, so resumption re-enters with handler matching and
    /// `finally` semantics intact. `finally` runs only once the statement is
    /// truly exited, never at a suspension.
    Try {
        inner: Vec<Frame>,
        handlers: Vec<ExceptHandler>,
        or_else: Option<Block>,
        finally: Option<Block>,
        stage: TryStage,
    },
}

/// Which region of a try statement a suspension happened in.
#[derive(Debug, Clone)]
pub(crate) enum TryStage {
    /// Suspended inside the try body.
    Body,
    /// Suspended inside an except handler; carries the active exception so
    /// a bare `raise` after resumption still re-raises it.
    Handler(PyExc),
    /// Suspended inside the else block.
    OrElse,
    /// Suspended inside the finally block, holding the outcome it may
    /// override on completion.
    Finally(TryPending),
}

/// The outcome a `finally` block inherits from the regions before it.
#[derive(Debug, Clone)]
pub(crate) enum TryPending {
    Normal,
    Return(Value),
    Break,
    Continue,
    Raise(PyExc),
}

/// Execution state of a generator object.
#[derive(Debug)]
pub(crate) enum GenState {
    /// Deferred mode: created but the body has not started executing.
    NotStarted {
        func: Rc<FuncObj>,
        /// The call scope: captured snapshot plus bound arguments.
        scope: IndexMap<String, Value>,
    },
    /// Deferred mode: suspended at a yield.
    Suspended {
        frames: Vec<Frame>,
        scope: IndexMap<String, Value>,
    },
    /// Eager mode: every yielded value, already materialised.
    Materialized { items: VecDeque<Value> },
    /// Reentrancy guard while the body is executing.
    Running,
    Done,
}

#[derive(Debug)]
pub(crate) struct GeneratorObj {
    pub qualname: String,
    pub state: GenState,
}

impl GeneratorObj {
    pub(crate) fn materialized(qualname: String, items: Vec<Value>) -> Self {
        Self {
            qualname,
            state: GenState::Materialized { items: items.into() },
        }
    }

    pub(crate) fn deferred(qualname: String, func: Rc<FuncObj>, scope: IndexMap<String, Value>) -> Self {
        Self {
            qualname,
            state: GenState::NotStarted { func, scope },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn range_iter_is_lazy() {
        let mut iter = ForIter::Range(RangeVal {
            start: 0,
            stop: i64::MAX,
            step: 1,
        });
        assert_eq!(iter.next().unwrap().py_repr(), "0");
        assert_eq!(iter.next().unwrap().py_repr(), "1");
    }

    #[test]
    fn negative_step_range() {
        let mut iter = ForIter::Range(RangeVal {
            start: 3,
            stop: 0,
            step: -1,
        });
        let mut got = Vec::new();
        while let Some(v) = iter.next() {
            got.push(v.py_repr());
        }
        assert_eq!(got, vec!["3", "2", "1"]);
    }
}
