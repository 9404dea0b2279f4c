//! Minimal compensating-transaction runner.
//!
//! # Responsibility
//! - Run named steps strictly in order over a shared context.
//! - On the first failure, undo completed steps in reverse order.
//!
//! # Invariants
//! - Only steps whose forward action succeeded are compensated.
//! - Compensation is best effort: a failing compensation is recorded and the
//!   unwind continues with the remaining steps.

use log::{error, info, warn};

type Action<'a, C, E> = Box<dyn Fn(&mut C) -> Result<(), E> + 'a>;

/// One saga step: a forward action and an optional compensation.
pub struct SagaStep<'a, C, E> {
    name: &'static str,
    forward: Action<'a, C, E>,
    compensate: Option<Action<'a, C, E>>,
}

impl<'a, C, E> SagaStep<'a, C, E> {
    pub fn new(name: &'static str, forward: impl Fn(&mut C) -> Result<(), E> + 'a) -> Self {
        Self {
            name,
            forward: Box::new(forward),
            compensate: None,
        }
    }

    pub fn with_compensation(mut self, compensate: impl Fn(&mut C) -> Result<(), E> + 'a) -> Self {
        self.compensate = Some(Box::new(compensate));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Outcome of an aborted saga.
#[derive(Debug)]
pub struct SagaFailure<E> {
    /// Step whose forward action failed.
    pub step: &'static str,
    pub error: E,
    /// Compensations that failed during unwind, by step name.
    pub compensation_errors: Vec<(&'static str, E)>,
}

impl<E> SagaFailure<E> {
    /// Whether every completed step was undone successfully.
    pub fn fully_compensated(&self) -> bool {
        self.compensation_errors.is_empty()
    }
}

/// Ordered list of steps sharing a context of type `C`.
pub struct Saga<'a, C, E> {
    name: &'static str,
    steps: Vec<SagaStep<'a, C, E>>,
}

impl<'a, C, E> Saga<'a, C, E>
where
    E: std::fmt::Display,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: SagaStep<'a, C, E>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(SagaStep::name).collect()
    }

    /// Runs every step; unwinds and reports the first failure.
    pub fn run(&self, context: &mut C) -> Result<(), SagaFailure<E>> {
        info!(
            "event=saga_run module=saga status=start saga={} steps={}",
            self.name,
            self.step_names().join(",")
        );
        for (index, step) in self.steps.iter().enumerate() {
            match (step.forward)(context) {
                Ok(()) => {
                    info!(
                        "event=saga_step module=saga status=ok saga={} step={}",
                        self.name, step.name
                    );
                }
                Err(err) => {
                    warn!(
                        "event=saga_step module=saga status=error saga={} step={} error={}",
                        self.name, step.name, err
                    );
                    let compensation_errors = self.unwind(&self.steps[..index], context);
                    return Err(SagaFailure {
                        step: step.name,
                        error: err,
                        compensation_errors,
                    });
                }
            }
        }
        Ok(())
    }

    fn unwind(&self, completed: &[SagaStep<'a, C, E>], context: &mut C) -> Vec<(&'static str, E)> {
        let mut failures = Vec::new();
        for step in completed.iter().rev() {
            let Some(compensate) = step.compensate.as_ref() else {
                continue;
            };
            match compensate(context) {
                Ok(()) => info!(
                    "event=saga_compensate module=saga status=ok saga={} step={}",
                    self.name, step.name
                ),
                Err(err) => {
                    error!(
                        "event=saga_compensate module=saga status=error saga={} step={} error={}",
                        self.name, step.name, err
                    );
                    failures.push((step.name, err));
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::{Saga, SagaStep};

    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
    }

    fn record(name: &'static str) -> impl Fn(&mut Trace) -> Result<(), String> {
        move |trace: &mut Trace| {
            trace.events.push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn runs_steps_in_order() {
        let saga = Saga::new("test")
            .step(SagaStep::new("a", record("a")))
            .step(SagaStep::new("b", record("b")));
        let mut trace = Trace::default();
        saga.run(&mut trace).unwrap();
        assert_eq!(trace.events, vec!["a", "b"]);
        assert_eq!(saga.step_names(), vec!["a", "b"]);
    }

    #[test]
    fn failure_compensates_completed_steps_in_reverse() {
        let saga = Saga::new("test")
            .step(SagaStep::new("a", record("a")).with_compensation(record("undo a")))
            .step(SagaStep::new("b", record("b")))
            .step(SagaStep::new("c", record("c")).with_compensation(record("undo c")))
            .step(
                SagaStep::new("d", |_: &mut Trace| Err("boom".to_string()))
                    .with_compensation(record("undo d")),
            )
            .step(SagaStep::new("e", record("e")));

        let mut trace = Trace::default();
        let failure = saga.run(&mut trace).unwrap_err();

        assert_eq!(failure.step, "d");
        assert_eq!(failure.error, "boom");
        assert!(failure.fully_compensated());
        assert_eq!(trace.events, vec!["a", "b", "c", "undo c", "undo a"]);
    }

    #[test]
    fn failing_compensation_is_recorded_and_unwind_continues() {
        let saga = Saga::new("test")
            .step(SagaStep::new("a", record("a")).with_compensation(record("undo a")))
            .step(
                SagaStep::new("b", record("b"))
                    .with_compensation(|_: &mut Trace| Err("stuck".to_string())),
            )
            .step(SagaStep::new("c", |_: &mut Trace| Err("boom".to_string())));

        let mut trace = Trace::default();
        let failure = saga.run(&mut trace).unwrap_err();

        assert_eq!(failure.compensation_errors, vec![("b", "stuck".to_string())]);
        assert_eq!(trace.events, vec!["a", "b", "undo a"]);
    }
}
