//! Named timing/counting scopes.
//!
//! A [`Monitor`] accumulates the wall-clock time and the number of times its
//! scope was entered. Scopes are RAII guards: the elapsed time is recorded when
//! the guard drops, on every exit path. A disabled monitor records nothing.
//!
//! Monitors share their accumulator through `Rc<Cell<_>>`, so they are neither
//! `Send` nor `Sync`: each worker builds its own.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::logging::log_monitor;

#[derive(Debug, Default)]
struct Accumulator {
    duration: Cell<Duration>,
    counts: Cell<u64>,
}

#[derive(Debug, Clone)]
pub struct Monitor {
    operation: String,
    acc: Option<Rc<Accumulator>>,
}

impl Monitor {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            acc: Some(Rc::new(Accumulator::default())),
        }
    }

    /// A monitor whose scopes measure nothing.
    pub fn noop() -> Self {
        Self {
            operation: String::new(),
            acc: None,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_enabled(&self) -> bool {
        self.acc.is_some()
    }

    /// Enter the scope; the measurement is recorded when the guard drops.
    pub fn measure(&self) -> MonitorScope<'_> {
        MonitorScope {
            monitor: self,
            started: self.acc.as_ref().map(|_| Instant::now()),
        }
    }

    pub fn duration(&self) -> Duration {
        self.acc.as_ref().map(|a| a.duration.get()).unwrap_or_default()
    }

    pub fn counts(&self) -> u64 {
        self.acc.as_ref().map(|a| a.counts.get()).unwrap_or(0)
    }

    fn record(&self, elapsed: Duration) {
        if let Some(acc) = &self.acc {
            acc.duration.set(acc.duration.get() + elapsed);
            acc.counts.set(acc.counts.get() + 1);
        }
    }
}

/// Guard returned by [`Monitor::measure`].
pub struct MonitorScope<'m> {
    monitor: &'m Monitor,
    started: Option<Instant>,
}

impl Drop for MonitorScope<'_> {
    fn drop(&mut self) {
        if let Some(started) = self.started.take() {
            self.monitor.record(started.elapsed());
        }
    }
}

/// Produces monitors for named operations.
pub trait MonitorFactory {
    fn monitor(&self, operation: &str) -> Monitor;
}

impl<F> MonitorFactory for F
where
    F: Fn(&str) -> Monitor,
{
    fn monitor(&self, operation: &str) -> Monitor {
        self(operation)
    }
}

/// Factory handing out disabled monitors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl MonitorFactory for NoopMonitor {
    fn monitor(&self, _operation: &str) -> Monitor {
        Monitor::noop()
    }
}

/// Totals of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReport {
    pub operation: String,
    pub duration: Duration,
    pub counts: u64,
}

/// Factory keeping track of every monitor it created, for reporting.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    children: RefCell<Vec<Monitor>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals per operation, in order of first creation. Monitors created
    /// several times under the same name are summed.
    pub fn report(&self) -> Vec<MonitorReport> {
        let mut reports: Vec<MonitorReport> = Vec::new();
        for child in self.children.borrow().iter() {
            match reports.iter_mut().find(|r| r.operation == child.operation) {
                Some(r) => {
                    r.duration += child.duration();
                    r.counts += child.counts();
                }
                None => reports.push(MonitorReport {
                    operation: child.operation.clone(),
                    duration: child.duration(),
                    counts: child.counts(),
                }),
            }
        }
        reports
    }

    /// Emit one `profile` log record per operation.
    pub fn flush(&self) {
        for r in self.report() {
            log_monitor(&r.operation, r.duration.as_secs_f64(), r.counts);
        }
    }
}

impl MonitorFactory for PerformanceMonitor {
    fn monitor(&self, operation: &str) -> Monitor {
        let monitor = Monitor::new(operation);
        self.children.borrow_mut().push(monitor.clone());
        monitor
    }
}
