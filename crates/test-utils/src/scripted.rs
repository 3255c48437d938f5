use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ghostctl::errors::Result;
use ghostctl::exec::BoxFuture;
use ghostctl::readiness::Clock;
use ghostctl::units::{Unit, UnitObserver};

/// Sequence of answers; each call takes the next one and the last one
/// repeats forever.
struct Frames<T> {
    frames: Vec<T>,
    cursor: usize,
}

impl<T: Clone + Default> Frames<T> {
    fn new(frames: Vec<T>) -> Self {
        Self { frames, cursor: 0 }
    }

    fn next(&mut self) -> T {
        let idx = self.cursor.min(self.frames.len().saturating_sub(1));
        self.cursor += 1;
        self.frames.get(idx).cloned().unwrap_or_default()
    }
}

/// A fake unit observer driven by scripts:
/// - `running_units` answers from a list of unit-list frames
/// - `tail_logs` answers per unit name from a list of log frames
///
/// Every call is counted so tests can assert how far polling went.
pub struct ScriptedObserver {
    units: Mutex<Frames<Vec<Unit>>>,
    logs: Mutex<HashMap<String, Frames<Vec<String>>>>,
    tail_requests: Mutex<Vec<(String, usize)>>,
    list_calls: Mutex<usize>,
}

impl ScriptedObserver {
    /// The same units are running on every call.
    pub fn new(units: Vec<Unit>) -> Self {
        Self::with_unit_frames(vec![units])
    }

    pub fn with_unit_frames(frames: Vec<Vec<Unit>>) -> Self {
        Self {
            units: Mutex::new(Frames::new(frames)),
            logs: Mutex::new(HashMap::new()),
            tail_requests: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
        }
    }

    /// Successive `tail_logs` answers for the unit named `name`.
    pub fn with_logs(self, name: &str, frames: Vec<Vec<&str>>) -> Self {
        let frames = frames
            .into_iter()
            .map(|f| f.into_iter().map(str::to_string).collect())
            .collect();
        self.logs
            .lock()
            .unwrap()
            .insert(name.to_string(), Frames::new(frames));
        self
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    /// `(unit name, line count)` for each `tail_logs` call.
    pub fn tail_requests(&self) -> Vec<(String, usize)> {
        self.tail_requests.lock().unwrap().clone()
    }
}

impl UnitObserver for ScriptedObserver {
    fn running_units(&self) -> BoxFuture<'_, Result<Vec<Unit>>> {
        *self.list_calls.lock().unwrap() += 1;
        let units = self.units.lock().unwrap().next();
        Box::pin(async move { Ok(units) })
    }

    fn tail_logs<'a>(&'a self, unit: &'a Unit, lines: usize) -> BoxFuture<'a, Result<Vec<String>>> {
        self.tail_requests
            .lock()
            .unwrap()
            .push((unit.name.clone(), lines));
        let logs = self
            .logs
            .lock()
            .unwrap()
            .get_mut(&unit.name)
            .map(Frames::next)
            .unwrap_or_default();
        Box::pin(async move { Ok(logs) })
    }
}

/// A clock that records requested sleeps and returns immediately.
#[derive(Default)]
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.sleeps.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}
