//! Timing helpers for device-flavored modules.
//!
//! A device module carries two capabilities scripts lean on constantly:
//! `sleep`, a deadline-based pause that cooperates with the scheduler by
//! reporting pending instead of blocking, and `timer`, a persistent
//! stopwatch for measuring phases:
//!
//! ```text
//! s robot timer reset
//! a robot sleep 2000
//! s robot timer read
//! ```
//!
//! Both keep their state in the registered function itself, guarded by a
//! mutex, so repeated calls from any connection or script tick observe one
//! consistent deadline or origin.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::function::{Function, Outcome};
use crate::module::Module;

/// Build a module of kind `Device` with the timing capabilities installed.
pub fn device_module(id: impl Into<String>) -> Module {
    let id = id.into();
    let module = Module::with_kind(id.clone(), "Device");
    module.register("sleep", Sleep { deadline: Mutex::new(None) });
    module.register("timer", Stopwatch { id, origin: Mutex::new(Instant::now()) });
    module
}

/// Cooperative pause. The arming call parses the duration and reports
/// pending; later calls keep reporting `Sleeping` until the deadline has
/// passed, then finish once with `Done` and disarm, ready to re-arm.
struct Sleep {
    deadline: Mutex<Option<Instant>>,
}

impl Function for Sleep {
    fn call(&self, parameter: Option<&str>) -> Result<Outcome> {
        let mut deadline = self.deadline.lock().expect("Sleep mutex poisoned");
        match *deadline {
            None => {
                let millis: u64 = parameter
                    .context("sleep requires a duration in milliseconds")?
                    .parse()
                    .context("invalid sleep duration")?;
                *deadline = Some(Instant::now() + Duration::from_millis(millis));
                Ok(Outcome::pending("Sleeping"))
            }
            Some(target) => {
                if Instant::now() > target {
                    *deadline = None;
                    Ok(Outcome::finished("Done"))
                } else {
                    Ok(Outcome::pending("Sleeping"))
                }
            }
        }
    }
}

/// Persistent stopwatch. `reset` re-zeroes it; any other parameter reads
/// the elapsed time as `<ms>ms, <s>s.`, logging the reading as well.
struct Stopwatch {
    id: String,
    origin: Mutex<Instant>,
}

impl Function for Stopwatch {
    fn call(&self, parameter: Option<&str>) -> Result<Outcome> {
        let parameter = parameter.context("timer requires a parameter (reset to re-zero)")?;
        let mut origin = self.origin.lock().expect("Stopwatch mutex poisoned");
        if parameter == "reset" {
            *origin = Instant::now();
            return Ok(Outcome::finished("Timer reset"));
        }
        let delta = origin.elapsed().as_millis();
        let reading = format!("{delta}ms, {}s.", delta / 1000);
        log::info!("[{}] Timer result: {reading}", self.id);
        Ok(Outcome::finished(reading))
    }
}
