//! # Ignition State Detector
//!
//! Debounces the power-sense GPIO into a logical ON/OFF signal.
//!
//! The switched power rail bounces while the key turns and while the
//! charging system settles, so a single raw read cannot be trusted. The
//! detector keeps the 3 most recent samples in a shift register and only
//! changes its logical state when all 3 agree; any mixed window leaves the
//! previous state in place. Session lifecycle hangs off the resulting
//! edges: OFF→ON opens a session, ON→OFF tears it down.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, RideLoggerError};

/// Logical ignition state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionState {
    Off,
    On,
}

/// Edge reported by one detector step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionEdge {
    /// No logical transition this iteration
    None,
    /// OFF→ON: a session must be created
    TurnedOn,
    /// ON→OFF: the session must be torn down
    TurnedOff,
}

/// Shift register of the 3 most recent raw samples, newest first
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleWindow {
    samples: [bool; 3],
}

impl SampleWindow {
    /// Push a raw sample, discarding the oldest
    pub fn push(&mut self, sample: bool) {
        self.samples[2] = self.samples[1];
        self.samples[1] = self.samples[0];
        self.samples[0] = sample;
    }

    pub fn all_on(&self) -> bool {
        self.samples.iter().all(|&s| s)
    }

    pub fn all_off(&self) -> bool {
        self.samples.iter().all(|&s| !s)
    }
}

/// Pure debounce transition function
///
/// Only a unanimous window moves the state; disagreement holds it.
pub fn next_state(current: IgnitionState, window: &SampleWindow) -> IgnitionState {
    if window.all_on() {
        IgnitionState::On
    } else if window.all_off() {
        IgnitionState::Off
    } else {
        current
    }
}

/// Power-sense input sampled once per loop iteration
pub trait IgnitionInput: Send {
    /// Read the raw pin level; a failure here is fatal to the loop
    fn read(&mut self) -> Result<bool>;
}

/// Ignition sense pin via the sysfs GPIO interface
pub struct SysfsGpioInput {
    value_path: PathBuf,
}

impl SysfsGpioInput {
    /// Export the pin, set it as an input and hold on to its value file
    ///
    /// Re-exporting an already exported pin fails with EBUSY; that case is
    /// accepted so the logger can restart without a GPIO cleanup step.
    pub fn open(gpio_root: &Path, pin: u32) -> Result<Self> {
        let pin_dir = gpio_root.join(format!("gpio{}", pin));

        if !pin_dir.exists() {
            let mut export = fs::OpenOptions::new()
                .write(true)
                .open(gpio_root.join("export"))
                .map_err(|e| RideLoggerError::Gpio(format!("failed to open export: {}", e)))?;
            write!(export, "{}", pin)
                .map_err(|e| RideLoggerError::Gpio(format!("failed to export pin {}: {}", pin, e)))?;
        }

        fs::write(pin_dir.join("direction"), "in")
            .map_err(|e| RideLoggerError::Gpio(format!("failed to set pin {} direction: {}", pin, e)))?;

        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

impl IgnitionInput for SysfsGpioInput {
    fn read(&mut self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path)
            .map_err(|e| RideLoggerError::Gpio(format!("failed to read ignition pin: {}", e)))?;
        Ok(raw.trim() != "0")
    }
}

/// Debounced detector combining the input, the window and the FSM
pub struct IgnitionDetector<I: IgnitionInput> {
    input: I,
    window: SampleWindow,
    state: IgnitionState,
}

impl<I: IgnitionInput> IgnitionDetector<I> {
    /// Start in the OFF state with an all-false window
    pub fn new(input: I) -> Self {
        Self {
            input,
            window: SampleWindow::default(),
            state: IgnitionState::Off,
        }
    }

    pub fn state(&self) -> IgnitionState {
        self.state
    }

    /// Sample the pin once and report the resulting edge, if any
    pub fn sample(&mut self) -> Result<IgnitionEdge> {
        let raw = self.input.read()?;
        self.window.push(raw);

        let next = next_state(self.state, &self.window);
        let edge = match (self.state, next) {
            (IgnitionState::Off, IgnitionState::On) => IgnitionEdge::TurnedOn,
            (IgnitionState::On, IgnitionState::Off) => IgnitionEdge::TurnedOff,
            _ => IgnitionEdge::None,
        };

        if edge != IgnitionEdge::None {
            debug!("ignition state changed to {:?}", next);
        }

        self.state = next;
        Ok(edge)
    }
}
