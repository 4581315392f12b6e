//! Simulated dome hardware.
//!
//! `SimSwitch` and `SimSensor` stand in for the relay and sensor pins,
//! and can be driven by hand from tests for exact edge sequences.
//! `DomeSimulator` is the hands-off alternative: a background task that
//! watches the relays and synthesizes the encoder and home edges a real
//! dome would produce, so the controller sees the same event stream in
//! either mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task;
use tokio::time::{sleep, Duration};

use crate::hardware::{DomeHardware, EdgeCallback, InputSensor, OutputSwitch};

/// Simulated relay.
#[derive(Default)]
pub struct SimSwitch {
    active: AtomicBool,
}

impl SimSwitch {
    pub fn new() -> Arc<SimSwitch> {
        Arc::new(SimSwitch::default())
    }
}

impl OutputSwitch for SimSwitch {
    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Simulated digital input.
///
/// Callbacks fire on level transitions only, the way a debounced GPIO
/// input reports edges; driving an already-high pin high again is
/// silent.
#[derive(Default)]
pub struct SimSensor {
    active: AtomicBool,
    on_activate: Mutex<Option<EdgeCallback>>,
    on_deactivate: Mutex<Option<EdgeCallback>>,
}

impl SimSensor {
    pub fn new() -> Arc<SimSensor> {
        Arc::new(SimSensor::default())
    }

    pub fn drive_high(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            if let Some(callback) = self.on_activate.lock().unwrap().as_ref() {
                callback();
            }
        }
    }

    pub fn drive_low(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(callback) = self.on_deactivate.lock().unwrap().as_ref() {
                callback();
            }
        }
    }

    /// Drive one full encoder pulse (rising then falling edge).
    pub fn pulse(&self) {
        self.drive_high();
        self.drive_low();
    }
}

impl InputSensor for SimSensor {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_on_activate(&self, callback: EdgeCallback) {
        *self.on_activate.lock().unwrap() = Some(callback);
    }

    fn set_on_deactivate(&self, callback: EdgeCallback) {
        *self.on_deactivate.lock().unwrap() = Some(callback);
    }
}

/// The full set of simulated pins, kept as concrete handles so tests can
/// drive them directly.
#[derive(Clone)]
pub struct SimHardware {
    pub rotation_relay: Arc<SimSwitch>,
    pub direction_relay: Arc<SimSwitch>,
    pub encoder: Arc<SimSensor>,
    pub home_sensor: Arc<SimSensor>,
}

impl SimHardware {
    pub fn new() -> SimHardware {
        SimHardware {
            rotation_relay: SimSwitch::new(),
            direction_relay: SimSwitch::new(),
            encoder: SimSensor::new(),
            home_sensor: SimSensor::new(),
        }
    }

    /// The trait-object bundle handed to the controller.
    pub fn hardware(&self) -> DomeHardware {
        DomeHardware {
            rotation_relay: self.rotation_relay.clone(),
            direction_relay: self.direction_relay.clone(),
            encoder: self.encoder.clone(),
            home_sensor: self.home_sensor.clone(),
        }
    }
}

impl Default for SimHardware {
    fn default() -> SimHardware {
        SimHardware::new()
    }
}

/// Background task emulating the dome's motion from the relay state.
///
/// While the rotation relay is energised the simulated dome advances one
/// tick per cycle in the direction the direction relay selects, emitting
/// an encoder pulse each tick. The home pin goes high on the tick that
/// lands on the home reference (once per `ticks_per_rotation`) and low
/// again on the next tick; the home edge always follows the tick that
/// landed on the reference.
pub struct DomeSimulator {
    task: task::JoinHandle<()>,
}

impl DomeSimulator {
    pub fn start(
        sim: &SimHardware,
        ticks_per_rotation: i64,
        cadence: Duration,
        start_offset: i64,
    ) -> DomeSimulator {
        let sim = sim.clone();

        let task = task::spawn(async move {
            let mut position = start_offset;
            log::debug!("Simulator starting at position {position}.");
            loop {
                if sim.rotation_relay.is_active() {
                    position += if sim.direction_relay.is_active() {
                        1
                    } else {
                        -1
                    };
                    sim.encoder.pulse();
                    if position.rem_euclid(ticks_per_rotation) == 0 {
                        log::debug!("Simulator crossing home at position {position}.");
                        sim.home_sensor.drive_high();
                    } else {
                        sim.home_sensor.drive_low();
                    }
                }
                sleep(cadence).await;
            }
        });

        DomeSimulator { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DomeSimulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
