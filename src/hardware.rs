//! Hardware abstraction consumed by the dome controller.
//!
//! The controller drives two relay outputs and watches two edge-triggered
//! sensor inputs. Real deployments wrap GPIO pins (debounce included)
//! behind these traits; tests and the demo binary use the simulated
//! implementations in [`crate::simulator`]. The controller itself holds
//! no pin state, so it runs identically against either.

use std::sync::Arc;

/// Callback invoked on a sensor edge. Edges are delivered from whatever
/// thread the hardware layer runs its event loop on, so callbacks must be
/// safe to call concurrently with the controller's own tasks.
pub type EdgeCallback = Box<dyn Fn() + Send + Sync>;

/// A latching digital output, such as a relay.
pub trait OutputSwitch: Send + Sync {
    fn set_active(&self, active: bool);

    fn is_active(&self) -> bool;
}

/// A debounced digital input with edge callbacks.
pub trait InputSensor: Send + Sync {
    fn is_active(&self) -> bool;

    /// Register the callback run when the input goes active. Replaces
    /// any previously registered callback.
    fn set_on_activate(&self, callback: EdgeCallback);

    /// Register the callback run when the input goes inactive.
    fn set_on_deactivate(&self, callback: EdgeCallback);
}

/// The dome's physical interface: two relays, two sensors.
///
/// The rotation relay is the motor on/off switch; its normally open
/// terminal feeds the common terminal of the direction relay, so the
/// direction must be set before rotation is switched on.
#[derive(Clone)]
pub struct DomeHardware {
    pub rotation_relay: Arc<dyn OutputSwitch>,
    pub direction_relay: Arc<dyn OutputSwitch>,
    pub encoder: Arc<dyn InputSensor>,
    pub home_sensor: Arc<dyn InputSensor>,
}
