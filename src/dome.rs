//! Provide the dome motion and position controller.
//!
//! The controller tracks absolute dome azimuth from an incremental shaft
//! encoder anchored by a home-reference sensor, sequences the rotation
//! and direction relays, and supervises long-running movement commands
//! (goto, home, calibrate, park) from a background task. Commands return
//! immediately; completion is observed through the status accessors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task;
use tokio::time::{sleep, Duration, Instant};

use crate::config::DomeConfig;
use crate::direction::Direction;
use crate::error::DomeResult;
use crate::hardware::DomeHardware;
use crate::position::{az_to_ticks, normalize_360, ticks_to_az, wrap_180};
use crate::status::DomeStatus;

/// Interval between completion-predicate polls in the movement monitor.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause between the homing phase and the counted rotations of a
/// calibration run, to let the drive settle.
const CALIBRATION_SETTLE: Duration = Duration::from_millis(500);

/// Completion target of one supervised movement command.
#[derive(Debug, Clone, Copy)]
enum MotionGoal {
    /// Rotate until within tolerance of the target azimuth.
    Azimuth(f64),
    /// Same as `Azimuth`, and set the parked gate on completion.
    Park(f64),
    /// Rotate CW until the home sensor activates.
    Home,
    /// Count home crossings until the requested rotations are done.
    Calibrate(u32),
}

/// How a movement monitor finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorExit {
    Completed,
    Aborted,
    TimedOut,
}

/// Position and direction record. Everything the sensor callbacks write
/// lives here, behind one mutex, so updates are linearizable against the
/// movement monitor and the status accessors.
#[derive(Debug)]
struct MotionState {
    encoder_count: i64,
    current_direction: Direction,
    last_direction: Direction,
    degrees_per_tick: Option<f64>,
    az_position_tolerance: f64,
    homed: bool,
    calibrating: bool,
    /// Home activations seen during the counted calibration rotations.
    rotation_count: u32,
    /// Latched home edge, cleared whenever a rotation starts. The
    /// monitor polls too slowly to be sure of catching the sensor while
    /// it is still active, so the find-home predicate reads this latch.
    home_crossed: bool,
}

impl MotionState {
    /// Direction to attribute an encoder pulse to. Falls back to the
    /// last direction so pulses from motor coast, delivered after a
    /// stop, still count the right way.
    fn effective_direction(&self) -> Direction {
        if self.current_direction != Direction::None {
            self.current_direction
        } else {
            self.last_direction
        }
    }

    /// Dome azimuth in degrees, `None` until the dome has been homed
    /// and calibrated.
    fn dome_az(&self, home_azimuth: f64) -> Option<f64> {
        if !self.homed {
            return None;
        }
        ticks_to_az(self.encoder_count, home_azimuth, self.degrees_per_tick).ok()
    }

    /// Completion window for goto moves, raised to 1.5 * degrees_per_tick
    /// whenever the configured value falls below that.
    fn effective_tolerance(&mut self) -> f64 {
        if let Some(scale) = self.degrees_per_tick {
            let floor = 1.5 * scale;
            if self.az_position_tolerance < floor {
                log::warn!(
                    "az_position_tolerance [{}] is below 1.5 * degrees_per_tick, raising to [{floor}].",
                    self.az_position_tolerance
                );
                self.az_position_tolerance = floor;
            }
        }
        self.az_position_tolerance
    }
}

struct Shared {
    state: Mutex<MotionState>,
    /// Single movement-command slot. Claimed with compare-exchange when
    /// a command is issued, cleared by the monitor on every exit path.
    moving: AtomicBool,
    /// Level-triggered abort signal; remains set until `abort` observes
    /// the monitor exit and clears it.
    aborting: AtomicBool,
    /// Gate rejecting all movement commands until `unpark`.
    parked: AtomicBool,
    hardware: DomeHardware,
    home_azimuth: f64,
    park_azimuth: f64,
    wait_timeout: Duration,
}

impl Shared {
    // -- sensor callbacks -------------------------------------------------

    /// Encoder edge: count one tick in the effective direction.
    ///
    /// Panics if both directions are unknown: the motor has moved with
    /// no direction on record, and continuing would corrupt the position
    /// estimate irrecoverably.
    fn on_encoder_pulse(&self) {
        let mut state = self.state.lock().unwrap();
        let direction = state.effective_direction();
        if direction == Direction::None {
            log::error!("Encoder pulse with no current or last direction.");
            panic!("encoder pulse with no current or last direction");
        }
        state.encoder_count += direction.sign();
        log::debug!("Encoder count: {}.", state.encoder_count);
    }

    /// Home edge: re-anchor the encoder, or count a calibration
    /// rotation.
    ///
    /// The encoder is only zeroed on a forward (CW) crossing, so a
    /// direction reversal exactly at the home boundary cannot corrupt
    /// the count while hunting around home.
    fn on_home_activate(&self) {
        let mut state = self.state.lock().unwrap();
        log::info!("Home sensor activated.");
        state.home_crossed = true;
        if state.calibrating {
            state.rotation_count += 1;
            log::debug!(
                "Home crossing during calibration, rotation count [{}].",
                state.rotation_count
            );
        } else if state.effective_direction() == Direction::Cw {
            log::debug!("Passing home clockwise, zeroing encoder counts.");
            state.encoder_count = 0;
            state.homed = true;
        }
    }

    fn on_home_deactivate(&self) {
        log::debug!("Home sensor deactivated.");
    }

    // -- relay state machine ----------------------------------------------

    /// Select a direction and energise the rotation relay. Refused while
    /// parked.
    fn rotate(&self, direction: Direction) {
        if direction == Direction::None {
            log::warn!("Refusing to rotate with no direction, use stop instead.");
            return;
        }
        if self.parked.load(Ordering::SeqCst) {
            log::warn!("Dome is parked, refusing to rotate.");
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            state.last_direction = state.current_direction;
            state.current_direction = direction;
            state.home_crossed = false;
        }
        // Direction relay first: its common terminal is fed by the
        // rotation relay.
        self.hardware
            .direction_relay
            .set_active(direction.relay_level());
        self.hardware.rotation_relay.set_active(true);
        log::info!("Rotating dome {direction:?}.");
    }

    /// De-energise the rotation relay. Idempotent: the direction shift
    /// happens only when a rotation was in progress, so a repeated stop
    /// does not erase the coast direction.
    fn stop(&self) {
        self.hardware.rotation_relay.set_active(false);
        let mut state = self.state.lock().unwrap();
        if state.current_direction != Direction::None {
            log::debug!("Setting last direction to {:?}.", state.current_direction);
            state.last_direction = state.current_direction;
            state.current_direction = Direction::None;
        }
    }

    // -- movement monitor -------------------------------------------------

    fn dome_az(&self) -> Option<f64> {
        self.state.lock().unwrap().dome_az(self.home_azimuth)
    }

    /// Direction-signed completion check for goto moves. Signed so an
    /// overshoot past the target flips the sign and completes the move
    /// instead of oscillating around the tolerance boundary.
    fn goto_complete(&self, target_az: f64) -> bool {
        let mut state = self.state.lock().unwrap();
        let tolerance = state.effective_tolerance();
        let Some(dome_az) = state.dome_az(self.home_azimuth) else {
            return false;
        };
        let delta_az = wrap_180(target_az - dome_az);
        let signed_delta = state.current_direction.sign() as f64 * delta_az;
        log::debug!(
            "Delta az [{delta_az:.2}], signed [{signed_delta:.2}], tolerance [{tolerance:.2}]."
        );
        signed_delta <= tolerance
    }

    fn goal_reached(&self, goal: &MotionGoal) -> bool {
        match goal {
            MotionGoal::Azimuth(target_az) | MotionGoal::Park(target_az) => {
                self.goto_complete(*target_az)
            }
            MotionGoal::Home => {
                let state = self.state.lock().unwrap();
                state.home_crossed || self.hardware.home_sensor.is_active()
            }
            MotionGoal::Calibrate(rotations) => {
                let state = self.state.lock().unwrap();
                log::debug!(
                    "Rotation count [{}], rotations to go [{}].",
                    state.rotation_count,
                    rotations.saturating_sub(state.rotation_count)
                );
                state.rotation_count >= *rotations
            }
        }
    }

    /// Poll the completion predicate until it triggers, the abort signal
    /// is observed, or the phase times out. Always stops the motor on
    /// the way out.
    async fn wait_for(&self, goal: MotionGoal) -> MonitorExit {
        let start = Instant::now();
        let exit = loop {
            if self.goal_reached(&goal) {
                break MonitorExit::Completed;
            }
            if self.aborting.load(Ordering::SeqCst) {
                break MonitorExit::Aborted;
            }
            if start.elapsed() > self.wait_timeout {
                break MonitorExit::TimedOut;
            }
            sleep(POLL_INTERVAL).await;
        };
        log::info!("Movement monitor for {goal:?} finished: {exit:?}.");
        self.stop();
        exit
    }

    /// Homing phase, settle pause, then the counted rotations. Runs
    /// inside a single supervisor task so the movement slot is held for
    /// the whole operation; each phase gets a full `wait_timeout`.
    async fn run_calibration(&self, rotations: u32) -> MonitorExit {
        log::info!("Calibration: finding home.");
        self.rotate(Direction::Cw);
        let exit = self.wait_for(MotionGoal::Home).await;
        if exit != MonitorExit::Completed {
            return exit;
        }
        log::info!("Calibration: found home.");

        sleep(CALIBRATION_SETTLE).await;

        log::info!("Calibration: starting [{rotations}] rotations.");
        {
            let mut state = self.state.lock().unwrap();
            state.rotation_count = 0;
            state.calibrating = true;
        }
        self.rotate(Direction::Cw);
        let exit = self.wait_for(MotionGoal::Calibrate(rotations)).await;

        if exit == MonitorExit::Completed {
            let mut state = self.state.lock().unwrap();
            if state.encoder_count > 0 {
                let scale = 360.0 * rotations as f64 / state.encoder_count as f64;
                state.degrees_per_tick = Some(scale);
                log::info!(
                    "Calibration complete: [{scale:.4}] degrees per tick over [{}] ticks.",
                    state.encoder_count
                );
            } else {
                log::error!("Calibration finished with no encoder ticks, scale unchanged.");
            }
        }
        exit
    }

    /// Supervisor body for one movement command. Every exit path
    /// converges to the same cleanup: motor stopped, calibration flag
    /// down, movement slot cleared.
    async fn run_command(self: Arc<Shared>, goal: MotionGoal) {
        let exit = match goal {
            MotionGoal::Calibrate(rotations) => self.run_calibration(rotations).await,
            goal => self.wait_for(goal).await,
        };

        match exit {
            MonitorExit::Completed => {
                if let MotionGoal::Park(_) = goal {
                    self.parked.store(true, Ordering::SeqCst);
                    log::info!("Dome parked.");
                }
            }
            MonitorExit::Aborted => log::warn!("Movement {goal:?} aborted."),
            MonitorExit::TimedOut => log::warn!(
                "Movement {goal:?} timed out after {:?}.",
                self.wait_timeout
            ),
        }

        self.stop();
        self.state.lock().unwrap().calibrating = false;
        self.moving.store(false, Ordering::SeqCst);
    }

    /// Claim the movement slot, or log why the command is refused. At
    /// most one supervisor runs at a time; a concurrent second command
    /// is rejected here, never queued.
    fn try_begin(&self, command: &str) -> bool {
        if self.parked.load(Ordering::SeqCst) {
            log::warn!("Dome is parked, ignoring {command}.");
            return false;
        }
        if self.aborting.load(Ordering::SeqCst) {
            log::warn!("Abort in progress, ignoring {command}.");
            return false;
        }
        if self
            .moving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Movement command in progress, ignoring {command}.");
            return false;
        }
        true
    }
}

/// Interface to the dome rotation hardware.
///
/// Owns the position/direction record and the movement supervisor; the
/// RPC bridge talks to this and never touches the relays directly.
pub struct Dome {
    shared: Arc<Shared>,
}

impl Dome {
    /// Build a controller on top of the given hardware and register the
    /// sensor callbacks.
    ///
    /// Azimuth is unknown until the dome is homed, and remains unknown
    /// until a `degrees_per_tick` is preset here or calibrated.
    pub fn new(config: &DomeConfig, hardware: DomeHardware) -> Dome {
        if config.degrees_per_tick.is_none() {
            log::warn!("No value supplied for degrees_per_tick, dome requires calibration.");
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(MotionState {
                encoder_count: 0,
                current_direction: Direction::None,
                last_direction: Direction::None,
                degrees_per_tick: config.degrees_per_tick,
                az_position_tolerance: config.az_position_tolerance,
                homed: false,
                calibrating: false,
                rotation_count: 0,
                home_crossed: false,
            }),
            moving: AtomicBool::new(false),
            aborting: AtomicBool::new(false),
            parked: AtomicBool::new(false),
            hardware,
            home_azimuth: normalize_360(config.home_azimuth),
            park_azimuth: normalize_360(config.park_azimuth),
            wait_timeout: Duration::from_secs_f64(config.wait_timeout),
        });

        let weak = Arc::downgrade(&shared);
        shared.hardware.encoder.set_on_activate(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_encoder_pulse();
            }
        }));
        let weak = Arc::downgrade(&shared);
        shared
            .hardware
            .home_sensor
            .set_on_activate(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_home_activate();
                }
            }));
        let weak = Arc::downgrade(&shared);
        shared
            .hardware
            .home_sensor
            .set_on_deactivate(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_home_deactivate();
                }
            }));

        log::info!(
            "Dome controller up: home azimuth [{}], park azimuth [{}], home sensor {}.",
            shared.home_azimuth,
            shared.park_azimuth,
            if shared.hardware.home_sensor.is_active() {
                "active"
            } else {
                "inactive"
            }
        );

        Dome { shared }
    }

    fn spawn(&self, goal: MotionGoal) {
        let shared = self.shared.clone();
        task::spawn(shared.run_command(goal));
    }

    fn start_goto(&self, command: &str, target_az: f64, park: bool) {
        let target_az = normalize_360(target_az);
        let Some(dome_az) = self.shared.dome_az() else {
            log::warn!("Dome azimuth unknown, ignoring {command}; home and calibrate first.");
            return;
        };
        if !self.shared.try_begin(command) {
            return;
        }
        // Wrap at 180 so we always take the shortest route.
        let delta_az = wrap_180(target_az - dome_az);
        let direction = if delta_az > 0.0 {
            Direction::Cw
        } else {
            Direction::Ccw
        };
        log::info!(
            "{command} to azimuth [{target_az:.2}]: delta [{delta_az:.2}], rotating {direction:?}."
        );
        self.shared.rotate(direction);
        self.spawn(if park {
            MotionGoal::Park(target_az)
        } else {
            MotionGoal::Azimuth(target_az)
        });
    }

    // -- commands ---------------------------------------------------------

    /// Send the dome to the requested azimuth, degrees.
    ///
    /// Rejected (logged no-op) if another command is active, the dome is
    /// parked, or the position is unknown.
    pub fn goto_az(&self, target_az: f64) {
        self.start_goto("goto_az", target_az, false);
    }

    /// Rotate CW until the home sensor activates, anchoring the encoder
    /// count at zero.
    pub fn find_home(&self) {
        if !self.shared.try_begin("find_home") {
            return;
        }
        log::info!("Finding home.");
        self.shared.rotate(Direction::Cw);
        self.spawn(MotionGoal::Home);
    }

    /// Calibrate the encoder scale: home the dome, then perform
    /// `rotations` full CW rotations counting ticks between home
    /// crossings.
    pub fn calibrate(&self, rotations: u32) {
        if rotations == 0 {
            log::warn!("Calibration requires at least one rotation, ignoring.");
            return;
        }
        if !self.shared.try_begin("calibrate") {
            return;
        }
        log::info!("Calibrating dome encoder over [{rotations}] rotations.");
        self.spawn(MotionGoal::Calibrate(rotations));
    }

    /// Send the dome to the configured park azimuth and, once there,
    /// gate out all further movement commands until `unpark`.
    pub fn park(&self) {
        self.start_goto("park", self.shared.park_azimuth, true);
    }

    /// Clear the parked gate.
    pub fn unpark(&self) {
        if self.shared.parked.swap(false, Ordering::SeqCst) {
            log::info!("Dome unparked.");
        }
    }

    /// Abort any active movement command.
    ///
    /// Sets the level-triggered abort signal and blocks until the active
    /// monitor observes it and exits (bounded by one poll interval),
    /// then makes sure the motor is off.
    pub async fn abort(&self) {
        log::warn!("Aborting dome movement.");
        self.shared.aborting.store(true, Ordering::SeqCst);
        while self.shared.moving.load(Ordering::SeqCst) {
            sleep(POLL_INTERVAL).await;
        }
        // Covers a bare rotate() with no monitor attached.
        if self.shared.hardware.rotation_relay.is_active() {
            self.shared.stop();
        }
        self.shared.aborting.store(false, Ordering::SeqCst);
    }

    /// Re-anchor the encoder count from a trusted external azimuth,
    /// without physical motion. Marks the dome homed.
    pub fn sync(&self, az: f64) -> DomeResult<()> {
        let az = normalize_360(az);
        let ticks = {
            let state = self.shared.state.lock().unwrap();
            az_to_ticks(az, self.shared.home_azimuth, state.degrees_per_tick)?
        };
        let mut state = self.shared.state.lock().unwrap();
        state.encoder_count = ticks.round() as i64;
        state.homed = true;
        log::info!(
            "Synced encoder counts to [{}] for azimuth [{az:.2}].",
            state.encoder_count
        );
        Ok(())
    }

    /// Low-level rotate. Prefer the supervised commands; nothing stops
    /// a rotation started this way except `stop` or `abort`.
    pub fn rotate(&self, direction: Direction) {
        self.shared.rotate(direction);
    }

    /// Switch the rotation relay off. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    // -- status accessors -------------------------------------------------

    /// Dome azimuth in degrees, `None` until homed and calibrated.
    pub fn dome_az(&self) -> Option<f64> {
        self.shared.dome_az()
    }

    /// True if the home sensor is currently active.
    pub fn at_home(&self) -> bool {
        self.shared.hardware.home_sensor.is_active()
    }

    /// True if the rotation relay is energised.
    pub fn dome_in_motion(&self) -> bool {
        self.shared.hardware.rotation_relay.is_active()
    }

    /// True while a movement command's monitor is running.
    pub fn movement_active(&self) -> bool {
        self.shared.moving.load(Ordering::SeqCst)
    }

    pub fn is_parked(&self) -> bool {
        self.shared.parked.load(Ordering::SeqCst)
    }

    pub fn encoder_count(&self) -> i64 {
        self.shared.state.lock().unwrap().encoder_count
    }

    pub fn degrees_per_tick(&self) -> Option<f64> {
        self.shared.state.lock().unwrap().degrees_per_tick
    }

    pub fn az_position_tolerance(&self) -> f64 {
        self.shared.state.lock().unwrap().effective_tolerance()
    }

    pub fn current_direction(&self) -> Direction {
        self.shared.state.lock().unwrap().current_direction
    }

    pub fn last_direction(&self) -> Direction {
        self.shared.state.lock().unwrap().last_direction
    }

    /// Consistent snapshot of the pollable state.
    pub fn status(&self) -> DomeStatus {
        let shared = &self.shared;
        let mut state = shared.state.lock().unwrap();
        DomeStatus {
            dome_az: state.dome_az(shared.home_azimuth),
            at_home: shared.hardware.home_sensor.is_active(),
            dome_in_motion: shared.hardware.rotation_relay.is_active(),
            movement_active: shared.moving.load(Ordering::SeqCst),
            parked: shared.parked.load(Ordering::SeqCst),
            homed: state.homed,
            calibrating: state.calibrating,
            encoder_count: state.encoder_count,
            degrees_per_tick: state.degrees_per_tick,
            az_position_tolerance: state.effective_tolerance(),
        }
    }
}

impl Drop for Dome {
    fn drop(&mut self) {
        // Leave the motor off and any running monitor on its way out.
        self.shared.aborting.store(true, Ordering::SeqCst);
        self.shared.hardware.rotation_relay.set_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::OutputSwitch;
    use crate::simulator::{DomeSimulator, SimHardware};

    /// Simulator cadence. Longer than the monitor poll interval so the
    /// monitor always gets a look between ticks.
    const CADENCE: Duration = Duration::from_millis(150);

    fn test_config() -> DomeConfig {
        DomeConfig {
            home_azimuth: 0.0,
            park_azimuth: 90.0,
            degrees_per_tick: Some(10.0),
            az_position_tolerance: 1.0,
            wait_timeout: 120.0,
            ..DomeConfig::default()
        }
    }

    fn sim_dome(config: &DomeConfig) -> (Dome, SimHardware) {
        let sim = SimHardware::new();
        let dome = Dome::new(config, sim.hardware());
        (dome, sim)
    }

    /// Anchor the dome at home by driving a CW home crossing.
    fn home_by_hand(dome: &Dome, sim: &SimHardware) {
        dome.rotate(Direction::Cw);
        sim.home_sensor.drive_high();
        sim.home_sensor.drive_low();
        dome.stop();
    }

    async fn wait_while(dome: &Dome, active: bool) {
        let mut polls = 0;
        while dome.movement_active() == active {
            sleep(Duration::from_millis(50)).await;
            polls += 1;
            assert!(polls < 10_000, "movement never changed state");
        }
    }

    #[test]
    fn test_initial_state() {
        let (dome, sim) = sim_dome(&test_config());

        assert_eq!(dome.dome_az(), None);
        assert_eq!(dome.encoder_count(), 0);
        assert_eq!(dome.current_direction(), Direction::None);
        assert_eq!(dome.last_direction(), Direction::None);
        assert!(!dome.dome_in_motion());
        assert!(!dome.movement_active());
        assert!(!dome.is_parked());
        assert!(!sim.direction_relay.is_active());
    }

    #[test]
    fn test_scenario_nine_cw_pulses() {
        let (dome, sim) = sim_dome(&test_config());
        home_by_hand(&dome, &sim);

        dome.rotate(Direction::Cw);
        for _ in 0..9 {
            sim.encoder.pulse();
        }
        dome.stop();

        assert_eq!(dome.encoder_count(), 9);
        assert_eq!(dome.dome_az(), Some(90.0));
    }

    #[test]
    fn test_direction_fallback_after_stop() {
        let (dome, sim) = sim_dome(&test_config());
        home_by_hand(&dome, &sim);

        dome.rotate(Direction::Cw);
        sim.encoder.pulse();
        dome.stop();
        // Coast pulse after the stop still counts CW.
        sim.encoder.pulse();

        assert_eq!(dome.current_direction(), Direction::None);
        assert_eq!(dome.last_direction(), Direction::Cw);
        assert_eq!(dome.encoder_count(), 2);
    }

    #[test]
    #[should_panic(expected = "no current or last direction")]
    fn test_pulse_with_no_direction_panics() {
        let (_dome, sim) = sim_dome(&test_config());

        sim.encoder.pulse();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (dome, sim) = sim_dome(&test_config());

        dome.rotate(Direction::Cw);
        dome.stop();
        dome.stop();
        dome.stop();

        assert_eq!(dome.last_direction(), Direction::Cw);
        assert_eq!(dome.current_direction(), Direction::None);
        // Coast attribution survives the repeated stops.
        sim.encoder.pulse();
        assert_eq!(dome.encoder_count(), 1);
    }

    #[test]
    fn test_home_crossing_resets_drift() {
        let (dome, sim) = sim_dome(&test_config());
        home_by_hand(&dome, &sim);

        dome.rotate(Direction::Cw);
        for _ in 0..17 {
            sim.encoder.pulse();
        }
        assert_eq!(dome.encoder_count(), 17);

        // Forward crossing re-anchors no matter the accumulated count.
        sim.home_sensor.drive_high();
        sim.home_sensor.drive_low();
        dome.stop();

        assert_eq!(dome.encoder_count(), 0);
        assert_eq!(dome.dome_az(), Some(0.0));
    }

    #[test]
    fn test_reverse_home_crossing_does_not_zero() {
        let (dome, sim) = sim_dome(&test_config());
        home_by_hand(&dome, &sim);

        dome.rotate(Direction::Ccw);
        for _ in 0..3 {
            sim.encoder.pulse();
        }
        sim.home_sensor.drive_high();
        sim.home_sensor.drive_low();
        dome.stop();

        assert_eq!(dome.encoder_count(), -3);
    }

    #[test]
    fn test_sync_re_anchors() {
        let (dome, _sim) = sim_dome(&test_config());

        dome.sync(30.0).unwrap();

        assert_eq!(dome.encoder_count(), 3);
        assert_eq!(dome.dome_az(), Some(30.0));
    }

    #[test]
    fn test_sync_uncalibrated_fails() {
        let config = DomeConfig {
            degrees_per_tick: None,
            ..test_config()
        };
        let (dome, _sim) = sim_dome(&config);

        assert!(dome.sync(30.0).is_err());
        assert_eq!(dome.dome_az(), None);
    }

    #[test]
    fn test_tolerance_raised_to_tick_floor() {
        let (dome, _sim) = sim_dome(&test_config());

        // Configured 1.0 is below 1.5 * 10.0.
        assert_eq!(dome.az_position_tolerance(), 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_rejected_while_position_unknown() {
        let (dome, _sim) = sim_dome(&test_config());

        dome.goto_az(100.0);

        assert!(!dome.movement_active());
        assert!(!dome.dome_in_motion());
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_chooses_shortest_path() {
        let (dome, sim) = sim_dome(&test_config());
        dome.sync(350.0).unwrap();

        // 350 -> 10 is 20 degrees CW, never 340 CCW.
        dome.goto_az(10.0);
        assert!(dome.movement_active());
        assert_eq!(dome.current_direction(), Direction::Cw);
        assert!(sim.direction_relay.is_active());

        dome.abort().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_moves_ccw_into_tolerance() {
        let (dome, sim) = sim_dome(&test_config());
        let _simulator = DomeSimulator::start(&sim, 36, CADENCE, 9);
        dome.sync(90.0).unwrap();

        // delta = wrap180(300 - 90) = -150, so CCW.
        dome.goto_az(300.0);
        assert_eq!(dome.current_direction(), Direction::Ccw);

        wait_while(&dome, true).await;

        assert!(!dome.dome_in_motion());
        let dome_az = dome.dome_az().unwrap();
        let miss = wrap_180(300.0 - dome_az).abs();
        assert!(
            miss <= dome.az_position_tolerance(),
            "landed at {dome_az}, {miss} degrees off"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_command_rejected_while_active() {
        let (dome, sim) = sim_dome(&test_config());
        dome.sync(0.0).unwrap();

        dome.goto_az(90.0);
        assert_eq!(dome.current_direction(), Direction::Cw);

        // A concurrent command must not steal the motor.
        dome.goto_az(270.0);
        dome.find_home();
        assert_eq!(dome.current_direction(), Direction::Cw);
        assert!(sim.direction_relay.is_active());

        dome.abort().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_movement() {
        let (dome, sim) = sim_dome(&test_config());
        let _simulator = DomeSimulator::start(&sim, 360, CADENCE, 9);
        dome.sync(0.0).unwrap();

        dome.goto_az(180.0);
        assert!(dome.movement_active());

        dome.abort().await;

        assert!(!dome.movement_active());
        assert!(!dome.dome_in_motion());
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_home_anchors_encoder() {
        let (dome, sim) = sim_dome(&test_config());
        let _simulator = DomeSimulator::start(&sim, 10, CADENCE, 3);

        dome.find_home();
        wait_while(&dome, true).await;

        assert!(!dome.dome_in_motion());
        assert_eq!(dome.encoder_count(), 0);
        assert_eq!(dome.dome_az(), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_home_times_out_on_dead_sensor() {
        let config = DomeConfig {
            wait_timeout: 2.0,
            ..test_config()
        };
        let (dome, _sim) = sim_dome(&config);

        // No simulator: the home sensor never fires.
        dome.find_home();
        wait_while(&dome, true).await;

        assert!(!dome.dome_in_motion());
        assert_eq!(dome.dome_az(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_scenario() {
        let config = DomeConfig {
            degrees_per_tick: None,
            ..test_config()
        };
        let (dome, sim) = sim_dome(&config);
        let _simulator = DomeSimulator::start(&sim, 10, CADENCE, 3);

        dome.calibrate(2);
        assert!(dome.movement_active());
        wait_while(&dome, true).await;

        assert_eq!(dome.encoder_count(), 20);
        assert_eq!(dome.degrees_per_tick(), Some(36.0));
        assert!(!dome.status().calibrating);
        assert_eq!(dome.dome_az(), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_park_gates_movement_commands() {
        let (dome, sim) = sim_dome(&test_config());
        let _simulator = DomeSimulator::start(&sim, 36, CADENCE, 0);
        dome.sync(0.0).unwrap();

        dome.park();
        wait_while(&dome, true).await;
        assert!(dome.is_parked());
        let parked_az = dome.dome_az().unwrap();
        assert!(wrap_180(90.0 - parked_az).abs() <= dome.az_position_tolerance());

        // All movement commands are rejected no-ops while parked.
        dome.goto_az(180.0);
        assert!(!dome.movement_active());
        dome.find_home();
        assert!(!dome.movement_active());
        dome.calibrate(2);
        assert!(!dome.movement_active());
        dome.rotate(Direction::Cw);
        assert!(!dome.dome_in_motion());
        assert_eq!(dome.dome_az().unwrap(), parked_az);

        dome.unpark();
        assert!(!dome.is_parked());

        dome.goto_az(180.0);
        assert!(dome.movement_active());
        wait_while(&dome, true).await;
        let dome_az = dome.dome_az().unwrap();
        assert!(wrap_180(180.0 - dome_az).abs() <= dome.az_position_tolerance());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot() {
        let (dome, _sim) = sim_dome(&test_config());
        dome.sync(30.0).unwrap();

        let status = dome.status();

        assert_eq!(status.dome_az, Some(30.0));
        assert!(status.homed);
        assert!(!status.at_home);
        assert!(!status.dome_in_motion);
        assert!(!status.movement_active);
        assert!(!status.parked);
        assert_eq!(status.encoder_count, 3);
        assert_eq!(status.degrees_per_tick, Some(10.0));
        assert_eq!(status.az_position_tolerance, 15.0);
    }
}
