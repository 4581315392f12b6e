//! Define the DomeStatus struct, a snapshot of everything a
//! poll-for-completion consumer can observe about the dome.

/// Point-in-time dome state, assembled under a single lock so the fields
/// are mutually consistent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomeStatus {
    pub dome_az: Option<f64>,
    pub at_home: bool,
    pub dome_in_motion: bool,
    pub movement_active: bool,
    pub parked: bool,
    pub homed: bool,
    pub calibrating: bool,
    pub encoder_count: i64,
    pub degrees_per_tick: Option<f64>,
    pub az_position_tolerance: f64,
}

impl DomeStatus {
    pub fn as_string(&self) -> String {
        let dome_az = match self.dome_az {
            Some(az) => format!("{az:.2}"),
            None => "unknown".to_string(),
        };
        let degrees_per_tick = match self.degrees_per_tick {
            Some(scale) => format!("{scale:.4}"),
            None => "uncalibrated".to_string(),
        };
        format!(
            "Azimuth: {dome_az}
At home: {}
In motion: {}
Movement active: {}
Parked: {}
Homed: {}
Calibrating: {}
Encoder counts: {}
Degrees per tick: {degrees_per_tick}
Tolerance (degrees): {:.2}
",
            self.at_home,
            self.dome_in_motion,
            self.movement_active,
            self.parked,
            self.homed,
            self.calibrating,
            self.encoder_count,
            self.az_position_tolerance,
        )
    }
}
