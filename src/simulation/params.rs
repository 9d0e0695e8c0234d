//! Numerical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - fixed step size and end time,
//! - optional real-time scale for frame-driven stepping

#[derive(Debug, Clone)]
pub struct Parameters {
    pub h0: f64, // fixed step size
    pub t_end: f64, // time end
    pub real_time_scale: Option<f64>, // frame delta -> simulation dt, viewer only
}

impl Parameters {
    /// Step to use for a frame that took `frame_seconds` of wall-clock time.
    pub fn step_for_frame(&self, frame_seconds: f64) -> f64 {
        match self.real_time_scale {
            Some(scale) => frame_seconds * scale,
            None => self.h0,
        }
    }
}
