//! Time-dependent values for independent sources.
//!
//! The DC operating point uses the value at t = 0.

use std::f64::consts::PI;

/// Trapezoidal pulse train.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseParams {
    pub initial: f64,
    pub pulsed: f64,
    pub delay: f64,
    pub rise: f64,
    pub fall: f64,
    pub width: f64,
    /// Repetition period, 0 for a single pulse
    pub period: f64,
}

/// Damped sine.
#[derive(Debug, Clone, PartialEq)]
pub struct SinParams {
    pub offset: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub delay: f64,
    /// Damping factor in 1/s
    pub damping: f64,
    /// Phase in degrees
    pub phase: f64,
}

/// Exponential rise followed by exponential fall.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpParams {
    pub initial: f64,
    pub pulsed: f64,
    pub rise_delay: f64,
    pub rise_tau: f64,
    pub fall_delay: f64,
    pub fall_tau: f64,
}

/// Single-frequency FM.
#[derive(Debug, Clone, PartialEq)]
pub struct SffmParams {
    pub offset: f64,
    pub amplitude: f64,
    pub carrier_frequency: f64,
    pub modulation_index: f64,
    pub signal_frequency: f64,
}

/// Amplitude modulation.
#[derive(Debug, Clone, PartialEq)]
pub struct AmParams {
    pub amplitude: f64,
    pub offset: f64,
    pub modulating_frequency: f64,
    pub carrier_frequency: f64,
    pub delay: f64,
}

/// Piecewise-linear waveform through (time, value) points.
#[derive(Debug, Clone, PartialEq)]
pub struct PwlParams {
    /// Points sorted by time
    pub points: Vec<(f64, f64)>,
    /// When set, the segment from this time to the last point repeats forever
    pub repeat_start: Option<f64>,
}

/// Value of an independent source over time.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    Constant(f64),
    Pulse(PulseParams),
    Sin(SinParams),
    Exp(ExpParams),
    Sffm(SffmParams),
    Am(AmParams),
    Pwl(PwlParams),
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Constant(0.0)
    }
}

impl Waveform {
    /// Value at time `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        match self {
            Waveform::Constant(v) => *v,
            Waveform::Pulse(p) => pulse(p, time),
            Waveform::Sin(p) => {
                let mut phase = p.phase.to_radians();
                let mut amplitude = p.amplitude;
                let elapsed = time - p.delay;
                if elapsed > 0.0 {
                    phase += 2.0 * PI * p.frequency * elapsed;
                    amplitude *= (-elapsed * p.damping).exp();
                }
                p.offset + amplitude * phase.sin()
            }
            Waveform::Exp(p) => {
                let step = p.pulsed - p.initial;
                let mut value = p.initial;
                if time > p.rise_delay {
                    value += step * (1.0 - (-(time - p.rise_delay) / p.rise_tau).exp());
                }
                if time > p.fall_delay {
                    value -= step * (1.0 - (-(time - p.fall_delay) / p.fall_tau).exp());
                }
                value
            }
            Waveform::Sffm(p) => {
                let carrier = 2.0 * PI * p.carrier_frequency * time;
                let signal = 2.0 * PI * p.signal_frequency * time;
                p.offset + p.amplitude * (carrier + p.modulation_index * signal.sin()).sin()
            }
            Waveform::Am(p) => {
                let elapsed = time - p.delay;
                if elapsed < 0.0 {
                    return 0.0;
                }
                let envelope = p.offset + (2.0 * PI * p.modulating_frequency * elapsed).sin();
                p.amplitude * envelope * (2.0 * PI * p.carrier_frequency * elapsed).sin()
            }
            Waveform::Pwl(p) => pwl(p, time),
        }
    }

    /// Value used for the DC operating point.
    pub fn dc_value(&self) -> f64 {
        self.value_at(0.0)
    }

    /// Check parameters, returning the name of the offending one.
    pub fn validate(&self) -> std::result::Result<(), (&'static str, String)> {
        let non_negative = |name: &'static str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err((name, format!("must be finite and non-negative, got {v}")))
            }
        };
        let positive = |name: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err((name, format!("must be finite and positive, got {v}")))
            }
        };
        match self {
            Waveform::Constant(v) => finite("value", *v),
            Waveform::Pulse(p) => {
                finite("initial", p.initial)?;
                finite("pulsed", p.pulsed)?;
                non_negative("delay", p.delay)?;
                non_negative("rise", p.rise)?;
                non_negative("fall", p.fall)?;
                non_negative("width", p.width)?;
                non_negative("period", p.period)
            }
            Waveform::Sin(p) => {
                finite("offset", p.offset)?;
                finite("amplitude", p.amplitude)?;
                non_negative("frequency", p.frequency)?;
                non_negative("delay", p.delay)?;
                finite("damping", p.damping)?;
                finite("phase", p.phase)
            }
            Waveform::Exp(p) => {
                finite("initial", p.initial)?;
                finite("pulsed", p.pulsed)?;
                non_negative("rise_delay", p.rise_delay)?;
                positive("rise_tau", p.rise_tau)?;
                non_negative("fall_delay", p.fall_delay)?;
                positive("fall_tau", p.fall_tau)
            }
            Waveform::Sffm(p) => {
                finite("offset", p.offset)?;
                finite("amplitude", p.amplitude)?;
                non_negative("carrier_frequency", p.carrier_frequency)?;
                finite("modulation_index", p.modulation_index)?;
                non_negative("signal_frequency", p.signal_frequency)
            }
            Waveform::Am(p) => {
                finite("amplitude", p.amplitude)?;
                finite("offset", p.offset)?;
                non_negative("modulating_frequency", p.modulating_frequency)?;
                non_negative("carrier_frequency", p.carrier_frequency)?;
                non_negative("delay", p.delay)
            }
            Waveform::Pwl(p) => {
                if p.points.is_empty() {
                    return Err(("points", "at least one point is required".to_string()));
                }
                if p.points.iter().any(|(t, v)| !t.is_finite() || !v.is_finite()) {
                    return Err(("points", "points must be finite".to_string()));
                }
                if p.points.windows(2).any(|w| w[1].0 < w[0].0) {
                    return Err(("points", "times must be non-decreasing".to_string()));
                }
                if let Some(start) = p.repeat_start {
                    let first = p.points[0].0;
                    let last = p.points[p.points.len() - 1].0;
                    if !(start >= first && start < last) {
                        return Err((
                            "repeat_start",
                            format!("must lie in [{first}, {last}), got {start}"),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

fn finite(name: &'static str, v: f64) -> std::result::Result<(), (&'static str, String)> {
    if v.is_finite() {
        Ok(())
    } else {
        Err((name, format!("must be finite, got {v}")))
    }
}

fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    from + (to - from) * fraction
}

fn pulse(p: &PulseParams, time: f64) -> f64 {
    if time < p.delay {
        return p.initial;
    }
    let mut phase = time - p.delay;
    if p.period > 0.0 {
        phase %= p.period;
    }
    if phase < p.rise {
        return lerp(p.initial, p.pulsed, phase / p.rise);
    }
    phase -= p.rise;
    if phase < p.width {
        return p.pulsed;
    }
    phase -= p.width;
    if phase < p.fall {
        return lerp(p.pulsed, p.initial, phase / p.fall);
    }
    p.initial
}

fn pwl(p: &PwlParams, time: f64) -> f64 {
    let points = &p.points;
    let (first_time, first_value) = match points.first() {
        Some(&point) => point,
        None => return 0.0,
    };
    let (last_time, last_value) = points[points.len() - 1];

    let mut t = time;
    if t > last_time {
        match p.repeat_start {
            Some(start) if last_time > start => {
                t = start + (t - start) % (last_time - start);
            }
            _ => return last_value,
        }
    }
    if t <= first_time {
        return first_value;
    }

    // First point strictly after t
    let upper = points.partition_point(|&(pt, _)| pt <= t);
    if upper >= points.len() {
        return last_value;
    }
    let (t0, v0) = points[upper - 1];
    let (t1, v1) = points[upper];
    lerp(v0, v1, (t - t0) / (t1 - t0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pulse_shape() {
        let w = Waveform::Pulse(PulseParams {
            initial: 0.0,
            pulsed: 5.0,
            delay: 1.0,
            rise: 1.0,
            fall: 2.0,
            width: 3.0,
            period: 10.0,
        });
        assert_eq!(w.dc_value(), 0.0);
        assert_abs_diff_eq!(w.value_at(1.5), 2.5, epsilon = 1e-12);
        assert_eq!(w.value_at(3.0), 5.0);
        assert_abs_diff_eq!(w.value_at(6.0), 2.5, epsilon = 1e-12);
        assert_eq!(w.value_at(8.0), 0.0);
        // Next period
        assert_abs_diff_eq!(w.value_at(11.5), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_damped_sine() {
        let w = Waveform::Sin(SinParams {
            offset: 1.0,
            amplitude: 2.0,
            frequency: 1.0,
            delay: 0.0,
            damping: 1.0,
            phase: 90.0,
        });
        assert_abs_diff_eq!(w.dc_value(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.value_at(1.0), 1.0 + 2.0 * (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_rise_and_fall() {
        let w = Waveform::Exp(ExpParams {
            initial: 0.0,
            pulsed: 1.0,
            rise_delay: 0.0,
            rise_tau: 1.0,
            fall_delay: 100.0,
            fall_tau: 1.0,
        });
        assert_eq!(w.dc_value(), 0.0);
        assert_abs_diff_eq!(w.value_at(1.0), 1.0 - (-1.0f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(w.value_at(200.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pwl_interpolation_and_repeat() {
        let mut params = PwlParams {
            points: vec![(0.0, 0.0), (1.0, 2.0), (2.0, 0.0)],
            repeat_start: None,
        };
        let w = Waveform::Pwl(params.clone());
        assert_eq!(w.value_at(-1.0), 0.0);
        assert_abs_diff_eq!(w.value_at(0.5), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.value_at(1.5), 1.0, epsilon = 1e-12);
        assert_eq!(w.value_at(5.0), 0.0);

        params.repeat_start = Some(0.0);
        let w = Waveform::Pwl(params);
        assert_abs_diff_eq!(w.value_at(2.5), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.value_at(5.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sffm_and_am_start_at_offset() {
        let fm = Waveform::Sffm(SffmParams {
            offset: 0.5,
            amplitude: 1.0,
            carrier_frequency: 1e3,
            modulation_index: 2.0,
            signal_frequency: 10.0,
        });
        assert_abs_diff_eq!(fm.dc_value(), 0.5, epsilon = 1e-12);

        let am = Waveform::Am(AmParams {
            amplitude: 1.0,
            offset: 1.0,
            modulating_frequency: 10.0,
            carrier_frequency: 1e3,
            delay: 0.0,
        });
        assert_abs_diff_eq!(am.dc_value(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(am.value_at(0.25e-3), 1.0 + (2.0 * PI * 10.0 * 0.25e-3).sin(), epsilon = 1e-9);
    }

    #[test]
    fn test_validation() {
        assert!(Waveform::Constant(1.0).validate().is_ok());
        assert_eq!(Waveform::Constant(f64::NAN).validate().unwrap_err().0, "value");
        let bad = Waveform::Pwl(PwlParams {
            points: vec![(1.0, 0.0), (0.0, 1.0)],
            repeat_start: None,
        });
        assert_eq!(bad.validate().unwrap_err().0, "points");
    }
}
