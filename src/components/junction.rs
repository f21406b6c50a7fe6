//! PN-junction helpers shared by diodes and transistors.

use std::f64::consts::SQRT_2;

/// Critical voltage above which junction steps are limited.
///
/// `Vcrit = Vt * ln(Vt / (sqrt(2) * Is))`
pub fn critical_voltage(saturation_current: f64, thermal_voltage: f64) -> f64 {
    thermal_voltage * (thermal_voltage / (SQRT_2 * saturation_current)).ln()
}

/// SPICE `pnjlim`: bound the change of a junction voltage between iterations.
///
/// Returns the limited voltage and whether limiting engaged.
pub fn limit_junction_voltage(
    v_new: f64,
    v_old: f64,
    thermal_voltage: f64,
    critical_voltage: f64,
) -> (f64, bool) {
    if v_new > critical_voltage && (v_new - v_old).abs() > 2.0 * thermal_voltage {
        let limited = if v_old > 0.0 {
            let arg = 1.0 + (v_new - v_old) / thermal_voltage;
            if arg > 0.0 {
                v_old + thermal_voltage * arg.ln()
            } else {
                critical_voltage
            }
        } else {
            thermal_voltage * (v_new / thermal_voltage).ln()
        };
        (limited, true)
    } else {
        (v_new, false)
    }
}

/// Junction current and conductance `(i, g)` at voltage `v`.
///
/// Deep reverse bias (below -3 Vt) uses the cubic approximation so the
/// current saturates smoothly at `-Is`.
pub fn junction_current(saturation_current: f64, v: f64, thermal_voltage: f64) -> (f64, f64) {
    if v < -3.0 * thermal_voltage {
        let a = 3.0 * thermal_voltage / (v * std::f64::consts::E);
        let a = a * a * a;
        let current = -saturation_current * (1.0 + a);
        let conductance = saturation_current * 3.0 * a / v;
        return (current, conductance);
    }
    let e = (v / thermal_voltage).exp();
    (
        saturation_current * (e - 1.0),
        saturation_current * e / thermal_voltage,
    )
}

/// Depletion capacitance with the forward-bias linearization above `fc * vj`.
pub fn depletion_capacitance(v: f64, cj0: f64, vj: f64, m: f64, fc: f64) -> f64 {
    if cj0 == 0.0 {
        return 0.0;
    }
    if v < fc * vj {
        cj0 / (1.0 - v / vj).powf(m)
    } else {
        cj0 / (1.0 - fc).powf(1.0 + m) * (1.0 - fc * (1.0 + m) + m * v / vj)
    }
}
