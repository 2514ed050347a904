/// Upper temperature cutoff for thermal time [°C].
pub const GDD_UPPER_CUTOFF: f64 = 30.0;

/// Calculates the daily thermal time (growing degree days) a crop accumulates.
///
/// Daily extremes are clamped before averaging: the maximum to `[0, GDD_UPPER_CUTOFF]`, the minimum to
/// `[-5, GDD_UPPER_CUTOFF]`. A maximum below the minimum is raised to the minimum.
///
/// # Parameters
///
/// - `tmax`: Maximum air temperature of the day [°C].
/// - `tmin`: Minimum air temperature of the day [°C].
/// - `base_temperature`: Temperature below which the crop does not develop [°C]. Negative values are raised to 0.
///
/// # Returns
///
/// Thermal time of the day [°C d], never negative.
pub fn growing_degree_days(tmax: f64, tmin: f64, base_temperature: f64) -> f64 {
    let tmin = tmin.clamp(-5.0, GDD_UPPER_CUTOFF);
    let tmax = tmax.clamp(0.0, GDD_UPPER_CUTOFF).max(tmin);
    let base_temperature = base_temperature.max(0.0);

    let tavg = (tmax + tmin) / 2.0;
    (tavg - base_temperature).max(0.0)
}
