//! Display helpers for sensor readings.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use mijia_rust_ble::celsius_to_fahrenheit;
///
/// assert!((celsius_to_fahrenheit(23.5) - 74.3).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// # Example
///
/// ```
/// use mijia_rust_ble::fahrenheit_to_celsius;
///
/// assert!((fahrenheit_to_celsius(74.3) - 23.5).abs() < 0.001);
/// ```
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Approximate the dew point from temperature and relative humidity.
///
/// Magnus formula with the Sonntag coefficients; good to about ±0.35°C
/// over the sensor's operating range.
///
/// # Example
///
/// ```
/// use mijia_rust_ble::dew_point_celsius;
///
/// let dew = dew_point_celsius(23.5, 45.0);
/// assert!((dew - 10.9).abs() < 0.2);
/// ```
pub fn dew_point_celsius(temperature_celsius: f64, humidity_percent: f64) -> f64 {
    const A: f64 = 17.62;
    const B: f64 = 243.12;

    let gamma = (humidity_percent / 100.0).ln() + A * temperature_celsius / (B + temperature_celsius);
    B * gamma / (A - gamma)
}
