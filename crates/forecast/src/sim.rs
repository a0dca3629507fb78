//! Weather-driven soil moisture simulator used to produce training data
//! when no real probe history is available.
//!
//! Models, per hourly step:
//! - A daily weather regime (sunny / cloudy / rainy) drawn once per day
//! - Diurnal temperature swing, with humidity anti-correlated to it
//! - Evaporation scaled by temperature, accelerated around midday on sunny days
//! - Rain replenishment
//! - Artificial watering when the soil gets too dry
//! - Fast drainage above saturation and slower drainage after wet events
//! - Upper/lower probe asymmetry (upper wetter during rain, drier otherwise)
//!
//! All randomness comes from an explicitly seeded generator, so a given seed
//! always produces the same sequence.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use std::f64::consts::PI;

use crate::reading::{round1, SensorReading, Weather};

/// Moisture the soil starts at (%).
const INITIAL_MOISTURE: f64 = 55.0;
/// Below this (and not raining) the simulated grower waters the bed.
const WATERING_TRIGGER: f64 = 25.0;
/// Above this the soil drains quickly.
const SATURATION: f64 = 80.0;
/// Steps after a watering or rain event during which passive drainage runs.
const PASSIVE_DRAIN_STEPS: usize = 3;
const MOISTURE_BOUNDS: (f64, f64) = (10.0, 95.0);

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal(rng: &mut fastrand::Rng) -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += rng.f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(rng: &mut fastrand::Rng, mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal(rng)
}

/// Sample from U[lo, hi).
fn uniform(rng: &mut fastrand::Rng, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * rng.f64()
}

// ---------------------------------------------------------------------------
// Weather regime parameters
// ---------------------------------------------------------------------------

/// Per-regime constants.
struct Regime {
    base_temp: f64,
    temp_amplitude: f64,
    temp_noise: f64,
    base_humidity: f64,
    /// Fraction of the diurnal temperature term subtracted from humidity.
    humidity_coupling: f64,
}

impl Weather {
    fn regime(self) -> Regime {
        match self {
            Weather::Sunny => Regime {
                base_temp: 24.0,
                temp_amplitude: 8.0,
                temp_noise: 0.5,
                base_humidity: 50.0,
                humidity_coupling: 1.0,
            },
            Weather::Cloudy => Regime {
                base_temp: 22.0,
                temp_amplitude: 4.0,
                temp_noise: 0.3,
                base_humidity: 70.0,
                humidity_coupling: 0.5,
            },
            Weather::Rainy => Regime {
                base_temp: 20.0,
                temp_amplitude: 2.0,
                temp_noise: 0.2,
                base_humidity: 90.0,
                humidity_coupling: 0.2,
            },
        }
    }

    /// Draw a day's weather: 60% sunny, 25% cloudy, 15% rainy.
    fn draw(rng: &mut fastrand::Rng) -> Self {
        let r = rng.f64();
        if r < 0.60 {
            Weather::Sunny
        } else if r < 0.85 {
            Weather::Cloudy
        } else {
            Weather::Rainy
        }
    }
}

/// Hourly evaporation loss for a non-rainy hour.
fn evaporation(weather: Weather, temperature: f64, hour: u32) -> f64 {
    match weather {
        Weather::Sunny => {
            let base = 0.4 + 0.1 * (temperature - 20.0) / 10.0;
            if (10..=16).contains(&hour) {
                base * 1.8
            } else {
                base
            }
        }
        Weather::Cloudy => 0.1 + 0.05 * (temperature - 20.0) / 10.0,
        Weather::Rainy => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Stateful simulator producing one reading per call to [`WeatherSim::sample`].
pub struct WeatherSim {
    rng: fastrand::Rng,
    /// Running "true" moisture before probe offsets.
    moisture: f64,
    day: Option<NaiveDate>,
    weather: Weather,
    step: usize,
    /// Step index of the most recent watering or rain hour.
    last_wet_step: Option<usize>,
}

impl WeatherSim {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            moisture: INITIAL_MOISTURE,
            day: None,
            weather: Weather::Sunny,
            step: 0,
            last_wet_step: None,
        }
    }

    /// Weather of the day currently being simulated, once sampling started.
    pub fn weather(&self) -> Option<Weather> {
        self.day.map(|_| self.weather)
    }

    /// Current underlying moisture (%), before probe offsets.
    pub fn moisture(&self) -> f64 {
        self.moisture
    }

    /// Apply an artificial watering pulse right now.
    pub fn irrigate(&mut self) {
        self.moisture = (self.moisture + uniform(&mut self.rng, 30.0, 40.0))
            .clamp(MOISTURE_BOUNDS.0, MOISTURE_BOUNDS.1);
        self.last_wet_step = Some(self.step);
    }

    /// Advance one step and produce the reading for `timestamp`.
    ///
    /// A new weather regime is drawn whenever the calendar day changes.
    pub fn sample(&mut self, timestamp: NaiveDateTime) -> SensorReading {
        let date = timestamp.date();
        if self.day != Some(date) {
            self.day = Some(date);
            self.weather = Weather::draw(&mut self.rng);
        }

        let weather = self.weather;
        let regime = weather.regime();
        let hour = timestamp.hour();
        let rng = &mut self.rng;

        // -- Air ----------------------------------------------------------

        let diurnal = regime.temp_amplitude * ((hour as f64 - 4.0) * PI / 12.0).sin();
        let temperature = (regime.base_temp + diurnal + gaussian(rng, 0.0, regime.temp_noise))
            .clamp(10.0, 40.0);
        let humidity = (regime.base_humidity - regime.humidity_coupling * diurnal
            + gaussian(rng, 0.0, 2.0))
        .clamp(30.0, 100.0);

        // -- Soil ---------------------------------------------------------

        let raining = weather == Weather::Rainy;
        let mut m = self.moisture;

        if raining {
            m += uniform(rng, 1.0, 3.0);
            self.last_wet_step = Some(self.step);
        } else {
            m -= evaporation(weather, temperature, hour) + gaussian(rng, 0.0, 0.1);
        }

        if m < WATERING_TRIGGER && !raining {
            m += uniform(rng, 30.0, 40.0);
            self.last_wet_step = Some(self.step);
        }

        let recently_wet = self
            .last_wet_step
            .is_some_and(|s| self.step - s < PASSIVE_DRAIN_STEPS);
        if m > SATURATION {
            m -= uniform(rng, 2.0, 4.0);
        } else if recently_wet && !raining {
            m -= uniform(rng, 1.0, 2.0);
        }

        m = m.clamp(MOISTURE_BOUNDS.0, MOISTURE_BOUNDS.1);
        self.moisture = m;

        // -- Probes -------------------------------------------------------

        let (upper, lower) = if raining {
            (m + uniform(rng, 2.0, 5.0), m - uniform(rng, 1.0, 3.0))
        } else {
            // Topsoil dries first.
            (m - uniform(rng, 1.0, 4.0), m + uniform(rng, 0.0, 2.0))
        };

        self.step += 1;

        SensorReading::new(
            timestamp,
            round1(upper),
            round1(lower),
            round1(temperature),
            round1(humidity),
        )
        .with_weather(weather)
    }
}

// ---------------------------------------------------------------------------
// Batch generation
// ---------------------------------------------------------------------------

/// Fixed start of generated series, so output never depends on the clock.
pub fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Generate `days * 24` hourly readings starting at [`default_start`].
pub fn generate(days: usize, seed: u64) -> Vec<SensorReading> {
    generate_from(default_start(), days, seed)
}

/// Generate `days * 24` hourly readings starting at `start`.
pub fn generate_from(start: NaiveDateTime, days: usize, seed: u64) -> Vec<SensorReading> {
    let mut sim = WeatherSim::new(seed);
    let readings: Vec<SensorReading> = (0..days * 24)
        .map(|i| sim.sample(start + Duration::hours(i as i64)))
        .collect();

    tracing::debug!(days, seed, readings = readings.len(), "simulated sensor history");
    readings
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_days_is_empty() {
        assert!(generate(0, 42).is_empty());
    }

    #[test]
    fn hourly_count_and_spacing() {
        let r = generate(3, 7);
        assert_eq!(r.len(), 72);
        for w in r.windows(2) {
            assert_eq!(w[1].timestamp - w[0].timestamp, Duration::hours(1));
        }
        assert_eq!(r[0].timestamp, default_start());
    }

    #[test]
    fn same_seed_is_identical() {
        let a = generate(7, 42);
        let b = generate(7, 42);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(generate(7, 1), generate(7, 2));
    }

    #[test]
    fn values_within_ranges() {
        for r in generate(30, 42) {
            assert!((0.0..=100.0).contains(&r.soil_moisture), "{r:?}");
            assert!((0.0..=100.0).contains(&r.soil_upper), "{r:?}");
            assert!((0.0..=100.0).contains(&r.soil_lower), "{r:?}");
            assert!((10.0..=40.0).contains(&r.temperature), "{r:?}");
            assert!((30.0..=100.0).contains(&r.humidity), "{r:?}");
        }
    }

    #[test]
    fn moisture_is_probe_mean() {
        for r in generate(2, 42) {
            assert!((r.soil_moisture - (r.soil_upper + r.soil_lower) / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn weather_constant_within_a_day() {
        let r = generate(10, 42);
        for day in r.chunks(24) {
            let w = day[0].weather;
            assert!(w.is_some());
            assert!(day.iter().all(|x| x.weather == w));
        }
    }

    #[test]
    fn weather_mix_roughly_matches_weights() {
        let r = generate(400, 3);
        let days: Vec<Weather> = r.chunks(24).filter_map(|d| d[0].weather).collect();
        let sunny = days.iter().filter(|w| **w == Weather::Sunny).count() as f64;
        let rainy = days.iter().filter(|w| **w == Weather::Rainy).count() as f64;
        let n = days.len() as f64;
        assert!((sunny / n - 0.60).abs() < 0.1, "sunny share {}", sunny / n);
        assert!((rainy / n - 0.15).abs() < 0.1, "rainy share {}", rainy / n);
    }

    #[test]
    fn rainy_upper_probe_reads_wetter() {
        let r = generate(60, 11);
        let rainy: Vec<_> = r
            .iter()
            .filter(|x| x.weather == Some(Weather::Rainy))
            .collect();
        assert!(!rainy.is_empty());
        assert!(rainy.iter().all(|x| x.soil_upper > x.soil_lower));

        let dry: Vec<_> = r
            .iter()
            .filter(|x| x.weather != Some(Weather::Rainy))
            .collect();
        assert!(dry.iter().all(|x| x.soil_upper < x.soil_lower));
    }

    #[test]
    fn sunny_afternoons_are_warmer_than_nights() {
        let r = generate(60, 5);
        let sunny = |h: u32| -> f64 {
            let v: Vec<f64> = r
                .iter()
                .filter(|x| x.weather == Some(Weather::Sunny) && x.timestamp.hour() == h)
                .map(|x| x.temperature)
                .collect();
            v.iter().sum::<f64>() / v.len() as f64
        };
        assert!(sunny(10) > sunny(22));
    }

    #[test]
    fn humidity_orders_by_regime() {
        let r = generate(120, 9);
        let mean = |w: Weather| -> f64 {
            let v: Vec<f64> = r
                .iter()
                .filter(|x| x.weather == Some(w))
                .map(|x| x.humidity)
                .collect();
            v.iter().sum::<f64>() / v.len() as f64
        };
        assert!(mean(Weather::Rainy) > mean(Weather::Cloudy));
        assert!(mean(Weather::Cloudy) > mean(Weather::Sunny));
    }

    #[test]
    fn dry_days_recover_through_watering() {
        // Outside rain the watering jump keeps the running state above 25%.
        let mut sim = WeatherSim::new(42);
        for i in 0..24 * 30 {
            sim.sample(default_start() + Duration::hours(i));
            assert!(sim.moisture() >= MOISTURE_BOUNDS.0);
            if sim.weather() != Some(Weather::Rainy) {
                assert!(sim.moisture() > 20.0, "moisture {}", sim.moisture());
            }
        }
    }

    // -- Evaporation ---------------------------------------------------------

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn evaporation_base_rates_by_weather() {
        assert!(close(evaporation(Weather::Sunny, 20.0, 8), 0.4));
        assert!(close(evaporation(Weather::Sunny, 30.0, 8), 0.5));
        assert!(close(evaporation(Weather::Cloudy, 20.0, 12), 0.1));
        assert!(close(evaporation(Weather::Cloudy, 30.0, 12), 0.15));
        assert_eq!(evaporation(Weather::Rainy, 30.0, 12), 0.0);
    }

    #[test]
    fn sunny_midday_evaporation_is_boosted() {
        for hour in 10..=16 {
            assert!(close(evaporation(Weather::Sunny, 20.0, hour), 0.72), "hour {hour}");
        }
        for hour in [0, 9, 17, 23] {
            assert!(close(evaporation(Weather::Sunny, 20.0, hour), 0.4), "hour {hour}");
        }
        // Cloudy days have no midday boost.
        assert!(close(
            evaporation(Weather::Cloudy, 20.0, 12),
            evaporation(Weather::Cloudy, 20.0, 3)
        ));
    }

    // -- Drainage ------------------------------------------------------------

    /// Simulator pinned to one weather regime for the first simulated day.
    fn pinned(seed: u64, weather: Weather, moisture: f64) -> WeatherSim {
        let mut sim = WeatherSim::new(seed);
        sim.day = Some(default_start().date());
        sim.weather = weather;
        sim.moisture = moisture;
        sim
    }

    /// Moisture lost over each of `steps` hourly samples.
    fn drops(sim: &mut WeatherSim, steps: i64) -> Vec<f64> {
        (0..steps)
            .map(|i| {
                let before = sim.moisture();
                sim.sample(default_start() + Duration::hours(i));
                before - sim.moisture()
            })
            .collect()
    }

    #[test]
    fn saturated_soil_drains_fast() {
        // Cloudy loss is ~0.1 plus noise of at most 0.6; saturation adds 2-4.
        let mut sim = pinned(5, Weather::Cloudy, 90.0);
        let drop = drops(&mut sim, 1)[0];
        assert!(drop > 1.4 && drop < 4.8, "drop {drop}");
    }

    #[test]
    fn passive_drainage_lasts_three_steps() {
        let mut sim = pinned(8, Weather::Cloudy, 50.0);
        sim.last_wet_step = Some(sim.step);

        let d = drops(&mut sim, 5);
        for (i, drop) in d[..3].iter().enumerate() {
            assert!(*drop > 0.5, "step {i} drop {drop}");
        }
        for (i, drop) in d[3..].iter().enumerate() {
            assert!(*drop < 0.75, "step {} drop {drop}", i + 3);
        }
    }

    #[test]
    fn no_drainage_without_wet_event() {
        let mut sim = pinned(8, Weather::Cloudy, 50.0);
        for drop in drops(&mut sim, 3) {
            assert!(drop < 0.75, "drop {drop}");
        }
    }

    #[test]
    fn rain_never_drains() {
        let mut sim = pinned(13, Weather::Rainy, 50.0);
        sim.last_wet_step = Some(sim.step);
        for drop in drops(&mut sim, 4) {
            // Rain adds 1-3 each hour and nothing is subtracted below saturation.
            assert!(drop <= -1.0 && drop >= -3.0, "drop {drop}");
        }
    }

    #[test]
    fn watering_then_drainage() {
        let mut sim = pinned(21, Weather::Cloudy, 40.0);
        sim.irrigate();
        let watered = sim.moisture();
        assert!(watered >= 70.0 && watered < 80.0, "{watered}");

        let d = drops(&mut sim, 4);
        assert!(d[..3].iter().all(|x| *x > 0.5), "{d:?}");
        assert!(d[3] < 0.75, "{d:?}");
    }

    #[test]
    fn irrigate_raises_moisture() {
        let mut sim = WeatherSim::new(1);
        sim.sample(default_start());
        let before = sim.moisture();
        sim.irrigate();
        assert!(sim.moisture() > before);
        assert!(sim.moisture() <= MOISTURE_BOUNDS.1);
    }

    #[test]
    fn weather_redrawn_on_new_day() {
        let mut sim = WeatherSim::new(42);
        assert_eq!(sim.weather(), None);
        sim.sample(default_start());
        assert!(sim.weather().is_some());
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let mut rng = fastrand::Rng::with_seed(99);
        let n = 5000;
        let sum: f64 = (0..n).map(|_| approx_std_normal(&mut rng)).sum();
        let mean = sum / n as f64;
        assert!(
            mean.abs() < 0.15,
            "approx_std_normal mean should be near zero: {mean}"
        );
    }
}
