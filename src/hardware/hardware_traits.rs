// Trait-based interfaces between the control loop and the simulated hardware

/// A heated body driven by a heater power in percent.
pub trait ThermalPlant: Send {
    /// Advance the model by `dt` seconds at the given heater power and return the new temperature.
    fn update(&mut self, heater_power: f64, dt: f64) -> f64;
    fn temperature(&self) -> f64;
    /// Extra convective cooling, e.g. from a part-cooling fan.
    fn set_extra_cooling(&mut self, coefficient: f64);
}

/// Something that reports the temperature of a plant.
pub trait TemperatureSensor: Send {
    fn read(&mut self, true_temp: f64, dt: f64) -> f64;
}
