use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};




/// Highest prediction order with a known coefficient table.
pub const MAX_PREDICTION_ORDER: usize = 3;




/**
 * Static parameters of a mesh: the range of admissible levels, the width of
 * the ghost band kept around leaves, the graduation stencil width and the
 * order of the coarse-to-fine prediction operator. Widths are measured in
 * cells of the level they apply to.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub min_level: usize,
    pub max_level: usize,
    pub ghost_width: i64,
    pub graduation_width: i64,
    pub prediction_order: usize,
    pub max_graduation_iterations: usize,
}




// ============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            min_level: 2,
            max_level: 6,
            ghost_width: 2,
            graduation_width: 1,
            prediction_order: 1,
            max_graduation_iterations: 64,
        }
    }
}




// ============================================================================
impl Config {

    /**
     * Convenience constructor for the level bounds, other fields take their
     * default values.
     */
    pub fn with_levels(min_level: usize, max_level: usize) -> Self {
        Self { min_level, max_level, ..Self::default() }
    }

    pub fn prediction_order(mut self, order: usize) -> Self {
        self.prediction_order = order;
        self
    }

    pub fn ghost_width(mut self, width: i64) -> Self {
        self.ghost_width = width;
        self
    }

    pub fn graduation_width(mut self, width: i64) -> Self {
        self.graduation_width = width;
        self
    }

    /**
     * Check the parameters are mutually consistent. The ghost band must be at
     * least as wide as the prediction stencil, otherwise the coarse stencil
     * of a boundary-adjacent prediction would not be stored.
     */
    pub fn validate(&self) -> Result<()> {
        if self.min_level > self.max_level {
            return Err(Error::InvalidConfig(format!(
                "min_level ({}) exceeds max_level ({})", self.min_level, self.max_level)))
        }
        if self.max_level >= 31 {
            return Err(Error::InvalidConfig(format!("max_level ({}) must be below 31", self.max_level)))
        }
        if self.prediction_order > MAX_PREDICTION_ORDER {
            return Err(Error::InvalidConfig(format!(
                "prediction order {} is not supported (max {})", self.prediction_order, MAX_PREDICTION_ORDER)))
        }
        if self.ghost_width < 1 || self.ghost_width < self.prediction_order as i64 {
            return Err(Error::InvalidConfig(format!(
                "ghost_width ({}) must be at least 1 and at least the prediction order ({})",
                self.ghost_width,
                self.prediction_order)))
        }
        if self.graduation_width < 1 {
            return Err(Error::InvalidConfig("graduation_width must be at least 1".into()))
        }
        if self.max_graduation_iterations == 0 {
            return Err(Error::InvalidConfig("max_graduation_iterations must be positive".into()))
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Config;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn inverted_levels_are_rejected() {
        assert!(Config::with_levels(4, 2).validate().is_err());
    }

    #[test]
    fn narrow_ghost_band_is_rejected() {
        let config = Config::with_levels(1, 3).prediction_order(3).ghost_width(2);
        assert!(config.validate().is_err());
        assert!(config.ghost_width(3).validate().is_ok());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: Config = ciborium::de::from_reader(&ciborium_bytes()[..]).unwrap();
        assert_eq!(config.min_level, 1);
        assert_eq!(config.max_level, Config::default().max_level);
    }

    fn ciborium_bytes() -> Vec<u8> {
        #[derive(serde::Serialize)]
        struct Partial {
            min_level: usize,
        }
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Partial { min_level: 1 }, &mut bytes).unwrap();
        bytes
    }
}
