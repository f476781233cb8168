//! Configuration access port.

use crate::domain::error::PortfolioError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    fn require_string(&self, section: &str, key: &str) -> Result<String, PortfolioError> {
        self.get_string(section, key)
            .ok_or_else(|| PortfolioError::ConfigMissing {
                section: section.into(),
                key: key.into(),
            })
    }
}
