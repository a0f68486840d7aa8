use std::path::PathBuf;

use crate::matcher::DataType;
use crate::stitch::StitchOptions;
use crate::types::WaitOptions;

pub const DEFAULT_BASE_URL: &str = "https://population.gotohui.com/";

/// Hebei prefecture-level cities searched by default. 邢台市 is listed twice,
/// which re-captures it into the same files.
pub const DEFAULT_CITIES: [&str; 7] = [
    "石家庄市",
    "唐山市",
    "秦皇岛市",
    "邯郸市",
    "邢台市",
    "邢台市",
    "张家口市",
];

/// Everything one run needs, passed explicitly to the workflow.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Search page loaded before every search.
    pub base_url: String,
    pub cities: Vec<String>,
    pub data_types: Vec<DataType>,
    /// Directory the timestamped run folder is created in.
    pub output_parent: PathBuf,
    /// Waits for page elements and new windows.
    pub wait: WaitOptions,
    pub stitch: StitchOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            data_types: DataType::ALL.to_vec(),
            output_parent: PathBuf::from("."),
            wait: WaitOptions::default(),
            stitch: StitchOptions::default(),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_cities<I, S>(mut self, cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cities = cities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data_types(mut self, data_types: impl IntoIterator<Item = DataType>) -> Self {
        self.data_types = data_types.into_iter().collect();
        self
    }

    pub fn with_output_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.output_parent = parent.into();
        self
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_stitch(mut self, stitch: StitchOptions) -> Self {
        self.stitch = stitch;
        self
    }

    /// Every (city, data type) pair in processing order: cities outer, data types inner.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, DataType)> + '_ {
        self.cities
            .iter()
            .flat_map(move |city| self.data_types.iter().map(move |d| (city.as_str(), *d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_cities_and_types() {
        let config = RunConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.cities.len(), 7);
        assert_eq!(config.pairs().count(), 21);
        assert!(!config.stitch.trim_overlap);
    }

    #[test]
    fn pairs_iterate_cities_then_types() {
        let config = RunConfig::new()
            .with_cities(["唐山市", "邯郸市"])
            .with_data_types([DataType::DeathPopulation, DataType::NaturalGrowthRate]);
        let pairs: Vec<_> = config.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("唐山市", DataType::DeathPopulation),
                ("唐山市", DataType::NaturalGrowthRate),
                ("邯郸市", DataType::DeathPopulation),
                ("邯郸市", DataType::NaturalGrowthRate),
            ]
        );
    }
}
