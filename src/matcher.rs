//! Picking the right statistics link out of the site's search results.
//!
//! Search results list many near-identical titles (districts, counties,
//! towns, other cities). A link is accepted when its trimmed text:
//!
//! - contains every character of the target (`{city}{suffix}`),
//! - ends with the target's last character,
//! - mentions none of 区 (district), 镇 (town) or 县 (county),
//! - contains 市 exactly once.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Characters marking sub-city regions, whose links are never wanted.
const REGION_QUALIFIERS: [char; 3] = ['区', '镇', '县'];
const CITY_MARK: char = '市';

/// The population statistics that can be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 出生人口
    BirthPopulation,
    /// 死亡人口
    DeathPopulation,
    /// 自然增长率
    NaturalGrowthRate,
}

impl DataType {
    pub const ALL: [DataType; 3] = [
        DataType::BirthPopulation,
        DataType::DeathPopulation,
        DataType::NaturalGrowthRate,
    ];

    /// Label typed into the search box and used in output file names.
    pub fn label(&self) -> &'static str {
        match self {
            DataType::BirthPopulation => "出生人口",
            DataType::DeathPopulation => "死亡人口",
            DataType::NaturalGrowthRate => "自然增长率",
        }
    }

    /// How the site titles the matching statistics page, after the city name.
    pub fn link_suffix(&self) -> &'static str {
        match self {
            DataType::BirthPopulation => "出生人数",
            DataType::DeathPopulation => "死亡人数",
            DataType::NaturalGrowthRate => "自然增长率",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|d| d.label() == s.trim())
            .ok_or_else(|| Error::UnknownDataType(s.to_string()))
    }
}

/// Text typed into the site's search box.
pub fn search_query(city: &str, data_type: DataType) -> String {
    format!("{} {}", city, data_type.label())
}

/// The link title we are looking for, e.g. `石家庄市出生人数`.
pub fn target_text(city: &str, data_type: DataType) -> String {
    format!("{}{}", city, data_type.link_suffix())
}

/// Whether a search result titled `link_text` is the page for `target`.
pub fn is_matching_link(link_text: &str, target: &str) -> bool {
    let text = link_text.trim();
    let Some(last) = target.chars().last() else {
        return false;
    };

    target.chars().all(|c| text.contains(c))
        && text.ends_with(last)
        && !text.contains(REGION_QUALIFIERS)
        && text.matches(CITY_MARK).count() == 1
}

/// Index of the first candidate accepted by [`is_matching_link`].
pub fn first_match<'a, I>(candidates: I, target: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .position(|text| is_matching_link(text, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_title() {
        let target = target_text("石家庄市", DataType::BirthPopulation);
        assert_eq!(target, "石家庄市出生人数");
        assert!(is_matching_link("石家庄市出生人数", &target));
    }

    #[test]
    fn accepts_title_with_extra_words_and_whitespace() {
        let target = target_text("唐山市", DataType::DeathPopulation);
        assert!(is_matching_link("  唐山市历年死亡人数\n", &target));
    }

    #[test]
    fn rejects_region_qualifiers() {
        let target = target_text("石家庄市", DataType::BirthPopulation);
        assert!(!is_matching_link("石家庄市长安区出生人数", &target));
        assert!(!is_matching_link("石家庄市鹿泉镇出生人数", &target));
        assert!(!is_matching_link("石家庄市正定县出生人数", &target));
    }

    #[test]
    fn rejects_more_than_one_city_mark() {
        let target = target_text("石家庄市", DataType::BirthPopulation);
        assert!(!is_matching_link("石家庄市辛集市出生人数", &target));
    }

    #[test]
    fn rejects_wrong_ending_or_missing_chars() {
        let target = target_text("邯郸市", DataType::NaturalGrowthRate);
        assert!(!is_matching_link("邯郸市自然增长率排名", &target));
        assert!(!is_matching_link("邯郸市出生率", &target));
        assert!(!is_matching_link("", &target));
    }

    #[test]
    fn empty_target_matches_nothing() {
        assert!(!is_matching_link("石家庄市出生人数", ""));
    }

    #[test]
    fn first_match_skips_districts() {
        let target = target_text("邢台市", DataType::BirthPopulation);
        let rows = ["邢台市信都区出生人数", "邢台市出生人数", "邢台市出生人数（旧）"];
        assert_eq!(first_match(rows, &target), Some(1));
        assert_eq!(first_match(["张家口市出生人数"], &target), None);
    }

    #[test]
    fn data_type_labels_round_trip_through_from_str() {
        for data_type in DataType::ALL {
            assert_eq!(data_type.label().parse::<DataType>().unwrap(), data_type);
        }
        assert!(matches!("人口密度".parse::<DataType>(), Err(Error::UnknownDataType(_))));
    }

    #[test]
    fn search_query_separates_city_and_label() {
        assert_eq!(search_query("秦皇岛市", DataType::NaturalGrowthRate), "秦皇岛市 自然增长率");
    }
}
